//! Pairwise aggregation and contribution attribution
//!
//! Pure algorithms over already-loaded data; the engine feeds them and
//! writes the outcome back into the state.

use crate::state::{OpinionEntry, ResultEntry};
use lib_cas::Multihash;
use lib_identity::Address;
use std::collections::BTreeMap;

/// Winner of a pairwise comparison under one ranked choice
///
/// The earlier index wins when both options are ranked; a ranked option
/// beats an unranked one; two unranked options have no winner.
pub fn compare<'a>(
    a: &'a Multihash,
    b: &'a Multihash,
    ranked_choice: &[Multihash],
) -> Option<&'a Multihash> {
    let position_a = ranked_choice.iter().position(|hash| hash == a);
    let position_b = ranked_choice.iter().position(|hash| hash == b);
    match (position_a, position_b) {
        (Some(index_a), Some(index_b)) => {
            if index_a < index_b {
                Some(a)
            } else if index_a > index_b {
                Some(b)
            } else {
                None
            }
        }
        (Some(_), None) => Some(a),
        (None, Some(_)) => Some(b),
        (None, None) => None,
    }
}

/// Option hashes in descending score order
///
/// Score ties order by position in the state's option sequence, keeping
/// the ranking deterministic across replays of the same history.
pub fn ranked_by_score(
    results: &BTreeMap<Multihash, ResultEntry>,
    insertion_order: &[Multihash],
) -> Vec<Multihash> {
    let position = |hash: &Multihash| {
        insertion_order
            .iter()
            .position(|candidate| candidate == hash)
            .unwrap_or(usize::MAX)
    };
    let mut hashes: Vec<&Multihash> = results.keys().collect();
    hashes.sort_by(|a, b| {
        results[*b]
            .score
            .total_cmp(&results[*a].score)
            .then_with(|| position(a).cmp(&position(b)))
    });
    hashes.into_iter().cloned().collect()
}

/// Contribution attribution for one question
///
/// Voters are ordered by opinion timestamp (ties lexicographically by
/// address) and voters with weight at or below zero are dropped. Each
/// voter gets an early-bird multiplier `1 - i/n` (0 for an empty ranked
/// choice) and a deviance measuring the distance between their ranking
/// and the aggregated result; the contribution combines both.
pub fn calculate_contributions(
    opinions: &BTreeMap<Address, OpinionEntry>,
    weights: &BTreeMap<Address, f64>,
    ranked_choices: &BTreeMap<Address, Vec<Multihash>>,
    ranked_options: &[Multihash],
) -> BTreeMap<Address, f64> {
    let mut voters: Vec<(&Address, u64)> = opinions
        .iter()
        .filter(|(address, _)| weights.get(*address).copied().unwrap_or(0.0) > 0.0)
        .map(|(address, entry)| (address, entry.timestamp))
        .collect();
    voters.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));

    let voter_count = voters.len();
    let mut multipliers: BTreeMap<&Address, f64> = BTreeMap::new();
    let mut deviances: BTreeMap<&Address, u64> = BTreeMap::new();
    let mut total_deviance: u64 = 0;

    for (i, (address, _)) in voters.iter().enumerate() {
        let ranked_choice = ranked_choices
            .get(*address)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let multiplier = if ranked_choice.is_empty() {
            0.0
        } else {
            1.0 - i as f64 / voter_count as f64
        };
        multipliers.insert(address, multiplier);

        let mut deviance: u64 = 0;
        for (j, option_hash) in ranked_options.iter().enumerate() {
            match ranked_choice.iter().position(|hash| hash == option_hash) {
                Some(rank) => deviance += (j as i64 - rank as i64).unsigned_abs(),
                None => deviance += (ranked_options.len() - j) as u64,
            }
        }
        total_deviance += deviance;
        deviances.insert(address, deviance);
    }

    deviances
        .iter()
        .map(|(address, deviance)| {
            let contribution = if total_deviance > 0 {
                (1.0 - *deviance as f64 / total_deviance as f64) * multipliers[*address]
            } else {
                multipliers[*address]
            };
            ((*address).clone(), contribution)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_identity::Signature;

    fn hashes(n: usize) -> Vec<Multihash> {
        (0..n)
            .map(|i| Multihash::for_bytes(format!("option-{}", i).as_bytes()))
            .collect()
    }

    fn voter(tag: &str) -> Address {
        match tag {
            "a" => Address::from_string("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa").unwrap(),
            "b" => Address::from_string("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy").unwrap(),
            _ => Address::from_string("mipcBbFg9gMiCh81Kj8tqqdgoZub1ZJRfn").unwrap(),
        }
    }

    fn entry(timestamp: u64) -> OpinionEntry {
        OpinionEntry {
            opinion_hash: Multihash::for_bytes(b"opinion"),
            signature: Signature::from_string("sig"),
            timestamp,
        }
    }

    #[test]
    fn test_compare_both_ranked() {
        let pool = hashes(3);
        let ranking = vec![pool[1].clone(), pool[0].clone()];
        assert_eq!(compare(&pool[0], &pool[1], &ranking), Some(&pool[1]));
        assert_eq!(compare(&pool[1], &pool[0], &ranking), Some(&pool[1]));
    }

    #[test]
    fn test_compare_one_ranked_wins() {
        let pool = hashes(3);
        let ranking = vec![pool[2].clone()];
        assert_eq!(compare(&pool[0], &pool[2], &ranking), Some(&pool[2]));
        assert_eq!(compare(&pool[2], &pool[0], &ranking), Some(&pool[2]));
    }

    #[test]
    fn test_compare_neither_ranked() {
        let pool = hashes(3);
        assert_eq!(compare(&pool[0], &pool[1], &[]), None);
    }

    #[test]
    fn test_ranked_by_score_breaks_ties_by_insertion() {
        let pool = hashes(3);
        let mut results = BTreeMap::new();
        results.insert(
            pool[0].clone(),
            ResultEntry {
                score: 0.5,
                ..Default::default()
            },
        );
        results.insert(
            pool[1].clone(),
            ResultEntry {
                score: 0.9,
                ..Default::default()
            },
        );
        results.insert(
            pool[2].clone(),
            ResultEntry {
                score: 0.5,
                ..Default::default()
            },
        );

        let ranked = ranked_by_score(&results, &pool);
        assert_eq!(ranked, vec![pool[1].clone(), pool[0].clone(), pool[2].clone()]);
    }

    #[test]
    fn test_contributions_reward_accuracy_and_earliness() {
        let pool = hashes(2);
        let mut opinions = BTreeMap::new();
        opinions.insert(voter("a"), entry(100));
        opinions.insert(voter("b"), entry(200));

        let mut weights = BTreeMap::new();
        weights.insert(voter("a"), 1.0);
        weights.insert(voter("b"), 1.0);

        let mut ranked_choices = BTreeMap::new();
        // Voter a matches the final ranking exactly, voter b inverted it
        ranked_choices.insert(voter("a"), pool.clone());
        ranked_choices.insert(voter("b"), vec![pool[1].clone(), pool[0].clone()]);

        let contributions = calculate_contributions(&opinions, &weights, &ranked_choices, &pool);

        // Deviances are 0 and 2: a keeps its full early-bird multiplier,
        // b ends up with nothing
        assert!((contributions[&voter("a")] - 1.0).abs() < 1e-9);
        assert!(contributions[&voter("b")].abs() < 1e-9);
    }

    #[test]
    fn test_contributions_drop_zero_weight_voters() {
        let pool = hashes(2);
        let mut opinions = BTreeMap::new();
        opinions.insert(voter("a"), entry(100));
        opinions.insert(voter("b"), entry(50));

        let mut weights = BTreeMap::new();
        weights.insert(voter("a"), 1.0);
        weights.insert(voter("b"), 0.0);

        let mut ranked_choices = BTreeMap::new();
        ranked_choices.insert(voter("a"), pool.clone());
        ranked_choices.insert(voter("b"), pool.clone());

        let contributions = calculate_contributions(&opinions, &weights, &ranked_choices, &pool);
        assert_eq!(contributions.len(), 1);
        assert!(contributions.contains_key(&voter("a")));
    }

    #[test]
    fn test_contributions_empty_ranking_gets_zero_multiplier() {
        let pool = hashes(2);
        let mut opinions = BTreeMap::new();
        opinions.insert(voter("a"), entry(100));
        opinions.insert(voter("b"), entry(200));

        let mut weights = BTreeMap::new();
        weights.insert(voter("a"), 1.0);
        weights.insert(voter("b"), 1.0);

        let mut ranked_choices = BTreeMap::new();
        ranked_choices.insert(voter("a"), Vec::new());
        ranked_choices.insert(voter("b"), pool.clone());

        let contributions = calculate_contributions(&opinions, &weights, &ranked_choices, &pool);
        assert_eq!(contributions[&voter("a")], 0.0);
        assert!(contributions[&voter("b")] > 0.0);
    }

    #[test]
    fn test_contributions_perfect_round_keeps_multipliers() {
        // Both voters match the final ranking: total deviance is 0 and
        // contributions reduce to the early-bird multipliers
        let pool = hashes(2);
        let mut opinions = BTreeMap::new();
        opinions.insert(voter("a"), entry(100));
        opinions.insert(voter("b"), entry(200));

        let mut weights = BTreeMap::new();
        weights.insert(voter("a"), 1.0);
        weights.insert(voter("b"), 1.0);

        let mut ranked_choices = BTreeMap::new();
        ranked_choices.insert(voter("a"), pool.clone());
        ranked_choices.insert(voter("b"), pool.clone());

        let contributions = calculate_contributions(&opinions, &weights, &ranked_choices, &pool);
        assert!((contributions[&voter("a")] - 1.0).abs() < 1e-9);
        assert!((contributions[&voter("b")] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_timestamp_tie_breaks_by_address() {
        let pool = hashes(2);
        let mut opinions = BTreeMap::new();
        // Same second: the lexicographically smaller address ranks first
        opinions.insert(voter("a"), entry(100));
        opinions.insert(voter("b"), entry(100));

        let mut weights = BTreeMap::new();
        weights.insert(voter("a"), 1.0);
        weights.insert(voter("b"), 1.0);

        let mut ranked_choices = BTreeMap::new();
        ranked_choices.insert(voter("a"), pool.clone());
        ranked_choices.insert(voter("b"), pool.clone());

        let contributions = calculate_contributions(&opinions, &weights, &ranked_choices, &pool);
        assert!((contributions[&voter("a")] - 1.0).abs() < 1e-9);
        assert!((contributions[&voter("b")] - 0.5).abs() < 1e-9);
    }
}
