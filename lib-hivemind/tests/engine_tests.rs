//! End-to-end tests of the decision engine: proposing, supporting,
//! ranking and selecting over an in-memory store with the deterministic
//! development-mode signature scheme.

use anyhow::Result;
use lib_cas::{MemoryCas, Multihash};
use lib_hivemind::{
    AnswerType, AutoComplete, Consensus, ConsensusType, HivemindEngine, HivemindError,
    HivemindIssue, HivemindOpinion, HivemindOption, HivemindState, NullOracle, OnSelection,
    OptionValue, Restrictions, SilEntry, StaticListOracle,
};
use lib_identity::{Address, DevModeVerifier, Signature};

const VOTER_A: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";
const VOTER_B: &str = "3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy";
const VOTER_C: &str = "mipcBbFg9gMiCh81Kj8tqqdgoZub1ZJRfn";

fn address(text: &str) -> Address {
    Address::from_string(text).unwrap()
}

fn engine() -> HivemindEngine {
    HivemindEngine::new(
        Box::new(MemoryCas::new()),
        Box::new(DevModeVerifier::new()),
        Box::new(StaticListOracle::new()),
    )
}

fn sign_artifact(signer: &Address, hash: &Multihash) -> Signature {
    DevModeVerifier::sign(signer, &format!("IPFS={}", hash))
}

/// Publish an integer issue and create its empty state
fn integer_issue(
    engine: &mut HivemindEngine,
    on_selection: OnSelection,
) -> Result<(Multihash, HivemindState)> {
    let mut issue = HivemindIssue::new();
    issue.add_question("Choose a number");
    issue.set_description("Pick the number the group likes best");
    issue.set_answer_type(AnswerType::Integer);
    issue.set_consensus_type(ConsensusType::Single);
    issue.set_on_selection(on_selection);
    let issue_hash = issue.save(engine.cas_mut())?;
    let state = engine.new_state(&issue_hash)?;
    Ok((issue_hash, state))
}

/// Publish an option and return its multihash
fn publish_option(
    engine: &mut HivemindEngine,
    issue_hash: &Multihash,
    value: OptionValue,
) -> Result<Multihash> {
    let issue = engine.issue(issue_hash)?;
    let mut option = HivemindOption::new(issue_hash.clone(), &issue);
    option.set(value);
    Ok(option.save(engine.cas_mut(), &issue)?)
}

/// Publish integer options and add them to the state
fn add_integer_options(
    engine: &mut HivemindEngine,
    issue_hash: &Multihash,
    state: &mut HivemindState,
    values: &[i64],
) -> Result<Vec<Multihash>> {
    let mut hashes = Vec::new();
    for value in values {
        let hash = publish_option(engine, issue_hash, OptionValue::Integer(*value))?;
        engine.add_option(state, &hash, None, None)?;
        hashes.push(hash);
    }
    Ok(hashes)
}

/// Publish a signed opinion and accept it into the state
fn submit_opinion(
    engine: &mut HivemindEngine,
    state: &mut HivemindState,
    voter: &Address,
    ranked: Vec<Multihash>,
    weight: f64,
) -> Result<Multihash> {
    let snapshot = state.save(engine.cas_mut())?;
    let mut opinion = HivemindOpinion::new(snapshot, 0);
    opinion.set(voter.clone(), ranked, state)?;
    let opinion_hash = opinion.save(engine.cas_mut())?;
    let signature = sign_artifact(voter, &opinion_hash);
    engine.add_opinion(state, &opinion_hash, &signature, weight, 0)?;
    Ok(opinion_hash)
}

fn score(state: &HivemindState, option_hash: &Multihash) -> f64 {
    state.results[0][option_hash].score
}

#[test]
fn test_basic_single_consensus() -> Result<()> {
    let mut engine = engine();
    let (issue_hash, mut state) = integer_issue(&mut engine, OnSelection::None)?;
    let options = add_integer_options(&mut engine, &issue_hash, &mut state, &[5, 10, 15])?;
    let (five, ten, fifteen) = (&options[0], &options[1], &options[2]);

    submit_opinion(
        &mut engine,
        &mut state,
        &address(VOTER_A),
        vec![ten.clone(), fifteen.clone(), five.clone()],
        1.0,
    )?;
    submit_opinion(
        &mut engine,
        &mut state,
        &address(VOTER_B),
        vec![ten.clone(), five.clone(), fifteen.clone()],
        1.0,
    )?;

    engine.calculate_results(&mut state, 0)?;

    // 10 wins all four of its weighted comparisons; 5 and 15 each win one
    // of theirs
    assert!((score(&state, ten) - 1.0).abs() < 1e-9);
    assert!((score(&state, five) - 0.25).abs() < 1e-9);
    assert!((score(&state, fifteen) - 0.25).abs() < 1e-9);

    assert_eq!(
        engine.consensus(&state, 0)?,
        Some(OptionValue::Integer(10))
    );

    // Every decisive pairwise comparison contributes one win and one loss
    let (wins, losses): (f64, f64) = state.results[0]
        .values()
        .fold((0.0, 0.0), |(w, l), e| (w + e.win, l + e.loss));
    assert!((wins - losses).abs() < 1e-9);
    assert!((wins + losses - 12.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_tie_returns_none() -> Result<()> {
    let mut engine = engine();
    let (issue_hash, mut state) = integer_issue(&mut engine, OnSelection::None)?;
    let options = add_integer_options(&mut engine, &issue_hash, &mut state, &[5, 10, 15])?;

    submit_opinion(
        &mut engine,
        &mut state,
        &address(VOTER_A),
        options.clone(),
        1.0,
    )?;
    let mut reversed = options.clone();
    reversed.reverse();
    submit_opinion(&mut engine, &mut state, &address(VOTER_B), reversed, 1.0)?;

    engine.calculate_results(&mut state, 0)?;
    for hash in &options {
        assert!((score(&state, hash) - 0.5).abs() < 1e-9);
    }
    assert_eq!(engine.consensus(&state, 0)?, None);
    Ok(())
}

#[test]
fn test_finalize_freezes_the_state() -> Result<()> {
    let mut engine = engine();
    let (issue_hash, mut state) = integer_issue(&mut engine, OnSelection::Finalize)?;
    let options = add_integer_options(&mut engine, &issue_hash, &mut state, &[5, 10, 15])?;

    submit_opinion(
        &mut engine,
        &mut state,
        &address(VOTER_A),
        vec![options[1].clone(), options[2].clone(), options[0].clone()],
        1.0,
    )?;

    let selection = engine.select_consensus(&mut state)?;
    assert_eq!(selection, Some(vec![Some(OptionValue::Integer(10))]));
    assert!(state.finalized);

    // Further mutations are silent no-ops
    let late = publish_option(&mut engine, &issue_hash, OptionValue::Integer(20))?;
    engine.add_option(&mut state, &late, None, None)?;
    assert_eq!(state.options.len(), 3);

    let opinions_before = state.opinions[0].len();
    let snapshot = state.multihash().unwrap().clone();
    let mut opinion = HivemindOpinion::new(snapshot, 0);
    opinion.set(address(VOTER_B), vec![options[0].clone()], &state)?;
    let opinion_hash = opinion.save(engine.cas_mut())?;
    let signature = sign_artifact(&address(VOTER_B), &opinion_hash);
    engine.add_opinion(&mut state, &opinion_hash, &signature, 1.0, 0)?;
    assert_eq!(state.opinions[0].len(), opinions_before);

    // Selecting again on a finalized state is a no-op
    assert_eq!(engine.select_consensus(&mut state)?, None);
    assert_eq!(state.selected.len(), 1);
    Ok(())
}

#[test]
fn test_exclude_shrinks_available_set() -> Result<()> {
    let mut engine = engine();
    let (issue_hash, mut state) = integer_issue(&mut engine, OnSelection::Exclude)?;
    let options = add_integer_options(&mut engine, &issue_hash, &mut state, &[5, 10, 15])?;
    let ranking = vec![options[1].clone(), options[2].clone(), options[0].clone()];

    submit_opinion(&mut engine, &mut state, &address(VOTER_A), ranking.clone(), 1.0)?;
    submit_opinion(&mut engine, &mut state, &address(VOTER_B), ranking, 1.0)?;

    let first = engine.select_consensus(&mut state)?;
    assert_eq!(first, Some(vec![Some(OptionValue::Integer(10))]));

    // The winner stays in the option pool but leaves the available set
    engine.calculate_results(&mut state, 0)?;
    assert_eq!(state.options.len(), 3);
    let second = engine.consensus(&state, 0)?;
    assert_eq!(second, Some(OptionValue::Integer(15)));
    Ok(())
}

#[test]
fn test_reset_clears_opinions_only() -> Result<()> {
    let mut engine = engine();
    let (issue_hash, mut state) = integer_issue(&mut engine, OnSelection::Reset)?;
    let options = add_integer_options(&mut engine, &issue_hash, &mut state, &[5, 10, 15])?;

    submit_opinion(
        &mut engine,
        &mut state,
        &address(VOTER_A),
        vec![options[1].clone(), options[2].clone(), options[0].clone()],
        1.0,
    )?;

    let selected_before = state.selected.len();
    engine.select_consensus(&mut state)?;

    assert!(state.opinions.iter().all(|opinions| opinions.is_empty()));
    assert_eq!(state.options.len(), 3);
    assert_eq!(state.selected.len(), selected_before + 1);
    assert_eq!(state.get_weight(&address(VOTER_A)), 1.0);
    assert!(!state.finalized);
    Ok(())
}

#[test]
fn test_auto_complete_max_over_state_options() -> Result<()> {
    let mut engine = engine();
    let (issue_hash, mut state) = integer_issue(&mut engine, OnSelection::None)?;
    let options = add_integer_options(&mut engine, &issue_hash, &mut state, &[1, 2, 3, 4, 5])?;

    let snapshot = state.save(engine.cas_mut())?;
    let mut opinion = HivemindOpinion::new(snapshot, 0);
    opinion.set(address(VOTER_A), vec![options[2].clone()], &state)?;
    opinion.set_auto_complete(AutoComplete::Max);

    let ranking = engine.opinion_ranking(&state, &opinion)?;
    assert_eq!(
        ranking,
        vec![options[2].clone(), options[1].clone(), options[0].clone()]
    );
    Ok(())
}

#[test]
fn test_address_restrictions_enforced() -> Result<()> {
    let mut engine = engine();

    let mut issue = HivemindIssue::new();
    issue.add_question("Restricted proposals");
    issue.set_answer_type(AnswerType::Integer);
    issue.set_restrictions(Restrictions {
        addresses: Some(vec![address(VOTER_A)]),
        ..Default::default()
    })?;
    let issue_hash = issue.save(engine.cas_mut())?;
    let mut state = engine.new_state(&issue_hash)?;

    let option_hash = publish_option(&mut engine, &issue_hash, OptionValue::Integer(1))?;

    // A validly signed request by an address outside the allow-list
    let intruder = address(VOTER_B);
    let result = engine.add_option(
        &mut state,
        &option_hash,
        Some(&intruder),
        Some(&sign_artifact(&intruder, &option_hash)),
    );
    assert!(matches!(result, Err(HivemindError::Forbidden(_))));
    assert!(state.options.is_empty());

    // Missing credentials are also forbidden
    let result = engine.add_option(&mut state, &option_hash, None, None);
    assert!(matches!(result, Err(HivemindError::Forbidden(_))));

    // The allowed address succeeds and becomes a supporter
    let proposer = address(VOTER_A);
    engine.add_option(
        &mut state,
        &option_hash,
        Some(&proposer),
        Some(&sign_artifact(&proposer, &option_hash)),
    )?;
    assert_eq!(state.options, vec![option_hash.clone()]);
    assert_eq!(state.supporters.len(), 1);
    assert_eq!(state.supporters[0].option_hash, option_hash);
    assert_eq!(state.supporters[0].address, proposer);
    Ok(())
}

#[test]
fn test_options_per_address_cap() -> Result<()> {
    let mut engine = engine();

    let mut issue = HivemindIssue::new();
    issue.add_question("One proposal each");
    issue.set_answer_type(AnswerType::Integer);
    issue.set_restrictions(Restrictions {
        options_per_address: Some(1),
        ..Default::default()
    })?;
    let issue_hash = issue.save(engine.cas_mut())?;
    let mut state = engine.new_state(&issue_hash)?;

    let proposer = address(VOTER_A);
    let first = publish_option(&mut engine, &issue_hash, OptionValue::Integer(1))?;
    engine.add_option(
        &mut state,
        &first,
        Some(&proposer),
        Some(&sign_artifact(&proposer, &first)),
    )?;

    let second = publish_option(&mut engine, &issue_hash, OptionValue::Integer(2))?;
    let result = engine.add_option(
        &mut state,
        &second,
        Some(&proposer),
        Some(&sign_artifact(&proposer, &second)),
    );
    assert!(matches!(result, Err(HivemindError::Forbidden(_))));
    assert_eq!(state.options.len(), 1);
    Ok(())
}

#[test]
fn test_opinion_signature_binding() -> Result<()> {
    let mut engine = engine();
    let (issue_hash, mut state) = integer_issue(&mut engine, OnSelection::None)?;
    let options = add_integer_options(&mut engine, &issue_hash, &mut state, &[5, 10])?;

    let snapshot = state.save(engine.cas_mut())?;
    let mut opinion = HivemindOpinion::new(snapshot, 0);
    opinion.set(address(VOTER_A), vec![options[0].clone()], &state)?;
    let opinion_hash = opinion.save(engine.cas_mut())?;

    // Signature over a different artifact must not bind this opinion
    let wrong = sign_artifact(&address(VOTER_A), &options[0]);
    let result = engine.add_opinion(&mut state, &opinion_hash, &wrong, 1.0, 0);
    assert!(matches!(result, Err(HivemindError::SignatureInvalid(_))));
    assert!(state.opinions[0].is_empty());
    Ok(())
}

#[test]
fn test_option_added_once_with_zeroed_results() -> Result<()> {
    let mut engine = engine();
    let (issue_hash, mut state) = integer_issue(&mut engine, OnSelection::None)?;
    let option_hash = publish_option(&mut engine, &issue_hash, OptionValue::Integer(5))?;

    engine.add_option(&mut state, &option_hash, None, None)?;
    engine.add_option(&mut state, &option_hash, None, None)?;

    assert_eq!(state.options, vec![option_hash.clone()]);
    let entry = &state.results[0][&option_hash];
    assert_eq!((entry.win, entry.loss, entry.unknown, entry.score), (0.0, 0.0, 0.0, 0.0));
    Ok(())
}

#[test]
fn test_option_for_foreign_issue_rejected() -> Result<()> {
    let mut engine = engine();
    let (_, mut state) = integer_issue(&mut engine, OnSelection::None)?;

    let mut other = HivemindIssue::new();
    other.add_question("A different question");
    other.set_answer_type(AnswerType::Integer);
    let other_hash = other.save(engine.cas_mut())?;
    let foreign = publish_option(&mut engine, &other_hash, OptionValue::Integer(5))?;

    let result = engine.add_option(&mut state, &foreign, None, None);
    assert!(matches!(result, Err(HivemindError::InvalidInput(_))));
    assert!(state.options.is_empty());
    Ok(())
}

#[test]
fn test_support_requires_known_option() -> Result<()> {
    let mut engine = engine();
    let (issue_hash, mut state) = integer_issue(&mut engine, OnSelection::None)?;
    let stranger = publish_option(&mut engine, &issue_hash, OptionValue::Integer(5))?;

    let supporter = address(VOTER_A);
    let result = engine.support_option(
        &mut state,
        &stranger,
        &supporter,
        &sign_artifact(&supporter, &stranger),
    );
    assert!(matches!(result, Err(HivemindError::NotFound(_))));
    Ok(())
}

#[test]
fn test_duplicate_support_is_noop() -> Result<()> {
    let mut engine = engine();
    let (issue_hash, mut state) = integer_issue(&mut engine, OnSelection::None)?;
    let options = add_integer_options(&mut engine, &issue_hash, &mut state, &[5])?;

    let supporter = address(VOTER_A);
    let signature = sign_artifact(&supporter, &options[0]);
    engine.support_option(&mut state, &options[0], &supporter, &signature)?;
    engine.support_option(&mut state, &options[0], &supporter, &signature)?;
    assert_eq!(state.supporters.len(), 1);
    Ok(())
}

#[test]
fn test_new_opinion_replaces_previous() -> Result<()> {
    let mut engine = engine();
    let (issue_hash, mut state) = integer_issue(&mut engine, OnSelection::None)?;
    let options = add_integer_options(&mut engine, &issue_hash, &mut state, &[5, 10])?;

    let voter = address(VOTER_A);
    submit_opinion(&mut engine, &mut state, &voter, vec![options[0].clone()], 1.0)?;
    let second = submit_opinion(
        &mut engine,
        &mut state,
        &voter,
        vec![options[1].clone(), options[0].clone()],
        2.0,
    )?;

    assert_eq!(state.opinions[0].len(), 1);
    assert_eq!(state.opinions[0][&voter].opinion_hash, second);
    assert_eq!(state.get_weight(&voter), 2.0);
    Ok(())
}

#[test]
fn test_ranked_consensus_orders_by_score() -> Result<()> {
    let mut engine = engine();

    let mut issue = HivemindIssue::new();
    issue.add_question("Rank the numbers");
    issue.set_answer_type(AnswerType::Integer);
    issue.set_consensus_type(ConsensusType::Ranked);
    let issue_hash = issue.save(engine.cas_mut())?;
    let mut state = engine.new_state(&issue_hash)?;
    let options = add_integer_options(&mut engine, &issue_hash, &mut state, &[5, 10, 15])?;

    submit_opinion(
        &mut engine,
        &mut state,
        &address(VOTER_A),
        vec![options[1].clone(), options[2].clone(), options[0].clone()],
        1.0,
    )?;
    engine.calculate_results(&mut state, 0)?;

    match engine.get_consensus(&state, 0)? {
        Consensus::Ranked(values) => assert_eq!(
            values,
            vec![
                OptionValue::Integer(10),
                OptionValue::Integer(15),
                OptionValue::Integer(5)
            ]
        ),
        other => panic!("expected a ranked consensus, got {:?}", other),
    }

    // Selecting is only defined for single consensus issues
    assert_eq!(engine.select_consensus(&mut state)?, None);
    assert!(state.selected.is_empty());
    Ok(())
}

#[test]
fn test_contributions_follow_submission_order() -> Result<()> {
    let mut engine = engine();
    let (issue_hash, mut state) = integer_issue(&mut engine, OnSelection::None)?;
    let options = add_integer_options(&mut engine, &issue_hash, &mut state, &[5, 10])?;
    let ranking = vec![options[1].clone(), options[0].clone()];

    // Identical opinions in the same second: the timestamp tie breaks
    // lexicographically by address, A before B before C
    for voter in [VOTER_A, VOTER_B, VOTER_C] {
        submit_opinion(&mut engine, &mut state, &address(voter), ranking.clone(), 1.0)?;
    }
    engine.calculate_results(&mut state, 0)?;

    let contributions = &state.contributions[0];
    assert!((contributions[&address(VOTER_A)] - 1.0).abs() < 1e-9);
    assert!((contributions[&address(VOTER_B)] - 2.0 / 3.0).abs() < 1e-9);
    assert!((contributions[&address(VOTER_C)] - 1.0 / 3.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_zero_weight_voter_moves_nothing() -> Result<()> {
    let mut engine = engine();
    let (issue_hash, mut state) = integer_issue(&mut engine, OnSelection::None)?;
    let options = add_integer_options(&mut engine, &issue_hash, &mut state, &[5, 10])?;

    submit_opinion(
        &mut engine,
        &mut state,
        &address(VOTER_A),
        vec![options[0].clone(), options[1].clone()],
        0.0,
    )?;
    engine.calculate_results(&mut state, 0)?;

    assert_eq!(score(&state, &options[0]), 0.0);
    assert_eq!(score(&state, &options[1]), 0.0);
    assert!(state.contributions[0].is_empty());
    Ok(())
}

#[test]
fn test_sil_gated_address_options() -> Result<()> {
    let list_owner = address(VOTER_A);
    let member = address(VOTER_B);
    let oracle = StaticListOracle::new().with_sil(
        list_owner.clone(),
        vec![SilEntry {
            address: member.clone(),
            amount: 100,
        }],
    );
    let mut engine = HivemindEngine::new(
        Box::new(MemoryCas::new()),
        Box::new(DevModeVerifier::new()),
        Box::new(oracle),
    );

    let mut issue = HivemindIssue::new();
    issue.add_question("Which address should receive the funds?");
    issue.set_answer_type(AnswerType::Address);
    issue.set_constraints(lib_hivemind::Constraints {
        sil: Some(list_owner),
        ..Default::default()
    })?;
    let issue_hash = issue.save(engine.cas_mut())?;
    let mut state = engine.new_state(&issue_hash)?;

    let in_list = publish_option(
        &mut engine,
        &issue_hash,
        OptionValue::Text(member.as_str().to_string()),
    )?;
    engine.add_option(&mut state, &in_list, None, None)?;
    assert_eq!(state.options.len(), 1);

    let outsider = publish_option(
        &mut engine,
        &issue_hash,
        OptionValue::Text(VOTER_C.to_string()),
    )?;
    let result = engine.add_option(&mut state, &outsider, None, None);
    assert!(matches!(result, Err(HivemindError::InvalidInput(_))));
    Ok(())
}

#[test]
fn test_unreachable_oracle_surfaces() -> Result<()> {
    let mut engine = HivemindEngine::new(
        Box::new(MemoryCas::new()),
        Box::new(DevModeVerifier::new()),
        Box::new(NullOracle),
    );

    let mut issue = HivemindIssue::new();
    issue.add_question("Which address?");
    issue.set_answer_type(AnswerType::Address);
    issue.set_constraints(lib_hivemind::Constraints {
        sil: Some(address(VOTER_A)),
        ..Default::default()
    })?;
    let issue_hash = issue.save(engine.cas_mut())?;
    let mut state = engine.new_state(&issue_hash)?;

    let option_hash = publish_option(
        &mut engine,
        &issue_hash,
        OptionValue::Text(VOTER_B.to_string()),
    )?;
    let result = engine.add_option(&mut state, &option_hash, None, None);
    assert!(matches!(result, Err(HivemindError::OracleUnavailable(_))));
    assert!(state.options.is_empty());
    Ok(())
}
