//! Integration tests for the SQLite destination registry.

use launchq::error::Error;
use launchq::model::*;
use launchq::registry::Registry;

fn test_registry() -> Registry {
    Registry::in_memory().expect("failed to create in-memory registry")
}

fn submitted(alias: &str) -> SubmissionRecord {
    SubmissionRecord::submitted(
        Alias::from(alias),
        BatchId::new(),
        JobHandle::from(format!("job-{alias}")),
    )
}

// ---------------------------------------------------------------------------
// Insert / upsert
// ---------------------------------------------------------------------------

#[test]
fn insert_then_get_round_trips() {
    let mut registry = test_registry();
    registry.insert(&submitted("calc/1")).unwrap();

    let rec = registry.get(&Alias::from("calc/1")).unwrap();
    assert_eq!(rec.alias.as_str(), "calc/1");
    assert_eq!(rec.state, JobState::Pending);
    assert_eq!(rec.handle, Some(JobHandle::from("job-calc/1")));
    assert_eq!(rec.poll_failures, 0);
    assert!(rec.batch.is_some());
    assert!(rec.completed_at.is_none());
}

#[test]
fn second_insert_at_same_alias_is_rejected() {
    let mut registry = test_registry();
    registry.insert(&submitted("a")).unwrap();

    match registry.insert(&submitted("a")) {
        Err(Error::AliasExists(alias)) => assert_eq!(alias.as_str(), "a"),
        other => panic!("expected AliasExists, got {other:?}"),
    }
}

#[test]
fn upsert_replaces_an_existing_row() {
    let mut registry = test_registry();
    registry.insert(&submitted("a")).unwrap();

    let replacement = SubmissionRecord::failed(Alias::from("a"), BatchId::new(), "rerun rejected");
    registry.upsert(&replacement).unwrap();

    let rec = registry.get(&Alias::from("a")).unwrap();
    assert_eq!(rec.state, JobState::Failed);
    assert_eq!(rec.error.as_deref(), Some("rerun rejected"));
}

#[test]
fn missing_alias_is_not_found() {
    let registry = test_registry();
    assert!(matches!(
        registry.get(&Alias::from("ghost")),
        Err(Error::NotFound(_))
    ));
    assert!(!registry.contains(&Alias::from("ghost")).unwrap());
}

// ---------------------------------------------------------------------------
// State transitions
// ---------------------------------------------------------------------------

#[test]
fn update_state_returns_previous_state() {
    let mut registry = test_registry();
    registry.insert(&submitted("a")).unwrap();

    let old = registry
        .update_state(&Alias::from("a"), JobState::Running)
        .unwrap();
    assert_eq!(old, JobState::Pending);
    assert_eq!(
        registry.get(&Alias::from("a")).unwrap().state,
        JobState::Running
    );
}

#[test]
fn terminal_rows_reject_further_transitions() {
    let mut registry = test_registry();
    registry.insert(&submitted("a")).unwrap();
    registry.complete(&Alias::from("a")).unwrap();

    let result = registry.update_state(&Alias::from("a"), JobState::Running);
    assert!(matches!(result, Err(Error::InvalidTransition { .. })));

    let result = registry.fail(&Alias::from("a"), "too late");
    assert!(matches!(result, Err(Error::InvalidTransition { .. })));
}

#[test]
fn completing_stamps_completed_at() {
    let mut registry = test_registry();
    registry.insert(&submitted("a")).unwrap();
    registry.complete(&Alias::from("a")).unwrap();

    let rec = registry.get(&Alias::from("a")).unwrap();
    assert_eq!(rec.state, JobState::Finished);
    assert!(rec.completed_at.is_some());
}

#[test]
fn fail_stores_the_error_atomically() {
    let mut registry = test_registry();
    registry.insert(&submitted("a")).unwrap();
    registry.fail(&Alias::from("a"), "out of memory").unwrap();

    let rec = registry.get(&Alias::from("a")).unwrap();
    assert_eq!(rec.state, JobState::Failed);
    assert_eq!(rec.error.as_deref(), Some("out of memory"));
    assert!(rec.completed_at.is_some());
}

// ---------------------------------------------------------------------------
// Listing and counting
// ---------------------------------------------------------------------------

#[test]
fn list_aliases_is_sorted() {
    let mut registry = test_registry();
    registry.insert(&submitted("b")).unwrap();
    registry.insert(&submitted("a")).unwrap();
    registry.insert(&submitted("c")).unwrap();

    let aliases: Vec<String> = registry
        .list_aliases()
        .unwrap()
        .into_iter()
        .map(|a| a.0)
        .collect();
    assert_eq!(aliases, vec!["a", "b", "c"]);
}

#[test]
fn active_listing_excludes_terminal_rows() {
    let mut registry = test_registry();
    registry.insert(&submitted("a")).unwrap();
    registry.insert(&submitted("b")).unwrap();
    registry.insert(&submitted("c")).unwrap();

    registry.complete(&Alias::from("a")).unwrap();
    registry.fail(&Alias::from("b"), "boom").unwrap();

    let active = registry.list_active().unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].alias.as_str(), "c");
    assert_eq!(registry.count_active().unwrap(), 1);

    let failed = registry.list_by_state(JobState::Failed).unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].alias.as_str(), "b");
}

#[test]
fn poll_failures_accumulate() {
    let mut registry = test_registry();
    registry.insert(&submitted("a")).unwrap();

    assert_eq!(
        registry.increment_poll_failures(&Alias::from("a")).unwrap(),
        1
    );
    assert_eq!(
        registry.increment_poll_failures(&Alias::from("a")).unwrap(),
        2
    );
    assert_eq!(registry.get(&Alias::from("a")).unwrap().poll_failures, 2);
}

#[test]
fn reset_clears_accumulated_poll_failures() {
    let mut registry = test_registry();
    registry.insert(&submitted("a")).unwrap();

    registry.increment_poll_failures(&Alias::from("a")).unwrap();
    registry.increment_poll_failures(&Alias::from("a")).unwrap();
    registry.reset_poll_failures(&Alias::from("a")).unwrap();

    assert_eq!(registry.get(&Alias::from("a")).unwrap().poll_failures, 0);

    // The budget starts over after a reset
    assert_eq!(
        registry.increment_poll_failures(&Alias::from("a")).unwrap(),
        1
    );
}

// ---------------------------------------------------------------------------
// Concurrent readers
// ---------------------------------------------------------------------------

#[test]
fn monitoring_reader_sees_launcher_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.db");

    let mut writer = Registry::open(&path).unwrap();
    let reader = Registry::open(&path).unwrap();

    writer.insert(&submitted("a")).unwrap();
    assert_eq!(
        reader.get(&Alias::from("a")).unwrap().state,
        JobState::Pending
    );

    writer.complete(&Alias::from("a")).unwrap();
    assert_eq!(
        reader.get(&Alias::from("a")).unwrap().state,
        JobState::Finished
    );
}
