use smproxy_core::{CredentialPool, PoolEmpty, PoolSnapshot};

fn pool_of(values: &[&str]) -> CredentialPool {
    let pool = CredentialPool::new();
    pool.add(values.iter().map(|v| v.to_string()));
    pool
}

#[test]
fn round_robin_visits_all_then_wraps() {
    let pool = pool_of(&["c1", "c2", "c3"]);
    assert_eq!(pool.pick_round_robin().as_deref(), Some("c1"));
    assert_eq!(pool.pick_round_robin().as_deref(), Some("c2"));
    assert_eq!(pool.pick_round_robin().as_deref(), Some("c3"));
    assert_eq!(pool.pick_round_robin().as_deref(), Some("c1"));
}

#[test]
fn random_picks_do_not_move_the_cursor() {
    let pool = pool_of(&["c1", "c2", "c3"]);
    assert_eq!(pool.pick_round_robin().as_deref(), Some("c1"));
    for _ in 0..10 {
        assert!(pool.pick_random().is_some());
    }
    assert_eq!(pool.pick_round_robin().as_deref(), Some("c2"));
}

#[test]
fn add_deduplicates_by_exact_value() {
    let pool = pool_of(&["c1", "c1", " c1 ", "c2"]);
    assert_eq!(pool.list(), vec!["c1".to_string(), "c2".to_string()]);
}

#[test]
fn replace_resets_cursor() {
    let pool = pool_of(&["c1", "c2"]);
    pool.pick_round_robin();
    pool.replace(["n1".to_string(), "n2".to_string()]);
    assert_eq!(pool.pick_round_robin().as_deref(), Some("n1"));
}

#[test]
fn rotate_after_failure_drops_the_failed_value() {
    let pool = pool_of(&["c1", "c2", "c3"]);
    assert_eq!(pool.pick_round_robin().as_deref(), Some("c1"));
    let next = pool.rotate_after_failure(Some("c1")).unwrap();
    assert_ne!(next, "c1");
    assert_eq!(pool.len(), 2);
}

#[test]
fn rotate_on_single_failing_credential_reports_empty() {
    let pool = pool_of(&["only"]);
    assert_eq!(pool.rotate_after_failure(Some("only")), Err(PoolEmpty));
    assert!(pool.is_empty());
}

#[test]
fn rotate_without_failed_value_just_advances() {
    let pool = pool_of(&["c1", "c2"]);
    assert_eq!(pool.rotate_after_failure(None).unwrap(), "c1");
    assert_eq!(pool.len(), 2);
}

#[test]
fn empty_pool_has_no_picks() {
    let pool = CredentialPool::new();
    assert_eq!(pool.pick_round_robin(), None);
    assert_eq!(pool.pick_random(), None);
}

#[test]
fn remove_clamps_the_cursor() {
    let pool = pool_of(&["c1", "c2", "c3"]);
    pool.pick_round_robin();
    pool.pick_round_robin();
    pool.remove("c3");
    assert_eq!(pool.pick_round_robin().as_deref(), Some("c1"));
}

#[test]
fn snapshot_restore_round_trip() {
    let pool = pool_of(&["c1", "c2"]);
    pool.pick_round_robin();
    let snapshot = pool.snapshot();
    let restored = CredentialPool::restore(snapshot.clone());
    assert_eq!(restored.snapshot(), snapshot);
    assert_eq!(restored.pick_round_robin().as_deref(), Some("c2"));
}

#[test]
fn restore_clamps_an_out_of_range_cursor() {
    let restored = CredentialPool::restore(PoolSnapshot {
        credentials: vec!["c1".to_string()],
        cursor: 7,
    });
    assert_eq!(restored.pick_round_robin().as_deref(), Some("c1"));
}
