use std::sync::Arc;
use std::thread;
use std::time::Duration;

use siltdb::transaction::{
    IsolationLevel, LockManager, TransactionManager, TransactionState,
};

fn setup() -> (Arc<LockManager>, TransactionManager) {
    let lock_manager = Arc::new(LockManager::new());
    let txn_manager = TransactionManager::new(lock_manager.clone());
    (lock_manager, txn_manager)
}

#[test]
fn test_shared_locks_are_compatible() {
    let (lm, tm) = setup();
    let t_a = tm.begin(IsolationLevel::RepeatableRead);
    let t_b = tm.begin(IsolationLevel::RepeatableRead);
    let rid = 1;

    assert!(lm.lock_shared(&t_a, rid));
    assert!(lm.lock_shared(&t_b, rid));
    assert!(t_a.is_shared_locked(rid));
    assert!(t_b.is_shared_locked(rid));

    // Re-acquiring a held lock is a no-op success
    assert!(lm.lock_shared(&t_a, rid));
}

#[test]
fn test_younger_writer_aborts_against_older_readers() {
    let (lm, tm) = setup();
    let t_old = tm.begin(IsolationLevel::RepeatableRead);
    let t_new = tm.begin(IsolationLevel::RepeatableRead);
    let rid = 1;

    assert!(lm.lock_shared(&t_old, rid));
    assert!(!lm.lock_exclusive(&t_new, rid));
    assert_eq!(t_new.state(), TransactionState::Aborted);

    // Mutual exclusion was never violated
    assert!(t_old.is_shared_locked(rid));
    assert!(!t_new.is_exclusive_locked(rid));
}

#[test]
fn test_older_writer_wounds_younger_holder() {
    let (lm, tm) = setup();
    let t_old = tm.begin(IsolationLevel::RepeatableRead);
    let t_new = tm.begin(IsolationLevel::RepeatableRead);
    let rid = 1;

    assert!(lm.lock_shared(&t_new, rid));
    assert!(lm.lock_exclusive(&t_old, rid));

    assert_eq!(t_new.state(), TransactionState::Aborted);
    assert!(!t_new.is_shared_locked(rid));
    assert!(t_old.is_exclusive_locked(rid));
}

#[test]
fn test_wound_wait_ordering() {
    // Three writers: the newest aborts itself, the oldest wounds the holder
    let (lm, tm) = setup();
    let t_oldest = tm.begin(IsolationLevel::RepeatableRead);
    let t_mid = tm.begin(IsolationLevel::RepeatableRead);
    let t_newest = tm.begin(IsolationLevel::RepeatableRead);
    let rid = 7;

    assert!(lm.lock_exclusive(&t_mid, rid));

    assert!(!lm.lock_exclusive(&t_newest, rid));
    assert_eq!(t_newest.state(), TransactionState::Aborted);

    assert!(lm.lock_exclusive(&t_oldest, rid));
    assert_eq!(t_mid.state(), TransactionState::Aborted);
    assert!(t_oldest.is_exclusive_locked(rid));
    assert!(!t_mid.is_exclusive_locked(rid));
}

#[test]
fn test_two_phase_locking_violation() {
    // RepeatableRead: the first unlock starts the shrink phase and any
    // further lock request kills the transaction
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::RepeatableRead);

    assert!(lm.lock_shared(&txn, 1));
    assert!(lm.unlock(&txn, 1));
    assert_eq!(txn.state(), TransactionState::Shrinking);

    assert!(!lm.lock_shared(&txn, 2));
    assert_eq!(txn.state(), TransactionState::Aborted);
}

#[test]
fn test_read_committed_unlock_stays_growing() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::ReadCommitted);

    assert!(lm.lock_shared(&txn, 1));
    assert!(lm.unlock(&txn, 1));
    assert_eq!(txn.state(), TransactionState::Growing);

    // Short shared lock lifetimes are the point of ReadCommitted
    assert!(lm.lock_shared(&txn, 2));
}

#[test]
fn test_read_uncommitted_rejects_shared_locks() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::ReadUncommitted);

    assert!(!lm.lock_shared(&txn, 1));
    assert_eq!(txn.state(), TransactionState::Aborted);
}

#[test]
fn test_aborted_transaction_cannot_lock() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::RepeatableRead);
    txn.set_state(TransactionState::Aborted);

    assert!(!lm.lock_shared(&txn, 1));
    assert!(!lm.lock_exclusive(&txn, 1));
    assert!(!lm.lock_upgrade(&txn, 1));
}

#[test]
fn test_unlock_without_lock_fails() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::ReadCommitted);
    assert!(!lm.unlock(&txn, 42));
}

#[test]
fn test_lock_upgrade() {
    let (lm, tm) = setup();
    let txn = tm.begin(IsolationLevel::RepeatableRead);
    let rid = 1;

    assert!(lm.lock_shared(&txn, rid));
    assert!(lm.lock_upgrade(&txn, rid));

    assert!(txn.is_exclusive_locked(rid));
    assert!(!txn.is_shared_locked(rid));
    assert_eq!(txn.state(), TransactionState::Growing);
}

#[test]
fn test_upgrade_wounds_younger_reader() {
    let (lm, tm) = setup();
    let t_old = tm.begin(IsolationLevel::RepeatableRead);
    let t_new = tm.begin(IsolationLevel::RepeatableRead);
    let rid = 1;

    assert!(lm.lock_shared(&t_old, rid));
    assert!(lm.lock_shared(&t_new, rid));

    assert!(lm.lock_upgrade(&t_old, rid));
    assert_eq!(t_new.state(), TransactionState::Aborted);
    assert!(t_old.is_exclusive_locked(rid));
}

#[test]
fn test_shared_waiter_acquires_after_unlock() {
    let (lm, tm) = setup();
    let t_old = tm.begin(IsolationLevel::RepeatableRead);
    let t_new = tm.begin(IsolationLevel::RepeatableRead);
    let rid = 3;

    assert!(lm.lock_exclusive(&t_old, rid));

    let waiter = {
        let lm = lm.clone();
        let t_new = t_new.clone();
        thread::spawn(move || lm.lock_shared(&t_new, rid))
    };

    // Give the younger reader time to block on the older writer
    thread::sleep(Duration::from_millis(100));
    assert!(lm.unlock(&t_old, rid));

    assert!(waiter.join().unwrap());
    assert!(t_new.is_shared_locked(rid));
}

#[test]
fn test_waiting_reader_can_be_wounded() {
    let (lm, tm) = setup();
    let t_oldest = tm.begin(IsolationLevel::RepeatableRead);
    let t_mid = tm.begin(IsolationLevel::RepeatableRead);
    let t_young = tm.begin(IsolationLevel::RepeatableRead);
    let rid = 3;

    assert!(lm.lock_exclusive(&t_mid, rid));

    let waiter = {
        let lm = lm.clone();
        let t_young = t_young.clone();
        thread::spawn(move || lm.lock_shared(&t_young, rid))
    };
    thread::sleep(Duration::from_millis(100));

    // The oldest writer wounds both the holder and the queued reader
    assert!(lm.lock_exclusive(&t_oldest, rid));
    assert_eq!(t_mid.state(), TransactionState::Aborted);

    assert!(lm.unlock(&t_oldest, rid));
    assert!(!waiter.join().unwrap());
    assert_eq!(t_young.state(), TransactionState::Aborted);
}

#[test]
fn test_only_one_upgrade_in_flight() {
    let (lm, tm) = setup();
    let t_old = tm.begin(IsolationLevel::RepeatableRead);
    let t_new = tm.begin(IsolationLevel::RepeatableRead);
    let rid = 5;

    assert!(lm.lock_shared(&t_old, rid));
    assert!(lm.lock_shared(&t_new, rid));

    // The younger upgrader queues up behind the older shared holder
    let upgrader = {
        let lm = lm.clone();
        let t_new = t_new.clone();
        thread::spawn(move || lm.lock_upgrade(&t_new, rid))
    };
    thread::sleep(Duration::from_millis(100));

    // A second upgrade on the same record aborts immediately
    assert!(!lm.lock_upgrade(&t_old, rid));
    assert_eq!(t_old.state(), TransactionState::Aborted);

    // Cleaning up the aborted holder lets the pending upgrade finish
    tm.abort(&t_old).unwrap();
    assert!(upgrader.join().unwrap());
    assert!(t_new.is_exclusive_locked(rid));
}

#[test]
fn test_commit_releases_locks() {
    let (lm, tm) = setup();
    let t_a = tm.begin(IsolationLevel::RepeatableRead);
    let t_b = tm.begin(IsolationLevel::RepeatableRead);
    let rid = 9;

    assert!(lm.lock_exclusive(&t_a, rid));
    tm.commit(&t_a).unwrap();
    assert_eq!(t_a.state(), TransactionState::Committed);
    assert!(!t_a.is_exclusive_locked(rid));

    // The record is free again for anyone, including a younger transaction
    assert!(lm.lock_exclusive(&t_b, rid));
}
