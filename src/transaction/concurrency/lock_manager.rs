use std::collections::HashMap;
use std::sync::Arc;
use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::common::types::{Rid, TxnId};
use crate::transaction::concurrency::transaction::{
    IsolationLevel, Transaction, TransactionState,
};
use crate::transaction::concurrency::transaction_manager::TransactionManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    #[allow(dead_code)]
    granted: bool,
}

/// Per-record request queue. The condition variable waits on the lock
/// manager's global latch; `upgrading` names the transaction whose upgrade
/// is in flight so a second upgrader aborts instead of racing it.
#[derive(Default)]
struct LockRequestQueue {
    requests: Vec<LockRequest>,
    upgrading: Option<TxnId>,
    cv: Arc<Condvar>,
}

/// Record-level lock manager with wound-wait deadlock prevention.
///
/// Conflicts are resolved by transaction age, not arrival order: an older
/// transaction forcibly aborts ("wounds") younger conflicting holders,
/// while a younger one waits for older holders to finish. Because waits
/// only ever point from younger to older, no cycle can form.
pub struct LockManager {
    latch: Mutex<HashMap<Rid, LockRequestQueue>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            latch: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire a shared lock on a record.
    ///
    /// Returns false when the transaction is (or becomes) aborted: shared
    /// locks are illegal under ReadUncommitted, any lock request after the
    /// shrink phase starts violates 2PL, and an older writer may wound us
    /// while we wait.
    pub fn lock_shared(&self, txn: &Arc<Transaction>, rid: Rid) -> bool {
        let mut table = self.latch.lock();

        if txn.state() == TransactionState::Aborted {
            return false;
        }
        if txn.isolation_level() == IsolationLevel::ReadUncommitted {
            txn.set_state(TransactionState::Aborted);
            return false;
        }
        if txn.state() == TransactionState::Shrinking {
            txn.set_state(TransactionState::Aborted);
            return false;
        }
        if txn.is_shared_locked(rid) {
            return true;
        }

        let mut waiting = false;
        loop {
            // A waiter may have been wounded before it was woken
            if txn.state() == TransactionState::Aborted {
                return false;
            }

            let queue = table.entry(rid).or_default();

            let mut must_wait = false;
            let mut idx = 0;
            while idx < queue.requests.len() {
                let other_id = queue.requests[idx].txn_id;
                if other_id == txn.id() {
                    idx += 1;
                    continue;
                }
                let other = match TransactionManager::get_transaction(other_id) {
                    Some(other) => other,
                    None => {
                        idx += 1;
                        continue;
                    }
                };

                if other_id > txn.id() && other.is_exclusive_locked(rid) {
                    // Younger writer in our way: wound it
                    queue.requests.remove(idx);
                    other.clear_locks_on(rid);
                    other.set_state(TransactionState::Aborted);
                    debug!("txn {} wounded txn {} on record {}", txn.id(), other_id, rid);
                } else if other_id < txn.id() && other.is_exclusive_locked(rid) {
                    // Older writer holds the record: wait for it
                    must_wait = true;
                    break;
                } else {
                    idx += 1;
                }
            }

            if must_wait {
                if !waiting {
                    Self::upsert_request(queue, txn.id(), LockMode::Shared, false);
                    txn.add_shared_lock(rid);
                    waiting = true;
                }
                let cv = queue.cv.clone();
                cv.wait(&mut table);
                continue;
            }

            txn.set_state(TransactionState::Growing);
            Self::upsert_request(queue, txn.id(), LockMode::Shared, true);
            txn.add_shared_lock(rid);
            return true;
        }
    }

    /// Acquire an exclusive lock on a record.
    ///
    /// Never waits: every younger conflicting request is wounded, and any
    /// older holder makes this transaction abort itself instead.
    pub fn lock_exclusive(&self, txn: &Arc<Transaction>, rid: Rid) -> bool {
        let mut table = self.latch.lock();

        if txn.state() == TransactionState::Aborted {
            return false;
        }
        if txn.state() == TransactionState::Shrinking
            && txn.isolation_level() == IsolationLevel::RepeatableRead
        {
            txn.set_state(TransactionState::Aborted);
            return false;
        }
        if txn.is_exclusive_locked(rid) {
            return true;
        }

        let queue = table.entry(rid).or_default();

        let mut idx = 0;
        while idx < queue.requests.len() {
            let other_id = queue.requests[idx].txn_id;
            if other_id == txn.id() {
                idx += 1;
                continue;
            }
            let other = match TransactionManager::get_transaction(other_id) {
                Some(other) => other,
                None => {
                    idx += 1;
                    continue;
                }
            };

            if other_id > txn.id() {
                queue.requests.remove(idx);
                other.clear_locks_on(rid);
                other.set_state(TransactionState::Aborted);
                debug!("txn {} wounded txn {} on record {}", txn.id(), other_id, rid);
            } else {
                // An older transaction is ahead of us; the younger side dies
                txn.clear_locks_on(rid);
                txn.set_state(TransactionState::Aborted);
                return false;
            }
        }

        txn.set_state(TransactionState::Growing);
        Self::upsert_request(queue, txn.id(), LockMode::Exclusive, true);
        txn.add_exclusive_lock(rid);
        true
    }

    /// Promote an already-held shared lock to exclusive.
    ///
    /// Only one upgrade may be in flight per record; a competing upgrader
    /// aborts. Younger holders are wounded, older holders are waited on.
    pub fn lock_upgrade(&self, txn: &Arc<Transaction>, rid: Rid) -> bool {
        let mut table = self.latch.lock();

        loop {
            if txn.state() == TransactionState::Aborted {
                Self::clear_upgrade_marker(&mut table, txn.id(), rid);
                return false;
            }
            if txn.state() == TransactionState::Shrinking
                && txn.isolation_level() == IsolationLevel::RepeatableRead
            {
                Self::clear_upgrade_marker(&mut table, txn.id(), rid);
                txn.set_state(TransactionState::Aborted);
                return false;
            }

            let queue = table.entry(rid).or_default();
            match queue.upgrading {
                Some(owner) if owner != txn.id() => {
                    txn.set_state(TransactionState::Aborted);
                    return false;
                }
                _ => queue.upgrading = Some(txn.id()),
            }

            let mut must_wait = false;
            let mut idx = 0;
            while idx < queue.requests.len() {
                let other_id = queue.requests[idx].txn_id;
                if other_id == txn.id() {
                    idx += 1;
                    continue;
                }
                let other = match TransactionManager::get_transaction(other_id) {
                    Some(other) => other,
                    None => {
                        idx += 1;
                        continue;
                    }
                };

                if other_id > txn.id() {
                    queue.requests.remove(idx);
                    other.clear_locks_on(rid);
                    other.set_state(TransactionState::Aborted);
                    debug!("txn {} wounded txn {} on record {}", txn.id(), other_id, rid);
                } else {
                    must_wait = true;
                    break;
                }
            }

            if must_wait {
                let cv = queue.cv.clone();
                cv.wait(&mut table);
                continue;
            }

            txn.set_state(TransactionState::Growing);
            if let Some(request) = queue.requests.iter_mut().find(|r| r.txn_id == txn.id()) {
                request.mode = LockMode::Exclusive;
                request.granted = true;
            }
            queue.upgrading = None;
            txn.promote_lock(rid);
            return true;
        }
    }

    /// Release a lock on a record.
    ///
    /// Under RepeatableRead the first unlock starts the shrink phase.
    /// ReadCommitted releases shared locks early and stays in Growing.
    /// Waiters on the queue are always woken to reassess.
    pub fn unlock(&self, txn: &Arc<Transaction>, rid: Rid) -> bool {
        let mut table = self.latch.lock();

        if txn.state() == TransactionState::Growing
            && txn.isolation_level() == IsolationLevel::RepeatableRead
        {
            txn.set_state(TransactionState::Shrinking);
        }

        let queue = match table.get_mut(&rid) {
            Some(queue) => queue,
            None => return false,
        };
        let pos = match queue.requests.iter().position(|r| r.txn_id == txn.id()) {
            Some(pos) => pos,
            None => return false,
        };
        let request = queue.requests.remove(pos);
        match request.mode {
            LockMode::Shared => txn.remove_shared_lock(rid),
            LockMode::Exclusive => txn.remove_exclusive_lock(rid),
        }

        queue.cv.notify_all();
        true
    }

    /// Remove every queue entry belonging to a transaction (commit/abort
    /// cleanup) and wake all affected waiters.
    pub fn release_all_locks(&self, txn: &Arc<Transaction>) {
        let mut table = self.latch.lock();

        for queue in table.values_mut() {
            if let Some(pos) = queue.requests.iter().position(|r| r.txn_id == txn.id()) {
                queue.requests.remove(pos);
                queue.cv.notify_all();
            }
            if queue.upgrading == Some(txn.id()) {
                queue.upgrading = None;
            }
        }

        txn.clear_all_locks();
    }

    fn clear_upgrade_marker(
        table: &mut HashMap<Rid, LockRequestQueue>,
        txn_id: TxnId,
        rid: Rid,
    ) {
        if let Some(queue) = table.get_mut(&rid) {
            if queue.upgrading == Some(txn_id) {
                queue.upgrading = None;
            }
        }
    }

    /// Add a request, or refresh the existing entry for the transaction
    fn upsert_request(queue: &mut LockRequestQueue, txn_id: TxnId, mode: LockMode, granted: bool) {
        for request in queue.requests.iter_mut() {
            if request.txn_id == txn_id {
                request.mode = mode;
                request.granted = granted;
                return;
            }
        }
        queue.requests.push(LockRequest {
            txn_id,
            mode,
            granted,
        });
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
