use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::common::types::TxnId;
use crate::transaction::concurrency::lock_manager::LockManager;
use crate::transaction::concurrency::transaction::{
    IndexWriteType, IsolationLevel, Transaction, TransactionError, TransactionState,
};

/// Process-wide transaction registry.
///
/// Lock queues reference transactions by id only; resolving an id back to
/// a transaction goes through this map, which breaks the reference cycle
/// between transactions, queues, and the lock manager.
static TRANSACTION_REGISTRY: Lazy<RwLock<HashMap<TxnId, Arc<Transaction>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Ids are handed out process-wide so they stay unique in the registry no
/// matter how many managers exist.
static NEXT_TXN_ID: AtomicU32 = AtomicU32::new(0);

/// Creates transactions and drives their commit/abort lifecycle
pub struct TransactionManager {
    lock_manager: Arc<LockManager>,
}

impl TransactionManager {
    pub fn new(lock_manager: Arc<LockManager>) -> Self {
        Self { lock_manager }
    }

    /// Start a new transaction. Ids increase monotonically, so a smaller id
    /// always identifies an older transaction.
    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let txn_id = NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id, isolation_level));
        TRANSACTION_REGISTRY.write().insert(txn_id, txn.clone());
        txn
    }

    /// Resolve a transaction id; the lock manager uses this while sweeping
    /// request queues.
    pub fn get_transaction(txn_id: TxnId) -> Option<Arc<Transaction>> {
        TRANSACTION_REGISTRY.read().get(&txn_id).cloned()
    }

    /// Commit a transaction and release everything it holds
    pub fn commit(&self, txn: &Arc<Transaction>) -> Result<(), TransactionError> {
        match txn.state() {
            TransactionState::Committed | TransactionState::Aborted => {
                return Err(TransactionError::InvalidState(txn.id()));
            }
            _ => {}
        }

        txn.set_state(TransactionState::Committed);
        self.lock_manager.release_all_locks(txn);
        TRANSACTION_REGISTRY.write().remove(&txn.id());
        Ok(())
    }

    /// Abort a transaction: undo its index writes in reverse order, then
    /// release its locks. Aborting an already-wounded transaction is the
    /// normal cleanup path, not an error.
    pub fn abort(&self, txn: &Arc<Transaction>) -> Result<(), TransactionError> {
        if txn.state() == TransactionState::Committed {
            return Err(TransactionError::InvalidState(txn.id()));
        }

        txn.set_state(TransactionState::Aborted);

        for record in txn.take_index_write_set().into_iter().rev() {
            match record.write_type {
                IndexWriteType::Insert => {
                    record.table.remove(record.key, record.value)?;
                }
                IndexWriteType::Delete => {
                    record.table.insert(record.key, record.value)?;
                }
            }
        }

        self.lock_manager.release_all_locks(txn);
        TRANSACTION_REGISTRY.write().remove(&txn.id());
        Ok(())
    }
}
