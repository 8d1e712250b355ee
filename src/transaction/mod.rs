pub mod concurrency;

// Public exports
pub use concurrency::{
    IsolationLevel, LockManager, LockMode, Transaction, TransactionError, TransactionManager,
    TransactionState,
};
