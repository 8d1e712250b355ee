pub mod hash;

pub use hash::{ExtendibleHashTable, HashTableConfig, HashTableError};
