pub mod error;
pub mod table;

pub use error::HashTableError;
pub use table::{ExtendibleHashTable, HashTableConfig};
