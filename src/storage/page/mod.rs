mod bucket;
mod directory;

pub use bucket::{BucketPage, BUCKET_ARRAY_SIZE};
pub use directory::{HashDirectoryPage, DIRECTORY_ARRAY_SIZE, MAX_GLOBAL_DEPTH};
