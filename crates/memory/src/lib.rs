#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

mod memory;
pub use memory::{
    proof_leaf, verify_proof, CachedPage, Memory, MemoryReader, MerkleNode, PAGE_LEAF_COUNT,
    ZERO_HASHES,
};

mod error;
pub use error::{MemoryError, MemoryResult};

pub mod types;

pub mod utils;

#[cfg(any(feature = "test-utils", test))]
pub mod test_utils;
