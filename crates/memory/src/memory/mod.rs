//! Contains the Merkleized paged memory implementation for the Cannonball FPVM.

use alloy_primitives::B256;

mod page;
pub use page::{CachedPage, PAGE_LEAF_COUNT, ZERO_HASHES};

mod map_memory;
pub use map_memory::Memory;

mod reader;
pub use reader::MemoryReader;

mod codec;

mod proof;
pub use proof::{proof_leaf, verify_proof};

/// A node within the memory's merkle tree cache.
///
/// Absent nodes are represented by the absence of an entry in the owning map: the subtree beneath
/// them is fully zeroed, and its hash is the zero hash for its depth.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MerkleNode {
    /// The subtree has changed since its hash was last computed.
    #[default]
    Invalidated,
    /// The hash of the subtree, valid until a write beneath it.
    Cached(B256),
}

impl MerkleNode {
    /// Returns `true` if the node holds a valid hash.
    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached(_))
    }
}
