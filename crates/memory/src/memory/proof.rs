//! Verification of memory merkle proofs.

use crate::{
    types::{Address, MemoryProof, MEMORY_PROOF_LEAF_COUNT},
    utils::keccak_concat_hashes,
};
use alloy_primitives::B256;

/// Returns the 32 byte leaf of memory that a proof opens.
pub fn proof_leaf(proof: &MemoryProof) -> B256 {
    B256::from_slice(&proof[..32])
}

/// Replays a memory proof for `address` and checks that it commits to `root`.
///
/// ### Takes
/// - `root`: The expected memory merkle root.
/// - `address`: The address the proof was generated for.
/// - `proof`: The proof, as produced by [Memory::merkle_proof].
///
/// ### Returns
/// - `true` if the leaf and siblings in the proof hash up to `root`.
///
/// [Memory::merkle_proof]: super::Memory::merkle_proof
pub fn verify_proof(root: B256, address: Address, proof: &MemoryProof) -> bool {
    let mut node = proof_leaf(proof);
    let mut path = address >> 5;
    for i in 1..MEMORY_PROOF_LEAF_COUNT {
        let sibling = B256::from_slice(&proof[i * 32..(i + 1) * 32]);
        node = if path & 1 != 0 {
            keccak_concat_hashes(sibling, node)
        } else {
            keccak_concat_hashes(node, sibling)
        };
        path >>= 1;
    }
    node == root
}
