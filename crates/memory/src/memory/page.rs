//! This module contains the [CachedPage] type: a [Page] of memory along with a lazily computed
//! merkle tree over the 32 byte leaves within it.

use super::MerkleNode;
use crate::{
    error::{MemoryError, MemoryResult},
    types::{Gindex, Page, EMPTY_PAGE, PAGE_ADDRESS_SIZE, PAGE_SIZE},
    utils::{concat_fixed, keccak_concat_hashes},
};
use alloy_primitives::{keccak256, B256};
use once_cell::sync::Lazy;

/// The number of 32 byte leaves within a [Page].
pub const PAGE_LEAF_COUNT: usize = PAGE_SIZE / 32;

/// Hashes of fully zeroed subtrees, indexed by the subtree's remaining depth down to the 32 byte
/// leaves. `ZERO_HASHES[0]` is a zeroed leaf.
pub static ZERO_HASHES: Lazy<[B256; 256]> = Lazy::new(|| {
    let mut out = [B256::ZERO; 256];
    for i in 1..256 {
        out[i] = keccak256(concat_fixed(out[i - 1], out[i - 1]));
    }
    out
});

/// A [CachedPage] is a [Page] of memory plus a cache of the intermediate nodes of its merkle tree.
///
/// Page-local generalized indices follow the global scheme: `1` is the page root, and
/// `PAGE_LEAF_COUNT..2 * PAGE_LEAF_COUNT` are the 32 byte leaves, which are read straight from
/// [Self::data] and never cached. Index `0` is unused.
#[derive(Debug)]
pub struct CachedPage {
    /// The raw contents of the page.
    pub data: Box<Page>,
    /// The intermediate nodes of the page's merkle tree, by page-local generalized index.
    nodes: Box<[MerkleNode; PAGE_LEAF_COUNT]>,
}

impl Default for CachedPage {
    fn default() -> Self {
        Self::new(Box::new(EMPTY_PAGE))
    }
}

impl CachedPage {
    /// Creates a new [CachedPage] over the given page contents, with an empty cache.
    pub fn new(data: Box<Page>) -> Self {
        Self { data, nodes: Box::new([MerkleNode::Invalidated; PAGE_LEAF_COUNT]) }
    }

    /// Returns whether the cached root of this page is currently trustworthy.
    pub fn is_root_valid(&self) -> bool {
        self.nodes[1].is_cached()
    }

    /// Invalidate the leaf containing `page_address` and every node above it.
    ///
    /// ### Takes
    /// - `page_address`: The offset within the page that changed.
    ///
    /// ### Returns
    /// - A [Result] indicating if the operation was successful.
    pub fn invalidate(&mut self, page_address: usize) -> MemoryResult<()> {
        if page_address >= PAGE_SIZE {
            return Err(MemoryError::GindexTooDeep {
                gindex: ((1 << PAGE_ADDRESS_SIZE) | page_address) as Gindex,
            });
        }

        // The bottom cache layer holds nodes over two 32 byte leaves.
        let mut g_index = ((1 << PAGE_ADDRESS_SIZE) | page_address) >> 6;
        while g_index > 0 {
            self.nodes[g_index] = MerkleNode::Invalidated;
            g_index >>= 1;
        }
        Ok(())
    }

    /// Invalidate every node covering the byte range `[start, end)` of the page.
    pub fn invalidate_range(&mut self, start: usize, end: usize) -> MemoryResult<()> {
        let mut page_address = start & !63;
        while page_address < end {
            self.invalidate(page_address)?;
            page_address += 64;
        }
        Ok(())
    }

    /// Invalidate the entire cache of the page.
    pub fn invalidate_full(&mut self) {
        self.nodes.fill(MerkleNode::Invalidated);
    }

    /// Compute the merkle root of the page.
    pub fn merkle_root(&mut self) -> MemoryResult<B256> {
        self.merkleize_subtree(1)
    }

    /// Compute the hash of the subtree at the page-local generalized index, recomputing and
    /// caching any invalidated nodes beneath it.
    ///
    /// ### Takes
    /// - `g_index`: The page-local generalized index of the subtree.
    ///
    /// ### Returns
    /// - The 32 byte hash of the subtree.
    pub fn merkleize_subtree(&mut self, g_index: Gindex) -> MemoryResult<B256> {
        let index = g_index as usize;
        if index == 0 || index >= PAGE_LEAF_COUNT * 2 {
            return Err(MemoryError::GindexTooDeep { gindex: g_index });
        }

        if index >= PAGE_LEAF_COUNT {
            // Leaves are the raw page contents.
            let offset = (index - PAGE_LEAF_COUNT) * 32;
            return Ok(B256::from_slice(&self.data[offset..offset + 32]));
        }

        if let MerkleNode::Cached(node) = self.nodes[index] {
            return Ok(node);
        }

        let left = self.merkleize_subtree(g_index << 1)?;
        let right = self.merkleize_subtree((g_index << 1) | 1)?;
        let result = keccak_concat_hashes(left, right);
        self.nodes[index] = MerkleNode::Cached(result);

        Ok(result)
    }
}
