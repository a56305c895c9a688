//! Testing utilities.

#![allow(missing_docs)]

use crate::{
    memory::ZERO_HASHES,
    types::{PageIndex, MEMORY_PROOF_LEAF_COUNT, PAGE_KEY_SIZE, PAGE_SIZE},
    utils::keccak_concat_hashes,
    Memory,
};
use alloy_primitives::{keccak256, B256};
use std::{cell::Cell, collections::BTreeMap};

thread_local! {
    static HASH_COUNT: Cell<u64> = const { Cell::new(0) };
}

/// Records one invocation of the pairwise node hash on the current thread.
pub(crate) fn record_hash() {
    HASH_COUNT.with(|count| count.set(count.get() + 1));
}

/// Returns the number of pairwise node hashes performed on the current thread so far.
pub fn hash_count() -> u64 {
    HASH_COUNT.with(|count| count.get())
}

/// Computes the merkle root of a single page from scratch, without any caching.
pub fn reference_page_root(data: &[u8; PAGE_SIZE]) -> B256 {
    let mut layer: Vec<B256> = data.chunks_exact(32).map(B256::from_slice).collect();
    while layer.len() > 1 {
        layer = layer.chunks_exact(2).map(|pair| keccak_concat_hashes(pair[0], pair[1])).collect();
    }
    layer[0]
}

/// Computes the merkle root of the full address space from scratch, given the contents of every
/// allocated page. This walks the sparse set of page roots up the tree one level at a time and
/// substitutes zero hashes for every absent sibling.
pub fn reference_root(memory: &Memory) -> B256 {
    let mut layer: BTreeMap<u64, B256> = memory
        .pages()
        .map(|(index, data)| (index as u64, reference_page_root(data)))
        .collect();

    // Depth of a page root below the 32 byte leaves.
    let mut depth = MEMORY_PROOF_LEAF_COUNT - 1 - PAGE_KEY_SIZE;
    for _ in 0..PAGE_KEY_SIZE {
        let zero = ZERO_HASHES[depth];
        let mut next = BTreeMap::new();
        for (&index, &node) in layer.iter() {
            let parent = index >> 1;
            if next.contains_key(&parent) {
                continue;
            }
            let (left, right) = if index & 1 == 0 {
                (node, layer.get(&(index | 1)).copied().unwrap_or(zero))
            } else {
                (layer.get(&(index & !1)).copied().unwrap_or(zero), node)
            };
            next.insert(parent, keccak_concat_hashes(left, right));
        }
        layer = next;
        depth += 1;
    }

    layer.get(&0).copied().unwrap_or(ZERO_HASHES[MEMORY_PROOF_LEAF_COUNT - 1])
}

/// A page filled with a repeating, index-dependent byte pattern.
pub fn patterned_page(index: PageIndex) -> [u8; PAGE_SIZE] {
    let seed = keccak256((index as u64).to_be_bytes());
    let mut page = [0u8; PAGE_SIZE];
    page.iter_mut().enumerate().for_each(|(i, b)| *b = seed[i % 32] ^ (i as u8));
    page
}
