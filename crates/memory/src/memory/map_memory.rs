//! The memory module contains the [Memory] data structure and its functionality for the emulator.

use super::{
    page::{CachedPage, ZERO_HASHES},
    MemoryReader, MerkleNode,
};
use crate::{
    error::{MemoryError, MemoryResult},
    types::{
        Address, Gindex, MemoryProof, Page, PageIndex, Word, EMPTY_PAGE, EXT_MASK,
        MEMORY_PROOF_LEAF_COUNT, PAGE_ADDRESS_MASK, PAGE_ADDRESS_SIZE, PAGE_KEY_MASK,
        PAGE_KEY_SIZE, PAGE_SIZE, WORD_SIZE, WORD_SIZE_BYTES,
    },
    utils::{human_bytes, keccak_concat_hashes},
};
use alloy_primitives::B256;
use rustc_hash::FxHashMap;
use std::io::{ErrorKind, Read};

/// The key of an empty page cache slot. Never a valid [PageIndex].
const NO_PAGE: PageIndex = PageIndex::MAX;

/// The [Memory] struct represents the MIPS emulator's memory.
///
/// Memory is sparse: pages are allocated on first write and never freed. A binary merkle tree over
/// the whole address space commits to its contents. The tree is split at the page boundary; nodes
/// above it are cached in [Memory], nodes within a page are cached in its [CachedPage].
#[derive(Debug)]
pub struct Memory {
    /// Map of generalized index -> merkle node, for nodes above the page boundary. A missing
    /// entry is a fully zeroed subtree.
    nodes: FxHashMap<Gindex, MerkleNode>,
    /// Arena of allocated [CachedPage]s. Pages never move or leave memory once allocated.
    pages: Vec<CachedPage>,
    /// Map of page indices to their slot in `pages`.
    page_slots: FxHashMap<PageIndex, usize>,
    /// We store two caches upfront; we often read instructions from one page and reserve another
    /// for scratch memory. This prevents map lookups for each instruction.
    last_page: [(PageIndex, usize); 2],
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            nodes: FxHashMap::default(),
            pages: Vec::new(),
            page_slots: FxHashMap::default(),
            last_page: [(NO_PAGE, 0), (NO_PAGE, 0)],
        }
    }
}

impl Memory {
    /// Returns the number of allocated pages in memory.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Returns an iterator over the allocated pages and their indices, in no particular order.
    pub fn pages(&self) -> impl Iterator<Item = (PageIndex, &Page)> {
        self.page_slots.iter().map(|(&index, &slot)| (index, &*self.pages[slot].data))
    }

    /// Calls `f` with every allocated page and its index, in no particular order, stopping at the
    /// first error.
    pub fn for_each_page<E, F>(&self, mut f: F) -> Result<(), E>
    where
        F: FnMut(PageIndex, &Page) -> Result<(), E>,
    {
        self.pages().try_for_each(|(index, page)| f(index, page))
    }

    /// Returns the contents of the page at `page_index`, if it is allocated. Does not touch the
    /// page cache.
    pub fn page(&self, page_index: PageIndex) -> Option<&Page> {
        self.page_slots.get(&page_index).map(|&slot| &*self.pages[slot].data)
    }

    /// Lookup a page in the [Memory]. This function will consult the cache before checking the
    /// maps, and will cache the page if it is not already cached.
    ///
    /// ### Takes
    /// - `page_index`: The page index to look up.
    ///
    /// ### Returns
    /// - The arena slot of the page, if it exists.
    fn page_lookup(&mut self, page_index: PageIndex) -> Option<usize> {
        // Check caches before maps
        if self.last_page[0].0 == page_index {
            return Some(self.last_page[0].1);
        }
        if self.last_page[1].0 == page_index {
            self.last_page.swap(0, 1);
            return Some(self.last_page[0].1);
        }

        // Only cache existing pages.
        let slot = *self.page_slots.get(&page_index)?;
        self.last_page[1] = self.last_page[0];
        self.last_page[0] = (page_index, slot);
        Some(slot)
    }

    /// Lookup a page through the page cache, returning it if it exists.
    pub(crate) fn lookup_page(&mut self, page_index: PageIndex) -> Option<&CachedPage> {
        self.page_lookup(page_index).map(|slot| &self.pages[slot])
    }

    /// Allocate a new, zeroed page in the [Memory] at a given page index. An existing page at the
    /// same index is reset to zero.
    ///
    /// ### Takes
    /// - `page_index`: The page index to allocate the page at.
    ///
    /// ### Returns
    /// - A [Result] indicating if the operation was successful.
    pub fn alloc_page(&mut self, page_index: PageIndex) -> MemoryResult<()> {
        self.insert_page(page_index, Box::new(EMPTY_PAGE)).map(|_| ())
    }

    /// Insert a page with the given contents, invalidating every node between the page and the
    /// memory root.
    pub(crate) fn insert_page(
        &mut self,
        page_index: PageIndex,
        data: Box<Page>,
    ) -> MemoryResult<usize> {
        if page_index as u64 > PAGE_KEY_MASK {
            return Err(MemoryError::InvalidPageIndex { page_index: page_index as u64 });
        }

        let page = CachedPage::new(data);
        let slot = match self.page_slots.get(&page_index) {
            Some(&slot) => {
                self.pages[slot] = page;
                slot
            }
            None => {
                self.pages.push(page);
                self.page_slots.insert(page_index, self.pages.len() - 1);
                self.pages.len() - 1
            }
        };
        tracing::trace!(target: "cannonball::memory", "Allocated page {:#x} in slot {}", page_index, slot);

        self.invalidate_branch(page_index);
        Ok(slot)
    }

    /// Invalidate every node from the root of the page at `page_index` up to the memory root.
    fn invalidate_branch(&mut self, page_index: PageIndex) {
        let mut g_index = (1 << PAGE_KEY_SIZE) | page_index as Gindex;
        while g_index > 0 {
            self.nodes.insert(g_index, MerkleNode::Invalidated);
            g_index >>= 1;
        }
    }

    /// Invalidate the byte range `[start, end)` of the page in `slot`. A range spanning the whole
    /// page clears its cache entirely.
    ///
    /// If the page root was already invalid before, the nodes up to the memory root are still
    /// invalid as well, and are left alone.
    fn invalidate_page(
        &mut self,
        slot: usize,
        page_index: PageIndex,
        start: usize,
        end: usize,
    ) -> MemoryResult<()> {
        let page = &mut self.pages[slot];
        let prev_valid = page.is_root_valid();

        if start == 0 && end == PAGE_SIZE {
            page.invalidate_full();
        } else {
            page.invalidate_range(start, end)?;
        }

        if prev_valid {
            self.invalidate_branch(page_index);
        }
        Ok(())
    }

    /// Compute the hash of the subtree at the given generalized index, recomputing and caching
    /// any invalidated nodes beneath it.
    ///
    /// ### Takes
    /// - `g_index`: The generalized index of the subtree within the memory tree.
    ///
    /// ### Returns
    /// - The 32 byte hash of the subtree.
    pub fn merkleize_subtree(&mut self, g_index: Gindex) -> MemoryResult<B256> {
        // Fetch the amount of bits required to represent the generalized index
        let bits = 64 - g_index.leading_zeros() as usize;
        if g_index == 0 || bits > MEMORY_PROOF_LEAF_COUNT {
            return Err(MemoryError::GindexTooDeep { gindex: g_index });
        }

        if bits > PAGE_KEY_SIZE {
            let depth_into_page = bits - 1 - PAGE_KEY_SIZE;
            let page_index = ((g_index >> depth_into_page) & PAGE_KEY_MASK) as PageIndex;
            return match self.page_slots.get(&page_index) {
                Some(&slot) => {
                    let page_g_index =
                        (1 << depth_into_page) | (g_index & ((1 << depth_into_page) - 1));
                    self.pages[slot].merkleize_subtree(page_g_index)
                }
                None => Ok(ZERO_HASHES[MEMORY_PROOF_LEAF_COUNT - bits]),
            };
        }

        match self.nodes.get(&g_index) {
            Some(MerkleNode::Cached(node)) => return Ok(*node),
            None => return Ok(ZERO_HASHES[MEMORY_PROOF_LEAF_COUNT - bits]),
            Some(MerkleNode::Invalidated) => { /* recompute */ }
        }

        let left = self.merkleize_subtree(g_index << 1)?;
        let right = self.merkleize_subtree((g_index << 1) | 1)?;
        let result = keccak_concat_hashes(left, right);

        self.nodes.insert(g_index, MerkleNode::Cached(result));

        Ok(result)
    }

    /// Compute the merkle root of the [Memory].
    ///
    /// ### Returns
    /// - The 32 byte merkle root hash of the [Memory].
    pub fn merkle_root(&mut self) -> MemoryResult<B256> {
        self.merkleize_subtree(1)
    }

    /// Compute the merkle proof for the given address in the [Memory].
    ///
    /// The proof starts with the 32 byte leaf containing the address, followed by the sibling
    /// of every node on the path from that leaf up to the root, deepest first.
    ///
    /// ### Takes
    /// - `address`: The address to compute the merkle proof for.
    ///
    /// ### Returns
    /// - The [MEMORY_PROOF_SIZE] byte merkle proof for the given address.
    ///
    /// [MEMORY_PROOF_SIZE]: crate::types::MEMORY_PROOF_SIZE
    pub fn merkle_proof(&mut self, address: Address) -> MemoryResult<MemoryProof> {
        let proof = self.traverse_branch(1, address, 0)?;

        let mut out = [0u8; crate::types::MEMORY_PROOF_SIZE];
        out.chunks_exact_mut(32).zip(proof.iter()).for_each(|(chunk, node)| {
            chunk.copy_from_slice(node.as_slice());
        });
        Ok(out)
    }

    /// Traverse a branch of the merkle tree, generating a proof for the given address.
    ///
    /// ### Takes
    /// - `parent`: The generalized index of the parent node.
    /// - `address`: The address to generate the proof for.
    /// - `depth`: The depth of the branch.
    ///
    /// ### Returns
    /// - The merkle proof for the given address.
    fn traverse_branch(
        &mut self,
        parent: Gindex,
        address: Address,
        depth: usize,
    ) -> MemoryResult<Vec<B256>> {
        if depth == MEMORY_PROOF_LEAF_COUNT - 1 {
            let mut proof = Vec::with_capacity(MEMORY_PROOF_LEAF_COUNT);
            proof.push(self.merkleize_subtree(parent)?);
            return Ok(proof);
        }

        if depth > MEMORY_PROOF_LEAF_COUNT - 1 {
            return Err(MemoryError::TraversedTooDeep { depth });
        }

        let mut local = parent << 1;
        let mut sibling = local | 1;
        if address & (1 << (WORD_SIZE - 1 - depth)) != 0 {
            (local, sibling) = (sibling, local);
        }

        let mut proof = self.traverse_branch(local, address, depth + 1)?;
        let sibling_node = self.merkleize_subtree(sibling)?;
        proof.push(sibling_node);

        Ok(proof)
    }

    /// Set a [Word] in the [Memory] at a given address.
    /// This will invalidate the page at the given address, or allocate a new page if it does not
    /// exist.
    ///
    /// ### Takes
    /// - `address`: The word aligned address to set the value at.
    /// - `value`: The value to set.
    ///
    /// ### Returns
    /// - A [Result] indicating if the operation was successful.
    #[inline(always)]
    pub fn set_word(&mut self, address: Address, value: Word) -> MemoryResult<()> {
        if address & EXT_MASK != 0 {
            return Err(MemoryError::Unaligned { address });
        }

        let page_index = address >> PAGE_ADDRESS_SIZE;
        let page_address = address as usize & PAGE_ADDRESS_MASK;

        // Attempt to look up the page.
        // - If it does exist, invalidate it before changing it.
        // - If it does not exist, allocate it. A fresh page is invalid throughout.
        let slot = match self.page_lookup(page_index) {
            Some(slot) => {
                self.invalidate_page(
                    slot,
                    page_index,
                    page_address,
                    page_address + WORD_SIZE_BYTES,
                )?;
                slot
            }
            None => self.insert_page(page_index, Box::new(EMPTY_PAGE))?,
        };

        self.pages[slot].data[page_address..page_address + WORD_SIZE_BYTES]
            .copy_from_slice(&value.to_be_bytes());

        Ok(())
    }

    /// Retrieve a [Word] from the [Memory] at a given address.
    ///
    /// ### Takes
    /// - `address`: The word aligned [Address] to retrieve the value from.
    ///
    /// ### Returns
    /// - The value at the given address, or zero if the page is not allocated.
    #[inline(always)]
    pub fn get_word(&mut self, address: Address) -> MemoryResult<Word> {
        if address & EXT_MASK != 0 {
            return Err(MemoryError::Unaligned { address });
        }

        match self.page_lookup(address >> PAGE_ADDRESS_SIZE) {
            Some(slot) => {
                let page_address = address as usize & PAGE_ADDRESS_MASK;
                let mut word = [0u8; WORD_SIZE_BYTES];
                word.copy_from_slice(
                    &self.pages[slot].data[page_address..page_address + WORD_SIZE_BYTES],
                );
                Ok(Word::from_be_bytes(word))
            }
            None => Ok(0),
        }
    }

    /// Set a range of memory in the [Memory] at a given address, reading from `data` until it is
    /// exhausted. Pages are only allocated for bytes that are actually read.
    ///
    /// ### Takes
    /// - `address`: The address to set the memory at.
    /// - `data`: The data to set.
    ///
    /// ### Returns
    /// - A [Result] indicating if the operation was successful.
    pub fn set_memory_range<T: Read>(&mut self, address: Address, mut data: T) -> MemoryResult<()> {
        let mut address = address;
        let mut chunk = vec![0u8; PAGE_SIZE];
        loop {
            let page_index = address >> PAGE_ADDRESS_SIZE;
            let page_address = address as usize & PAGE_ADDRESS_MASK;

            let n = match data.read(&mut chunk[..PAGE_SIZE - page_address]) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            let slot = match self.page_lookup(page_index) {
                Some(slot) => {
                    self.invalidate_page(slot, page_index, page_address, page_address + n)?;
                    slot
                }
                None => self.insert_page(page_index, Box::new(EMPTY_PAGE))?,
            };

            self.pages[slot].data[page_address..page_address + n].copy_from_slice(&chunk[..n]);
            address = address.wrapping_add(n as Address);
        }
    }

    /// Returns a reader over `count` bytes of memory starting at `address`. Unallocated pages
    /// read as zeroes.
    pub fn read_memory_range(&mut self, address: Address, count: Word) -> MemoryReader<'_> {
        MemoryReader::new(self, address, count)
    }

    /// Returns the number of bytes held by allocated pages.
    pub fn usage_raw(&self) -> u64 {
        (self.pages.len() * PAGE_SIZE) as u64
    }

    /// Returns a human-readable string describing the size of the [Memory].
    ///
    /// ### Returns
    /// - A human-readable string describing the size of the [Memory] in B, KiB, MiB, GiB, TiB, PiB,
    ///   or EiB.
    pub fn usage(&self) -> String {
        human_bytes(self.usage_raw())
    }
}

/// Deep copies the memory. Page contents are copied into fresh buffers; the merkle caches are
/// not copied, and are recomputed on the next root or proof query.
impl Clone for Memory {
    fn clone(&self) -> Self {
        let mut out = Self::default();
        for (&page_index, &slot) in self.page_slots.iter() {
            out.pages.push(CachedPage::new(self.pages[slot].data.clone()));
            out.page_slots.insert(page_index, out.pages.len() - 1);
            out.invalidate_branch(page_index);
        }
        out
    }
}

/// Two memories are equal if they hold the same pages with the same contents.
impl PartialEq for Memory {
    fn eq(&self, other: &Self) -> bool {
        self.page_count() == other.page_count() &&
            self.pages().all(|(index, data)| other.page(index) == Some(data))
    }
}

impl Eq for Memory {}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        memory::verify_proof,
        test_utils::{hash_count, patterned_page, reference_root},
        types::MEMORY_PROOF_SIZE,
    };

    mod merkle_proof {
        use super::*;

        #[test]
        fn small_tree() {
            let mut memory = Memory::default();
            memory.set_word(0x10000, 0xaabbccdd).unwrap();
            let proof = memory.merkle_proof(0x10000).unwrap();
            assert_eq!(0xaabbccdd_u32.to_be_bytes(), proof[WORD_SIZE_BYTES - 4..WORD_SIZE_BYTES]);
            (0..MEMORY_PROOF_LEAF_COUNT - 1).for_each(|i| {
                let start = 32 + i * 32;
                assert_eq!(ZERO_HASHES[i], proof[start..start + 32]);
            });
        }

        #[test]
        fn larger_tree() {
            let mut memory = Memory::default();
            memory.set_word(0x10000, 0xaabbccdd).unwrap();
            memory.set_word(0x80008, 42).unwrap();
            memory.set_word(0x13370000, 123).unwrap();
            let root = memory.merkle_root().unwrap();
            let proof = memory.merkle_proof(0x80008).unwrap();
            assert_eq!(42, proof[8 + WORD_SIZE_BYTES - 1]);
            let mut node: B256 = B256::from_slice(&proof[..32]);
            let mut path = 0x80008 >> 5;
            (32..proof.len()).step_by(32).for_each(|i| {
                let sib = B256::from_slice(&proof[i..i + 32]);
                if path & 1 != 0 {
                    node = keccak_concat_hashes(sib, node);
                } else {
                    node = keccak_concat_hashes(node, sib);
                }
                path >>= 1;
            });
            assert_eq!(root, node, "proof must verify");
            assert!(verify_proof(root, 0x80008, &proof));
        }

        #[test]
        fn full_page_and_absent_page() {
            let mut memory = Memory::default();
            let data = patterned_page(3);
            memory.set_memory_range(3 * PAGE_SIZE as Address, &data[..]).unwrap();
            assert_eq!(memory.page_count(), 1);

            let root = memory.merkle_root().unwrap();
            let inside = 3 * PAGE_SIZE as Address + 0x120;
            let proof = memory.merkle_proof(inside).unwrap();
            assert_eq!(proof[..32], data[0x120..0x140]);
            assert!(verify_proof(root, inside, &proof));

            // Page 4 is not allocated: its leaf and every sibling within it are zero hashes.
            let outside = 4 * PAGE_SIZE as Address + 0x40;
            let proof = memory.merkle_proof(outside).unwrap();
            assert!(verify_proof(root, outside, &proof));
            (0..PAGE_ADDRESS_SIZE - 5).for_each(|i| {
                let start = 32 + i * 32;
                assert_eq!(ZERO_HASHES[i], proof[start..start + 32]);
            });
            assert_eq!(memory.page_count(), 1, "proofs never allocate");
        }

        #[test]
        fn proof_does_not_verify_other_address() {
            let mut memory = Memory::default();
            memory.set_word(0x2000, 7).unwrap();
            let root = memory.merkle_root().unwrap();
            let proof = memory.merkle_proof(0x2000).unwrap();
            assert!(!verify_proof(root, 0x2020, &proof));
        }

        #[test]
        fn proof_size() {
            let mut memory = Memory::default();
            assert_eq!(memory.merkle_proof(0).unwrap().len(), MEMORY_PROOF_SIZE);
        }
    }

    mod merkle_root {
        use super::*;

        #[test]
        fn empty() {
            let mut memory = Memory::default();
            let root = memory.merkle_root().unwrap();
            assert_eq!(
                ZERO_HASHES[MEMORY_PROOF_LEAF_COUNT - 1],
                root,
                "Fully zeroed memory should have expected zero hash"
            );
        }

        #[test]
        fn empty_page() {
            let mut memory = Memory::default();
            memory.set_word(0xF000, 0).unwrap();
            let root = memory.merkle_root().unwrap();
            assert_eq!(
                ZERO_HASHES[MEMORY_PROOF_LEAF_COUNT - 1],
                root,
                "Fully zeroed memory should have expected zero hash"
            );
        }

        #[test]
        fn single_page() {
            let mut memory = Memory::default();
            memory.set_word(0xF000, 1).unwrap();
            let root = memory.merkle_root().unwrap();
            assert_ne!(
                ZERO_HASHES[MEMORY_PROOF_LEAF_COUNT - 1],
                root,
                "Non-zero memory should not have expected zero hash"
            );
        }

        #[test]
        fn repeat_zero() {
            let mut memory = Memory::default();
            memory.set_word(0xF000, 0).unwrap();
            memory.set_word(0xF000 + WORD_SIZE_BYTES as Address, 0).unwrap();
            let root = memory.merkle_root().unwrap();
            assert_eq!(
                ZERO_HASHES[MEMORY_PROOF_LEAF_COUNT - 1],
                root,
                "Still should have expected zero hash"
            );
        }

        #[test]
        fn random_few_pages() {
            let mut memory = Memory::default();
            memory.set_word(PAGE_SIZE as Address * 3, 1).unwrap();
            memory.set_word(PAGE_SIZE as Address * 5, 42).unwrap();
            memory.set_word(PAGE_SIZE as Address * 6, 123).unwrap();
            let p3 = memory.merkleize_subtree((1 << PAGE_KEY_SIZE) | 3).unwrap();
            let p5 = memory.merkleize_subtree((1 << PAGE_KEY_SIZE) | 5).unwrap();
            let p6 = memory.merkleize_subtree((1 << PAGE_KEY_SIZE) | 6).unwrap();
            let z = ZERO_HASHES[PAGE_ADDRESS_SIZE - 5];
            let r1 = keccak_concat_hashes(
                keccak_concat_hashes(keccak_concat_hashes(z, z), keccak_concat_hashes(z, p3)),
                keccak_concat_hashes(keccak_concat_hashes(z, p5), keccak_concat_hashes(p6, z)),
            );
            let r2 = memory.merkleize_subtree(1 << (PAGE_KEY_SIZE - 3)).unwrap();
            assert_eq!(r1, r2, "Expecting manual page combination to match subtree merkle func");
        }

        #[test]
        fn invalidate_page() {
            let mut memory = Memory::default();
            memory.set_word(0xF000, 0).unwrap();
            assert_eq!(
                ZERO_HASHES[MEMORY_PROOF_LEAF_COUNT - 1],
                memory.merkle_root().unwrap(),
                "Zero at first"
            );
            memory.set_word(0xF000 + WORD_SIZE_BYTES as Address, 1).unwrap();
            assert_ne!(
                ZERO_HASHES[MEMORY_PROOF_LEAF_COUNT - 1],
                memory.merkle_root().unwrap(),
                "Non-zero"
            );
            memory.set_word(0xF000 + WORD_SIZE_BYTES as Address, 0).unwrap();
            assert_eq!(
                ZERO_HASHES[MEMORY_PROOF_LEAF_COUNT - 1],
                memory.merkle_root().unwrap(),
                "Zero again"
            );
        }

        #[test]
        fn range_write_after_root_is_reflected() {
            let mut memory = Memory::default();
            memory.set_memory_range(0x4000, &patterned_page(1)[..]).unwrap();
            let before = memory.merkle_root().unwrap();

            memory.set_memory_range(0x4000, &patterned_page(2)[..]).unwrap();
            let after = memory.merkle_root().unwrap();
            assert_ne!(before, after);
            assert_eq!(after, reference_root(&memory));

            memory.set_memory_range(0x4010, &[0xEE; 3][..]).unwrap();
            assert_eq!(memory.merkle_root().unwrap(), reference_root(&memory));
        }

        #[test]
        fn writes_across_page_boundary() {
            let mut memory = Memory::default();
            memory.set_word(0x1000, 1).unwrap();
            memory.merkle_root().unwrap();

            let data = [0x5A; 64];
            memory.set_memory_range(0x2000 - 32, &data[..]).unwrap();
            assert_eq!(memory.page_count(), 2);
            assert_eq!(memory.merkle_root().unwrap(), reference_root(&memory));
        }

        #[test]
        fn cached_root_is_warm() {
            let mut memory = Memory::default();
            memory.set_word(0x1000, 0x1122334455667788_u64 as Word).unwrap();
            memory.set_word(0x7FFF_0000, 9).unwrap();
            let first = memory.merkle_root().unwrap();

            let before = hash_count();
            let second = memory.merkle_root().unwrap();
            assert_eq!(first, second);
            assert_eq!(hash_count(), before, "second root query must not hash");
        }

        #[test]
        fn single_write_rehashes_one_branch() {
            let mut memory = Memory::default();
            memory.set_word(0x1000, 1).unwrap();
            memory.set_word(0x9000, 2).unwrap();
            memory.merkle_root().unwrap();

            let before = hash_count();
            memory.set_word(0x1008, 3).unwrap();
            memory.merkle_root().unwrap();
            assert_eq!(
                hash_count() - before,
                (MEMORY_PROOF_LEAF_COUNT - 1) as u64,
                "one hash per level from the leaf pair to the root"
            );
        }

        #[test]
        fn gindex_too_deep() {
            let mut memory = Memory::default();
            assert!(matches!(
                memory.merkleize_subtree(1 << MEMORY_PROOF_LEAF_COUNT),
                Err(MemoryError::GindexTooDeep { .. })
            ));
            assert!(matches!(memory.merkleize_subtree(0), Err(MemoryError::GindexTooDeep { .. })));
        }
    }

    mod read_write {
        use super::*;
        use rand::RngCore;
        use std::io::Read;

        #[test]
        fn large_random() {
            let mut memory = Memory::default();
            let mut data = [0u8; 20_000];
            rand::thread_rng().fill_bytes(&mut data[..]);
            memory.set_memory_range(0, &data[..]).expect("Should not error");
            assert_eq!(memory.page_count(), 5, "no trailing page is allocated at EOF");
            for i in [0, 8, 1000, 20_000 - 8] {
                let value = memory.get_word(i as Address).expect("Should not error");
                let mut expected = [0u8; WORD_SIZE_BYTES];
                expected.copy_from_slice(&data[i..i + WORD_SIZE_BYTES]);
                assert_eq!(Word::from_be_bytes(expected), value, "read at {}", i);
            }
            assert_eq!(memory.merkle_root().unwrap(), reference_root(&memory));
        }

        #[test]
        fn repeat_range() {
            let mut memory = Memory::default();
            let data = b"under the big bright yellow sun".repeat(40);
            memory.set_memory_range(0x1337, &data[..]).expect("Should not error");

            let mut reader = memory.read_memory_range(0x1337 - 10, data.len() as Word + 20);
            let mut buf = Vec::with_capacity(1260);
            reader.read_to_end(&mut buf).unwrap();

            assert_eq!([0u8; 10], buf[..10], "empty start");
            assert_eq!(data[..], buf[10..buf.len() - 10], "result");
            assert_eq!([0u8; 10], buf[buf.len() - 10..], "empty end");
        }

        #[test]
        fn read_write() {
            let mut memory = Memory::default();
            memory.set_word(16, 0xaabbccdd).unwrap();
            assert_eq!(0xaabbccdd, memory.get_word(16).unwrap());
            memory.set_word(16, 0xaabbc1dd).unwrap();
            assert_eq!(0xaabbc1dd, memory.get_word(16).unwrap());
        }

        #[test]
        fn adjacent_word_untouched() {
            let mut memory = Memory::default();
            let value = 0x1122334455667788_u64 as Word;
            let empty_root = memory.merkle_root().unwrap();
            memory.set_word(0x1000, value).unwrap();
            assert_eq!(value, memory.get_word(0x1000).unwrap());
            assert_eq!(0, memory.get_word(0x1000 + WORD_SIZE_BYTES as Address).unwrap());
            assert_ne!(empty_root, memory.merkle_root().unwrap());
        }

        #[test]
        fn unaligned_read() {
            let mut memory = Memory::default();
            memory.set_word(16, 0xaabbccdd).unwrap();
            memory.set_word(32, 0x11223344).unwrap();
            for offset in 1..WORD_SIZE_BYTES as Address {
                assert!(matches!(
                    memory.get_word(16 + offset),
                    Err(MemoryError::Unaligned { address }) if address == 16 + offset
                ));
            }
            assert_eq!(0x11223344, memory.get_word(32).unwrap());
            assert_eq!(0, memory.get_word(48).unwrap());
            assert_eq!(0xaabbccdd, memory.get_word(16).unwrap());
        }

        #[test]
        fn unaligned_write() {
            let mut memory = Memory::default();
            memory.set_word(16, 0xaabbccdd).unwrap();
            for offset in 1..WORD_SIZE_BYTES as Address {
                assert!(memory.set_word(16 + offset, 0x11223344).is_err());
            }
            assert_eq!(0xaabbccdd, memory.get_word(16).unwrap());
            assert_eq!(memory.page_count(), 1);
        }

        #[test]
        fn absent_page_reads_zero_without_allocating() {
            let mut memory = Memory::default();
            assert_eq!(0, memory.get_word(0x5000).unwrap());
            let mut buf = Vec::new();
            memory.read_memory_range(0x5000, 100).read_to_end(&mut buf).unwrap();
            assert_eq!(buf, vec![0u8; 100]);
            assert_eq!(memory.page_count(), 0);
        }

        #[test]
        fn failing_reader_propagates() {
            struct Broken;
            impl Read for Broken {
                fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                    Err(std::io::Error::new(ErrorKind::BrokenPipe, "broken"))
                }
            }

            let mut memory = Memory::default();
            let err = memory.set_memory_range(0, Broken).unwrap_err();
            assert!(matches!(err, MemoryError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
            assert_eq!(memory.page_count(), 0);
        }

        #[test]
        fn interrupted_reader_retries() {
            struct Flaky<'a> {
                interrupted: bool,
                data: &'a [u8],
            }
            impl Read for Flaky<'_> {
                fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                    if !self.interrupted {
                        self.interrupted = true;
                        return Err(std::io::Error::new(ErrorKind::Interrupted, "interrupted"));
                    }
                    self.data.read(buf)
                }
            }

            let mut memory = Memory::default();
            let data = [0xAAu8, 0xBB, 0xCC, 0xDD, 0xEE];
            memory.set_memory_range(0x1FFE, Flaky { interrupted: false, data: &data }).unwrap();
            assert_eq!(memory.page_count(), 2);

            let mut buf = Vec::new();
            memory.read_memory_range(0x1FFC, 9).read_to_end(&mut buf).unwrap();
            assert_eq!(buf, vec![0, 0, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0, 0]);
            assert_eq!(memory.merkle_root().unwrap(), reference_root(&memory));

            // An interruption before any data allocates nothing.
            let mut memory = Memory::default();
            memory.set_memory_range(0x3000, Flaky { interrupted: false, data: &[] }).unwrap();
            assert_eq!(memory.page_count(), 0);
        }
    }

    mod page_cache {
        use super::*;

        #[test]
        fn lookup_promotes_to_front() {
            let mut memory = Memory::default();
            memory.set_word(0x1000, 1).unwrap();
            memory.set_word(0x2000, 2).unwrap();
            memory.set_word(0x3000, 3).unwrap();

            memory.get_word(0x1000).unwrap();
            assert_eq!(memory.last_page[0].0, 1);
            memory.get_word(0x2000).unwrap();
            assert_eq!(memory.last_page[0].0, 2);
            assert_eq!(memory.last_page[1].0, 1);

            // A hit in the second slot swaps it to the front.
            memory.get_word(0x1000).unwrap();
            assert_eq!(memory.last_page[0].0, 1);
            assert_eq!(memory.last_page[1].0, 2);

            memory.get_word(0x3000).unwrap();
            assert_eq!(memory.last_page[0].0, 3);
            assert_eq!(memory.last_page[1].0, 1);
        }

        #[test]
        fn cache_agrees_with_map() {
            let mut memory = Memory::default();
            for i in 0..8 {
                memory.set_word(i * PAGE_SIZE as Address, i + 1).unwrap();
            }
            for i in (0..8).rev().chain(0..8) {
                assert_eq!(memory.get_word(i * PAGE_SIZE as Address).unwrap(), i + 1);
                for (key, slot) in memory.last_page {
                    if key != NO_PAGE {
                        assert_eq!(memory.page_slots.get(&key), Some(&slot));
                    }
                }
            }
        }

        #[test]
        fn missing_pages_are_not_cached() {
            let mut memory = Memory::default();
            memory.set_word(0x1000, 1).unwrap();
            memory.get_word(0x1000).unwrap();
            memory.get_word(0x8000).unwrap();
            assert_eq!(memory.last_page[0].0, 1);
            assert_eq!(memory.last_page[1].0, NO_PAGE);
        }
    }

    mod alloc {
        use super::*;

        #[test]
        fn alloc_page_resets_existing() {
            let mut memory = Memory::default();
            memory.set_word(0x3000, 5).unwrap();
            memory.merkle_root().unwrap();
            memory.alloc_page(3).unwrap();
            assert_eq!(memory.page_count(), 1);
            assert_eq!(memory.get_word(0x3000).unwrap(), 0);
            assert_eq!(memory.merkle_root().unwrap(), ZERO_HASHES[MEMORY_PROOF_LEAF_COUNT - 1]);
        }

        #[test]
        fn alloc_page_out_of_range() {
            let mut memory = Memory::default();
            assert!(matches!(
                memory.alloc_page(NO_PAGE),
                Err(MemoryError::InvalidPageIndex { .. })
            ));
            assert_eq!(memory.page_count(), 0);
        }

        #[test]
        fn usage() {
            let mut memory = Memory::default();
            assert_eq!(memory.usage(), "0 B");
            memory.set_word(0, 1).unwrap();
            assert_eq!(memory.usage_raw(), PAGE_SIZE as u64);
            assert_eq!(memory.usage(), "4.0 KiB");
        }

        #[test]
        fn for_each_page_stops_on_error() {
            let mut memory = Memory::default();
            memory.set_word(0x1000, 1).unwrap();
            memory.set_word(0x2000, 1).unwrap();
            let mut visited = 0;
            let result: Result<(), &str> = memory.for_each_page(|_, _| {
                visited += 1;
                Err("stop")
            });
            assert_eq!(result, Err("stop"));
            assert_eq!(visited, 1);
        }
    }

    mod copy {
        use super::*;

        #[test]
        fn clone_is_independent() {
            let mut memory = Memory::default();
            memory.set_word(0x1000, 1).unwrap();
            memory.set_memory_range(0x8000, &patterned_page(8)[..]).unwrap();
            let root = memory.merkle_root().unwrap();

            let mut copy = memory.clone();
            assert_eq!(memory, copy);
            assert_eq!(copy.merkle_root().unwrap(), root);

            copy.set_word(0x1000, 2).unwrap();
            assert_ne!(memory, copy);
            assert_eq!(memory.get_word(0x1000).unwrap(), 1);
            assert_eq!(memory.merkle_root().unwrap(), root);
            assert_ne!(copy.merkle_root().unwrap(), root);
        }
    }

    mod properties {
        use super::*;
        use proptest::{collection::vec, prelude::any, proptest};

        /// Word aligned addresses clustered into a handful of pages, with a few far away.
        fn address() -> impl proptest::strategy::Strategy<Value = Address> {
            use proptest::prelude::*;
            prop_oneof![
                (0..4 as Address, 0..(PAGE_SIZE / WORD_SIZE_BYTES) as Address).prop_map(
                    |(page, word)| page * PAGE_SIZE as Address + word * WORD_SIZE_BYTES as Address
                ),
                any::<Address>().prop_map(|a| a & !EXT_MASK),
            ]
        }

        proptest! {
            #[test]
            fn write_then_read(writes in vec((address(), any::<Word>()), 1..32)) {
                let mut memory = Memory::default();
                for &(address, value) in writes.iter() {
                    memory.set_word(address, value).unwrap();
                    assert_eq!(memory.get_word(address).unwrap(), value);
                }
            }

            #[test]
            fn root_matches_reference(
                batches in vec(vec((address(), any::<Word>()), 1..8), 1..6)
            ) {
                let mut memory = Memory::default();
                for batch in batches {
                    for (address, value) in batch {
                        memory.set_word(address, value).unwrap();
                    }
                    assert_eq!(memory.merkle_root().unwrap(), reference_root(&memory));
                }
            }

            #[test]
            fn proofs_verify(
                writes in vec((address(), any::<Word>()), 1..16),
                probe in address(),
            ) {
                let mut memory = Memory::default();
                for (address, value) in writes.iter().copied() {
                    memory.set_word(address, value).unwrap();
                }
                let root = memory.merkle_root().unwrap();
                for address in writes.iter().map(|(a, _)| *a).chain(std::iter::once(probe)) {
                    let proof = memory.merkle_proof(address).unwrap();
                    assert!(verify_proof(root, address, &proof));
                }
            }
        }
    }
}
