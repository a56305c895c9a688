//! This module contains all of the type aliases and architecture constants used within this
//! crate.
//!
//! The address space width is selected at compile time. By default the memory models a 64-bit
//! (MIPS64) address space; the `mips32` feature selects a 32-bit address space instead. Every
//! other constant is derived from [WORD_SIZE].

#[cfg(not(feature = "mips32"))]
mod arch {
    /// A [Word] is the widest value the machine reads or writes in a single memory access.
    pub type Word = u64;

    /// The width of a [Word] in bits.
    pub const WORD_SIZE: usize = 64;
}

#[cfg(feature = "mips32")]
mod arch {
    /// A [Word] is the widest value the machine reads or writes in a single memory access.
    pub type Word = u32;

    /// The width of a [Word] in bits.
    pub const WORD_SIZE: usize = 32;
}

pub use arch::{Word, WORD_SIZE};

/// The width of a [Word] in bytes.
pub const WORD_SIZE_BYTES: usize = WORD_SIZE >> 3;

/// The mask applied to an [Address] to check [Word] alignment.
pub const EXT_MASK: Word = (WORD_SIZE_BYTES - 1) as Word;

/// An [Address] is a byte address in the emulator's memory.
pub type Address = Word;

/// A [Gindex] is a generalized index, defined as $2^{\text{depth}} + \text{index}$.
pub type Gindex = u64;

/// A [PageIndex] is the index of a [Page] within the address space, i.e. `address >>
/// PAGE_ADDRESS_SIZE`.
pub type PageIndex = Word;

/// The size of a page address in bits. 2**12 = 4 KiB, the minimum physical page size.
pub const PAGE_ADDRESS_SIZE: usize = 12;

/// The number of bits in an [Address] that select the [Page].
pub const PAGE_KEY_SIZE: usize = WORD_SIZE - PAGE_ADDRESS_SIZE;

/// The size of a [Page] in bytes.
pub const PAGE_SIZE: usize = 1 << PAGE_ADDRESS_SIZE;

/// The mask to apply to an [Address] to obtain the address within its page.
pub const PAGE_ADDRESS_MASK: usize = PAGE_SIZE - 1;

/// The maximum number of pages addressable within the address space.
pub const MAX_PAGE_COUNT: u64 = 1 << PAGE_KEY_SIZE;

/// The mask to apply to a [Gindex] to obtain a [PageIndex].
pub const PAGE_KEY_MASK: u64 = MAX_PAGE_COUNT - 1;

/// The number of 32 byte elements in a memory proof. This is the depth of the tree down to
/// 32 byte leaves, plus one for the leaf itself.
pub const MEMORY_PROOF_LEAF_COUNT: usize = WORD_SIZE - 5 + 1;

/// The size of an encoded memory proof in bytes.
pub const MEMORY_PROOF_SIZE: usize = MEMORY_PROOF_LEAF_COUNT * 32;

/// A [Page] is a portion of memory of size [PAGE_SIZE].
pub type Page = [u8; PAGE_SIZE];

/// An encoded memory proof: the leaf followed by its sibling hashes, deepest first.
pub type MemoryProof = [u8; MEMORY_PROOF_SIZE];

/// An empty page of memory, zeroed out.
pub(crate) const EMPTY_PAGE: Page = [0u8; PAGE_SIZE];
