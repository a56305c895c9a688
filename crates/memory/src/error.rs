//! Error types for the Merkleized memory.

use crate::types::{Address, Gindex, PageIndex};
use thiserror::Error;

/// A [Result] type over a generic value with [MemoryError].
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Errors that the [Memory] can throw.
///
/// [Memory]: crate::Memory
#[derive(Error, Debug)]
pub enum MemoryError {
    /// A word access at an address that is not word aligned.
    #[error("unaligned memory access: {address:x}")]
    Unaligned {
        /// The offending address.
        address: Address,
    },

    /// A generalized index below the 32 byte leaves of the memory tree.
    #[error("gindex too deep: {gindex}")]
    GindexTooDeep {
        /// The offending generalized index.
        gindex: Gindex,
    },

    /// A proof traversal that descended below the 32 byte leaves of the memory tree. Proof
    /// generation stops at the leaf level, so this only guards against a broken traversal.
    #[error("traversed too deep: depth {depth}")]
    TraversedTooDeep {
        /// The depth reached.
        depth: usize,
    },

    /// A page index that does not fit within the address space.
    #[error("page index {page_index:x} is outside of the address space")]
    InvalidPageIndex {
        /// The offending page index.
        page_index: u64,
    },

    /// The serialized input ended before a complete field could be read.
    #[error("truncated input while reading {field}")]
    Truncated {
        /// The field being read.
        field: &'static str,
    },

    /// The serialized input contains the same page more than once.
    #[error("cannot load duplicate page, entry {entry}, page index {page_index}")]
    DuplicatePage {
        /// The position of the duplicate entry in the input.
        entry: usize,
        /// The repeated page index.
        page_index: PageIndex,
    },

    /// An error from the underlying reader or writer.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
