//! Contains the [MemoryReader] structure.

use super::Memory;
use crate::types::{Address, Word, PAGE_ADDRESS_MASK, PAGE_ADDRESS_SIZE, PAGE_SIZE};
use std::io::Read;

/// A reader over a range of [Memory].
///
/// Enables unaligned verbatim reads from the [Memory]'s pages. If the pages for the address
/// space requested are not present, the reader will return zeroed out data for that region, rather
/// than fail or allocate. Reads wrap around the end of the address space.
#[derive(Debug)]
pub struct MemoryReader<'a> {
    memory: &'a mut Memory,
    address: Address,
    count: Word,
}

impl<'a> MemoryReader<'a> {
    /// Create a new [MemoryReader] for the given [Memory] that can read `count` bytes starting
    /// from `address`.
    pub fn new(memory: &'a mut Memory, address: Address, count: Word) -> Self {
        Self { memory, address, count }
    }
}

impl Read for MemoryReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, std::io::Error> {
        if self.count == 0 || buf.is_empty() {
            return Ok(0);
        }

        let end_address = self.address.wrapping_add(self.count);

        let page_index = self.address >> PAGE_ADDRESS_SIZE;
        let start = self.address as usize & PAGE_ADDRESS_MASK;
        let mut end = PAGE_SIZE;

        let end_offset = end_address as usize & PAGE_ADDRESS_MASK;
        if page_index == (end_address >> PAGE_ADDRESS_SIZE) && end_offset > start {
            end = end_offset;
        }

        let n = (end - start).min(buf.len());
        match self.memory.lookup_page(page_index) {
            Some(page) => buf[..n].copy_from_slice(&page.data[start..start + n]),
            None => buf[..n].fill(0),
        }

        self.address = self.address.wrapping_add(n as Address);
        self.count -= n as Word;
        Ok(n)
    }
}
