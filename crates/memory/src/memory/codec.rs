//! Binary and JSON encodings of the [Memory] page table.
//!
//! Both encodings carry page contents only. Merkle caches are derived state and are rebuilt
//! lazily after loading.

use super::Memory;
use crate::{
    error::{MemoryError, MemoryResult},
    types::{Page, PageIndex, Word, EMPTY_PAGE, WORD_SIZE_BYTES},
};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};

impl Memory {
    /// Returns the allocated pages sorted by ascending page index.
    fn sorted_pages(&self) -> Vec<(PageIndex, &Page)> {
        let mut pages: Vec<_> = self.pages().collect();
        pages.sort_unstable_by_key(|(index, _)| *index);
        pages
    }

    /// Writes the memory in a simple binary format which can be read again using
    /// [Memory::deserialize_binary].
    ///
    /// The format is a concatenation of fields, with a prefixed item count for repeating items,
    /// using big endian encoding for numbers:
    ///
    /// ```text
    /// page count          Word
    /// for each page, in ascending page index order:
    ///     page index      Word
    ///     page data       [u8; PAGE_SIZE]
    /// ```
    pub fn serialize_binary<W: Write>(&self, mut out: W) -> MemoryResult<()> {
        out.write_all(&(self.page_count() as Word).to_be_bytes())?;
        for (page_index, page) in self.sorted_pages() {
            out.write_all(&page_index.to_be_bytes())?;
            out.write_all(page)?;
        }
        tracing::debug!(target: "cannonball::memory", "Serialized {} pages", self.page_count());
        Ok(())
    }

    /// Reads a memory previously written with [Memory::serialize_binary].
    ///
    /// A fresh [Memory] is built and returned only once the whole input has been read, so a
    /// failure never leaves a partially loaded memory behind.
    pub fn deserialize_binary<R: Read>(mut input: R) -> MemoryResult<Self> {
        let page_count = read_word(&mut input, "page count")?;

        let mut memory = Memory::default();
        for entry in 0..page_count {
            let page_index = read_word(&mut input, "page index")?;
            if memory.page(page_index).is_some() {
                return Err(MemoryError::DuplicatePage { entry: entry as usize, page_index });
            }

            let mut data = Box::new(EMPTY_PAGE);
            read_exact(&mut input, &mut data[..], "page data")?;
            memory.insert_page(page_index, data)?;
        }

        tracing::debug!(target: "cannonball::memory", "Deserialized {} pages", memory.page_count());
        Ok(memory)
    }
}

/// Fill `buf` from `input`, reporting a short read as [MemoryError::Truncated].
fn read_exact<R: Read>(input: &mut R, buf: &mut [u8], field: &'static str) -> MemoryResult<()> {
    input.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => MemoryError::Truncated { field },
        _ => MemoryError::Io(e),
    })
}

/// Read one big endian [Word] from `input`.
fn read_word<R: Read>(input: &mut R, field: &'static str) -> MemoryResult<Word> {
    let mut word = [0u8; WORD_SIZE_BYTES];
    read_exact(input, &mut word, field)?;
    Ok(Word::from_be_bytes(word))
}

#[derive(Serialize)]
struct PageEntryRef<'a> {
    index: PageIndex,
    #[serde(serialize_with = "crate::utils::ser::page_hex::serialize")]
    data: &'a Page,
}

#[derive(Deserialize)]
struct PageEntry {
    index: PageIndex,
    #[serde(deserialize_with = "crate::utils::ser::page_hex::deserialize")]
    data: Box<Page>,
}

impl Serialize for Memory {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let page_entries: Vec<PageEntryRef<'_>> = self
            .sorted_pages()
            .into_iter()
            .map(|(index, data)| PageEntryRef { index, data })
            .collect();
        page_entries.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Memory {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let page_entries: Vec<PageEntry> = Vec::deserialize(deserializer)?;

        let mut memory = Memory::default();
        for (i, p) in page_entries.into_iter().enumerate() {
            if memory.page(p.index).is_some() {
                return Err(serde::de::Error::custom(MemoryError::DuplicatePage {
                    entry: i,
                    page_index: p.index,
                }));
            }
            memory.insert_page(p.index, p.data).map_err(serde::de::Error::custom)?;
        }

        Ok(memory)
    }
}
