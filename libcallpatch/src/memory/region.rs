use super::{MemoryError, MemoryResult};

/// A non-empty, non-wrapping address range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodeRegion {
    address: usize,
    len: usize,
}

impl CodeRegion {
    pub fn new(address: usize, len: usize) -> MemoryResult<Self> {
        if address == 0 {
            return Err(MemoryError::NullAddress);
        }

        if len == 0 {
            return Err(MemoryError::InvalidSize);
        }

        address
            .checked_add(len)
            .ok_or(MemoryError::InvalidMemoryRange(address, len))?;

        Ok(Self { address, len })
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// First address past the region
    pub fn end(&self) -> usize {
        // Cannot overflow, checked in `new`
        self.address + self.len
    }

    pub fn contains(&self, other: &CodeRegion) -> bool {
        other.address >= self.address && other.end() <= self.end()
    }

    /// Returns `len` bytes starting `offset` bytes into this region.
    pub fn subregion(&self, offset: usize, len: usize) -> MemoryResult<CodeRegion> {
        let address = self
            .address
            .checked_add(offset)
            .ok_or(MemoryError::InvalidMemoryRange(self.address, offset))?;

        let sub = CodeRegion::new(address, len)?;

        if !self.contains(&sub) {
            return Err(MemoryError::OutOfBounds {
                address,
                len,
                base: self.address,
                size: self.len,
            });
        }

        Ok(sub)
    }

    /// Expands the region to whole pages of `page_size` bytes.
    pub(crate) fn page_span(&self, page_size: usize) -> (usize, usize) {
        let start = self.address & !(page_size - 1);
        let end_page = (self.end() - 1) & !(page_size - 1);
        (start, (end_page + page_size) - start)
    }
}
