use parking_lot::Mutex;

use super::{CodeMemory, CodeRegion, MemoryError, MemoryResult};

/// A code image held in a buffer and addressed as if it were mapped at
/// `base`.
///
/// Pages start out read + execute only. Writes succeed only inside
/// ranges that went through [`CodeMemory::make_writable`], so patch
/// logic that forgets to unprotect fails here the same way it would
/// crash against real code pages.
#[derive(Debug)]
pub struct BufferMemory {
    image: CodeRegion,
    bytes: Mutex<Vec<u8>>,
    writable: Mutex<Vec<CodeRegion>>,
}

impl BufferMemory {
    pub fn new(base: usize, bytes: impl Into<Vec<u8>>) -> MemoryResult<Self> {
        let bytes = bytes.into();
        let image = CodeRegion::new(base, bytes.len())?;

        Ok(Self {
            image,
            bytes: Mutex::new(bytes),
            writable: Mutex::new(Vec::new()),
        })
    }

    /// Whole image as a region
    pub fn region(&self) -> CodeRegion {
        self.image
    }

    /// Copy of the whole image
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }

    pub fn bytes_at(&self, address: usize, len: usize) -> MemoryResult<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        self.read(address, &mut buffer)?;
        Ok(buffer)
    }

    /// Overwrites bytes ignoring protection, like an unrelated writer would.
    pub fn overwrite(&self, address: usize, bytes: &[u8]) -> MemoryResult<()> {
        let range = self.offset_of(CodeRegion::new(address, bytes.len())?)?;
        self.bytes.lock()[range].copy_from_slice(bytes);
        Ok(())
    }

    pub fn is_writable(&self, region: CodeRegion) -> bool {
        self.writable.lock().iter().any(|w| w.contains(&region))
    }

    /// Drops every writable range, back to read + execute
    pub fn reset_protection(&self) {
        self.writable.lock().clear();
    }

    fn offset_of(&self, region: CodeRegion) -> MemoryResult<std::ops::Range<usize>> {
        if !self.image.contains(&region) {
            return Err(MemoryError::NotMapped(region.address()));
        }

        let start = region.address() - self.image.address();
        Ok(start..start + region.len())
    }
}

impl CodeMemory for BufferMemory {
    fn validate(&self, region: CodeRegion) -> MemoryResult<()> {
        self.offset_of(region).map(|_| ())
    }

    fn read(&self, address: usize, buffer: &mut [u8]) -> MemoryResult<()> {
        let range = self.offset_of(CodeRegion::new(address, buffer.len())?)?;
        buffer.copy_from_slice(&self.bytes.lock()[range]);
        Ok(())
    }

    fn make_writable(&self, region: CodeRegion) -> MemoryResult<()> {
        self.validate(region)?;

        let mut writable = self.writable.lock();
        if !writable.iter().any(|w| w.contains(&region)) {
            writable.push(region);
        }
        Ok(())
    }

    fn write(&self, address: usize, bytes: &[u8]) -> MemoryResult<()> {
        let region = CodeRegion::new(address, bytes.len())?;
        let range = self.offset_of(region)?;

        if !self.is_writable(region) {
            return Err(MemoryError::NotWritable(address));
        }

        self.bytes.lock()[range].copy_from_slice(bytes);
        Ok(())
    }
}
