//! Code memory access
//!
//! Everything that reads or writes instruction bytes goes through
//! [`CodeMemory`]. [`ProcessMemory`] talks to the live process,
//! [`BufferMemory`] holds a code image at a chosen virtual base.

mod buffer;
mod errors;
mod process;
mod region;

pub use buffer::BufferMemory;
pub use errors::MemoryError;
pub use process::ProcessMemory;
pub use region::CodeRegion;

pub type MemoryResult<T> = std::result::Result<T, MemoryError>;

/// Capability to inspect and rewrite executable code.
///
/// Addresses are absolute virtual addresses. Implementations must check
/// ranges themselves; callers never get a raw pointer out of this trait.
pub trait CodeMemory {
    /// Fails unless the whole region is mapped (committed on Windows).
    fn validate(&self, region: CodeRegion) -> MemoryResult<()>;

    /// Copies `buffer.len()` bytes starting at `address` into `buffer`.
    fn read(&self, address: usize, buffer: &mut [u8]) -> MemoryResult<()>;

    /// Marks the region readable, writable and executable.
    fn make_writable(&self, region: CodeRegion) -> MemoryResult<()>;

    /// Writes `bytes` at `address`. The range must already be writable.
    fn write(&self, address: usize, bytes: &[u8]) -> MemoryResult<()>;
}

impl<M: CodeMemory + ?Sized> CodeMemory for &M {
    fn validate(&self, region: CodeRegion) -> MemoryResult<()> {
        (**self).validate(region)
    }

    fn read(&self, address: usize, buffer: &mut [u8]) -> MemoryResult<()> {
        (**self).read(address, buffer)
    }

    fn make_writable(&self, region: CodeRegion) -> MemoryResult<()> {
        (**self).make_writable(region)
    }

    fn write(&self, address: usize, bytes: &[u8]) -> MemoryResult<()> {
        (**self).write(address, bytes)
    }
}
