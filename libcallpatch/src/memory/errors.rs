use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Input address is NULL")]
    NullAddress,

    #[error("Invalid size parameter")]
    InvalidSize,

    #[error("Invalid memory range: base=0x{0:X}, size={1}")]
    InvalidMemoryRange(usize, usize),

    #[error("Memory not mapped at address 0x{0:X}")]
    NotMapped(usize),

    #[error("Range 0x{address:X}+{len} is outside of region 0x{base:X}+{size}")]
    OutOfBounds {
        address: usize,
        len: usize,
        base: usize,
        size: usize,
    },

    #[error("Memory at 0x{0:X} is not writable")]
    NotWritable(usize),

    #[error("Memory protection change failed at 0x{address:X} (os error {code})")]
    ProtectionChangeFailed { address: usize, code: i32 },

    #[error("Instruction cache flush failed at 0x{address:X} (os error {code})")]
    FlushFailed { address: usize, code: i32 },

    #[error("Memory query failed at 0x{address:X} (os error {code})")]
    QueryFailed { address: usize, code: i32 },

    #[error("Page size unavailable")]
    PageSizeUnavailable,
}
