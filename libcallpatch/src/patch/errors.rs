use thiserror::Error;

use crate::{ffi::FnPtrError, memory::MemoryError};

/// Error types for call-site patching
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("FnPtr error: {0}")]
    FnPtr(#[from] FnPtrError),

    #[error("Function base address is NULL")]
    NullFunctionBase,

    #[error("Call-site offset 0x{offset:X} overflows function base 0x{base:X}")]
    OffsetOverflow { base: usize, offset: usize },

    #[error("Byte at 0x{address:X} is 0x{found:02X}, expected near call opcode 0xE8")]
    NotANearCall { address: usize, found: u8 },

    #[error("Call at 0x{call_site:X} cannot reach 0x{destination:X} with a 32-bit displacement")]
    CallOutOfRange { call_site: usize, destination: usize },

    #[error("Call verification failed: expected target 0x{expected:X}, got 0x{actual:X}")]
    CallVerificationFailed { expected: usize, actual: usize },

    #[error("Call site 0x{0:X} is already patched")]
    AlreadyInstalled(usize),

    #[error("Call site is not patched")]
    NotInstalled,
}
