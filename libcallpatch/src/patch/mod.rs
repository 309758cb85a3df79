//! Call-site patching
//!
//! [`callsite::install`] swaps the displacement of one `call rel32` so it
//! lands on an interceptor and hands back a [`PatchRecord`];
//! [`callsite::restore`] writes the record back. [`CallHook`] wraps the
//! pair with install-once state and restores on drop.

pub mod callsite;
pub mod encoding;
pub mod errors;
pub mod hook;

pub use callsite::{CallSite, PatchRecord, install, read_target, restore};
pub use encoding::{CALL_REL32_LEN, CALL_REL32_OPCODE};
pub use errors::PatchError;
pub use hook::CallHook;

pub type PatchResult<T> = std::result::Result<T, PatchError>;
