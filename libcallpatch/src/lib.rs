//! libcallpatch
//! Redirects a single near relative call inside an already loaded function
//! to an interception routine, and puts the original bytes back later.
//!
//! The crate is split the same way the work is split at runtime:
//! - [`memory`] is the only place that touches raw addresses.
//! - [`patch`] encodes, installs and restores 5-byte `call rel32` sites.
//! - [`forward`] is the subscriber channel an interception routine asks
//!   before it lets a result through.

// Near relative calls with a 32-bit displacement only exist on x86/x86_64
#[cfg(not(any(target_arch = "x86_64", target_arch = "x86")))]
compile_error!("Unsupported architecture - only x86/x64 supported");

pub mod common;
pub mod ffi;
pub mod forward;
pub mod memory;
pub mod patch;

pub use forward::{Forward, ForwardError, ForwardManager, Outcome, SubscriberId};
pub use memory::{BufferMemory, CodeMemory, CodeRegion, MemoryError, ProcessMemory};
pub use patch::{CallHook, CallSite, PatchError, PatchRecord};
