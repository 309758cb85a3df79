//! SDKTools capability provider
//!
//! The balance native needs the live game rules object, which only the
//! SDKTools extension can hand out, and only from interface version 2 on.

use std::{ffi::c_void, fmt, ptr::NonNull};

use libcallpatch::ffi::{FnPtr, FnPtrError};

pub const MIN_INTERFACE_VERSION: u32 = 2;

pub trait GameRulesProvider: Send + Sync {
    fn interface_version(&self) -> u32;

    /// Current game rules object, if a map is running
    fn game_rules(&self) -> Option<NonNull<c_void>>;

    fn is_compatible(&self) -> bool {
        self.interface_version() >= MIN_INTERFACE_VERSION
    }
}

pub type GetGameRulesFn = unsafe extern "C" fn() -> *mut c_void;

/// Provider backed by a host supplied `GetGameRules` entry point.
pub struct NativeGameRulesProvider {
    interface_version: u32,
    get_game_rules: FnPtr<GetGameRulesFn>,
}

impl NativeGameRulesProvider {
    pub fn new(interface_version: u32, get_game_rules: *mut c_void) -> Result<Self, FnPtrError> {
        Ok(Self {
            interface_version,
            get_game_rules: FnPtr::from_raw(get_game_rules)?,
        })
    }
}

impl GameRulesProvider for NativeGameRulesProvider {
    fn interface_version(&self) -> u32 {
        self.interface_version
    }

    fn game_rules(&self) -> Option<NonNull<c_void>> {
        NonNull::new(unsafe { (self.get_game_rules.as_fn())() })
    }
}

impl fmt::Debug for NativeGameRulesProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeGameRulesProvider")
            .field("interface_version", &self.interface_version)
            .field("get_game_rules", &self.get_game_rules.as_raw_ptr())
            .finish()
    }
}
