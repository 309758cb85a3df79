use std::{ffi::c_void, fmt};

use parking_lot::Mutex;

use super::callsite::{self, CallSite, PatchRecord};
use super::{PatchError, PatchResult};
use crate::{ffi::FnPtr, memory::CodeMemory};

struct Installed<F: Copy + 'static> {
    record: PatchRecord,
    original_fn: FnPtr<F>,
}

/// One patched call site with its undo record.
///
/// `F` is the function pointer type of both the original callee and the
/// interceptor. The hook can be installed once at a time; dropping an
/// installed hook restores the original bytes.
pub struct CallHook<M: CodeMemory, F: Copy + 'static> {
    name: String,
    memory: M,
    site: CallSite,
    interceptor_fn: FnPtr<F>,
    state: Mutex<Option<Installed<F>>>,
}

impl<M: CodeMemory, F: Copy + 'static> CallHook<M, F> {
    pub fn new(name: impl Into<String>, memory: M, site: CallSite, interceptor: F) -> PatchResult<Self> {
        let interceptor_fn = FnPtr::from_fn(interceptor)?;
        Ok(Self::with_interceptor(name, memory, site, interceptor_fn))
    }

    /// Hook whose interceptor is only known by address.
    pub fn from_raw(
        name: impl Into<String>,
        memory: M,
        site: CallSite,
        interceptor: *mut c_void,
    ) -> PatchResult<Self> {
        let interceptor_fn = FnPtr::from_raw(interceptor)?;
        Ok(Self::with_interceptor(name, memory, site, interceptor_fn))
    }

    fn with_interceptor(name: impl Into<String>, memory: M, site: CallSite, interceptor_fn: FnPtr<F>) -> Self {
        Self {
            name: name.into(),
            memory,
            site,
            interceptor_fn,
            state: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn site(&self) -> &CallSite {
        &self.site
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn interceptor(&self) -> FnPtr<F> {
        self.interceptor_fn
    }

    pub fn is_installed(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Original callee, available while installed
    pub fn original(&self) -> Option<FnPtr<F>> {
        self.state.lock().as_ref().map(|installed| installed.original_fn)
    }

    /// Address and saved bytes of the live patch
    pub fn record(&self) -> Option<(usize, [u8; super::CALL_REL32_LEN])> {
        self.state
            .lock()
            .as_ref()
            .map(|installed| (installed.record.address(), *installed.record.original_bytes()))
    }

    /// Callee the site reaches right now; the interceptor once installed.
    pub fn current_target(&self) -> PatchResult<usize> {
        callsite::read_target(&self.memory, &self.site)
    }

    /// Patches the call site and returns the callee it used to reach.
    pub fn install(&self) -> PatchResult<FnPtr<F>> {
        let mut state = self.state.lock();

        if state.is_some() {
            log::error!("[{}] Call site 0x{:X} already patched", self.name, self.site.address());
            return Err(PatchError::AlreadyInstalled(self.site.address()));
        }

        let (record, original_target) =
            callsite::install(&self.memory, &self.site, self.interceptor_fn.address())?;

        let original_fn = match FnPtr::from_address(original_target) {
            Ok(original_fn) => original_fn,
            Err(err) => {
                // Nothing to call through, undo right away
                if let Err(restore_err) = callsite::restore(&self.memory, record) {
                    log::error!("[{}] Rollback failed: {}", self.name, restore_err);
                }
                return Err(err.into());
            }
        };

        log::info!(
            "[{}] Installed at 0x{:X}, original callee 0x{:X}",
            self.name,
            self.site.address(),
            original_target
        );

        *state = Some(Installed { record, original_fn });
        Ok(original_fn)
    }

    /// Writes the original bytes back.
    ///
    /// The record is only dropped after a successful write, so a failed
    /// restore can be retried.
    pub fn restore(&self) -> PatchResult<()> {
        let mut state = self.state.lock();

        let installed = state.as_ref().ok_or(PatchError::NotInstalled)?;
        callsite::write_back(&self.memory, &installed.record)?;
        *state = None;

        log::info!("[{}] Restored 0x{:X}", self.name, self.site.address());
        Ok(())
    }
}

impl<M: CodeMemory, F: Copy + 'static> Drop for CallHook<M, F> {
    fn drop(&mut self) {
        if !self.is_installed() {
            return;
        }

        if let Err(err) = self.restore() {
            log::error!("[{}] Failed to restore on drop: {}", self.name, err);
        }
    }
}

impl<M: CodeMemory, F: Copy + 'static> fmt::Debug for CallHook<M, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallHook")
            .field("name", &self.name)
            .field("site", &self.site)
            .field("interceptor_fn", &self.interceptor_fn.as_raw_ptr())
            .field("installed", &self.is_installed())
            .finish()
    }
}
