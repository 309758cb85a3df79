//! Extension context: everything the extension owns between load and unload

use std::{fmt, sync::Arc};

use libcallpatch::{
    CallHook, CallSite, CodeMemory, Forward, ForwardManager, ProcessMemory, ffi::FnPtr,
};
use parking_lot::RwLock;

use crate::{
    errors::{ExtensionError, ExtensionResult, NativeResult},
    interceptor::{
        self, Interceptor, NativePlayerLookup, PlayerByIndexFn, PlayerLookup, hk_player_by_index,
    },
    natives::{self, BalanceTeamsFn, NativeContext},
    provider::{GameRulesProvider, MIN_INTERFACE_VERSION},
    resolver::AddressResolver,
};

pub const SIG_BALANCE_TEAMS: &str = "BalanceTeams";
pub const OFFSET_PLAYER_BY_INDEX: &str = "PlayerByIndex";
pub const FORWARD_ON_BALANCE_CHECK: &str = "OnBalanceCheck";

/// Loaded extension.
///
/// Owns the patched call inside `CCSGameRules::BalanceTeams`, the
/// `OnBalanceCheck` forward and the late-bound SDKTools provider. Dropping
/// it does the same as [`Extension::unload`].
pub struct Extension<M: CodeMemory = ProcessMemory> {
    site: CallSite,
    balance_teams: FnPtr<BalanceTeamsFn>,
    hook: CallHook<M, PlayerByIndexFn>,
    forward: Arc<Forward<i32>>,
    forwards: Arc<ForwardManager<i32>>,
    provider: RwLock<Option<Arc<dyn GameRulesProvider>>>,
    unloaded: bool,
}

impl<M: CodeMemory> Extension<M> {
    /// Resolves the call site, creates the forward, activates the
    /// interceptor and patches the call. On any failure everything done
    /// so far is undone.
    pub fn load<R: AddressResolver + ?Sized>(
        memory: M,
        resolver: &R,
        forwards: Arc<ForwardManager<i32>>,
    ) -> ExtensionResult<Self> {
        let function_base = resolver.resolve_symbol(SIG_BALANCE_TEAMS)?;
        let offset = resolver.resolve_offset(OFFSET_PLAYER_BY_INDEX)?;

        log::info!(
            "BalanceTeams at 0x{:X}, PlayerByIndex call at +0x{:X}",
            function_base,
            offset
        );

        let site = CallSite::from_address(function_base, offset)?;
        let balance_teams = FnPtr::<BalanceTeamsFn>::from_address(function_base)?;
        let hook = CallHook::new(
            "UTIL_PlayerByIndex",
            memory,
            site,
            hk_player_by_index as PlayerByIndexFn,
        )?;

        let original_target = hook.current_target()?;
        if original_target == hook.interceptor().address() {
            log::error!("Call site 0x{:X} is already intercepted", site.address());
            return Err(ExtensionError::AlreadyLoaded);
        }
        let original_fn = FnPtr::<PlayerByIndexFn>::from_address(original_target)?;

        let forward = forwards.create_forward(FORWARD_ON_BALANCE_CHECK)?;

        let lookup: Box<dyn PlayerLookup> = Box::new(NativePlayerLookup::new(original_fn));
        if !interceptor::activate(Interceptor::new(lookup, forward.clone()), original_fn) {
            release_forward(&forwards);
            return Err(ExtensionError::AlreadyLoaded);
        }

        let installed_original = match hook.install() {
            Ok(installed_original) => installed_original,
            Err(err) => {
                interceptor::deactivate();
                release_forward(&forwards);
                return Err(err.into());
            }
        };

        if installed_original != original_fn {
            match hook.restore() {
                Ok(()) => interceptor::deactivate(),
                Err(err) => {
                    // The call still lands in the slot, so it stays filled
                    log::error!("Failed to restore call site after target change: {}", err);
                    std::mem::forget(hook);
                }
            }
            release_forward(&forwards);

            return Err(ExtensionError::TargetChanged {
                expected: original_fn.address(),
                actual: installed_original.address(),
            });
        }

        log::info!(
            "Patched BalanceTeams, original UTIL_PlayerByIndex is 0x{:X}",
            original_fn.address()
        );

        Ok(Self {
            site,
            balance_teams,
            hook,
            forward,
            forwards,
            provider: RwLock::new(None),
            unloaded: false,
        })
    }

    /// Late interface binding, once every extension is loaded.
    pub fn all_loaded(&self, provider: Option<Arc<dyn GameRulesProvider>>) {
        match &provider {
            Some(provider) => log::info!(
                "SDKTools bound (interface version {})",
                provider.interface_version()
            ),
            None => log::warn!("SDKTools is not loaded, CSS_BalanceTeams will fail"),
        }

        *self.provider.write() = provider;
    }

    /// Missing SDKTools is an error; an outdated one only disables the
    /// native.
    pub fn query_running(&self) -> ExtensionResult<()> {
        let provider = self
            .provider
            .read()
            .clone()
            .ok_or(ExtensionError::ProviderMissing)?;

        if provider.interface_version() < MIN_INTERFACE_VERSION {
            log::error!("SDKTools is outdated. BalanceTeams native disabled.");
        }

        Ok(())
    }

    pub fn call_native(&self, name: &str) -> NativeResult<i32> {
        natives::call_native(self, name)
    }

    /// Releases the forward, restores the call site and deactivates the
    /// interceptor.
    pub fn unload(mut self) -> ExtensionResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> ExtensionResult<()> {
        if self.unloaded {
            return Ok(());
        }
        self.unloaded = true;

        if let Err(err) = self.forwards.release_forward(self.forward.name()) {
            log::warn!("Forward release: {}", err);
        }

        if self.hook.is_installed() {
            // Leave the interceptor in place while the call still reaches it
            self.hook.restore()?;
        }

        interceptor::deactivate();
        log::info!("Unloaded, call site 0x{:X} restored", self.site.address());

        Ok(())
    }

    pub fn site(&self) -> &CallSite {
        &self.site
    }

    pub fn forward(&self) -> &Arc<Forward<i32>> {
        &self.forward
    }

    pub fn forwards(&self) -> &Arc<ForwardManager<i32>> {
        &self.forwards
    }

    pub fn is_patched(&self) -> bool {
        self.hook.is_installed()
    }

    pub fn memory(&self) -> &M {
        self.hook.memory()
    }
}

impl<M: CodeMemory> NativeContext for Extension<M> {
    fn provider(&self) -> Option<Arc<dyn GameRulesProvider>> {
        self.provider.read().clone()
    }

    fn balance_teams(&self) -> FnPtr<BalanceTeamsFn> {
        self.balance_teams
    }
}

impl<M: CodeMemory> Drop for Extension<M> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::error!("Unload failed: {}", err);
        }
    }
}

impl<M: CodeMemory> fmt::Debug for Extension<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("site", &self.site)
            .field("balance_teams", &self.balance_teams)
            .field("hook", &self.hook)
            .field("forward", &self.forward)
            .field("unloaded", &self.unloaded)
            .finish()
    }
}

fn release_forward(forwards: &ForwardManager<i32>) {
    if let Err(err) = forwards.release_forward(FORWARD_ON_BALANCE_CHECK) {
        log::warn!("Forward release during rollback: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::{LookupError, NativeError, ResolveError},
        interceptor::SLOT_TEST_LOCK,
    };
    use libcallpatch::{
        BufferMemory, CodeRegion, MemoryError, Outcome, PatchError,
        memory::MemoryResult,
        patch::encoding::{decode_call_rel32, encode_call_rel32},
    };
    use std::{
        ffi::c_void,
        ptr::NonNull,
        sync::atomic::{AtomicUsize, Ordering},
    };

    const CALL_OFFSET: usize = 0x10;

    static ORIGINAL_CALLS: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn player_by_index(entindex: i32) -> *mut c_void {
        ORIGINAL_CALLS.fetch_add(1, Ordering::SeqCst);
        if entindex > 0 {
            (0x3000 + entindex as usize) as *mut c_void
        } else {
            std::ptr::null_mut()
        }
    }

    struct FixedResolver {
        function_base: usize,
        offset: Option<usize>,
    }

    impl AddressResolver for FixedResolver {
        fn resolve_symbol(&self, _name: &str) -> Result<usize, ResolveError> {
            Ok(self.function_base)
        }

        fn resolve_offset(&self, name: &str) -> Result<usize, ResolveError> {
            self.offset.ok_or_else(|| ResolveError::OffsetNotFound {
                name: name.to_string(),
                cause: LookupError::NoMatch("server".to_string()),
            })
        }
    }

    struct FixedProvider(u32);

    impl GameRulesProvider for FixedProvider {
        fn interface_version(&self) -> u32 {
            self.0
        }

        fn game_rules(&self) -> Option<NonNull<c_void>> {
            None
        }
    }

    /// Fake `BalanceTeams` body, placed close enough to the test binary
    /// for rel32 calls both ways
    fn balance_teams_image() -> BufferMemory {
        let anchor = hk_player_by_index as PlayerByIndexFn as usize;
        let base = (anchor & !0xFFF).saturating_sub(0x2000).max(0x1000);

        let mut bytes = vec![0x90u8; 0x40];
        let call = encode_call_rel32(base + CALL_OFFSET, player_by_index as PlayerByIndexFn as usize).unwrap();
        bytes[CALL_OFFSET..CALL_OFFSET + 5].copy_from_slice(&call);

        BufferMemory::new(base, bytes).unwrap()
    }

    fn resolver(memory: &BufferMemory) -> FixedResolver {
        FixedResolver {
            function_base: memory.region().address(),
            offset: Some(CALL_OFFSET),
        }
    }

    /// Moves the call to `moved_target` right before the second read, as
    /// another patcher racing the load would, and refuses every
    /// `make_writable` after the first
    struct RacingMemory<'a> {
        inner: &'a BufferMemory,
        moved_target: usize,
        reads: AtomicUsize,
        unprotects: AtomicUsize,
    }

    impl CodeMemory for RacingMemory<'_> {
        fn validate(&self, region: CodeRegion) -> MemoryResult<()> {
            self.inner.validate(region)
        }

        fn read(&self, address: usize, buffer: &mut [u8]) -> MemoryResult<()> {
            if self.reads.fetch_add(1, Ordering::SeqCst) == 1 {
                let site = self.inner.region().address() + CALL_OFFSET;
                let call = encode_call_rel32(site, self.moved_target).unwrap();
                self.inner.overwrite(site, &call).unwrap();
            }
            self.inner.read(address, buffer)
        }

        fn make_writable(&self, region: CodeRegion) -> MemoryResult<()> {
            if self.unprotects.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err(MemoryError::ProtectionChangeFailed {
                    address: region.address(),
                    code: 13,
                });
            }
            self.inner.make_writable(region)
        }

        fn write(&self, address: usize, bytes: &[u8]) -> MemoryResult<()> {
            self.inner.write(address, bytes)
        }
    }

    fn call_target(memory: &BufferMemory) -> usize {
        let address = memory.region().address() + CALL_OFFSET;
        let bytes: [u8; 5] = memory.bytes_at(address, 5).unwrap().try_into().unwrap();
        decode_call_rel32(address, &bytes).unwrap()
    }

    #[test]
    fn test_load_patches_and_unload_restores() {
        let _guard = SLOT_TEST_LOCK.lock();
        let memory = balance_teams_image();
        let pristine = memory.snapshot();
        let forwards = Arc::new(ForwardManager::new());

        let extension = Extension::load(&memory, &resolver(&memory), forwards.clone()).unwrap();

        assert!(extension.is_patched());
        assert!(interceptor::is_active());
        assert!(forwards.find_forward(FORWARD_ON_BALANCE_CHECK).is_some());
        assert_eq!(call_target(&memory), hk_player_by_index as PlayerByIndexFn as usize);

        extension.unload().unwrap();

        assert_eq!(memory.snapshot(), pristine);
        assert!(!interceptor::is_active());
        assert!(forwards.find_forward(FORWARD_ON_BALANCE_CHECK).is_none());
    }

    #[test]
    fn test_patched_lookup_consults_forward() {
        let _guard = SLOT_TEST_LOCK.lock();
        let memory = balance_teams_image();
        let forwards = Arc::new(ForwardManager::new());

        let extension = Extension::load(&memory, &resolver(&memory), forwards).unwrap();
        extension
            .forward()
            .subscribe(|entindex| if *entindex == 5 { Outcome::Handled } else { Outcome::Continue });

        let before = ORIGINAL_CALLS.load(Ordering::SeqCst);
        assert!(unsafe { hk_player_by_index(5) }.is_null());
        assert_eq!(unsafe { hk_player_by_index(6) }, 0x3006 as *mut c_void);
        assert_eq!(ORIGINAL_CALLS.load(Ordering::SeqCst) - before, 2);

        drop(extension);
        assert!(!interceptor::is_active());
    }

    #[test]
    fn test_failed_resolve_leaves_nothing_behind() {
        let _guard = SLOT_TEST_LOCK.lock();
        let memory = balance_teams_image();
        let pristine = memory.snapshot();
        let forwards = Arc::new(ForwardManager::new());

        let resolver = FixedResolver {
            function_base: memory.region().address(),
            offset: None,
        };
        let err = Extension::load(&memory, &resolver, forwards.clone()).unwrap_err();

        assert_eq!(
            err.to_string(),
            "Couldn't read \"PlayerByIndex\" offset from gamedata."
        );
        assert!(forwards.is_empty());
        assert!(!interceptor::is_active());
        assert_eq!(memory.snapshot(), pristine);
    }

    #[test]
    fn test_bad_call_site_rolls_back() {
        let _guard = SLOT_TEST_LOCK.lock();
        let memory = balance_teams_image();
        let pristine = memory.snapshot();
        let forwards = Arc::new(ForwardManager::new());

        let resolver = FixedResolver {
            function_base: memory.region().address(),
            offset: Some(0),
        };
        let err = Extension::load(&memory, &resolver, forwards.clone()).unwrap_err();

        assert!(matches!(
            err,
            ExtensionError::Patch(PatchError::NotANearCall { found: 0x90, .. })
        ));
        assert!(forwards.is_empty());
        assert!(!interceptor::is_active());
        assert_eq!(memory.snapshot(), pristine);
    }

    #[test]
    fn test_target_change_with_failed_restore_keeps_interceptor() {
        let _guard = SLOT_TEST_LOCK.lock();
        let memory = balance_teams_image();
        let forwards = Arc::new(ForwardManager::new());
        let moved_target = memory.region().address() + 0x30;

        let racing = RacingMemory {
            inner: &memory,
            moved_target,
            reads: AtomicUsize::new(0),
            unprotects: AtomicUsize::new(0),
        };
        let err = Extension::load(racing, &resolver(&memory), forwards.clone()).unwrap_err();

        assert!(matches!(
            err,
            ExtensionError::TargetChanged { actual, .. } if actual == moved_target
        ));

        // The patch could not be taken out, so the lookup must still work
        assert_eq!(call_target(&memory), hk_player_by_index as PlayerByIndexFn as usize);
        assert!(interceptor::is_active());
        assert!(forwards.is_empty());

        let before = ORIGINAL_CALLS.load(Ordering::SeqCst);
        assert_eq!(unsafe { hk_player_by_index(4) }, 0x3004 as *mut c_void);
        assert_eq!(ORIGINAL_CALLS.load(Ordering::SeqCst) - before, 1);

        interceptor::deactivate();
    }

    #[test]
    fn test_lookup_passes_through_after_unload() {
        let _guard = SLOT_TEST_LOCK.lock();
        let memory = balance_teams_image();
        let forwards = Arc::new(ForwardManager::new());

        let extension = Extension::load(&memory, &resolver(&memory), forwards).unwrap();
        extension.forward().subscribe(|_| Outcome::Stop);
        extension.unload().unwrap();

        // A caller already inside the old call reaches the original, unfiltered
        let before = ORIGINAL_CALLS.load(Ordering::SeqCst);
        assert_eq!(unsafe { hk_player_by_index(9) }, 0x3009 as *mut c_void);
        assert_eq!(ORIGINAL_CALLS.load(Ordering::SeqCst) - before, 1);
    }

    #[test]
    fn test_existing_forward_blocks_load() {
        let _guard = SLOT_TEST_LOCK.lock();
        let memory = balance_teams_image();
        let pristine = memory.snapshot();
        let forwards = Arc::new(ForwardManager::new());
        forwards.create_forward(FORWARD_ON_BALANCE_CHECK).unwrap();

        let err = Extension::load(&memory, &resolver(&memory), forwards.clone()).unwrap_err();

        assert!(matches!(err, ExtensionError::Forward(_)));
        assert!(!interceptor::is_active());
        assert_eq!(memory.snapshot(), pristine);
    }

    #[test]
    fn test_second_load_is_rejected() {
        let _guard = SLOT_TEST_LOCK.lock();
        let memory = balance_teams_image();
        let pristine = memory.snapshot();
        let forwards = Arc::new(ForwardManager::new());

        let first = Extension::load(&memory, &resolver(&memory), forwards.clone()).unwrap();
        let patched = memory.snapshot();

        let other_forwards = Arc::new(ForwardManager::new());
        let err = Extension::load(&memory, &resolver(&memory), other_forwards.clone()).unwrap_err();

        assert!(matches!(err, ExtensionError::AlreadyLoaded));
        assert!(other_forwards.is_empty());
        assert_eq!(memory.snapshot(), patched);
        assert!(interceptor::is_active());

        first.unload().unwrap();
        assert_eq!(memory.snapshot(), pristine);
    }

    #[test]
    fn test_provider_lifecycle() {
        let _guard = SLOT_TEST_LOCK.lock();
        let memory = balance_teams_image();
        let extension =
            Extension::load(&memory, &resolver(&memory), Arc::new(ForwardManager::new())).unwrap();

        assert!(matches!(
            extension.query_running(),
            Err(ExtensionError::ProviderMissing)
        ));
        assert_eq!(
            extension.call_native("CSS_BalanceTeams"),
            Err(NativeError::ProviderMissing)
        );

        // Outdated SDKTools keeps the extension running, the native refuses
        extension.all_loaded(Some(Arc::new(FixedProvider(1))));
        assert!(extension.query_running().is_ok());
        assert_eq!(
            extension.call_native("CSS_BalanceTeams"),
            Err(NativeError::ProviderOutdated)
        );

        extension.all_loaded(Some(Arc::new(FixedProvider(2))));
        assert_eq!(
            extension.call_native("CSS_BalanceTeams"),
            Err(NativeError::NoGameRules)
        );
    }
}
