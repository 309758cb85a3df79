//! Interception routine for the player lookup inside the balancer
//!
//! The patched call lands in [`hk_player_by_index`], which forwards to the
//! [`Interceptor`] placed in the process-wide slot by the extension.

use std::{
    ffi::c_void,
    fmt,
    sync::{Arc, LazyLock},
};

use libcallpatch::{Forward, ffi::FnPtr};
use parking_lot::RwLock;

/// `CBasePlayer *UTIL_PlayerByIndex(int entindex)`
pub type PlayerByIndexFn = unsafe extern "C" fn(i32) -> *mut c_void;

/// The "invoke original" half of the interception.
pub trait PlayerLookup: Send + Sync {
    fn player_by_index(&self, entindex: i32) -> *mut c_void;
}

impl PlayerLookup for Box<dyn PlayerLookup> {
    fn player_by_index(&self, entindex: i32) -> *mut c_void {
        (**self).player_by_index(entindex)
    }
}

/// Calls the callee the patched site used to reach.
#[derive(Debug, Clone, Copy)]
pub struct NativePlayerLookup {
    original_fn: FnPtr<PlayerByIndexFn>,
}

impl NativePlayerLookup {
    pub fn new(original_fn: FnPtr<PlayerByIndexFn>) -> Self {
        Self { original_fn }
    }

    pub fn original(&self) -> FnPtr<PlayerByIndexFn> {
        self.original_fn
    }
}

impl PlayerLookup for NativePlayerLookup {
    fn player_by_index(&self, entindex: i32) -> *mut c_void {
        unsafe { (self.original_fn.as_fn())(entindex) }
    }
}

/// Filters the lookup result through the `OnBalanceCheck` forward.
pub struct Interceptor<L: PlayerLookup = Box<dyn PlayerLookup>> {
    lookup: L,
    forward: Arc<Forward<i32>>,
}

impl<L: PlayerLookup> Interceptor<L> {
    pub fn new(lookup: L, forward: Arc<Forward<i32>>) -> Self {
        Self { lookup, forward }
    }

    pub fn forward(&self) -> &Arc<Forward<i32>> {
        &self.forward
    }

    /// Runs the original lookup, then hides the player when any
    /// subscriber answers above `Continue`.
    ///
    /// The original always runs, so its side effects are kept even when
    /// the result is dropped.
    pub fn invoke(&self, entindex: i32) -> *mut c_void {
        let player = self.lookup.player_by_index(entindex);

        if player.is_null() || !self.forward.has_subscribers() {
            return player;
        }

        if self.forward.broadcast(&entindex).is_action() {
            log::debug!("Skipped call to UTIL_PlayerByIndex({})", entindex);
            return std::ptr::null_mut();
        }

        player
    }
}

impl<L: PlayerLookup> fmt::Debug for Interceptor<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("forward", &self.forward)
            .finish()
    }
}

static ACTIVE: LazyLock<RwLock<Option<Arc<Interceptor>>>> = LazyLock::new(|| RwLock::new(None));

/// Callee reached while the slot is empty. Outlives `deactivate`, since a
/// call site whose restore failed still lands in `hk_player_by_index`.
static ORIGINAL: LazyLock<RwLock<Option<FnPtr<PlayerByIndexFn>>>> =
    LazyLock::new(|| RwLock::new(None));

/// Puts `interceptor` in the slot and records `original` as the callee to
/// fall back to once the slot is emptied. Fails when one is already active.
pub fn activate(interceptor: Interceptor, original: FnPtr<PlayerByIndexFn>) -> bool {
    let mut slot = ACTIVE.write();

    if slot.is_some() {
        log::error!("Player lookup interceptor is already active");
        return false;
    }

    *ORIGINAL.write() = Some(original);
    *slot = Some(Arc::new(interceptor));
    log::debug!("Player lookup interceptor activated");
    true
}

pub fn deactivate() {
    if ACTIVE.write().take().is_some() {
        log::debug!("Player lookup interceptor deactivated");
    }
}

pub fn is_active() -> bool {
    ACTIVE.read().is_some()
}

/// Written into the balancer in place of `UTIL_PlayerByIndex`.
///
/// # Safety
/// Only meant to be reached from the patched call site, with the same
/// contract as the original lookup.
pub unsafe extern "C" fn hk_player_by_index(entindex: i32) -> *mut c_void {
    // Release the lock before calling out; subscribers may unload us
    let active = ACTIVE.read().clone();

    if let Some(interceptor) = active {
        return interceptor.invoke(entindex);
    }

    let original = *ORIGINAL.read();
    match original {
        Some(original) => unsafe { (original.as_fn())(entindex) },
        None => std::ptr::null_mut(),
    }
}

#[cfg(test)]
pub(crate) static SLOT_TEST_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());

#[cfg(test)]
mod tests {
    use super::*;
    use libcallpatch::Outcome;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Every positive index is a player; counts calls
    #[derive(Default)]
    struct CountingLookup {
        calls: Arc<AtomicUsize>,
    }

    impl PlayerLookup for CountingLookup {
        fn player_by_index(&self, entindex: i32) -> *mut c_void {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if entindex > 0 {
                (0x1000 + entindex as usize) as *mut c_void
            } else {
                std::ptr::null_mut()
            }
        }
    }

    fn interceptor() -> (Interceptor<CountingLookup>, Arc<AtomicUsize>) {
        let lookup = CountingLookup::default();
        let calls = lookup.calls.clone();
        let forward = Arc::new(Forward::<i32>::new("OnBalanceCheck"));
        (Interceptor::new(lookup, forward), calls)
    }

    #[test]
    fn test_no_subscribers_passes_through_without_broadcast() {
        let (interceptor, calls) = interceptor();

        assert_eq!(interceptor.invoke(4), 0x1004 as *mut c_void);
        assert!(interceptor.invoke(0).is_null());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_continue_keeps_result() {
        let (interceptor, _) = interceptor();
        interceptor.forward().subscribe(|_| Outcome::Continue);

        for entindex in 1..=32 {
            assert_eq!(interceptor.invoke(entindex), (0x1000 + entindex as usize) as *mut c_void);
        }
    }

    #[test]
    fn test_suppressed_result_still_runs_original_once() {
        let (interceptor, calls) = interceptor();
        interceptor
            .forward()
            .subscribe(|entindex| if *entindex == 7 { Outcome::Handled } else { Outcome::Continue });

        assert!(interceptor.invoke(7).is_null());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(interceptor.invoke(8), 0x1008 as *mut c_void);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_null_player_is_not_broadcast() {
        let (interceptor, _) = interceptor();
        let broadcasts = Arc::new(AtomicUsize::new(0));

        let counter = broadcasts.clone();
        interceptor.forward().subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Outcome::Stop
        });

        assert!(interceptor.invoke(0).is_null());
        assert_eq!(broadcasts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_any_outcome_above_continue_suppresses() {
        for outcome in [Outcome::Changed, Outcome::Handled, Outcome::Stop] {
            let (interceptor, _) = interceptor();
            interceptor.forward().subscribe(move |_| outcome);
            assert!(interceptor.invoke(3).is_null());
        }
    }

    unsafe extern "C" fn original_lookup(entindex: i32) -> *mut c_void {
        (0x2000 + entindex as usize) as *mut c_void
    }

    #[test]
    fn test_slot_dispatch() {
        let _guard = SLOT_TEST_LOCK.lock();

        let original_fn = FnPtr::from_fn(original_lookup as PlayerByIndexFn).unwrap();
        let forward = Arc::new(Forward::<i32>::new("OnBalanceCheck"));
        forward.subscribe(|entindex| if *entindex == 2 { Outcome::Handled } else { Outcome::Continue });

        let interceptor = Interceptor::new(
            Box::new(NativePlayerLookup::new(original_fn)) as Box<dyn PlayerLookup>,
            forward.clone(),
        );
        assert!(activate(interceptor, original_fn));
        assert!(is_active());

        let second = Interceptor::new(
            Box::new(NativePlayerLookup::new(original_fn)) as Box<dyn PlayerLookup>,
            forward,
        );
        assert!(!activate(second, original_fn));

        assert_eq!(unsafe { hk_player_by_index(1) }, 0x2001 as *mut c_void);
        assert!(unsafe { hk_player_by_index(2) }.is_null());

        deactivate();
        assert!(!is_active());

        // Empty slot goes straight to the original, unfiltered
        assert_eq!(unsafe { hk_player_by_index(1) }, 0x2001 as *mut c_void);
        assert_eq!(unsafe { hk_player_by_index(2) }, 0x2002 as *mut c_void);
    }

    #[test]
    fn test_rejected_activation_keeps_first_original() {
        let _guard = SLOT_TEST_LOCK.lock();

        unsafe extern "C" fn other_lookup(entindex: i32) -> *mut c_void {
            (0x5000 + entindex as usize) as *mut c_void
        }

        let original_fn = FnPtr::from_fn(original_lookup as PlayerByIndexFn).unwrap();
        let other_fn = FnPtr::from_fn(other_lookup as PlayerByIndexFn).unwrap();
        let forward = Arc::new(Forward::<i32>::new("OnBalanceCheck"));

        let first = Interceptor::new(
            Box::new(NativePlayerLookup::new(original_fn)) as Box<dyn PlayerLookup>,
            forward.clone(),
        );
        assert!(activate(first, original_fn));

        let second = Interceptor::new(
            Box::new(NativePlayerLookup::new(other_fn)) as Box<dyn PlayerLookup>,
            forward,
        );
        assert!(!activate(second, other_fn));

        deactivate();
        assert_eq!(unsafe { hk_player_by_index(3) }, 0x2003 as *mut c_void);
    }
}
