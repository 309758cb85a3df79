//! Natives exposed to the scripting layer

use std::{ffi::c_void, sync::Arc};

use libcallpatch::ffi::FnPtr;

use crate::{
    errors::{NativeError, NativeResult},
    provider::GameRulesProvider,
};

/// `void CCSGameRules::BalanceTeams()`; member functions take `this` in
/// ECX on 32-bit Windows
#[cfg(all(target_os = "windows", target_arch = "x86"))]
pub type BalanceTeamsFn = unsafe extern "thiscall" fn(*mut c_void);

#[cfg(not(all(target_os = "windows", target_arch = "x86")))]
pub type BalanceTeamsFn = unsafe extern "C" fn(*mut c_void);

/// What a native needs from the running extension.
pub trait NativeContext {
    fn provider(&self) -> Option<Arc<dyn GameRulesProvider>>;
    fn balance_teams(&self) -> FnPtr<BalanceTeamsFn>;
}

pub type NativeFn = fn(&dyn NativeContext) -> NativeResult<i32>;

#[derive(Clone, Copy)]
pub struct NativeInfo {
    pub name: &'static str,
    pub func: NativeFn,
}

pub const NATIVES: &[NativeInfo] = &[NativeInfo {
    name: "CSS_BalanceTeams",
    func: css_balance_teams,
}];

/// `native CSS_BalanceTeams();`
///
/// Runs the balancer once, immune players included in the patched loop.
pub fn css_balance_teams(context: &dyn NativeContext) -> NativeResult<i32> {
    let provider = context.provider().ok_or(NativeError::ProviderMissing)?;

    if !provider.is_compatible() {
        return Err(NativeError::ProviderOutdated);
    }

    let game_rules = provider.game_rules().ok_or(NativeError::NoGameRules)?;

    log::debug!("Calling BalanceTeams() on {:p}", game_rules);

    unsafe { (context.balance_teams().as_fn())(game_rules.as_ptr()) };

    Ok(0)
}

pub fn find_native(name: &str) -> Option<&'static NativeInfo> {
    NATIVES.iter().find(|native| native.name == name)
}

pub fn call_native(context: &dyn NativeContext, name: &str) -> NativeResult<i32> {
    let native = find_native(name).ok_or_else(|| NativeError::UnknownNative(name.to_string()))?;
    (native.func)(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        ptr::NonNull,
        sync::atomic::{AtomicUsize, Ordering},
    };

    static BALANCED_WITH: AtomicUsize = AtomicUsize::new(0);

    #[cfg(all(target_os = "windows", target_arch = "x86"))]
    unsafe extern "thiscall" fn balance_teams(this: *mut c_void) {
        BALANCED_WITH.store(this as usize, Ordering::SeqCst);
    }

    #[cfg(not(all(target_os = "windows", target_arch = "x86")))]
    unsafe extern "C" fn balance_teams(this: *mut c_void) {
        BALANCED_WITH.store(this as usize, Ordering::SeqCst);
    }

    struct FixedProvider {
        version: u32,
        game_rules: usize,
    }

    impl GameRulesProvider for FixedProvider {
        fn interface_version(&self) -> u32 {
            self.version
        }

        fn game_rules(&self) -> Option<NonNull<c_void>> {
            NonNull::new(self.game_rules as *mut c_void)
        }
    }

    struct Context {
        provider: Option<Arc<dyn GameRulesProvider>>,
    }

    impl NativeContext for Context {
        fn provider(&self) -> Option<Arc<dyn GameRulesProvider>> {
            self.provider.clone()
        }

        fn balance_teams(&self) -> FnPtr<BalanceTeamsFn> {
            FnPtr::from_fn(balance_teams as BalanceTeamsFn).unwrap()
        }
    }

    fn context(version: u32, game_rules: usize) -> Context {
        Context {
            provider: Some(Arc::new(FixedProvider { version, game_rules })),
        }
    }

    #[test]
    fn test_balance_teams_calls_with_game_rules() {
        assert_eq!(call_native(&context(2, 0xBEEF0), "CSS_BalanceTeams"), Ok(0));
        assert_eq!(BALANCED_WITH.load(Ordering::SeqCst), 0xBEEF0);
    }

    #[test]
    fn test_provider_errors() {
        let missing = Context { provider: None };
        let err = css_balance_teams(&missing).unwrap_err();
        assert_eq!(err, NativeError::ProviderMissing);
        assert_eq!(err.to_string(), "Failed to lookup ISDKTools interface.");

        let err = css_balance_teams(&context(1, 0xBEEF0)).unwrap_err();
        assert_eq!(err.to_string(), "SDKTools is outdated. BalanceTeams is disabled.");

        let err = css_balance_teams(&context(3, 0)).unwrap_err();
        assert_eq!(err.to_string(), "Failed to get a CGameRules pointer from SDKTools.");
    }

    #[test]
    fn test_unknown_native() {
        assert_eq!(
            call_native(&Context { provider: None }, "CSS_SwitchTeam"),
            Err(NativeError::UnknownNative("CSS_SwitchTeam".to_string()))
        );
        assert!(find_native("CSS_BalanceTeams").is_some());
    }
}
