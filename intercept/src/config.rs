//! Engine settings, read once from the environment when the interceptor is
//! first obtained unless [`crate::init`] supplied them earlier.

use std::ffi::OsString;

use serde::{Deserialize, Serialize};

/// Disables copying inherited methods down to the hooked class.
pub const NO_INHERIT_ENV: &str = "SWIZZLE_NO_INHERIT";
/// Emits a `trace!` record for every intercepted call.
pub const TRACE_DISPATCH_ENV: &str = "SWIZZLE_TRACE_DISPATCH";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    /// Hooking a selector the class only inherits first adds a copy of the
    /// inherited method to the class itself, leaving the superclass untouched.
    /// When false such requests fail with `SelectorNotFound`.
    pub inherit_methods: bool,
    pub trace_dispatch: bool,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            inherit_methods: true,
            trace_dispatch: false,
        }
    }
}

impl HookConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let enabled = |key: &str| {
            lookup(key).is_some_and(|v| !v.is_empty() && v != "0" && v != "false")
        };
        Self {
            inherit_methods: !enabled(NO_INHERIT_ENV),
            trace_dispatch: enabled(TRACE_DISPATCH_ENV),
        }
    }
}
