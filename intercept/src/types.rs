use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// When the replacement runs relative to the original implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookMode {
    /// Replacement runs first, then the original; the caller gets the original's result.
    Before,
    /// Original runs first, then the replacement; the caller gets the original's result.
    After,
    /// Replacement decides whether, how often and with what arguments the
    /// original runs, and supplies the result.
    Instead,
}

impl fmt::Display for HookMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HookMode::Before => "before",
            HookMode::After => "after",
            HookMode::Instead => "instead",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    #[error("no type encoding available for {0}")]
    MissingSignature(String),

    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    #[error("foreign call preparation failed: {0}")]
    Ffi(String),

    #[error("'{class}' has no method '{selector}'")]
    SelectorNotFound { class: String, selector: String },
}

pub type Result<T> = std::result::Result<T, HookError>;
