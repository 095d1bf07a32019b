use core::fmt;

use swizzle_runtime::Imp;

use crate::signature::Signature;
use crate::types::{HookError, Result};

/// User code installed by a hook, plus the type encoding describing how it
/// wants to be called.
///
/// The encoding uses the same grammar as method encodings. Which parameter
/// layouts are accepted depends on the [`HookMode`](crate::HookMode) it is
/// installed with.
#[derive(Clone)]
pub struct Replacement {
    code: Imp,
    encoding: Option<String>,
}

impl Replacement {
    /// # Safety
    /// `code` must be a function following the C calling convention whose
    /// parameters and return type are exactly those `encoding` describes.
    pub unsafe fn new(code: Imp, encoding: impl Into<String>) -> Self {
        Self {
            code,
            encoding: Some(encoding.into()),
        }
    }

    /// A replacement with no recoverable type metadata. Installing it always
    /// fails with `MissingSignature`; it is never called.
    pub fn untyped(code: Imp) -> Self {
        Self { code, encoding: None }
    }

    pub fn code(&self) -> Imp {
        self.code
    }

    pub fn type_encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    pub fn signature(&self) -> Result<Signature> {
        match self.encoding.as_deref() {
            Some(encoding) if !encoding.is_empty() => Signature::parse(encoding),
            _ => Err(HookError::MissingSignature(format!("replacement at {:?}", self.code))),
        }
    }
}

impl fmt::Debug for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replacement")
            .field("code", &self.code)
            .field("encoding", &self.encoding)
            .finish()
    }
}
