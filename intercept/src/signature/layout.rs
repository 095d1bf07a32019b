//! Matches a replacement's signature against the hooked method's.
//!
//! A replacement never sees the raw method calling convention directly. It
//! may take a leading "call original" function pointer, the method arguments
//! with or without the receiver and selector, and (in `after` mode) a copy of
//! the original's result. Which of those it takes is read off its signature.

use crate::signature::{Signature, TypeDescriptor, TypeKind};
use crate::types::{HookError, HookMode, Result};

/// Which method arguments are forwarded to the replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Arguments {
    Omitted,
    Plain,
    WithReceiver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Layout {
    pub original: bool,
    pub arguments: Arguments,
    pub result: bool,
}

const fn layout(original: bool, arguments: Arguments, result: bool) -> Layout {
    Layout { original, arguments, result }
}

const INSTEAD: &[Layout] = &[
    layout(true, Arguments::Plain, false),
    layout(true, Arguments::WithReceiver, false),
];

const BEFORE: &[Layout] = &[
    layout(false, Arguments::Omitted, false),
    layout(false, Arguments::Plain, false),
    layout(false, Arguments::WithReceiver, false),
    layout(true, Arguments::Omitted, false),
    layout(true, Arguments::Plain, false),
    layout(true, Arguments::WithReceiver, false),
];

const AFTER: &[Layout] = &[
    layout(false, Arguments::Omitted, false),
    layout(false, Arguments::Plain, false),
    layout(false, Arguments::Plain, true),
    layout(false, Arguments::WithReceiver, false),
    layout(false, Arguments::WithReceiver, true),
];

impl Layout {
    /// Picks the first accepted layout the replacement signature satisfies.
    pub(crate) fn resolve(mode: HookMode, method: &Signature, replacement: &Signature) -> Result<Layout> {
        let returns_ok = match mode {
            HookMode::Instead => replacement.return_type().same_kind(method.return_type()),
            HookMode::Before | HookMode::After => replacement.return_type().is_void(),
        };
        let candidates = match mode {
            HookMode::Instead => INSTEAD,
            HookMode::Before => BEFORE,
            HookMode::After => AFTER,
        };
        candidates
            .iter()
            .copied()
            .filter(|_| returns_ok)
            .find(|candidate| candidate.matches(method, replacement))
            .ok_or_else(|| {
                HookError::UnsupportedType(format!(
                    "{mode} replacement {replacement} is incompatible with method {method}"
                ))
            })
    }

    fn forwarded<'m>(&self, method: &'m Signature) -> &'m [TypeDescriptor] {
        match self.arguments {
            Arguments::Omitted => &[],
            Arguments::Plain => &method.arguments()[2..],
            Arguments::WithReceiver => method.arguments(),
        }
    }

    fn matches(&self, method: &Signature, replacement: &Signature) -> bool {
        if self.result && method.return_type().is_void() {
            return false;
        }
        let mut params = replacement.arguments().iter();
        if self.original && !params.next().is_some_and(|p| *p.kind() == TypeKind::FunctionPointer) {
            return false;
        }
        for expected in self.forwarded(method) {
            if !params.next().is_some_and(|p| p.same_kind(expected)) {
                return false;
            }
        }
        if self.result && !params.next().is_some_and(|p| p.same_kind(method.return_type())) {
            return false;
        }
        params.next().is_none()
    }

    /// Shape of the "call original" callable handed to the replacement.
    ///
    /// It mirrors how the replacement receives its own arguments: with the
    /// receiver and selector when the replacement gets them, without otherwise.
    pub(crate) fn original_signature(&self, method: &Signature) -> Option<Signature> {
        if !self.original {
            return None;
        }
        let arguments = match self.arguments {
            Arguments::WithReceiver => method.arguments().to_vec(),
            Arguments::Plain | Arguments::Omitted => method.arguments()[2..].to_vec(),
        };
        Some(Signature::new(method.return_type().clone(), arguments))
    }
}
