use core::ffi::c_char;
use core::fmt;
use core::ptr::NonNull;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::sync::OnceLock;

use parking_lot::Mutex;

/// Interned method name.
///
/// Two selectors registered with the same name are the same pointer, so
/// comparison and hashing never touch the string. The layout is a single
/// pointer, which lets a `Sel` travel through the C calling convention as the
/// implicit second argument of every method.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sel(NonNull<c_char>);

// Interned names are leaked and never mutated.
unsafe impl Send for Sel {}
unsafe impl Sync for Sel {}

fn table() -> &'static Mutex<HashMap<String, Sel>> {
    static TABLE: OnceLock<Mutex<HashMap<String, Sel>>> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(HashMap::new()))
}

impl Sel {
    /// Returns the selector for `name`, interning it on first use.
    ///
    /// # Panics
    /// Panics if `name` contains an interior NUL byte.
    pub fn register(name: &str) -> Sel {
        let mut table = table().lock();
        if let Some(sel) = table.get(name) {
            return *sel;
        }
        let owned = CString::new(name).expect("selector names cannot contain NUL");
        let leaked: &'static CStr = Box::leak(owned.into_boxed_c_str());
        let sel = Sel(NonNull::from(leaked).cast());
        table.insert(name.to_owned(), sel);
        sel
    }

    pub fn name(&self) -> &'static str {
        // SAFETY: every Sel points at a leaked, UTF-8 CString built in register().
        unsafe { CStr::from_ptr(self.0.as_ptr()) }
            .to_str()
            .unwrap_or_default()
    }

    pub fn as_ptr(&self) -> *const c_char {
        self.0.as_ptr()
    }
}

impl fmt::Debug for Sel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sel({})", self.name())
    }
}

impl fmt::Display for Sel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
