//! Foreign-call descriptions built from signatures.

use core::ffi::c_void;
use core::mem::size_of;

use libffi::middle::Type;
use libffi::raw;
use swizzle_runtime::Imp;

use crate::signature::{Signature, TypeDescriptor, TypeKind};
use crate::types::{HookError, Result};

/// A prepared `ffi_cif` plus every type descriptor it points into.
///
/// The cif and the argument type array are boxed so their addresses stay put
/// when the shape moves; trampolines prepared from a shape keep pointing at
/// them.
pub struct CallShape {
    cif: Box<raw::ffi_cif>,
    arg_types: Box<[*mut raw::ffi_type]>,
    _types: Vec<Type>,
    _return_type: Type,
    return_size: usize,
    return_offset: usize,
}

// The cif is fully written by ffi_prep_cif before the shape is shared and is
// only read by ffi_call and closure dispatch afterwards.
unsafe impl Send for CallShape {}
unsafe impl Sync for CallShape {}

fn ffi_type(descriptor: &TypeDescriptor, by_value: bool) -> Type {
    match descriptor.kind() {
        TypeKind::Void => Type::void(),
        TypeKind::Char => Type::i8(),
        TypeKind::UnsignedChar | TypeKind::Bool => Type::u8(),
        TypeKind::Short => Type::i16(),
        TypeKind::UnsignedShort => Type::u16(),
        TypeKind::Int | TypeKind::Long => Type::i32(),
        TypeKind::UnsignedInt | TypeKind::UnsignedLong => Type::u32(),
        TypeKind::LongLong => Type::i64(),
        TypeKind::UnsignedLongLong => Type::u64(),
        TypeKind::Float => Type::f32(),
        TypeKind::Double => Type::f64(),
        TypeKind::CString
        | TypeKind::Object
        | TypeKind::Class
        | TypeKind::Selector
        | TypeKind::Block
        | TypeKind::FunctionPointer
        | TypeKind::Pointer => Type::pointer(),
        TypeKind::Struct(fields) => {
            let fields: Vec<Type> = fields.iter().map(|f| ffi_type(f, true)).collect();
            Type::structure(fields)
        }
        // Arrays decay to pointers in argument position and are laid out
        // inline inside structs, whose size the parser caps at
        // MAX_AGGREGATE_SIZE.
        TypeKind::Array(_, _) if !by_value => Type::pointer(),
        TypeKind::Array(len, element) => {
            let elements: Vec<Type> = (0..*len).map(|_| ffi_type(element, true)).collect();
            Type::structure(elements)
        }
    }
}

fn is_integral(descriptor: &TypeDescriptor) -> bool {
    !matches!(
        descriptor.kind(),
        TypeKind::Void | TypeKind::Float | TypeKind::Double | TypeKind::Struct(_) | TypeKind::Array(_, _)
    )
}

impl CallShape {
    pub fn new(signature: &Signature) -> Result<CallShape> {
        let return_descriptor = signature.return_type();
        let return_type = ffi_type(return_descriptor, true);
        let types: Vec<Type> = signature.arguments().iter().map(|a| ffi_type(a, false)).collect();
        let mut arg_types: Box<[*mut raw::ffi_type]> = types.iter().map(Type::as_raw_ptr).collect();
        // SAFETY: an all-zero ffi_cif is a valid target for ffi_prep_cif.
        let mut cif: Box<raw::ffi_cif> = Box::new(unsafe { core::mem::zeroed() });

        let status = unsafe {
            raw::ffi_prep_cif(
                &mut *cif,
                raw::ffi_abi_FFI_DEFAULT_ABI,
                arg_types.len() as _,
                return_type.as_raw_ptr(),
                arg_types.as_mut_ptr(),
            )
        };
        if status != raw::ffi_status_FFI_OK {
            return Err(HookError::Ffi(format!("ffi_prep_cif rejected {signature} (status {status:?})")));
        }

        // ffi_prep_cif lays out aggregates; they must agree with the C layout
        // computed from the encoding or arguments would be copied short.
        let laid_out = |t: &Type| unsafe { (*t.as_raw_ptr()).size };
        for (descriptor, ty) in signature.arguments().iter().zip(&types) {
            if matches!(descriptor.kind(), TypeKind::Struct(_)) && laid_out(ty) != descriptor.size() {
                return Err(HookError::Ffi(format!(
                    "layout of {descriptor} is {} bytes natively, {} from its encoding",
                    laid_out(ty),
                    descriptor.size()
                )));
            }
        }

        let word = size_of::<usize>();
        let return_size = return_descriptor.size();
        let return_offset = if cfg!(target_endian = "big") && is_integral(return_descriptor) {
            word.saturating_sub(return_size)
        } else {
            0
        };

        Ok(CallShape {
            cif,
            arg_types,
            _types: types,
            _return_type: return_type,
            return_size,
            return_offset,
        })
    }

    pub fn arity(&self) -> usize {
        self.arg_types.len()
    }

    pub(crate) fn as_raw(&self) -> *mut raw::ffi_cif {
        &*self.cif as *const raw::ffi_cif as *mut raw::ffi_cif
    }

    pub fn return_size(&self) -> usize {
        self.return_size
    }

    /// Bytes libffi writes for a return value: small integers are widened to
    /// a full register.
    pub fn return_storage(&self) -> usize {
        if self.return_size == 0 {
            0
        } else {
            self.return_size.max(size_of::<usize>())
        }
    }

    /// A zeroed, suitably aligned buffer large enough for the return value.
    pub fn return_buffer(&self) -> ReturnBuffer {
        let words = self.return_storage().max(size_of::<u64>()).div_ceil(size_of::<u64>());
        ReturnBuffer {
            words: vec![0; words],
            offset: self.return_offset,
        }
    }

    /// Calls `code` with the argument values `args` points at.
    ///
    /// # Safety
    /// `code` must follow this shape's calling convention, `args` must hold
    /// `arity()` pointers to correctly typed values and `ret` must have room
    /// for `return_storage()` bytes.
    pub unsafe fn call(&self, code: Imp, ret: *mut c_void, args: *mut *mut c_void) {
        let fun: unsafe extern "C" fn() = core::mem::transmute(code.as_ptr());
        raw::ffi_call(self.as_raw(), Some(fun), ret, args);
    }
}

/// Storage for one return value, aligned for any scalar.
pub struct ReturnBuffer {
    words: Vec<u64>,
    offset: usize,
}

impl ReturnBuffer {
    /// Where libffi writes the value.
    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        self.words.as_mut_ptr().cast()
    }

    /// Where the value itself starts when read back at its natural width.
    pub fn value_ptr(&mut self) -> *mut c_void {
        // SAFETY: offset is below one machine word and the buffer holds at least one.
        unsafe { self.words.as_mut_ptr().cast::<u8>().add(self.offset).cast() }
    }
}
