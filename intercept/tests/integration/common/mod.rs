//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::ffi::c_void;

pub use swizzle_intercept::*;

thread_local! {
    static EVENTS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

pub fn setup() {
    let _ = env_logger::builder().is_test(true).try_init();
    take_events();
}

/// Appends to the calling thread's event log.
pub fn record(event: impl Into<String>) {
    EVENTS.with(|events| events.borrow_mut().push(event.into()));
}

/// Drains the calling thread's event log.
pub fn take_events() -> Vec<String> {
    EVENTS.with(|events| events.borrow_mut().drain(..).collect())
}

pub fn imp(code: *const c_void) -> Imp {
    Imp::new(code).expect("null code pointer")
}

pub fn class(name: &str) -> &'static Class {
    Class::register(name, None).expect("class registered twice")
}

pub fn subclass(name: &str, superclass: &'static Class) -> &'static Class {
    Class::register(name, Some(superclass)).expect("class registered twice")
}

/// Adds a typed method and returns its selector.
pub fn add_method(class: &'static Class, name: &str, code: *const c_void, types: &str) -> Sel {
    let sel = Sel::register(name);
    assert!(unsafe { class.add_method(sel, imp(code), types) });
    sel
}

pub fn current_imp(class: &'static Class, sel: Sel) -> Imp {
    class.own_method(sel).expect("method not defined").implementation()
}

/// # Safety
/// `code` must be a C function with the parameters `encoding` describes.
pub unsafe fn replacement(code: *const c_void, encoding: &str) -> Replacement {
    Replacement::new(imp(code), encoding)
}

/// Receiver used by every test class: the object header plus one field.
#[repr(C)]
pub struct Calc {
    pub base: Object,
    pub bias: i64,
}

impl Calc {
    pub fn new(class: &'static Class, bias: i64) -> Calc {
        Calc {
            base: Object::new(class),
            bias,
        }
    }

    /// Sends `sel`, calling the resolved implementation as `F`.
    pub fn send<F: Copy, R>(&self, sel: Sel, call: impl FnOnce(F, &Calc) -> R) -> R {
        self.base
            .send(sel, |imp| call(unsafe { imp.cast::<F>() }, self))
            .expect("message not understood")
    }
}

pub type SumFn = extern "C" fn(&Calc, Sel, i64, i64) -> i64;

extern "C" fn calc_sum(this: &Calc, _cmd: Sel, a: i64, b: i64) -> i64 {
    record(format!("sum({a},{b})"));
    a + b + this.bias
}

/// A class with `sum:with:` returning `a + b + bias`.
pub fn sum_class(name: &str) -> (&'static Class, Sel) {
    let class = class(name);
    let sel = add_method(class, "sum:with:", calc_sum as *const c_void, "q32@0:8q16q24");
    (class, sel)
}

pub fn sum(obj: &Calc, sel: Sel, a: i64, b: i64) -> i64 {
    obj.send(sel, |f: SumFn, this| f(this, sel, a, b))
}

pub type PlainSumFn = extern "C" fn(i64, i64) -> i64;

extern "C" fn plus_one(original: PlainSumFn, a: i64, b: i64) -> i64 {
    record("plus_one");
    original(a, b) + 1
}

extern "C" fn times_three(original: PlainSumFn, a: i64, b: i64) -> i64 {
    record("times_three");
    original(a, b) * 3
}

extern "C" fn minus_two(original: PlainSumFn, a: i64, b: i64) -> i64 {
    record("minus_two");
    original(a, b) - 2
}

/// `instead` hook on `sum:with:` adding one to the result.
pub fn plus_one_hook() -> Replacement {
    unsafe { replacement(plus_one as *const c_void, "q^?qq") }
}

/// `instead` hook on `sum:with:` tripling the result.
pub fn times_three_hook() -> Replacement {
    unsafe { replacement(times_three as *const c_void, "q^?qq") }
}

/// `instead` hook on `sum:with:` subtracting two from the result.
pub fn minus_two_hook() -> Replacement {
    unsafe { replacement(minus_two as *const c_void, "q^?qq") }
}
