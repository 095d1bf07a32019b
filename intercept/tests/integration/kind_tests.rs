//! `instead` hooks that forward straight to the original must be invisible
//! for every supported argument and return kind.

use std::ffi::c_void;

use crate::common::*;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    x: f64,
    y: f64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    origin: Point,
    size: Point,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pair {
    a: i32,
    b: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tagged {
    tag: u8,
    value: f32,
}

macro_rules! forwards_unchanged {
    ($name:ident, $ty:ty, $enc:literal, $a:expr, $b:expr, $op:expr) => {
        #[test]
        fn $name() {
            extern "C" fn method(_this: &Calc, _cmd: Sel, a: $ty, b: $ty) -> $ty {
                let op: fn($ty, $ty) -> $ty = $op;
                op(a, b)
            }
            extern "C" fn forward(original: extern "C" fn($ty, $ty) -> $ty, a: $ty, b: $ty) -> $ty {
                original(a, b)
            }
            type MethodFn = extern "C" fn(&Calc, Sel, $ty, $ty) -> $ty;

            setup();
            let class = class(concat!("KindTests.", stringify!($name)));
            let encoding = concat!($enc, "@:", $enc, $enc);
            let sel = add_method(class, "combine:with:", method as *const c_void, encoding);
            let obj = Calc::new(class, 0);
            let call = |a: $ty, b: $ty| obj.send(sel, |f: MethodFn, this| f(this, sel, a, b));

            let expected = call($a, $b);
            let token = hook(
                class,
                sel,
                HookMode::Instead,
                unsafe { replacement(forward as *const c_void, concat!($enc, "^?", $enc, $enc)) },
            )
            .expect("hook failed");
            assert!(is_hooked(class, sel));
            assert_eq!(call($a, $b), expected);

            assert!(token.cancel());
            assert!(!is_hooked(class, sel));
            assert_eq!(call($a, $b), expected);
        }
    };
}

forwards_unchanged!(test_char, i8, "c", -7i8, 3i8, |a, b| a.wrapping_mul(b));
forwards_unchanged!(test_unsigned_char, u8, "C", 200u8, 100u8, |a, b| a.wrapping_add(b));
forwards_unchanged!(test_short, i16, "s", -300i16, 7i16, |a, b| a.wrapping_mul(b));
forwards_unchanged!(test_unsigned_short, u16, "S", 65000u16, 600u16, |a, b| a.wrapping_add(b));
forwards_unchanged!(test_int, i32, "i", i32::MIN, 1i32, |a, b| a.wrapping_sub(b));
forwards_unchanged!(test_unsigned_int, u32, "I", u32::MAX, 2u32, |a, b| a.wrapping_add(b));
forwards_unchanged!(test_long_is_32_bit, i32, "l", -5i32, 9i32, |a, b| a * b);
forwards_unchanged!(test_long_long, i64, "q", i64::MAX, -1i64, |a, b| a.wrapping_add(b));
forwards_unchanged!(test_unsigned_long_long, u64, "Q", u64::MAX - 1, 1u64, |a, b| a ^ b);
forwards_unchanged!(test_float, f32, "f", 1.5f32, -0.25f32, |a, b| a * b);
forwards_unchanged!(test_double, f64, "d", 1e300f64, 3.5f64, |a, b| a / b);
forwards_unchanged!(test_bool, bool, "B", true, false, |a, b| a && !b);
forwards_unchanged!(test_c_string, *const u8, "*", b"left\0".as_ptr(), b"right\0".as_ptr(), |a, _b| a);
forwards_unchanged!(test_pointer, *mut c_void, "^v", 0x1000 as *mut c_void, 0x2000 as *mut c_void, |_a, b| b);
forwards_unchanged!(
    test_small_struct,
    Pair,
    "{Pair=ii}",
    Pair { a: 1, b: -2 },
    Pair { a: 30, b: 40 },
    |p, q| Pair { a: p.a + q.b, b: p.b * q.a }
);
forwards_unchanged!(
    test_float_struct,
    Point,
    "{Point=dd}",
    Point { x: 1.0, y: 2.0 },
    Point { x: 0.5, y: -4.0 },
    |p, q| Point { x: p.x + q.x, y: p.y * q.y }
);
forwards_unchanged!(
    test_mixed_struct,
    Tagged,
    "{Tagged=Cf}",
    Tagged { tag: 1, value: 0.5 },
    Tagged { tag: 2, value: 8.0 },
    |p, q| Tagged { tag: p.tag | q.tag, value: p.value * q.value }
);
forwards_unchanged!(
    test_large_struct,
    Rect,
    "{Rect={Point=dd}{Point=dd}}",
    Rect { origin: Point { x: 1.0, y: 2.0 }, size: Point { x: 3.0, y: 4.0 } },
    Rect { origin: Point { x: -1.0, y: 0.0 }, size: Point { x: 10.0, y: 20.0 } },
    |p, q| Rect {
        origin: Point { x: p.origin.x + q.origin.x, y: p.origin.y + q.origin.y },
        size: Point { x: p.size.x * q.size.x, y: p.size.y * q.size.y },
    }
);

extern "C" fn log_value(_this: &Calc, _cmd: Sel, value: i64) {
    record(format!("log({value})"));
}

extern "C" fn log_incremented(original: extern "C" fn(i64), value: i64) {
    original(value + 1);
}

#[test]
fn test_void_method() {
    setup();
    let class = class("KindTests.Void");
    let sel = add_method(class, "log:", log_value as *const c_void, "v@:q");
    let obj = Calc::new(class, 0);
    let call = |value: i64| obj.send(sel, |f: extern "C" fn(&Calc, Sel, i64), this| f(this, sel, value));

    let token = hook(class, sel, HookMode::Instead, unsafe {
        replacement(log_incremented as *const c_void, "v^?q")
    })
    .unwrap();
    call(41);
    assert_eq!(take_events(), ["log(42)"]);
    token.cancel();
    call(41);
    assert_eq!(take_events(), ["log(41)"]);
}

extern "C" fn total(_this: &Calc, _cmd: Sel, values: *const i32) -> i32 {
    unsafe { core::slice::from_raw_parts(values, 4) }.iter().sum()
}

extern "C" fn total_plus_one(original: extern "C" fn(*const i32) -> i32, values: *const i32) -> i32 {
    original(values) + 1
}

#[test]
fn test_array_arguments_are_passed_as_pointers() {
    setup();
    let class = class("KindTests.Array");
    let sel = add_method(class, "total:", total as *const c_void, "i@:[4i]");
    let obj = Calc::new(class, 0);
    let values = [1i32, 2, 3, 4];
    let call = || obj.send(sel, |f: extern "C" fn(&Calc, Sel, *const i32) -> i32, this| f(this, sel, values.as_ptr()));

    assert_eq!(call(), 10);
    let token = hook(class, sel, HookMode::Instead, unsafe {
        replacement(total_plus_one as *const c_void, "i^?[4i]")
    })
    .unwrap();
    assert_eq!(call(), 11);
    token.cancel();
    assert_eq!(call(), 10);
}

extern "C" fn midpoint(_this: &Calc, _cmd: Sel, p: Point, q: Point) -> Point {
    Point { x: (p.x + q.x) / 2.0, y: (p.y + q.y) / 2.0 }
}

extern "C" fn observe_midpoint(p: Point, q: Point, result: Point) {
    record(format!("({}, {}) ({}, {}) -> ({}, {})", p.x, p.y, q.x, q.y, result.x, result.y));
}

#[test]
fn test_after_receives_struct_result() {
    setup();
    let class = class("KindTests.AfterStruct");
    let sel = add_method(class, "midpoint:and:", midpoint as *const c_void, "{Point=dd}@:{Point=dd}{Point=dd}");
    let obj = Calc::new(class, 0);

    let token = hook(class, sel, HookMode::After, unsafe {
        replacement(observe_midpoint as *const c_void, "v{Point=dd}{Point=dd}{Point=dd}")
    })
    .unwrap();
    let result = obj.send(sel, |f: extern "C" fn(&Calc, Sel, Point, Point) -> Point, this| {
        f(this, sel, Point { x: 0.0, y: 0.0 }, Point { x: 4.0, y: -2.0 })
    });
    assert_eq!(result, Point { x: 2.0, y: -1.0 });
    assert_eq!(take_events(), ["(0, 0) (4, -2) -> (2, -1)"]);
    token.cancel();
}
