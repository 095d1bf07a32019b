//! Dispatch order and data flow for each hook mode.

use std::ffi::c_void;

use crate::common::*;

extern "C" fn before_none() {
    record("before");
}

extern "C" fn before_plain(a: i64, b: i64) {
    record(format!("before({a},{b})"));
}

extern "C" fn before_full(this: &Calc, cmd: Sel, a: i64, b: i64) {
    record(format!("before[{} {}]({a},{b})", this.bias, cmd.name()));
}

extern "C" fn before_peeks(original: PlainSumFn, a: i64, b: i64) {
    let peeked = original(a, b);
    record(format!("peeked {peeked}"));
}

extern "C" fn after_none() {
    record("after");
}

extern "C" fn after_result(a: i64, b: i64, result: i64) {
    record(format!("after({a},{b}) = {result}"));
}

extern "C" fn after_full_result(this: &Calc, _cmd: Sel, a: i64, b: i64, result: i64) {
    record(format!("after[{}]({a},{b}) = {result}", this.bias));
}

extern "C" fn instead_double(original: PlainSumFn, a: i64, b: i64) -> i64 {
    original(a, b) * 2
}

extern "C" fn instead_full(original: SumFn, this: &Calc, cmd: Sel, a: i64, b: i64) -> i64 {
    original(this, cmd, a + 1, b) + this.bias
}

extern "C" fn instead_skip(_original: PlainSumFn, _a: i64, _b: i64) -> i64 {
    -1
}

extern "C" fn instead_twice(original: PlainSumFn, a: i64, b: i64) -> i64 {
    original(a, 0) + original(0, b)
}

extern "C" fn instead_reports_dispatch(original: PlainSumFn, a: i64, b: i64) -> i64 {
    record(format!("in dispatch: {}", in_dispatch()));
    original(a, b)
}

fn install(name: &str, mode: HookMode, code: *const c_void, encoding: &str) -> (Calc, Sel, HookToken) {
    setup();
    let (class, sel) = sum_class(name);
    let token = hook(class, sel, mode, unsafe { replacement(code, encoding) }).expect("hook failed");
    (Calc::new(class, 100), sel, token)
}

// ============================================================================
// before
// ============================================================================

#[test]
fn test_before_runs_replacement_then_original() {
    let (obj, sel, token) = install("ModeTests.BeforePlain", HookMode::Before, before_plain as *const c_void, "vqq");

    for i in 0..5 {
        assert_eq!(sum(&obj, sel, i, 4), 104 + i);
        assert_eq!(take_events(), [format!("before({i},4)"), format!("sum({i},4)")]);
    }

    assert!(token.cancel());
    assert_eq!(sum(&obj, sel, 3, 4), 107);
    assert_eq!(take_events(), ["sum(3,4)"]);
}

#[test]
fn test_before_without_arguments() {
    let (obj, sel, token) = install("ModeTests.BeforeNone", HookMode::Before, before_none as *const c_void, "v");

    assert_eq!(sum(&obj, sel, 1, 2), 103);
    assert_eq!(take_events(), ["before", "sum(1,2)"]);
    token.cancel();
}

#[test]
fn test_before_with_receiver_and_selector() {
    let (obj, sel, token) = install("ModeTests.BeforeFull", HookMode::Before, before_full as *const c_void, "v@:qq");

    assert_eq!(sum(&obj, sel, 5, 6), 111);
    assert_eq!(take_events(), ["before[100 sum:with:](5,6)", "sum(5,6)"]);
    token.cancel();
}

#[test]
fn test_before_original_callable_reaches_the_real_receiver() {
    let (obj, sel, token) = install("ModeTests.BeforePeek", HookMode::Before, before_peeks as *const c_void, "v^?qq");

    assert_eq!(sum(&obj, sel, 3, 4), 107);
    assert_eq!(take_events(), ["sum(3,4)", "peeked 107", "sum(3,4)"]);
    token.cancel();
}

// ============================================================================
// after
// ============================================================================

#[test]
fn test_after_sees_result_and_cannot_change_it() {
    let (obj, sel, token) = install("ModeTests.AfterResult", HookMode::After, after_result as *const c_void, "vqqq");

    assert_eq!(sum(&obj, sel, 3, 4), 107);
    assert_eq!(take_events(), ["sum(3,4)", "after(3,4) = 107"]);
    token.cancel();
}

#[test]
fn test_after_with_receiver_and_result() {
    let (obj, sel, token) =
        install("ModeTests.AfterFull", HookMode::After, after_full_result as *const c_void, "v@:qqq");

    assert_eq!(sum(&obj, sel, -3, 4), 101);
    assert_eq!(take_events(), ["sum(-3,4)", "after[100](-3,4) = 101"]);
    token.cancel();
}

#[test]
fn test_after_without_arguments() {
    let (obj, sel, token) = install("ModeTests.AfterNone", HookMode::After, after_none as *const c_void, "v");

    assert_eq!(sum(&obj, sel, 0, 0), 100);
    assert_eq!(take_events(), ["sum(0,0)", "after"]);
    token.cancel();
}

// ============================================================================
// instead
// ============================================================================

#[test]
fn test_instead_wraps_original() {
    let (obj, sel, token) =
        install("ModeTests.InsteadPlain", HookMode::Instead, instead_double as *const c_void, "q^?qq");

    assert_eq!(sum(&obj, sel, 3, 4), 214);
    assert_eq!(take_events(), ["sum(3,4)"]);
    assert!(token.cancel());
    assert_eq!(sum(&obj, sel, 3, 4), 107);
}

#[test]
fn test_instead_with_receiver_and_selector() {
    let (obj, sel, token) =
        install("ModeTests.InsteadFull", HookMode::Instead, instead_full as *const c_void, "q^?@:qq");

    assert_eq!(sum(&obj, sel, 3, 4), 208);
    assert_eq!(take_events(), ["sum(4,4)"]);
    token.cancel();
}

#[test]
fn test_instead_may_skip_original() {
    let (obj, sel, token) =
        install("ModeTests.InsteadSkip", HookMode::Instead, instead_skip as *const c_void, "q^?qq");

    assert_eq!(sum(&obj, sel, 3, 4), -1);
    assert!(take_events().is_empty());
    token.cancel();
}

#[test]
fn test_instead_may_call_original_repeatedly() {
    let (obj, sel, token) =
        install("ModeTests.InsteadTwice", HookMode::Instead, instead_twice as *const c_void, "q^?qq");

    assert_eq!(sum(&obj, sel, 3, 4), 207);
    assert_eq!(take_events(), ["sum(3,0)", "sum(0,4)"]);
    token.cancel();
}

#[test]
fn test_replacement_runs_inside_dispatch() {
    let (obj, sel, token) = install(
        "ModeTests.InDispatch",
        HookMode::Instead,
        instead_reports_dispatch as *const c_void,
        "q^?qq",
    );

    assert!(!in_dispatch());
    assert_eq!(sum(&obj, sel, 1, 1), 102);
    assert_eq!(take_events(), ["in dispatch: true", "sum(1,1)"]);
    assert!(!in_dispatch());
    token.cancel();
}

#[test]
fn test_token_reports_what_it_installed() {
    let (_obj, sel, token) = install("ModeTests.Token", HookMode::After, after_none as *const c_void, "v");

    assert_eq!(token.mode(), HookMode::After);
    assert_eq!(token.selector(), sel);
    assert_eq!(token.class().name(), "ModeTests.Token");
    assert!(!token.is_cancelled());
    assert!(token.cancel());
    assert!(token.is_cancelled());
}
