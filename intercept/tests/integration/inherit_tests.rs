//! Hooking a selector a class only inherits.

use crate::common::*;

#[test]
fn test_hooking_subclass_leaves_superclass_alone() {
    setup();
    let (base, sel) = sum_class("InheritTests.Base");
    let derived = subclass("InheritTests.Derived", base);
    let base_imp = current_imp(base, sel);
    let base_obj = Calc::new(base, 0);
    let derived_obj = Calc::new(derived, 0);
    assert!(derived.own_method(sel).is_none());

    let token = hook(derived, sel, HookMode::Instead, times_three_hook()).unwrap();
    assert!(derived.own_method(sel).is_some());
    assert!(is_hooked(derived, sel));
    assert!(!is_hooked(base, sel));
    assert_eq!(current_imp(base, sel), base_imp);

    assert_eq!(sum(&derived_obj, sel, 3, 4), 21);
    assert_eq!(sum(&base_obj, sel, 3, 4), 7);

    assert!(token.cancel());
    assert_eq!(sum(&derived_obj, sel, 3, 4), 7);
    assert_eq!(hook_count(derived, sel), 0);
}

#[test]
fn test_subclass_follows_later_superclass_hooks() {
    setup();
    let (base, sel) = sum_class("InheritTests.LaterBase");
    let derived = subclass("InheritTests.LaterDerived", base);
    let base_obj = Calc::new(base, 0);
    let derived_obj = Calc::new(derived, 0);

    let on_derived = hook(derived, sel, HookMode::Instead, times_three_hook()).unwrap();
    let on_base = hook(base, sel, HookMode::Instead, plus_one_hook()).unwrap();

    assert_eq!(sum(&base_obj, sel, 3, 4), 8);
    assert_eq!(sum(&derived_obj, sel, 3, 4), 24);
    take_events();

    assert!(on_base.cancel());
    assert_eq!(sum(&derived_obj, sel, 3, 4), 21);
    assert_eq!(take_events(), ["times_three", "sum(3,4)"]);

    assert!(on_derived.cancel());
    assert_eq!(sum(&derived_obj, sel, 3, 4), 7);
    assert_eq!(sum(&base_obj, sel, 3, 4), 7);
}

#[test]
fn test_superclass_hook_cancelled_under_subclass_hook() {
    setup();
    let (base, sel) = sum_class("InheritTests.UnderBase");
    let derived = subclass("InheritTests.UnderDerived", base);
    let derived_obj = Calc::new(derived, 1);

    let on_base = hook(base, sel, HookMode::Instead, plus_one_hook()).unwrap();
    let on_derived = hook(derived, sel, HookMode::Instead, times_three_hook()).unwrap();
    assert_eq!(sum(&derived_obj, sel, 3, 4), 27);

    // The subclass copy looks the superclass implementation up per call, so
    // releasing the superclass hook cannot leave it pointing at freed code.
    assert!(on_base.cancel());
    assert_eq!(sum(&derived_obj, sel, 3, 4), 24);
    assert!(on_derived.cancel());
    assert_eq!(sum(&derived_obj, sel, 3, 4), 8);
}
