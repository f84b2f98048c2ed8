use enlist_core::common_tests::concurrent_set_stress_tests::*;
use enlist_core::{DeferredGuard, EnlistSet};
use rstest::rstest;
use serial_test::serial;

type TestSet = EnlistSet<i32, DeferredGuard>;

#[test]
#[serial(stress_tests)]
fn stress_contains_during_modifications() {
    test_contains_during_modifications::<TestSet>();
}

#[test]
#[serial(stress_tests)]
fn stress_concurrent_remove_same_value() {
    test_concurrent_remove_same_value::<TestSet>();
}

#[test]
#[serial(stress_tests)]
fn stress_linearizability() {
    test_linearizability::<TestSet>();
}

#[rstest]
#[serial(stress_tests)]
#[case::first_run(0)]
#[case::second_run(1)]
#[case::third_run(2)]
fn stress_mixed_churn_balance(#[case] _run: usize) {
    test_mixed_churn_balance::<DeferredGuard>();
}

#[test]
#[serial(stress_tests)]
fn stress_extreme_contention_single_value() {
    test_extreme_contention_single_value::<DeferredGuard>();
}

#[test]
#[serial(stress_tests)]
fn stress_progress_guarantee() {
    test_progress_guarantee::<TestSet>();
}

#[test]
#[serial(stress_tests)]
fn stress_external_identities() {
    test_external_identities::<DeferredGuard>();
}
