/*
 * Guarded CAS chains: required-result guards make each thread runnable
 * exactly when its CAS would succeed, so the reachable interleavings are
 * precisely the value chain's linearizations.
 */

use weft::Checker;
use weft::program::mem::Atomic;
use weft::program::{require_result, start_thread};

/// Threads CAS(0->1), CAS(1->2), CAS(2->0), CAS(0->3), CAS(3->0), each
/// guarded on success. Exactly two orders satisfy every guard:
/// 1,2,0 then 3,0 - or 3,0 then 1,2,0.
fn cas_chain_checker() -> Checker {
    let x = Atomic::<i64>::leaked(0);
    Checker::new(
        move || {
            x.store(0);
            for (expected, replacement) in [(0, 1), (1, 2), (2, 0), (0, 3), (3, 0)] {
                start_thread(move || {
                    require_result(expected);
                    while !x.cas(expected, replacement) {}
                });
            }
        },
        || {},
    )
}

#[test]
fn brute_force_finds_both_linearizations() {
    let checker = cas_chain_checker();
    let report = checker.run_brute_force().unwrap();
    assert_eq!(report.leaves, 2);
    assert_eq!(checker.violations(), 0);
}

#[test]
fn dpor_finds_exactly_the_linearizations() {
    let checker = cas_chain_checker();
    let report = checker.run_dpor().unwrap();
    // Every pair of chain CASes conflicts, so no two orders are equivalent.
    assert_eq!(report.leaves, 2);
    assert_eq!(report.deadends, 0);
}

#[test]
fn cbdpor_completes_on_the_chain() {
    let checker = cas_chain_checker();
    let report = checker.run_cbdpor().unwrap();
    assert!(report.complete);
    assert!(report.leaves >= 2);
}

#[test]
fn guards_keep_every_trial_on_the_chain() {
    let x = Atomic::<i64>::leaked(0);
    let trials_ok = std::rc::Rc::new(std::cell::Cell::new(true));
    let seen = trials_ok.clone();
    let checker = Checker::new(
        move || {
            x.store(0);
            for (expected, replacement) in [(0, 1), (1, 2), (2, 0), (0, 3), (3, 0)] {
                start_thread(move || {
                    require_result(expected);
                    while !x.cas(expected, replacement) {}
                });
            }
        },
        move || {
            // Both satisfying orders drain the chain back to zero.
            if x.load() != 0 {
                seen.set(false);
            }
        },
    );
    checker.run_brute_force().unwrap();
    assert!(trials_ok.get());
}
