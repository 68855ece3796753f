/*
 * Cooperative locks under exploration: acquisition order is the only
 * freedom, mutual exclusion holds in every interleaving, and a
 * flag-without-turn protocol deadlocks.
 */

use weft::program::mem::Atomic;
use weft::program::sync::Mutex;
use weft::program::{found, require_result, start_thread};
use weft::{CheckError, Checker};

#[test]
fn lock_serializes_four_threads_into_24_orders() {
    let lock = Mutex::leaked();
    let x = Atomic::<i64>::leaked(0);
    let y = Atomic::<i64>::leaked(0);
    let checker = Checker::new(
        move || {
            lock.reset();
            x.store(0);
            y.store(0);
            for arg in 1..=4 {
                start_thread(move || {
                    lock.acquire();
                    x.store(arg);
                    y.store(arg);
                    lock.release();
                });
            }
        },
        move || {
            // The last critical section wrote both cells.
            if x.load() != y.load() {
                found();
            }
        },
    );
    let report = checker.run_dpor().unwrap();
    assert_eq!(report.leaves, 24);
    assert_eq!(checker.violations(), 0);
}

#[test]
fn critical_sections_never_overlap() {
    let lock = Mutex::leaked();
    let inside = Atomic::<i64>::leaked(0);
    let checker = Checker::new(
        move || {
            lock.reset();
            inside.store(0);
            for _ in 0..3 {
                start_thread(move || {
                    lock.acquire();
                    if inside.fetch_add(1) != 0 {
                        found();
                    }
                    inside.fetch_sub(1);
                    lock.release();
                });
            }
        },
        || {},
    );
    checker.run_dpor().unwrap();
    assert_eq!(checker.violations(), 0);
}

#[test]
fn flags_without_turn_taking_deadlock() {
    let trace = std::env::temp_dir().join(format!("weft-deadlock-{}.py", std::process::id()));
    let flag0 = Atomic::<i64>::leaked(0);
    let flag1 = Atomic::<i64>::leaked(0);
    let checker = Checker::new(
        move || {
            flag0.store(0);
            flag1.store(0);
            start_thread(move || {
                flag0.store(1);
                require_result(0);
                while flag1.load() != 0 {}
                flag0.store(0);
            });
            start_thread(move || {
                flag1.store(1);
                require_result(0);
                while flag0.load() != 0 {}
                flag1.store(0);
            });
        },
        || {},
    )
    .trace_path(trace.clone());

    // Some interleaving raises both flags first; with both waits guarded on
    // zero, nothing is runnable there.
    let result = checker.run_dpor();
    assert_eq!(result.unwrap_err(), CheckError::Deadlock);
    assert!(trace.exists(), "deadlock trace not dumped");
    let _ = std::fs::remove_file(trace);
}
