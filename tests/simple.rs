/*
 * Small scripted programs with hand-countable interleaving spaces, checked
 * against the exact exploration counts each strategy should produce.
 */

use weft::Checker;
use weft::explore::chess::ChessOptions;
use weft::program::mem::Atomic;
use weft::program::start_thread;

/// x = y = 0; thread 0: y = 1; x = 1; thread 1: if x == 0 { y = 2 }.
fn store_buffer_checker() -> Checker {
    let x = Atomic::<i64>::leaked(0);
    let y = Atomic::<i64>::leaked(0);
    Checker::new(
        move || {
            x.store(0);
            y.store(0);
            start_thread(move || {
                y.store(1);
                x.store(1);
            });
            start_thread(move || {
                if x.load() == 0 {
                    y.store(2);
                }
            });
        },
        || {},
    )
}

#[test]
fn dpor_explores_three_maximal_traces() {
    let checker = store_buffer_checker();
    let report = checker.run_dpor().unwrap();
    assert_eq!(report.leaves, 3);
    assert_eq!(report.deadends, 0);
    assert_eq!(checker.violations(), 0);
}

#[test]
fn brute_force_explores_six_interleavings() {
    let checker = store_buffer_checker();
    let report = checker.run_brute_force().unwrap();
    assert_eq!(report.leaves, 6);
    assert_eq!(checker.violations(), 0);
}

#[test]
fn chess_without_preemptions_runs_each_thread_to_completion() {
    let checker = store_buffer_checker();
    let report = checker
        .run_chess(ChessOptions {
            max_preemptions: Some(0),
            ..ChessOptions::default()
        })
        .unwrap();
    // Each thread, once chosen, runs until blocked or done: two schedules.
    assert_eq!(report.leaves, 2);
    assert_eq!(report.bounds_explored, 1);
    assert!(!report.complete);
}

#[test]
fn chess_deepens_until_complete() {
    let checker = store_buffer_checker();
    let report = checker.run_chess(ChessOptions::default()).unwrap();
    assert!(report.complete);
    assert!(report.leaves >= 6);
    assert_eq!(checker.violations(), 0);
}

#[test]
fn chess_hash_pruning_still_completes() {
    let checker = store_buffer_checker();
    let report = checker
        .run_chess(ChessOptions {
            prune_using_hash_table: true,
            ..ChessOptions::default()
        })
        .unwrap();
    assert!(report.complete);
    assert!(report.leaves >= 2);
}

#[test]
fn pbpor_and_cbdpor_complete_on_the_store_buffer_program() {
    let checker = store_buffer_checker();
    let report = checker.run_pbpor().unwrap();
    assert!(report.complete);
    assert!(report.leaves >= 3);

    let checker = store_buffer_checker();
    let report = checker.run_cbdpor().unwrap();
    assert!(report.complete);
    assert!(report.leaves >= 3);
    assert_eq!(checker.violations(), 0);
}

#[test]
fn dpor_explores_conflict_free_programs_once() {
    let x = Atomic::<i64>::leaked(0);
    let y = Atomic::<i64>::leaked(0);
    let checker = Checker::new(
        move || {
            x.store(0);
            y.store(0);
            start_thread(move || {
                x.store(1);
                x.store(2);
            });
            start_thread(move || {
                y.store(1);
            });
        },
        || {},
    );
    let report = checker.run_dpor().unwrap();
    assert_eq!(report.leaves, 1);
}

#[test]
fn zero_threads_finish_immediately() {
    let checker = Checker::new(|| {}, || {});
    let report = checker.run_single().unwrap();
    assert_eq!(report.steps, 0);
    assert_eq!(checker.runs(), 1);

    let checker = Checker::new(|| {}, || {});
    let report = checker.run_dpor().unwrap();
    assert_eq!(report.leaves, 1);
    assert_eq!(checker.runs(), 1);
}

#[test]
fn finish_callback_observes_final_memory() {
    let x = Atomic::<i64>::leaked(0);
    let checker = Checker::new(
        move || {
            x.store(0);
            for arg in [1, 2, 3] {
                start_thread(move || {
                    x.fetch_add(arg);
                });
            }
        },
        move || {
            // Addition commutes: every interleaving must end at 6.
            if x.load() != 6 {
                weft::program::found();
            }
        },
    );
    let report = checker.run_brute_force().unwrap();
    assert_eq!(report.leaves, 6);
    assert_eq!(checker.violations(), 0);
}
