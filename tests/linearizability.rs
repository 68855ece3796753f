/*
 * Linearizability harness scenarios: a counter with a non-atomic increment
 * loses updates under some interleaving and gets flagged, while the atomic
 * version checks clean. The implementation is rebuilt every trial and the
 * model re-verified against every finished call log.
 */

use std::cell::Cell;
use std::rc::Rc;

use weft::Checker;
use weft::program::lin::Linearizability;
use weft::program::mem::Atomic;

/// Shared handle to the structure under test, re-created each trial.
#[derive(Clone)]
struct CounterHandle {
    cell: Rc<Cell<Option<Atomic<i64>>>>,
}

impl CounterHandle {
    fn new() -> CounterHandle {
        CounterHandle {
            cell: Rc::new(Cell::new(None)),
        }
    }

    fn create(&self) {
        self.cell.set(Some(Atomic::alloc()));
    }

    fn counter(&self) -> Atomic<i64> {
        self.cell.get().expect("counter not created")
    }

    /// Racy increment: separate load and store.
    fn increment_racy(&self) -> i64 {
        let counter = self.counter();
        let value = counter.load();
        counter.store(value + 1);
        value + 1
    }

    /// Linearizable increment.
    fn increment_atomic(&self) -> i64 {
        self.counter().fetch_add(1) + 1
    }
}

fn counter_checker(racy: bool) -> Checker {
    let handle = CounterHandle::new();
    let mut harness = Linearizability::new(2);

    let impl_handle = handle.clone();
    harness.register_implementation(move || impl_handle.create(), || {});
    let model_handle = handle.clone();
    harness.register_model(move || model_handle.create(), || {});

    for thread in 0..2 {
        let handle = handle.clone();
        harness.add_step(
            thread,
            move || {
                if racy {
                    handle.increment_racy()
                } else {
                    handle.increment_atomic()
                }
            },
            "increment",
        );
    }

    harness.into_checker()
}

#[test]
fn racy_increment_is_not_linearizable() {
    let trace = std::env::temp_dir().join(format!("weft-lin-{}.py", std::process::id()));
    let checker = counter_checker(true).trace_path(trace.clone());
    checker.run_dpor().unwrap();
    // Both threads reading zero yields results (1, 1); a sequential counter
    // must answer 1 and 2.
    assert!(checker.violations() > 0);
    assert!(checker.first_violation() > 0);
    assert!(trace.exists(), "violating trace not dumped");
    let _ = std::fs::remove_file(trace);
}

#[test]
fn atomic_increment_is_linearizable() {
    let checker = counter_checker(false);
    checker.run_brute_force().unwrap();
    assert_eq!(checker.violations(), 0);
    assert!(checker.runs() > 1);
}

#[test]
fn model_reset_leaves_no_residue_across_trials() {
    // Run the clean counter under a strategy that revisits many prefixes;
    // if either fixture leaked state between trials, later trials would see
    // non-zero counters and flag spurious violations.
    let checker = counter_checker(false);
    checker.run_dpor().unwrap();
    assert_eq!(checker.violations(), 0);
}
