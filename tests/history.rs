/*
 * Ordering-structure invariants checked over real trials: clock-vector
 * bounds, happens-before transitivity, conflict ordering, replay
 * determinism of values and context hashes, and trace-tree navigation
 * guarantees.
 */

use std::rc::Rc;

use weft::history::ClockVector;
use weft::program::mem::Atomic;
use weft::program::start_thread;
use weft::trace::TraceBuilder;
use weft::types::{ThreadId, Time};
use weft::{CheckResult, Checker};

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

#[derive(PartialEq, Debug)]
struct StepRecord {
    thread: ThreadId,
    previous_value: i64,
    hash: u64,
    cv: ClockVector,
}

#[test]
fn happens_before_invariants_hold_along_a_trial() {
    let checker = store_buffer_checker();
    checker
        .enter(|rt| -> CheckResult<()> {
            rt.start_new_run()?;
            while !rt.finished() {
                let thread = rt.runnable().first().unwrap();
                rt.advance_thread(thread)?;
            }

            rt.with_history(|history| {
                let len = history.len();
                assert!(len > 0);

                for t in 0..len {
                    // A step's clock vector never reaches into the future,
                    // and its own slot is exactly its time.
                    for i in 0..weft::config::MAX_THREADS {
                        assert!(history.cv_at(t)[ThreadId(i)] <= t);
                    }
                    assert_eq!(history.cv_at(t)[history.thread_at(t)], t);
                }

                // Transitivity.
                for a in 0..len {
                    for b in 0..len {
                        for c in 0..len {
                            if history.time_happens_before_time(a, b)
                                && history.time_happens_before_time(b, c)
                            {
                                assert!(history.time_happens_before_time(a, c));
                            }
                        }
                    }
                }

                // Conflicting steps are ordered by recording.
                for a in 0..len {
                    for b in (a + 1)..len {
                        let ta = history.transition_at(a);
                        let tb = history.transition_at(b);
                        if ta.conflicts_with(tb) {
                            assert!(
                                history.time_happens_before_time(a, b),
                                "conflicting steps {a} and {b} unordered"
                            );
                        }
                    }
                }

                // The cached first-conflict lists only name earlier,
                // genuinely conflicting steps.
                for t in 0..len {
                    for &conflict in history.first_conflicts_at(t) {
                        assert!(conflict < t);
                        assert!(
                            history
                                .transition_at(conflict)
                                .conflicts_with(history.transition_at(t))
                        );
                    }
                }
            });
            Ok(())
        })
        .unwrap();
}

#[test]
fn replaying_a_schedule_reproduces_values_and_hashes() {
    let checker = store_buffer_checker();
    checker
        .enter(|rt| -> CheckResult<()> {
            rt.start_new_run()?;
            let mut schedule = Vec::new();
            while !rt.finished() {
                let thread = rt.runnable().first().unwrap();
                schedule.push(thread);
                rt.advance_thread(thread)?;
            }

            let record = |rt: &weft::runtime::Runtime| {
                rt.with_history(|history| {
                    (0..history.len())
                        .map(|t| StepRecord {
                            thread: history.thread_at(t),
                            previous_value: history.previous_value_at(t),
                            hash: history.hash_at(t),
                            cv: *history.cv_at(t),
                        })
                        .collect::<Vec<_>>()
                })
            };

            let first = record(rt);
            assert_eq!(first.len() as Time, rt.history_len());

            // Reset and replay the identical schedule: every recorded value,
            // clock vector and chained hash must come back identical.
            rt.start_new_run()?;
            for &thread in &schedule {
                rt.advance_thread(thread)?;
            }
            let second = record(rt);

            assert_eq!(first, second);
            Ok(())
        })
        .unwrap();
}

#[test]
fn trace_children_are_pointer_equal_across_navigations() {
    let checker = store_buffer_checker();
    checker
        .enter(|rt| -> CheckResult<()> {
            let mut builder = TraceBuilder::new(rt)?;
            let root = builder.root();
            let thread = root.runnable().first().unwrap();

            let first = builder.extend(rt, thread)?;
            builder.move_to(rt, &root)?;
            let second = builder.extend(rt, thread)?;
            assert!(Rc::ptr_eq(&first, &second));

            // A second hop through a different navigation path still lands
            // on the same child object.
            let other = first.runnable().first().unwrap();
            let deep_first = builder.extend(rt, other)?;
            builder.move_to(rt, &root)?;
            builder.move_to(rt, &first)?;
            let deep_second = builder.extend(rt, other)?;
            assert!(Rc::ptr_eq(&deep_first, &deep_second));
            Ok(())
        })
        .unwrap();
}

#[test]
fn moving_to_the_current_node_replays_nothing() {
    let checker = store_buffer_checker();
    checker
        .enter(|rt| -> CheckResult<()> {
            let mut builder = TraceBuilder::new(rt)?;
            let root = builder.root();
            let thread = root.runnable().first().unwrap();
            builder.extend(rt, thread)?;

            let runs_before = rt.stats(|stats| stats.get("runs"));
            let transitions_before = rt.stats(|stats| stats.get("transitions"));

            let current = builder.current();
            builder.move_to(rt, &current)?;

            assert_eq!(rt.stats(|stats| stats.get("runs")), runs_before);
            assert_eq!(
                rt.stats(|stats| stats.get("transitions")),
                transitions_before
            );
            Ok(())
        })
        .unwrap();
}

#[test]
fn moving_to_root_restarts_the_trial() {
    let checker = store_buffer_checker();
    checker
        .enter(|rt| -> CheckResult<()> {
            let mut builder = TraceBuilder::new(rt)?;
            let root = builder.root();
            let thread = root.runnable().first().unwrap();
            builder.extend(rt, thread)?;

            let runs_before = rt.stats(|stats| stats.get("runs"));
            builder.move_to(rt, &root)?;

            assert_eq!(rt.stats(|stats| stats.get("runs")), runs_before + 1);
            assert_eq!(rt.history_len(), 0);
            assert!(Rc::ptr_eq(&builder.current(), &root));
            Ok(())
        })
        .unwrap();
}
