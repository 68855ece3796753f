/*
 * Linearizability Harness
 *
 * Scripted workload for checking a concurrent structure against a
 * sequential model. Each script thread runs its list of operations against
 * the implementation, logging per call the result and the clock vectors at
 * its start and end. When the trial finishes, a backtracking search looks
 * for a linearization of the call log - total order consistent with
 * per-thread program order and with the observed clock-vector ordering -
 * under which the model reproduces every logged result. If none exists the
 * trial is flagged as a violation.
 *
 * The implementation is torn down and rebuilt between trials so no state
 * leaks from one interleaving to the next; the model is rebuilt for every
 * candidate linearization.
 */

use std::cell::RefCell;
use std::rc::Rc;

use crate::checker::Checker;
use crate::history::ClockVector;
use crate::program::{annotate, found, get_clock_vector, start_thread, thread_id};
use crate::types::ThreadId;

struct Step {
    run: Box<dyn Fn() -> i64>,
    name: String,
}

struct Fixture {
    setup: Box<dyn FnMut()>,
    cleanup: Box<dyn FnMut()>,
}

/// One logged call of a script step.
struct CallRecord {
    script_thread: usize,
    actual_thread: ThreadId,
    step: usize,
    result: i64,
    start_cv: ClockVector,
    end_cv: ClockVector,
    executed: bool,
}

struct LinState {
    order: Vec<CallRecord>,
    linearization: Vec<usize>,
}

pub struct Linearizability {
    steps: Vec<Vec<Step>>,
    model: RefCell<Option<Fixture>>,
    implementation: RefCell<Option<Fixture>>,
    state: RefCell<LinState>,
}

impl Linearizability {
    pub fn new(num_threads: usize) -> Linearizability {
        Linearizability {
            steps: (0..num_threads).map(|_| Vec::new()).collect(),
            model: RefCell::new(None),
            implementation: RefCell::new(None),
            state: RefCell::new(LinState {
                order: Vec::new(),
                linearization: Vec::new(),
            }),
        }
    }

    pub fn register_model(&mut self, setup: impl FnMut() + 'static, cleanup: impl FnMut() + 'static) {
        *self.model.borrow_mut() = Some(Fixture {
            setup: Box::new(setup),
            cleanup: Box::new(cleanup),
        });
    }

    pub fn register_implementation(
        &mut self,
        setup: impl FnMut() + 'static,
        cleanup: impl FnMut() + 'static,
    ) {
        *self.implementation.borrow_mut() = Some(Fixture {
            setup: Box::new(setup),
            cleanup: Box::new(cleanup),
        });
    }

    /// Append an operation to `thread`'s script. The closure must drive the
    /// structure the registered fixtures create.
    pub fn add_step(&mut self, thread: usize, run: impl Fn() -> i64 + 'static, name: impl Into<String>) {
        self.steps[thread].push(Step {
            run: Box::new(run),
            name: name.into(),
        });
    }

    pub fn num_threads(&self) -> usize {
        self.steps.len()
    }

    /// Build a checker whose trials run the scripted workload and verify
    /// every finished trial against the model.
    pub fn into_checker(self) -> Checker {
        let harness = Rc::new(self);
        let on_setup = harness.clone();
        let on_finish = harness.clone();
        Checker::new(
            move || {
                on_setup.setup();
                for thread in 0..on_setup.num_threads() {
                    let body = on_setup.clone();
                    start_thread(move || body.thread_body(thread));
                }
            },
            move || on_finish.finish(),
        )
    }

    /// Trial prologue: fresh implementation, empty call log.
    pub fn setup(&self) {
        (self
            .implementation
            .borrow_mut()
            .as_mut()
            .expect("no implementation registered")
            .setup)();
        self.state.borrow_mut().order.clear();
    }

    /// Trial epilogue: tear down the implementation and search for a
    /// witnessing linearization; none means a violation.
    pub fn finish(&self) {
        (self
            .implementation
            .borrow_mut()
            .as_mut()
            .expect("no implementation registered")
            .cleanup)();

        self.state.borrow_mut().linearization.clear();
        if !self.search() {
            found();
        }
    }

    /// Body of script thread `thread`: run its steps in order, logging
    /// results and clock vectors, annotating the trace as it goes.
    pub fn thread_body(&self, thread: usize) {
        for step in 0..self.steps[thread].len() {
            let actual = thread_id();
            let index = {
                let mut state = self.state.borrow_mut();
                state.order.push(CallRecord {
                    script_thread: thread,
                    actual_thread: actual,
                    step,
                    result: 0,
                    start_cv: get_clock_vector(actual),
                    end_cv: ClockVector::new(),
                    executed: false,
                });
                state.order.len() - 1
            };

            annotate(format!("Starting {}", self.steps[thread][step].name));
            let result = (self.steps[thread][step].run)();
            annotate(format!("-> {result}"));

            let mut state = self.state.borrow_mut();
            state.order[index].end_cv = get_clock_vector(actual);
            state.order[index].result = result;
        }
    }

    /// Replay the current candidate linearization against a fresh model and
    /// compare results.
    fn verify(&self) -> bool {
        let mut model = self.model.borrow_mut();
        let model = model.as_mut().expect("no model registered");
        (model.setup)();

        let plan: Vec<(usize, usize, i64)> = {
            let state = self.state.borrow();
            state
                .linearization
                .iter()
                .map(|&index| {
                    let record = &state.order[index];
                    (record.script_thread, record.step, record.result)
                })
                .collect()
        };

        let mut witnessed = true;
        for (thread, step, expected) in plan {
            if (self.steps[thread][step].run)() != expected {
                witnessed = false;
                break;
            }
        }

        (model.cleanup)();
        witnessed
    }

    /// Backtracking search for a linearization of the call log.
    fn search(&self) -> bool {
        if !self.verify() {
            return false;
        }

        let total = self.state.borrow().order.len();
        if self.state.borrow().order.iter().all(|record| record.executed) {
            return true;
        }

        for i in 0..total {
            let can = {
                let state = self.state.borrow();
                let order = &state.order;
                if order[i].executed {
                    continue;
                }

                let mut can = true;
                for j in 0..total {
                    if i == j || order[j].executed {
                        continue;
                    }

                    if order[i].script_thread == order[j].script_thread {
                        if j < i {
                            can = false;
                            break;
                        }
                        continue;
                    }

                    // i is not strictly before j iff i's end saw j's start.
                    let i_after_j = order[i].end_cv[order[j].actual_thread]
                        >= order[j].start_cv[order[j].actual_thread];
                    let j_after_i = order[j].end_cv[order[i].actual_thread]
                        >= order[i].start_cv[order[i].actual_thread];

                    if i_after_j && !j_after_i {
                        can = false;
                        break;
                    }
                }
                can
            };

            if can {
                {
                    let mut state = self.state.borrow_mut();
                    state.linearization.push(i);
                    state.order[i].executed = true;
                }
                let success = self.search();
                {
                    let mut state = self.state.borrow_mut();
                    state.order[i].executed = false;
                    state.linearization.pop();
                }
                if success {
                    return true;
                }
            }
        }

        false
    }
}
