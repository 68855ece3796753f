/*
 * Preemption-Bounded Partial-Order Reduction
 *
 * The DPOR skeleton under a preemption budget. Preempting edges (switching
 * away from a still-runnable thread) are skipped once the budget is spent,
 * and only preempting children join the sleep set afterwards, since a
 * non-preempting continuation is never redundant under the bound.
 *
 * Backtrack insertions land both at the conflicting time and at the anchor
 * where that thread's uninterrupted run began (`begins`), so the reversal
 * stays reachable within the bound. Bounds deepen iteratively until an
 * iteration never hits its budget.
 */

use std::rc::Rc;

use crate::error::CheckResult;
use crate::explore::find_conflicting_threads;
use crate::runtime::Runtime;
use crate::trace::{TraceBuilder, TraceNode};
use crate::types::{ThreadId, ThreadSet, Time};

#[derive(Debug)]
pub struct PbporReport {
    pub leaves: i64,
    pub deadends: i64,
    pub bounds_explored: i64,
    pub complete: bool,
}

struct Pbpor {
    available: Vec<ThreadSet>,
    backtrack: Vec<ThreadSet>,
    /// Per depth: the time at which the thread stepping there began its
    /// current uninterrupted run.
    begins: Vec<Time>,
    leaves: i64,
    deadends: i64,
    bound_hit: bool,
}

pub fn run(rt: &Runtime) -> CheckResult<PbporReport> {
    let mut builder = TraceBuilder::new(rt)?;
    let mut search = Pbpor {
        available: Vec::new(),
        backtrack: Vec::new(),
        begins: Vec::new(),
        leaves: 0,
        deadends: 0,
        bound_hit: false,
    };

    let mut bound = 0;
    loop {
        search.bound_hit = false;
        let root = builder.root();
        search.explore(rt, &mut builder, &root, ThreadSet::new(), bound)?;
        rt.dump_stats();

        if !search.bound_hit {
            rt.stats(|stats| {
                stats.add("bpor-leaves", search.leaves);
                stats.add("bpor-deadends", search.deadends);
            });
            return Ok(PbporReport {
                leaves: search.leaves,
                deadends: search.deadends,
                bounds_explored: bound + 1,
                complete: true,
            });
        }
        bound += 1;
    }
}

impl Pbpor {
    fn backtrack_insert(&mut self, time: Time, thread: ThreadId) {
        let at = time as usize;
        if self.available[at].count(thread) {
            self.backtrack[at].insert(thread);
        } else {
            self.backtrack[at] = self.backtrack[at] | self.available[at];
        }
    }

    fn explore(
        &mut self,
        rt: &Runtime,
        builder: &mut TraceBuilder,
        node: &Rc<TraceNode>,
        mut sleep: ThreadSet,
        remaining: i64,
    ) -> CheckResult<()> {
        if node.is_leaf() {
            self.leaves += 1;
            return Ok(());
        }

        let available = node.runnable() - sleep;
        if available.is_empty() {
            self.deadends += 1;
            return Ok(());
        }
        self.available.push(available);
        let depth = self.available.len() - 1;

        let mut initial = ThreadSet::new();
        if node.parent().is_some() && available.count(node.last_thread()) {
            initial.insert(node.last_thread());
        } else {
            initial.insert(available.first().expect("available set empty"));
        }
        self.backtrack.push(initial);

        let mut done = ThreadSet::new();
        loop {
            let todo = self.backtrack[depth] - done;
            let Some(thread) = todo.first() else {
                break;
            };
            let transition = node.next_transition_of(thread);

            let is_preemption = node.parent().is_some()
                && thread != node.last_thread()
                && node.runnable().count(node.last_thread());
            if is_preemption && remaining == 0 {
                self.bound_hit = true;
                done.insert(thread);
                continue;
            }

            builder.move_to(rt, node)?;
            let conflicts =
                rt.with_history(|history| history.find_first_conflicts(thread, &transition));
            for time in conflicts {
                let still_runnable = rt.with_history(|history| {
                    transition.determine_runnable(history.previous_value_at(time))
                });
                if still_runnable {
                    self.backtrack_insert(time, thread);
                    self.backtrack_insert(self.begins[time as usize], thread);
                }
            }

            let new_sleep = sleep - find_conflicting_threads(node.next_transitions(), &transition);

            if node.parent().is_none() || node.last_thread() != thread {
                self.begins.push(rt.history_len());
            } else {
                self.begins.push(*self.begins.last().expect("begins stack empty"));
            }

            let child = builder.extend(rt, thread)?;
            self.explore(rt, builder, &child, new_sleep, remaining - is_preemption as i64)?;

            self.begins.pop();

            if is_preemption {
                sleep.insert(thread);
            }
            done.insert(thread);
        }

        self.available.pop();
        self.backtrack.pop();
        Ok(())
    }
}
