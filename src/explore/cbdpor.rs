/*
 * Context-Bounded Partial-Order Reduction
 *
 * The preemption-bounded skeleton with coarser backtracking: a node whose
 * last thread cannot continue starts with its whole available set in the
 * backtrack set, and a conflict overwrites the backtrack set at the
 * conflicting time with the full available set there. Coarser sets mean
 * more exploration per bound but no reliance on the fine-grained reversal
 * reachability argument. Bounds deepen iteratively until an iteration never
 * hits its budget.
 */

use std::rc::Rc;

use crate::error::CheckResult;
use crate::explore::find_conflicting_threads;
use crate::runtime::Runtime;
use crate::trace::{TraceBuilder, TraceNode};
use crate::types::ThreadSet;

#[derive(Debug)]
pub struct CbdporReport {
    pub leaves: i64,
    pub deadends: i64,
    pub bounds_explored: i64,
    pub complete: bool,
}

struct Cbdpor {
    available: Vec<ThreadSet>,
    backtrack: Vec<ThreadSet>,
    leaves: i64,
    deadends: i64,
    bound_hit: bool,
}

pub fn run(rt: &Runtime) -> CheckResult<CbdporReport> {
    let mut builder = TraceBuilder::new(rt)?;
    let mut search = Cbdpor {
        available: Vec::new(),
        backtrack: Vec::new(),
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
                stats.add("cbdpor-leaves", search.leaves);
                stats.add("cbdpor-deadends", search.deadends);
            });
            return Ok(CbdporReport {
                leaves: search.leaves,
                deadends: search.deadends,
                bounds_explored: bound + 1,
                complete: true,
            });
        }
        bound += 1;
    }
}

impl Cbdpor {
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
            initial = available;
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
                    let at = time as usize;
                    self.backtrack[at] = self.available[at];
                }
            }

            let new_sleep = sleep - find_conflicting_threads(node.next_transitions(), &transition);

            let child = builder.extend(rt, thread)?;
            self.explore(rt, builder, &child, new_sleep, remaining - is_preemption as i64)?;

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
