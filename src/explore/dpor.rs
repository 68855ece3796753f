/*
 * Dynamic Partial-Order Reduction
 *
 * Classic depth-first DPOR with sleep sets. Each node keeps an available
 * set (runnable minus sleeping) and a backtrack set seeded with the thread
 * that kept running, if it may. Expanding a thread inspects the first
 * conflicts of its transition: every prior conflicting step that could be
 * reordered after it earns a backtrack entry at its depth, so the reversed
 * order gets explored too. Threads already proven redundant sleep until a
 * conflicting transition wakes the search to them.
 */

use std::rc::Rc;

use crate::error::CheckResult;
use crate::explore::find_conflicting_threads;
use crate::runtime::Runtime;
use crate::trace::{TraceBuilder, TraceNode};
use crate::types::ThreadSet;

#[derive(Debug)]
pub struct DporReport {
    /// Completed trials (maximal interleavings explored).
    pub leaves: i64,
    /// Nodes whose whole available set was asleep.
    pub deadends: i64,
}

struct Dpor {
    available: Vec<ThreadSet>,
    backtrack: Vec<ThreadSet>,
    leaves: i64,
    deadends: i64,
}

pub fn run(rt: &Runtime) -> CheckResult<DporReport> {
    let mut builder = TraceBuilder::new(rt)?;
    let mut dpor = Dpor {
        available: Vec::new(),
        backtrack: Vec::new(),
        leaves: 0,
        deadends: 0,
    };

    let root = builder.root();
    dpor.explore(rt, &mut builder, &root, ThreadSet::new())?;

    rt.stats(|stats| {
        stats.add("dpor-leaves", dpor.leaves);
        stats.add("dpor-deadends", dpor.deadends);
    });
    rt.dump_stats();

    Ok(DporReport {
        leaves: dpor.leaves,
        deadends: dpor.deadends,
    })
}

impl Dpor {
    fn explore(
        &mut self,
        rt: &Runtime,
        builder: &mut TraceBuilder,
        node: &Rc<TraceNode>,
        mut sleep: ThreadSet,
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
            // Deeper expansions add to our backtrack set, so re-read it on
            // every pass.
            let todo = self.backtrack[depth] - done;
            let Some(thread) = todo.first() else {
                break;
            };
            let transition = node.next_transition_of(thread);

            builder.move_to(rt, node)?;
            let conflicts =
                rt.with_history(|history| history.find_first_conflicts(thread, &transition));
            for time in conflicts {
                let still_runnable = rt.with_history(|history| {
                    transition.determine_runnable(history.previous_value_at(time))
                });
                if still_runnable {
                    let at = time as usize;
                    if self.available[at].count(thread) {
                        self.backtrack[at].insert(thread);
                    } else {
                        self.backtrack[at] = self.backtrack[at] | self.available[at];
                    }
                }
            }

            let new_sleep = sleep - find_conflicting_threads(node.next_transitions(), &transition);

            let child = builder.extend(rt, thread)?;
            self.explore(rt, builder, &child, new_sleep)?;

            sleep.insert(thread);
            done.insert(thread);
        }

        self.available.pop();
        self.backtrack.pop();
        Ok(())
    }
}
