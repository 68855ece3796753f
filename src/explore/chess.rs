/*
 * Preemption-Bounded Search
 *
 * Depth-first exploration with a budget of preemptions: a step by a thread
 * other than the last one, while the last one was still runnable, spends
 * one. Bounds deepen iteratively from zero; the search is complete once an
 * iteration finishes without ever hitting its budget.
 *
 * Two optional prunings:
 *  - duplicate-state memoization keyed on the combined context hash plus
 *    last thread, revisiting a state only with strictly more budget left
 *  - never preempt away from a thread whose just-executed transition was
 *    atomic
 */

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::rc::Rc;

use crate::error::CheckResult;
use crate::history::StateHash;
use crate::runtime::Runtime;
use crate::trace::{TraceBuilder, TraceNode};

#[derive(Debug, Clone, Copy, Default)]
pub struct ChessOptions {
    /// Stop deepening past this bound; `None` runs until complete.
    pub max_preemptions: Option<i64>,
    pub prune_using_hash_table: bool,
    pub only_preempt_on_atomic: bool,
}

#[derive(Debug)]
pub struct ChessReport {
    /// Completed trials across all iterations.
    pub leaves: i64,
    /// Preemption bounds explored (final bound + 1).
    pub bounds_explored: i64,
    /// The last iteration never hit its budget.
    pub complete: bool,
}

struct Chess {
    options: ChessOptions,
    /// Best remaining budget each state has been visited with.
    seen: HashMap<StateHash, i64>,
    leaves: i64,
    bound_hit: bool,
}

pub fn run(rt: &Runtime, options: ChessOptions) -> CheckResult<ChessReport> {
    let mut builder = TraceBuilder::new(rt)?;
    let mut chess = Chess {
        options,
        seen: HashMap::new(),
        leaves: 0,
        bound_hit: false,
    };

    let mut bound = 0;
    loop {
        chess.bound_hit = false;
        let root = builder.root();
        chess.explore(rt, &mut builder, &root, bound)?;
        rt.dump_stats();

        if !chess.bound_hit {
            return Ok(ChessReport {
                leaves: chess.leaves,
                bounds_explored: bound + 1,
                complete: true,
            });
        }
        if let Some(max) = options.max_preemptions {
            if bound >= max {
                return Ok(ChessReport {
                    leaves: chess.leaves,
                    bounds_explored: bound + 1,
                    complete: false,
                });
            }
        }
        bound += 1;
    }
}

impl Chess {
    fn explore(
        &mut self,
        rt: &Runtime,
        builder: &mut TraceBuilder,
        node: &Rc<TraceNode>,
        remaining: i64,
    ) -> CheckResult<()> {
        if node.is_leaf() {
            self.leaves += 1;
            return Ok(());
        }

        if self.options.prune_using_hash_table {
            // The hash must describe this node's context, so make sure the
            // replay state actually sits at `node` (it already does except
            // at the start of a deepening iteration).
            builder.move_to(rt, node)?;
            let hash = rt.with_history(|history| history.combine_current_hashes_with_last());
            match self.seen.entry(hash) {
                Entry::Occupied(mut entry) => {
                    if *entry.get() >= remaining {
                        return Ok(());
                    }
                    entry.insert(remaining);
                }
                Entry::Vacant(entry) => {
                    entry.insert(remaining);
                }
            }
        }

        for thread in node.runnable() {
            let is_preemption = node.parent().is_some()
                && thread != node.last_thread()
                && node.runnable().count(node.last_thread());

            if is_preemption && remaining == 0 {
                self.bound_hit = true;
                continue;
            }

            if self.options.only_preempt_on_atomic && is_preemption {
                // The transition that produced this node is the parent's
                // pending transition along our incoming edge.
                let executed = node
                    .parent()
                    .expect("preemption at root")
                    .next_transition_of(node.last_thread());
                if executed.is_atomic() {
                    continue;
                }
            }

            builder.move_to(rt, node)?;
            let child = builder.extend(rt, thread)?;
            self.explore(rt, builder, &child, remaining - is_preemption as i64)?;
        }

        Ok(())
    }
}
