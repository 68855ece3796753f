/*
 * Exploration Strategies
 *
 * Drivers that decide which children of a trace node to expand and which
 * pending backtracks to schedule:
 *
 *   single  - one trial under the default schedule
 *   brute   - every interleaving
 *   chess   - iteratively deepened preemption bounding, optional
 *             duplicate-state pruning
 *   pct     - probabilistic priority scheduling
 *   dpor    - dynamic partial-order reduction with sleep sets
 *   pbpor   - preemption-bounded partial-order reduction
 *   cbdpor  - context-bounded partial-order reduction
 *   pinner  - clock-vector pinning search
 */

pub mod brute;
pub mod cbdpor;
pub mod chess;
pub mod dpor;
pub mod pbpor;
pub mod pct;
pub mod pinner;
pub mod single;

use crate::transition::Transition;
use crate::types::{ThreadMap, ThreadSet};

/// Threads whose pending transition conflicts with `transition`.
pub(crate) fn find_conflicting_threads(
    transitions: &ThreadMap<Transition>,
    transition: &Transition,
) -> ThreadSet {
    let mut conflicts = ThreadSet::new();
    for thread in transitions.keys() {
        if transitions[thread].conflicts_with(transition) {
            conflicts.insert(thread);
        }
    }
    conflicts
}
