/*
 * weft - stateless partial-order model checker
 *
 * Runs a multithreaded program over and over inside a single-threaded
 * cooperative scheduler, steering every shared-memory interleaving the
 * program can exhibit, and searches that space for assertion failures,
 * linearizability violations and deadlocks. When a violating interleaving
 * is found, the exact schedule is dumped for replay.
 *
 * A checked program talks to the checker through `program`: it starts
 * threads, performs its loads, stores, compare-and-swaps and
 * read-modify-writes through checked cells, and may attach guards and
 * annotations to its next operation. The exploration strategies in
 * `explore` - brute force, preemption bounding, probabilistic priorities,
 * partial-order reduction in three flavors, and a clock-vector pinning
 * search - decide which interleavings are worth running.
 *
 * ```no_run
 * use weft::{Checker, program};
 * use weft::program::mem::Atomic;
 *
 * let x = Atomic::<i64>::leaked(0);
 * let checker = Checker::new(
 *     move || {
 *         x.store(0);
 *         for arg in [1, 2] {
 *             program::start_thread(move || {
 *                 x.fetch_add(arg);
 *             });
 *         }
 *     },
 *     move || {
 *         if x.load() != 3 {
 *             program::found();
 *         }
 *     },
 * );
 * let report = checker.run_dpor().unwrap();
 * assert_eq!(checker.violations(), 0);
 * assert!(report.leaves > 0);
 * ```
 */

pub mod arena;
pub mod checker;
pub mod config;
pub mod error;
pub mod explore;
pub mod history;
pub mod logger;
pub mod program;
pub mod runtime;
mod sched;
pub mod stats;
pub mod trace;
pub mod transition;
pub mod types;

pub use checker::Checker;
pub use error::{CheckError, CheckResult};
pub use types::{ThreadId, ThreadMap, ThreadSet, Time};
