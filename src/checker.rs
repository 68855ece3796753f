/*
 * Checker Facade
 *
 * One Checker owns a runtime configured with a program's setup and finish
 * callbacks and exposes the exploration strategies over it. Strategy runs
 * install the runtime into the scoped thread-local for their duration, so
 * independent checkers on different OS threads never interact.
 */

use std::path::PathBuf;

use crate::error::CheckResult;
use crate::explore::{
    brute, cbdpor, chess, dpor, pbpor, pct, pinner, single,
};
use crate::runtime::Runtime;

pub struct Checker {
    runtime: Runtime,
}

impl Checker {
    /// `setup` is invoked at the start of every trial and must start the
    /// program's threads; `finish` is invoked when a trial's last thread
    /// ends and may inspect results and call `program::found`.
    pub fn new(setup: impl FnMut() + 'static, finish: impl FnMut() + 'static) -> Checker {
        Checker {
            runtime: Runtime::new(setup, finish),
        }
    }

    /// Where the first violating (or deadlocking) trace gets dumped.
    pub fn trace_path(self, path: impl Into<PathBuf>) -> Checker {
        self.runtime.set_trace_path(path.into());
        self
    }

    /// Install this checker's runtime and run `f`. The entry point for
    /// driving the runtime by hand; the strategy methods below use it too.
    pub fn enter<R>(&self, f: impl FnOnce(&Runtime) -> R) -> R {
        self.runtime.enter(|| f(&self.runtime))
    }

    // ========================================================================
    // STRATEGIES
    // ========================================================================

    /// One trial under the default schedule.
    pub fn run_single(&self) -> CheckResult<single::SingleReport> {
        self.enter(single::run)
    }

    /// Every interleaving.
    pub fn run_brute_force(&self) -> CheckResult<brute::BruteReport> {
        self.enter(brute::run)
    }

    /// Iteratively deepened preemption bounding.
    pub fn run_chess(&self, options: chess::ChessOptions) -> CheckResult<chess::ChessReport> {
        self.enter(|rt| chess::run(rt, options))
    }

    /// Probabilistic priority scheduling.
    pub fn run_pct(&self, options: pct::PctOptions) -> CheckResult<pct::PctReport> {
        self.enter(|rt| pct::run(rt, options))
    }

    /// Dynamic partial-order reduction with sleep sets.
    pub fn run_dpor(&self) -> CheckResult<dpor::DporReport> {
        self.enter(dpor::run)
    }

    /// Preemption-bounded partial-order reduction, iteratively deepened.
    pub fn run_pbpor(&self) -> CheckResult<pbpor::PbporReport> {
        self.enter(pbpor::run)
    }

    /// Context-bounded partial-order reduction, iteratively deepened.
    pub fn run_cbdpor(&self) -> CheckResult<cbdpor::CbdporReport> {
        self.enter(cbdpor::run)
    }

    /// Clock-vector pinning search up to `max_cost`.
    pub fn run_pinner(&self, max_cost: i64) -> CheckResult<pinner::PinnerReport> {
        self.enter(|rt| pinner::run(rt, max_cost))
    }

    // ========================================================================
    // RESULTS
    // ========================================================================

    /// Trials executed so far.
    pub fn runs(&self) -> i64 {
        self.runtime.stats(|stats| stats.get("runs"))
    }

    /// Trials that flagged a violation.
    pub fn violations(&self) -> i64 {
        self.runtime.stats(|stats| stats.get("found"))
    }

    /// Trial number of the first violation, or 0.
    pub fn first_violation(&self) -> i64 {
        self.runtime.stats(|stats| stats.get("first_found"))
    }

    /// Distinct end states seen across trials.
    pub fn distinct_end_states(&self) -> i64 {
        self.runtime.stats(|stats| stats.get("distinct"))
    }

    /// Transitions executed across all trials.
    pub fn transitions(&self) -> i64 {
        self.runtime.stats(|stats| stats.get("transitions"))
    }

    pub fn dump_stats(&self) {
        self.runtime.dump_stats();
    }
}
