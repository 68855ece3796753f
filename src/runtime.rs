/*
 * Runtime - the interceptor between program and driver
 *
 * One Runtime owns everything a checker needs for a sequence of trials: the
 * cooperative scheduler, the mounted history, the deterministic arena, the
 * per-run interceptor state and the statistics. It is installed into a
 * scoped thread-local for the duration of a checking session so that both
 * the exploration driver (on the original context) and the checked
 * program's coroutines reach the same instance.
 *
 * Interior state lives behind RefCells. The invariant that keeps that
 * sound: no borrow is ever held across a context switch. Every operation
 * below is structured as borrow / decide / release / switch.
 */

use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::Arc;

use scoped_tls::scoped_thread_local;

use crate::arena::Arena;
use crate::config::{self, DebugFlags, MAX_THREADS};
use crate::error::{CheckError, CheckResult};
use crate::history::{ClockVector, PhhbHistory};
use crate::sched::Scheduler;
use crate::stats::Stats;
use crate::transition::Transition;
use crate::types::{ThreadId, ThreadMap, ThreadSet, Time};

scoped_thread_local!(static RUNTIME: Runtime);

/// Run `f` against the installed runtime. Panics outside a session.
pub fn with<R>(f: impl FnOnce(&Runtime) -> R) -> R {
    RUNTIME.with(f)
}

/// Is a runtime installed on this OS thread?
pub fn is_installed() -> bool {
    RUNTIME.is_set()
}

/// Out-of-band information attached to a thread's next transition.
#[derive(Default)]
struct PendingInfo {
    required: Option<i64>,
    annotations: Vec<String>,
}

struct RunState {
    alive: ThreadSet,
    runnable: ThreadSet,
    next_transitions: ThreadMap<Transition>,
    pending_info: [PendingInfo; MAX_THREADS],
    found_bug: bool,
    num_created: usize,
}

enum TrialEnd {
    Running,
    Finished,
    Deadlock,
}

pub struct Runtime {
    scheduler: Scheduler,
    state: RefCell<RunState>,
    history: RefCell<PhhbHistory>,
    setup: RefCell<Box<dyn FnMut()>>,
    finish: RefCell<Box<dyn FnMut()>>,
    arena: Arena,
    stats: RefCell<Stats>,
    trace_path: RefCell<PathBuf>,
}

impl Runtime {
    pub fn new(setup: impl FnMut() + 'static, finish: impl FnMut() + 'static) -> Runtime {
        let runtime = Runtime {
            scheduler: Scheduler::new(),
            state: RefCell::new(RunState {
                alive: ThreadSet::new(),
                runnable: ThreadSet::new(),
                next_transitions: ThreadMap::new(),
                pending_info: core::array::from_fn(|_| PendingInfo::default()),
                found_bug: false,
                num_created: 0,
            }),
            history: RefCell::new(PhhbHistory::new()),
            setup: RefCell::new(Box::new(setup)),
            finish: RefCell::new(Box::new(finish)),
            arena: Arena::new(),
            stats: RefCell::new(Stats::new()),
            trace_path: RefCell::new(PathBuf::from(config::DEFAULT_TRACE_PATH)),
        };
        runtime.arena.store_base();
        runtime
    }

    /// Install this runtime for the duration of `f`.
    pub fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        RUNTIME.set(self, f)
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn set_trace_path(&self, path: PathBuf) {
        *self.trace_path.borrow_mut() = path;
    }

    // ========================================================================
    // DRIVER INTERFACE
    // ========================================================================

    /// Begin a fresh trial: drain any threads left over from an abandoned
    /// replay, reset the mounted history and the arena, run the user setup
    /// callback, and collect every new thread's first pending transition.
    pub fn start_new_run(&self) -> CheckResult<()> {
        loop {
            let Some(thread) = self.state.borrow().runnable.first() else {
                break;
            };
            self.advance_thread(thread)?;
        }

        {
            let mut state = self.state.borrow_mut();
            assert!(
                state.alive.is_empty(),
                "threads survived the previous trial"
            );
            state.next_transitions.clear();
            state.runnable.clear();
            for info in state.pending_info.iter_mut() {
                *info = PendingInfo::default();
            }
            state.found_bug = false;
            state.num_created = 0;
        }
        self.history.borrow_mut().reset();
        self.arena.reset_to_base();
        self.stats.borrow_mut().bump("runs");

        (self.setup.borrow_mut())();

        self.switch_to_next();
        self.compute_runnable()
    }

    /// Execute one step of `thread`: record its pending transition, resume
    /// its coroutine until the next interception point or its death, and
    /// recompute the runnable set.
    pub fn advance_thread(&self, thread: ThreadId) -> CheckResult<()> {
        let transition = {
            let mut state = self.state.borrow_mut();
            assert!(state.alive.count(thread), "advancing a dead thread");
            assert!(
                state.runnable.count(thread),
                "advancing a non-runnable thread"
            );
            state.next_transitions.remove(thread)
        };

        // The pre-execution value is captured here; recording must stay
        // immediately before the coroutine performs the memory effect.
        self.history.borrow_mut().add_transition(thread, &transition);
        self.stats.borrow_mut().bump("transitions");

        if config::debug_flags().contains(DebugFlags::SHOW_ALL_TRANSITIONS) {
            let step = self.history.borrow().len() - 1;
            log::debug!(
                "[Runtime] {step:3} [{thread:>2}]: {}",
                transition.format(transition.read_mem())
            );
        }

        self.scheduler.switch_to(thread);
        self.compute_runnable()
    }

    /// Threads whose pending transition would currently be admitted.
    pub fn runnable(&self) -> ThreadSet {
        self.state.borrow().runnable
    }

    /// Snapshot of every pending transition.
    pub fn next_transitions(&self) -> ThreadMap<Transition> {
        self.state.borrow().next_transitions.clone()
    }

    /// No threads alive: the trial has ended.
    pub fn finished(&self) -> bool {
        self.state.borrow().alive.is_empty()
    }

    pub fn current_thread(&self) -> ThreadId {
        self.scheduler.current_thread()
    }

    // ========================================================================
    // PROGRAM INTERFACE
    // ========================================================================

    /// Register a new logical thread running `task`. Valid from the setup
    /// callback or from a running coroutine.
    pub fn start_thread(&self, task: Box<dyn FnOnce()>) -> ThreadId {
        let thread = {
            let mut state = self.state.borrow_mut();
            assert!(state.num_created < MAX_THREADS, "too many threads");
            let thread = ThreadId(state.num_created);
            state.num_created += 1;
            state.alive.insert(thread);
            thread
        };

        self.scheduler.add_thread(
            thread,
            Box::new(move || {
                task();
                with(|rt| rt.retire_current_thread());
            }),
        );

        thread
    }

    /// Called from a coroutine immediately before its next shared-memory
    /// operation: decorate the transition with any out-of-band guard or
    /// annotations, park it, and hand control onward.
    pub fn reached_transition(&self, mut transition: Transition) {
        let thread = self.scheduler.current_thread();
        {
            let mut state = self.state.borrow_mut();
            let info = &mut state.pending_info[thread.index()];
            if let Some(required) = info.required.take() {
                transition.set_required(required);
            }
            if !info.annotations.is_empty() {
                transition.set_annotations(Arc::new(std::mem::take(&mut info.annotations)));
            }
            assert!(
                !state.next_transitions.contains(thread),
                "thread {thread} already has a pending transition"
            );
            state.next_transitions[thread] = transition;
        }
        self.switch_to_next();
    }

    /// Attach a required-result guard to the calling thread's next
    /// transition. Ignored off-coroutine.
    pub fn require_result(&self, required: i64) {
        let thread = self.scheduler.current_thread();
        if thread.is_original() {
            return;
        }
        self.state.borrow_mut().pending_info[thread.index()].required = Some(required);
    }

    /// Attach an annotation to the calling thread's next transition.
    /// Ignored off-coroutine.
    pub fn annotate(&self, text: String) {
        let thread = self.scheduler.current_thread();
        if thread.is_original() {
            return;
        }
        self.state.borrow_mut().pending_info[thread.index()]
            .annotations
            .push(text);
    }

    /// Sticky per-trial violation flag.
    pub fn found_bug(&self) {
        self.state.borrow_mut().found_bug = true;
    }

    pub fn has_found_bug(&self) -> bool {
        self.state.borrow().found_bug
    }

    pub fn clock_vector_for(&self, thread: ThreadId) -> ClockVector {
        self.history.borrow().current_cv_for(thread)
    }

    pub fn alloc(&self, size: usize) -> usize {
        self.arena.alloc(size)
    }

    // ========================================================================
    // HISTORY AND STATISTICS ACCESS
    // ========================================================================

    pub fn with_history<R>(&self, f: impl FnOnce(&PhhbHistory) -> R) -> R {
        f(&self.history.borrow())
    }

    pub fn history_len(&self) -> Time {
        self.history.borrow().len()
    }

    /// Swap the mounted history, returning the previous one. The pinning
    /// strategy mounts each search state's own history for its run.
    pub fn replace_history(&self, history: PhhbHistory) -> PhhbHistory {
        self.history.replace(history)
    }

    pub fn stats<R>(&self, f: impl FnOnce(&mut Stats) -> R) -> R {
        f(&mut self.stats.borrow_mut())
    }

    pub fn dump_stats(&self) {
        self.stats.borrow().dump_to_stderr();
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    /// Hand control to a thread whose first transition is still unknown, or
    /// back to the driver if every alive thread has deposited one.
    fn switch_to_next(&self) {
        let target = {
            let state = self.state.borrow();
            let unknown = state.alive - state.next_transitions.keys();
            unknown.first().unwrap_or(ThreadId::ORIGINAL)
        };
        self.scheduler.switch_to(target);
    }

    /// Final act of every coroutine: leave the alive set and hand control
    /// onward. Never returns.
    fn retire_current_thread(&self) {
        let thread = self.scheduler.current_thread();
        self.state.borrow_mut().alive.erase(thread);
        self.switch_to_next();
        unreachable!("retired coroutine resumed");
    }

    /// Recompute the runnable set; detect trial end and deadlock.
    fn compute_runnable(&self) -> CheckResult<()> {
        let end = {
            let state = &mut *self.state.borrow_mut();
            state.runnable.clear();
            for thread in state.next_transitions.keys() {
                if state.next_transitions[thread].determine_runnable_now() {
                    state.runnable.insert(thread);
                }
            }
            if state.alive.is_empty() {
                TrialEnd::Finished
            } else if state.runnable.is_empty() {
                TrialEnd::Deadlock
            } else {
                TrialEnd::Running
            }
        };

        match end {
            TrialEnd::Running => Ok(()),
            TrialEnd::Finished => {
                self.finalize_run();
                Ok(())
            }
            TrialEnd::Deadlock => {
                let alive = self.state.borrow().alive.len();
                log::error!("[Runtime] deadlock: {alive} threads alive, none runnable");
                self.dump_trace("deadlock");
                Err(CheckError::Deadlock)
            }
        }
    }

    /// Trial epilogue: user finish callback, then violation and end-state
    /// bookkeeping.
    fn finalize_run(&self) {
        (self.finish.borrow_mut())();

        if self.state.borrow().found_bug {
            let first = self.stats.borrow_mut().add("found", 1) == 0;
            if first {
                self.dump_trace("violation");
                let runs = self.stats.borrow().get("runs");
                self.stats.borrow_mut().set("first_found", runs);
            }
        }

        let hash = self.history.borrow().combine_current_hashes();
        self.stats.borrow_mut().note_end_state(hash);
    }

    fn dump_trace(&self, why: &str) {
        let path = self.trace_path.borrow().clone();
        match self.history.borrow().dump(&path) {
            Ok(()) => log::info!("[Runtime] dumped {why} trace to {}", path.display()),
            Err(err) => log::warn!("[Runtime] failed to dump {why} trace: {err}"),
        }
    }
}
