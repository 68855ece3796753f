/*
 * Pinner - clock-vector pinning search
 *
 * Explores by reordering: a *pin* picks a past step and a clock-vector
 * fragment `c`, replays only the prior steps that do not happen after `c`,
 * executes the pinned thread's transition in that reduced context, and lets
 * the default policy finish the trial. Every step of the happens-before
 * past of the pin is then frozen (`fixed`), so later pins only rearrange
 * the still-free suffix.
 *
 * Choices at a state walk each free step's first-conflict list backwards,
 * distributing conflicts either into an ordered-before join `B` (they stay
 * in front of the pin) or into `c` (they move behind it), subject to the
 * pinned transition staying runnable and to first-seen/last-considered
 * bookkeeping that stops the same pin from being generated twice. Cost:
 * a pin is free while it keeps extending the same thread's run without an
 * intervening observation loop (see `is_split`); each non-free pin spends
 * one unit of a per-search budget, deepened iteratively by the caller.
 */

use std::collections::BTreeMap;
use std::mem;

use crate::config::{self, DebugFlags};
use crate::error::CheckResult;
use crate::history::{ClockVector, PhhbHistory};
use crate::runtime::Runtime;
use crate::types::{NO_TIME, ThreadId, ThreadMap, Time};

#[derive(Debug)]
pub struct PinnerReport {
    /// States visited across all cost bounds.
    pub states: i64,
    /// Cost bounds explored (final bound + 1).
    pub costs_explored: i64,
}

/// One explored scheduling state: a finished trial plus the pinning
/// bookkeeping that derived it.
struct PinnerState {
    history: PhhbHistory,
    /// Per time: depth of the pin chain at which the step first appeared.
    first_seen: Vec<i32>,
    /// Per time: guard against regenerating a pin already considered here.
    last_considered: Vec<i32>,
    /// Per time: frozen by an earlier pin's happens-before past.
    fixed: Vec<bool>,
    /// Per time: this step was itself a pin.
    is_a_pin: Vec<bool>,
    last_pin: ThreadMap<Time>,
    cost: i64,
    thread_cost: ThreadMap<i64>,
    depth: i32,
}

impl PinnerState {
    fn new() -> PinnerState {
        PinnerState {
            history: PhhbHistory::new(),
            first_seen: Vec::new(),
            last_considered: Vec::new(),
            fixed: Vec::new(),
            is_a_pin: Vec::new(),
            last_pin: ThreadMap::new(),
            cost: 0,
            thread_cost: ThreadMap::new(),
            depth: 0,
        }
    }

    fn prepare_for_new_run(&mut self) {
        self.first_seen.clear();
        self.last_considered.clear();
        self.fixed.clear();
        self.is_a_pin.clear();
        self.last_pin.clear();
        self.cost = 0;
        self.thread_cost.clear();
    }

    /// Record bookkeeping for the step just appended to `history` (which is
    /// mounted in the runtime while a trial runs, hence passed in).
    fn push(
        &mut self,
        history: &PhhbHistory,
        first_seen: i32,
        last_considered: i32,
        fixed: bool,
        is_a_pin: bool,
    ) {
        self.first_seen.push(first_seen);
        self.last_considered.push(last_considered);
        self.fixed.push(fixed);
        self.is_a_pin.push(is_a_pin);

        // Cost rule: only pins can cost, and a pin is free while the thread's
        // previous pin still leads this one without an observation split.
        if is_a_pin {
            let time = history.len() - 1;
            let thread = history.thread_at(time);

            let charge = match self.last_pin.get(thread) {
                None => true,
                Some(&previous) => history.is_split(previous, time),
            };
            if charge {
                self.cost += 1;
                self.thread_cost[thread] += 1;
            }
            self.last_pin[thread] = time;
        }
    }

    fn thread_cost_of(&self, thread: ThreadId) -> i64 {
        self.thread_cost.get(thread).copied().unwrap_or(0)
    }
}

/// A candidate pin: reorder the step at `time` to occur right after the
/// prefix of steps not happening after `c`.
struct Choice {
    time: Time,
    c: ClockVector,
}

pub struct Pinner {
    state_cache: Vec<PinnerState>,
    cost_histogram: BTreeMap<Vec<i64>, i64>,
    states: i64,
}

pub fn run(rt: &Runtime, max_cost: i64) -> CheckResult<PinnerReport> {
    let mut pinner = Pinner {
        state_cache: Vec::new(),
        cost_histogram: BTreeMap::new(),
        states: 0,
    };

    for cost in 0..=max_cost {
        let mut root = pinner.take_state();
        pinner.create_initial_state(rt, &mut root)?;
        pinner.cost_histogram.clear();

        pinner.explore(rt, &root, cost)?;

        rt.dump_stats();
        pinner.dump_histogram(cost);
        pinner.return_state(root);
    }

    rt.stats(|stats| stats.set("pinner-states", pinner.states));
    Ok(PinnerReport {
        states: pinner.states,
        costs_explored: max_cost + 1,
    })
}

impl Pinner {
    fn take_state(&mut self) -> PinnerState {
        self.state_cache.pop().unwrap_or_else(PinnerState::new)
    }

    fn return_state(&mut self, state: PinnerState) {
        self.state_cache.push(state);
    }

    /// One trial under the default sticky policy: keep the same thread
    /// running while it can, else the lowest runnable.
    fn create_initial_state(&mut self, rt: &Runtime, state: &mut PinnerState) -> CheckResult<()> {
        state.depth = 0;
        state.prepare_for_new_run();

        rt.replace_history(mem::take(&mut state.history));
        rt.start_new_run()?;

        let mut thread: Option<ThreadId> = None;
        while !rt.finished() {
            let runnable = rt.runnable();
            let next = match thread {
                Some(t) if runnable.count(t) => t,
                _ => runnable.first().expect("unfinished trial with no runnable thread"),
            };
            thread = Some(next);
            rt.advance_thread(next)?;
            rt.with_history(|history| state.push(history, state.depth, -1, false, false));
        }

        state.history = rt.replace_history(PhhbHistory::new());
        Ok(())
    }

    /// Produce the trial `choice` describes: replay the prefix of `old` that
    /// does not happen after `choice.c`, execute the pinned step in the new
    /// context, freeze its happens-before past, and finish with the default
    /// policy.
    fn pin(
        &mut self,
        rt: &Runtime,
        state: &mut PinnerState,
        choice: &Choice,
        old: &PinnerState,
    ) -> CheckResult<()> {
        let pin_thread = old.history.thread_at(choice.time);

        state.depth = old.depth + 1;
        state.prepare_for_new_run();

        rt.replace_history(mem::take(&mut state.history));
        rt.start_new_run()?;

        // For threads whose steps get displaced past the pin, remember the
        // last_considered of their first displaced step; their first re-run
        // step inherits it.
        let mut displaced_last_considered: ThreadMap<i32> = ThreadMap::new();

        for time in 0..old.history.len() {
            let thread = old.history.thread_at(time);

            if !old.history.cv_at(time).happens_after_any(&choice.c) {
                rt.advance_thread(thread)?;
                if time < choice.time {
                    rt.with_history(|history| {
                        state.push(
                            history,
                            old.first_seen[time as usize],
                            old.depth,
                            old.fixed[time as usize],
                            old.is_a_pin[time as usize],
                        )
                    });
                } else {
                    rt.with_history(|history| {
                        state.push(
                            history,
                            old.first_seen[time as usize],
                            old.last_considered[time as usize],
                            old.fixed[time as usize],
                            old.is_a_pin[time as usize],
                        )
                    });
                }
            } else if !displaced_last_considered.contains(thread) {
                displaced_last_considered[thread] = old.last_considered[time as usize];
            }
        }

        let pin_point = rt.history_len();
        rt.advance_thread(pin_thread)?;
        assert!(
            displaced_last_considered.contains(pin_thread),
            "pinned step was not displaced"
        );
        rt.with_history(|history| {
            state.push(
                history,
                state.depth,
                displaced_last_considered[pin_thread],
                true,
                true,
            )
        });
        displaced_last_considered.remove(pin_thread);

        for time in 0..pin_point {
            if rt.with_history(|history| history.time_happens_before_time(time, pin_point)) {
                state.fixed[time as usize] = true;
            }
        }

        let mut thread = pin_thread;
        while !rt.finished() {
            let runnable = rt.runnable();
            if !runnable.count(thread) {
                thread = runnable.first().expect("unfinished trial with no runnable thread");
            }
            rt.advance_thread(thread)?;

            if displaced_last_considered.contains(thread) {
                let inherited = displaced_last_considered[thread];
                rt.with_history(|history| state.push(history, state.depth, inherited, false, false));
                displaced_last_considered.remove(thread);
            } else {
                rt.with_history(|history| state.push(history, state.depth, -1, false, false));
            }
        }

        state.history = rt.replace_history(PhhbHistory::new());
        Ok(())
    }

    /// All pins applicable at `state` within `max_cost`.
    fn generate_choices(&self, state: &PinnerState, max_cost: i64) -> Vec<Choice> {
        let mut choices = Vec::new();

        for time in 0..state.history.len() {
            let thread = state.history.thread_at(time);

            if state.fixed[time as usize] {
                continue;
            }

            // Would a pin of this step necessarily cost a unit? If so and
            // the budget is spent, skip it outright.
            let already_nonfree = match state.last_pin.get(thread) {
                None => true,
                Some(&previous) => {
                    let before = state.history.previous_time_of_thread_at(time);
                    before != NO_TIME && state.history.is_split(previous, before)
                }
            };
            if already_nonfree && state.cost == max_cost {
                continue;
            }

            // Walk the conflict list newest-first.
            let mut conflicts = state.history.first_conflicts_at(time).to_vec();
            conflicts.reverse();

            let mut c = ClockVector::filled(Time::MAX);
            let mut fragments = Vec::new();
            self.consider_pin(
                state,
                &conflicts,
                0,
                &ClockVector::new(),
                false,
                &mut c,
                false,
                state.history.previous_value_at(time),
                time,
                max_cost,
                &mut fragments,
            );

            for c in fragments {
                choices.push(Choice { time, c });
            }
        }

        choices
    }

    /// Distribute `conflicts[index..]` between the ordered-before join `b`
    /// and the displacement fragment `c`; collect every complete assignment
    /// that leaves the pinned transition runnable.
    #[allow(clippy::too_many_arguments)]
    fn consider_pin(
        &self,
        state: &PinnerState,
        conflicts: &[Time],
        index: usize,
        b: &ClockVector,
        b_nonempty: bool,
        c: &mut ClockVector,
        c_nonempty: bool,
        value: i64,
        pin_time: Time,
        max_cost: i64,
        fragments: &mut Vec<ClockVector>,
    ) {
        // The first conflict picked must be news since the pin was last
        // considered; first_seen never decreases, so failing now fails for
        // every later pick too.
        let index_first_seen = if index < conflicts.len() {
            state.first_seen[conflicts[index] as usize]
        } else {
            0
        };
        if !b_nonempty && index_first_seen <= state.last_considered[pin_time as usize] {
            return;
        }

        // Ordering the pin directly after the picks so far requires it to be
        // runnable against the value it would then see.
        let mut can_put_in_b = b_nonempty
            || state
                .history
                .transition_at(pin_time)
                .determine_runnable(value);

        // At the cost ceiling, only fragments that keep this pin free are
        // worth extending.
        if index < conflicts.len() && state.cost == max_cost {
            let pin_thread = state.history.thread_at(pin_time);
            match state.last_pin.get(pin_thread) {
                Some(&previous_pin) => {
                    if state.history.cv_at(conflicts[index])[pin_thread] >= previous_pin {
                        can_put_in_b = false;
                    }
                }
                None => can_put_in_b = false,
            }
        }

        if index < conflicts.len() {
            let conflict = conflicts[index];

            if can_put_in_b {
                let mut new_b = *b;
                new_b.maximize(state.history.cv_at(conflict));
                self.consider_pin(
                    state,
                    conflicts,
                    index + 1,
                    &new_b,
                    true,
                    c,
                    c_nonempty,
                    state.history.previous_value_at(conflict),
                    pin_time,
                    max_cost,
                    fragments,
                );
            }

            let conflict_thread = state.history.thread_at(conflict);
            let can_put_in_c =
                b[conflict_thread] < conflict && !state.fixed[conflict as usize];
            if can_put_in_c {
                let saved = c[conflict_thread];
                c[conflict_thread] = conflict;
                self.consider_pin(
                    state,
                    conflicts,
                    index + 1,
                    b,
                    b_nonempty,
                    c,
                    true,
                    state.history.previous_value_at(conflict),
                    pin_time,
                    max_cost,
                    fragments,
                );
                c[conflict_thread] = saved;
            }
        } else if can_put_in_b && c_nonempty {
            fragments.push(*c);
        }
    }

    fn explore(&mut self, rt: &Runtime, state: &PinnerState, max_cost: i64) -> CheckResult<()> {
        self.states += 1;

        let mut costs: Vec<i64> = (0..crate::config::MAX_THREADS)
            .map(|i| state.thread_cost_of(ThreadId(i)))
            .collect();
        costs.sort();
        *self.cost_histogram.entry(costs).or_insert(0) += 1;

        if state.cost > max_cost {
            return Ok(());
        }

        let mut choices = self.generate_choices(state, max_cost);
        choices.reverse();
        for choice in choices {
            let mut next = self.take_state();
            self.pin(rt, &mut next, &choice, state)?;
            self.explore(rt, &next, max_cost)?;
            self.return_state(next);
        }
        Ok(())
    }

    fn dump_histogram(&self, cost: i64) {
        let verbose = config::debug_flags().contains(DebugFlags::SHOW_DEBUG_OUTPUT);
        let mut within_budget = 0;
        for (costs, count) in self.cost_histogram.iter() {
            let total: i64 = costs.iter().sum();
            if total <= cost {
                within_budget += count;
            }
            if verbose {
                log::debug!(
                    "[Pinner] histogram {:?} x {count}",
                    costs.iter().filter(|&&c| c != 0).collect::<Vec<_>>()
                );
            }
        }
        log::info!("[Pinner] runs within cost {cost}: {within_budget}");
    }
}
