/*
 * Precomputing Hashed Happens-Before History
 *
 * The outermost history layer. On every step it additionally caches the
 * first-conflict list of the recorded transition, computed against the
 * state just before the step, so that strategies replaying over past times
 * (the pinning search in particular) can read it back in O(1).
 *
 * This is the history type the runtime mounts; it forwards the full query
 * surface of the layers below.
 */

use crate::history::clock::ClockVector;
use crate::history::hhb::{HhbHistory, StateHash};
use crate::transition::Transition;
use crate::types::{ThreadId, Time};

pub struct PhhbHistory {
    hhb: HhbHistory,
    first_conflicts_at: Vec<Vec<Time>>,
}

impl PhhbHistory {
    pub fn new() -> PhhbHistory {
        PhhbHistory {
            hhb: HhbHistory::new(),
            first_conflicts_at: Vec::new(),
        }
    }

    pub fn add_transition(&mut self, thread: ThreadId, transition: &Transition) {
        // Cache against the pre-step state; the conflicts of a step do not
        // include the step itself.
        self.first_conflicts_at
            .push(self.hhb.hb().find_first_conflicts(thread, transition));
        self.hhb.add_transition(thread, transition);
    }

    pub fn reset(&mut self) {
        self.hhb.reset();
        self.first_conflicts_at.clear();
    }

    /// First-conflict list of the step at `time`, as of just before it ran.
    #[inline]
    pub fn first_conflicts_at(&self, time: Time) -> &[Time] {
        &self.first_conflicts_at[time as usize]
    }

    // ========================================================================
    // FORWARDED QUERIES
    // ========================================================================

    #[inline]
    pub fn len(&self) -> Time {
        self.hhb.hb().len()
    }

    #[inline]
    pub fn thread_at(&self, time: Time) -> ThreadId {
        self.hhb.hb().thread_at(time)
    }

    #[inline]
    pub fn transition_at(&self, time: Time) -> &Transition {
        self.hhb.hb().transition_at(time)
    }

    #[inline]
    pub fn previous_value_at(&self, time: Time) -> i64 {
        self.hhb.hb().previous_value_at(time)
    }

    #[inline]
    pub fn cv_at(&self, time: Time) -> &ClockVector {
        self.hhb.hb().cv_at(time)
    }

    #[inline]
    pub fn current_cv_for(&self, thread: ThreadId) -> ClockVector {
        self.hhb.hb().current_cv_for(thread)
    }

    #[inline]
    pub fn previous_time_of_thread_at(&self, time: Time) -> Time {
        self.hhb.hb().previous_time_of_thread_at(time)
    }

    #[inline]
    pub fn time_happens_before_time(&self, a: Time, b: Time) -> bool {
        self.hhb.hb().time_happens_before_time(a, b)
    }

    #[inline]
    pub fn time_happens_before_thread(&self, time: Time, thread: ThreadId) -> bool {
        self.hhb.hb().time_happens_before_thread(time, thread)
    }

    pub fn find_first_conflicts(&self, thread: ThreadId, transition: &Transition) -> Vec<Time> {
        self.hhb.hb().find_first_conflicts(thread, transition)
    }

    #[inline]
    pub fn is_split(&self, a: Time, b: Time) -> bool {
        self.hhb.hb().is_split(a, b)
    }

    #[inline]
    pub fn hash_at(&self, time: Time) -> StateHash {
        self.hhb.hash_at(time)
    }

    #[inline]
    pub fn current_hash_for(&self, thread: ThreadId) -> StateHash {
        self.hhb.current_hash_for(thread)
    }

    #[inline]
    pub fn combine_current_hashes(&self) -> StateHash {
        self.hhb.combine_current_hashes()
    }

    #[inline]
    pub fn combine_current_hashes_with_last(&self) -> StateHash {
        self.hhb.combine_current_hashes_with_last()
    }

    pub fn dump(&self, path: &std::path::Path) -> std::io::Result<()> {
        self.hhb.hb().dump(path)
    }
}

impl Default for PhhbHistory {
    fn default() -> PhhbHistory {
        PhhbHistory::new()
    }
}
