/*
 * Happens-Before History
 *
 * Extends the base record with the ordering structure of the trial:
 * per-thread clock vectors, the clock vector at each step, per-location
 * access/write time lists with their clock-vector joins, and the previous
 * step of each stepping thread.
 *
 * Recording rule for a step by thread T on object O at time t:
 *   - writes join T's vector with O's access join (ordering the write after
 *     every earlier access); reads join with O's write join (ordering the
 *     read after every earlier write, but not after other reads)
 *   - T's own slot becomes t, and the result is stored as cv_at[t]
 *   - O's joins absorb T's vector; the access list (and for writes, the
 *     write list) gets t appended
 */

use crate::history::base::BaseHistory;
use crate::history::clock::ClockVector;
use crate::history::objects::ObjectTable;
use crate::transition::Transition;
use crate::types::{NO_TIME, ThreadId, ThreadMap, Time};

pub struct HbHistory {
    base: BaseHistory,
    objects: ObjectTable,
    cv_at: Vec<ClockVector>,
    current_cv: ThreadMap<ClockVector>,
    previous_time_of_thread: Vec<Time>,
    last_time_of: ThreadMap<Time>,
}

impl HbHistory {
    pub fn new() -> HbHistory {
        let mut history = HbHistory {
            base: BaseHistory::new(),
            objects: ObjectTable::new(),
            cv_at: Vec::new(),
            current_cv: ThreadMap::new(),
            previous_time_of_thread: Vec::new(),
            last_time_of: ThreadMap::new(),
        };
        history.reset_tracking();
        history
    }

    fn reset_tracking(&mut self) {
        self.objects.reset();
        self.cv_at.clear();
        self.current_cv.clear();
        self.previous_time_of_thread.clear();
        self.last_time_of.clear();
        for i in 0..crate::config::MAX_THREADS {
            self.current_cv[ThreadId(i)] = ClockVector::new();
            self.last_time_of[ThreadId(i)] = NO_TIME;
        }
    }

    pub fn add_transition(&mut self, thread: ThreadId, transition: &Transition) {
        self.base.add_transition(thread, transition);

        let time = self.base.len() - 1;
        let object = self.objects.entry(transition.address());

        self.current_cv[thread][thread] = time;

        if transition.can_write() {
            self.current_cv[thread].maximize(&object.access_cv);
            object.access_cv.maximize(&self.current_cv[thread]);
            object.write_cv.maximize(&self.current_cv[thread]);
            object.accesses.push(time);
            object.writes.push(time);
        } else {
            self.current_cv[thread].maximize(&object.write_cv);
            object.access_cv.maximize(&self.current_cv[thread]);
            object.accesses.push(time);
        }

        self.cv_at.push(self.current_cv[thread]);

        self.previous_time_of_thread.push(self.last_time_of[thread]);
        self.last_time_of[thread] = time;
    }

    pub fn reset(&mut self) {
        self.base.reset();
        self.reset_tracking();
    }

    // ========================================================================
    // HAPPENS-BEFORE QUERIES
    // ========================================================================

    /// Did step `a` happen before step `b`?
    #[inline]
    pub fn time_happens_before_time(&self, a: Time, b: Time) -> bool {
        let thread = self.thread_at(a);
        self.cv_at[b as usize][thread] >= self.cv_at[a as usize][thread]
    }

    /// Is step `time` in the happens-before past of `thread`'s current point?
    #[inline]
    pub fn time_happens_before_thread(&self, time: Time, thread: ThreadId) -> bool {
        let other = self.thread_at(time);
        self.current_cv[thread][other] >= self.cv_at[time as usize][other]
    }

    /// Every earlier step that conflicts with `transition` and is not already
    /// in `thread`'s happens-before past: the minimal set of prior
    /// conflicting events that could still be reordered after it.
    pub fn find_first_conflicts(&self, thread: ThreadId, transition: &Transition) -> Vec<Time> {
        let Some(object) = self.objects.lookup(transition.address()) else {
            return Vec::new();
        };

        let conflicts = if transition.can_write() {
            &object.accesses
        } else {
            &object.writes
        };

        conflicts
            .iter()
            .copied()
            .filter(|&time| !self.time_happens_before_thread(time, thread))
            .collect()
    }

    /// Between `a` and `b`, did the thread stepping at `b` observe some other
    /// thread that had itself observed the stepping thread at or after `a`?
    pub fn is_split(&self, a: Time, b: Time) -> bool {
        let thread = self.thread_at(b);
        for i in 0..crate::config::MAX_THREADS {
            let other = ThreadId(i);
            if other == thread {
                continue;
            }
            let seen_them = self.cv_at(b)[other];
            if seen_them != NO_TIME {
                let seen_us = self.cv_at(seen_them)[thread];
                if seen_us >= a {
                    return true;
                }
            }
        }
        false
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    #[inline]
    pub fn cv_at(&self, time: Time) -> &ClockVector {
        &self.cv_at[time as usize]
    }

    #[inline]
    pub fn current_cv_for(&self, thread: ThreadId) -> ClockVector {
        self.current_cv[thread]
    }

    /// The step the thread of `time` took just before `time`, or NO_TIME.
    #[inline]
    pub fn previous_time_of_thread_at(&self, time: Time) -> Time {
        self.previous_time_of_thread[time as usize]
    }

    #[inline]
    pub fn len(&self) -> Time {
        self.base.len()
    }

    #[inline]
    pub fn thread_at(&self, time: Time) -> ThreadId {
        self.base.thread_at(time)
    }

    #[inline]
    pub fn transition_at(&self, time: Time) -> &Transition {
        self.base.transition_at(time)
    }

    #[inline]
    pub fn previous_value_at(&self, time: Time) -> i64 {
        self.base.previous_value_at(time)
    }

    pub fn dump(&self, path: &std::path::Path) -> std::io::Result<()> {
        self.base.dump(path)
    }
}

impl Default for HbHistory {
    fn default() -> HbHistory {
        HbHistory::new()
    }
}
