/*
 * Base History
 *
 * The append-only record of one trial: which thread took each step, the
 * transition it executed, and the value that was in memory immediately
 * before execution. The previous value is captured at record time so that
 * "would this transition have been runnable under a different prefix?" can
 * be answered later without re-running the program.
 */

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::transition::Transition;
use crate::types::{ThreadId, Time};

pub struct BaseHistory {
    threads: Vec<ThreadId>,
    transitions: Vec<Transition>,
    previous_values: Vec<i64>,
}

impl BaseHistory {
    pub fn new() -> BaseHistory {
        BaseHistory {
            threads: Vec::new(),
            transitions: Vec::new(),
            previous_values: Vec::new(),
        }
    }

    /// Record a step. Must be called immediately before the transition's
    /// memory effect happens, while the pre-execution value is still in
    /// memory.
    pub fn add_transition(&mut self, thread: ThreadId, transition: &Transition) {
        self.threads.push(thread);
        self.previous_values.push(transition.read_mem());
        self.transitions.push(transition.clone());
    }

    pub fn reset(&mut self) {
        self.threads.clear();
        self.transitions.clear();
        self.previous_values.clear();
    }

    #[inline]
    pub fn len(&self) -> Time {
        self.threads.len() as Time
    }

    #[inline]
    pub fn thread_at(&self, time: Time) -> ThreadId {
        self.threads[time as usize]
    }

    #[inline]
    pub fn transition_at(&self, time: Time) -> &Transition {
        &self.transitions[time as usize]
    }

    #[inline]
    pub fn previous_value_at(&self, time: Time) -> i64 {
        self.previous_values[time as usize]
    }

    /// Write the structured trace: one record per annotation, then one per
    /// transition, as a python-syntax list of dicts.
    pub fn dump(&self, path: &Path) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        write!(out, "data = [")?;
        for time in 0..self.len() {
            if time > 0 {
                write!(out, ",\n")?;
            }

            let thread = self.thread_at(time);
            let transition = self.transition_at(time);

            if let Some(annotations) = transition.annotations() {
                for annotation in annotations.iter() {
                    write!(
                        out,
                        "{{'thread': {thread}, 'type': 'annotation', 'description': '{annotation}'}},\n",
                    )?;
                }
            }

            write!(out, "{}", transition.dump_record(thread, time, self.previous_value_at(time)))?;
        }
        write!(out, "]\n")?;
        out.flush()
    }
}

impl Default for BaseHistory {
    fn default() -> BaseHistory {
        BaseHistory::new()
    }
}
