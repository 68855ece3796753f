/*
 * Statistics Registry
 *
 * Named counters for one checker: trial counts, transition counts,
 * violations, distinct end states, and whatever the strategies add. Dumped
 * as a single JSON-like line to stderr at trial-boundary checkpoints.
 */

use std::collections::{BTreeMap, HashSet};

use crate::history::StateHash;

pub struct Stats {
    counters: BTreeMap<&'static str, i64>,
    seen_states: HashSet<StateHash>,
}

impl Stats {
    pub fn new() -> Stats {
        Stats {
            counters: BTreeMap::new(),
            seen_states: HashSet::new(),
        }
    }

    pub fn bump(&mut self, name: &'static str) -> i64 {
        self.add(name, 1)
    }

    /// Add `delta` and return the value before the addition.
    pub fn add(&mut self, name: &'static str, delta: i64) -> i64 {
        let entry = self.counters.entry(name).or_insert(0);
        let before = *entry;
        *entry += delta;
        before
    }

    pub fn set(&mut self, name: &'static str, value: i64) {
        self.counters.insert(name, value);
    }

    pub fn get(&self, name: &'static str) -> i64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Record a trial's end-state hash; returns true (and counts it) the
    /// first time the state is seen.
    pub fn note_end_state(&mut self, hash: StateHash) -> bool {
        if self.seen_states.insert(hash) {
            self.bump("distinct");
            true
        } else {
            false
        }
    }

    pub fn dump_line(&self) -> String {
        let mut line = String::from("{");
        for (i, (name, value)) in self.counters.iter().enumerate() {
            if i > 0 {
                line.push_str(", ");
            }
            line.push_str(&format!("'{name}': {value}"));
        }
        line.push('}');
        line
    }

    pub fn dump_to_stderr(&self) {
        eprintln!("{}", self.dump_line());
    }
}

impl Default for Stats {
    fn default() -> Stats {
        Stats::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let mut stats = Stats::new();
        assert_eq!(stats.bump("runs"), 0);
        assert_eq!(stats.bump("runs"), 1);
        stats.add("transitions", 5);
        assert_eq!(stats.get("runs"), 2);
        assert_eq!(stats.get("transitions"), 5);
        assert_eq!(stats.get("absent"), 0);
    }

    #[test]
    fn end_states_count_distinct_hashes() {
        let mut stats = Stats::new();
        assert!(stats.note_end_state(1));
        assert!(!stats.note_end_state(1));
        assert!(stats.note_end_state(2));
        assert_eq!(stats.get("distinct"), 2);
    }

    #[test]
    fn dump_is_one_sorted_line() {
        let mut stats = Stats::new();
        stats.set("runs", 3);
        stats.set("found", 1);
        assert_eq!(stats.dump_line(), "{'found': 1, 'runs': 3}");
    }
}
