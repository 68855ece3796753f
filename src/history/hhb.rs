/*
 * Hashed Happens-Before History
 *
 * Extends the happens-before record with a rolling 64-bit hash per thread.
 * The hash a thread carries summarizes everything in its happens-before
 * past, chained through the hashes of the threads it has observed. Two
 * execution points with equal combined hashes have (up to hash collisions)
 * the same context, which is what the duplicate-state pruning keys on.
 *
 * The hash input is a fixed-layout little-endian buffer: a 4-byte thread id
 * followed by one 8-byte hash per thread slot. The layout is load-bearing;
 * changing it changes which states collide.
 */

use std::hash::Hasher;

use twox_hash::XxHash64;

use crate::config::MAX_THREADS;
use crate::history::hb::HbHistory;
use crate::transition::Transition;
use crate::types::{NO_TIME, ThreadId, ThreadMap, Time};

pub type StateHash = u64;

const HASH_BUFFER_LEN: usize = 4 + 8 * MAX_THREADS;

fn hash_buffer(thread: i32, hashes: &[StateHash; MAX_THREADS]) -> StateHash {
    let mut buffer = [0u8; HASH_BUFFER_LEN];
    buffer[..4].copy_from_slice(&thread.to_le_bytes());
    for (i, hash) in hashes.iter().enumerate() {
        buffer[4 + 8 * i..4 + 8 * (i + 1)].copy_from_slice(&hash.to_le_bytes());
    }
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(&buffer);
    hasher.finish()
}

pub struct HhbHistory {
    hb: HbHistory,
    current_hash: ThreadMap<StateHash>,
    hash_at: Vec<StateHash>,
}

impl HhbHistory {
    pub fn new() -> HhbHistory {
        let mut history = HhbHistory {
            hb: HbHistory::new(),
            current_hash: ThreadMap::new(),
            hash_at: Vec::new(),
        };
        history.reset_hashes();
        history
    }

    fn reset_hashes(&mut self) {
        self.current_hash.clear();
        self.hash_at.clear();
        for i in 0..MAX_THREADS {
            self.current_hash[ThreadId(i)] = 0;
        }
    }

    pub fn add_transition(&mut self, thread: ThreadId, transition: &Transition) {
        self.hb.add_transition(thread, transition);

        // For every other thread, fold in its hash at the step this thread
        // most recently observed it; the stepping thread contributes its own
        // prior hash.
        let mut hashes = [0u64; MAX_THREADS];
        for i in 0..MAX_THREADS {
            let other = ThreadId(i);
            if other == thread {
                continue;
            }
            let time = self.hb.current_cv_for(thread)[other];
            hashes[i] = if time != NO_TIME {
                self.hash_at[time as usize]
            } else {
                0
            };
        }
        hashes[thread.index()] = self.current_hash[thread];

        let hash = hash_buffer(thread.index() as i32, &hashes);
        self.current_hash[thread] = hash;
        self.hash_at.push(hash);
    }

    pub fn reset(&mut self) {
        self.hb.reset();
        self.reset_hashes();
    }

    /// Hash of every thread's current hash: the summary of the whole state.
    pub fn combine_current_hashes(&self) -> StateHash {
        let mut buffer = [0u8; 8 * MAX_THREADS];
        for i in 0..MAX_THREADS {
            let hash = self.current_hash[ThreadId(i)];
            buffer[8 * i..8 * (i + 1)].copy_from_slice(&hash.to_le_bytes());
        }
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(&buffer);
        hasher.finish()
    }

    /// As `combine_current_hashes`, additionally folding in the id of the
    /// thread that stepped last. This is the key for duplicate-state pruning.
    pub fn combine_current_hashes_with_last(&self) -> StateHash {
        let mut hashes = [0u64; MAX_THREADS];
        for i in 0..MAX_THREADS {
            hashes[i] = self.current_hash[ThreadId(i)];
        }
        let last = if self.hb.len() > 0 {
            self.hb.thread_at(self.hb.len() - 1).index() as i32
        } else {
            -1
        };
        hash_buffer(last, &hashes)
    }

    #[inline]
    pub fn hash_at(&self, time: Time) -> StateHash {
        self.hash_at[time as usize]
    }

    #[inline]
    pub fn current_hash_for(&self, thread: ThreadId) -> StateHash {
        self.current_hash[thread]
    }

    #[inline]
    pub fn hb(&self) -> &HbHistory {
        &self.hb
    }
}

impl Default for HhbHistory {
    fn default() -> HhbHistory {
        HhbHistory::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(initial: i64) -> usize {
        Box::leak(Box::new(initial)) as *mut i64 as usize
    }

    #[test]
    fn identical_sequences_hash_identically() {
        let addr = cell(0);
        let write = Transition::write(addr, 8, 1, true, None);
        let read = Transition::read(addr, 8, true, None);

        let mut a = HhbHistory::new();
        a.add_transition(ThreadId(0), &write);
        a.add_transition(ThreadId(1), &read);
        let combined = a.combine_current_hashes_with_last();
        let hashes: Vec<StateHash> = (0..2).map(|t| a.hash_at(t)).collect();

        a.reset();
        a.add_transition(ThreadId(0), &write);
        a.add_transition(ThreadId(1), &read);
        assert_eq!(
            (0..2).map(|t| a.hash_at(t)).collect::<Vec<_>>(),
            hashes
        );
        assert_eq!(a.combine_current_hashes_with_last(), combined);
    }

    #[test]
    fn last_thread_distinguishes_combined_hashes() {
        let a_addr = cell(0);
        let b_addr = cell(0);

        // Same per-thread hashes can still differ in who moved last.
        let mut h = HhbHistory::new();
        h.add_transition(ThreadId(0), &Transition::write(a_addr, 8, 1, true, None));
        h.add_transition(ThreadId(1), &Transition::write(b_addr, 8, 1, true, None));
        let with_last = h.combine_current_hashes_with_last();
        let without = h.combine_current_hashes();
        assert_ne!(with_last, without);
    }

    #[test]
    fn observation_chains_through_conflicts() {
        let addr = cell(0);
        let mut h = HhbHistory::new();
        h.add_transition(ThreadId(0), &Transition::write(addr, 8, 1, true, None));
        let alone = h.current_hash_for(ThreadId(1));
        assert_eq!(alone, 0);

        // Thread 1 reads thread 0's write and absorbs its hash into its own.
        h.add_transition(ThreadId(1), &Transition::read(addr, 8, true, None));
        assert_ne!(h.current_hash_for(ThreadId(1)), 0);
        assert_ne!(h.current_hash_for(ThreadId(1)), h.current_hash_for(ThreadId(0)));
    }
}
