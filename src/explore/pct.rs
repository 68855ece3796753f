/*
 * Probabilistic Concurrency Testing
 *
 * Randomized trials with priority scheduling: every thread gets a random
 * initial priority, a handful of priority-change points are scattered
 * uniformly over the observed maximum program length, and each trial runs
 * the highest-priority runnable thread, demoting the running thread to the
 * lowest unused priority whenever a change point is crossed. Trials repeat
 * until enough have run to cover depth-`num_changes` bugs with 99%
 * probability.
 *
 * Seeded, so a given options value explores the same trial sequence every
 * time.
 */

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::MAX_THREADS;
use crate::error::CheckResult;
use crate::runtime::Runtime;
use crate::types::{ThreadId, ThreadMap, ThreadSet, Time};

#[derive(Debug, Clone, Copy)]
pub struct PctOptions {
    /// Number of priority-change points per trial; covers bugs whose
    /// triggering schedule needs this many forced switches.
    pub num_changes: usize,
    pub seed: u64,
}

impl Default for PctOptions {
    fn default() -> PctOptions {
        PctOptions {
            num_changes: 10,
            seed: 0,
        }
    }
}

#[derive(Debug)]
pub struct PctReport {
    pub trials: i64,
    pub max_program_length: i64,
}

fn highest_priority_thread(priority: &ThreadMap<i64>, runnable: ThreadSet) -> ThreadId {
    let mut best = None;
    let mut best_priority = i64::MIN;
    for thread in runnable {
        if priority[thread] > best_priority {
            best = Some(thread);
            best_priority = priority[thread];
        }
    }
    best.expect("no runnable thread")
}

fn run_once(
    rt: &Runtime,
    rng: &mut StdRng,
    num_changes: usize,
    max_program_length: i64,
) -> CheckResult<()> {
    // Random initial priorities: num_changes..num_changes+MAX_THREADS,
    // shuffled. The values below num_changes stay reserved for demotions.
    let mut priority: ThreadMap<i64> = ThreadMap::new();
    for i in 0..MAX_THREADS {
        priority[ThreadId(i)] = (num_changes + i) as i64;
    }
    for i in 0..MAX_THREADS {
        let j = rng.gen_range(0..=i);
        let tmp = priority[ThreadId(i)];
        priority[ThreadId(i)] = priority[ThreadId(j)];
        priority[ThreadId(j)] = tmp;
    }

    let mut changes: Vec<(Time, i64)> = (0..num_changes)
        .map(|i| (rng.gen_range(0..=max_program_length) as Time, i as i64))
        .collect();
    changes.sort();
    let mut changes = changes.into_iter().peekable();

    rt.start_new_run()?;
    while !rt.finished() {
        while let Some(&(at, demoted_priority)) = changes.peek() {
            if at != rt.history_len() {
                break;
            }
            let thread = highest_priority_thread(&priority, rt.runnable());
            priority[thread] = demoted_priority;
            changes.next();
        }

        let thread = highest_priority_thread(&priority, rt.runnable());
        rt.advance_thread(thread)?;
    }
    Ok(())
}

pub fn run(rt: &Runtime, options: PctOptions) -> CheckResult<PctReport> {
    rt.start_new_run()?;
    let num_threads = rt.next_transitions().len();
    if num_threads == 0 {
        rt.dump_stats();
        return Ok(PctReport {
            trials: 0,
            max_program_length: 0,
        });
    }

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut max_program_length: i64 = 0;
    let mut trials: i64 = 1;

    loop {
        run_once(rt, &mut rng, options.num_changes, max_program_length)?;
        max_program_length = max_program_length.max(rt.history_len() as i64);
        rt.stats(|stats| stats.set("max-program-length", max_program_length));

        // Probability one trial hits a depth-num_changes schedule.
        let p = 1.0
            / num_threads as f64
            / (max_program_length as f64).powi(options.num_changes as i32);
        let required_trials = if !(p > 1e-10) {
            1e10
        } else {
            (0.01f64).ln() / (1.0 - p).ln()
        };

        if trials as f64 > required_trials {
            break;
        }

        if trials % 1000 == 0 {
            rt.dump_stats();
        }
        trials += 1;
    }

    rt.dump_stats();
    Ok(PctReport {
        trials,
        max_program_length,
    })
}
