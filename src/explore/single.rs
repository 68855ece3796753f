/*
 * Single Run
 *
 * One trial under the default schedule: always advance the lowest-numbered
 * runnable thread. Useful as a smoke test and as the baseline scheduling
 * policy other strategies start from.
 */

use crate::error::CheckResult;
use crate::runtime::Runtime;

#[derive(Debug)]
pub struct SingleReport {
    pub steps: i64,
}

pub fn run(rt: &Runtime) -> CheckResult<SingleReport> {
    rt.start_new_run()?;

    let mut steps = 0;
    while !rt.finished() {
        let thread = rt.runnable().first().expect("unfinished trial with no runnable thread");
        rt.advance_thread(thread)?;
        steps += 1;
    }

    rt.dump_stats();
    Ok(SingleReport { steps })
}
