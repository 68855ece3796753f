/*
 * weft binary
 *
 * Runs the bundled demo program - five threads racing guarded
 * compare-and-swaps over one cell - under the strategy named on the
 * command line (default: cbdpor) and reports the exploration counters.
 */

use log::LevelFilter;

use weft::explore::{chess::ChessOptions, pct::PctOptions};
use weft::program::mem::Atomic;
use weft::program::{require_result, start_thread};
use weft::{CheckResult, Checker};

/// Five threads, each landing one guarded CAS in a value chain
/// 0 -> 1 -> 2 -> 0 -> 3 -> 0. The guards admit each thread exactly when
/// its CAS would succeed, so only the chain's linearizations are explored.
fn cas_chain_checker() -> Checker {
    let x = Atomic::<i64>::leaked(0);
    Checker::new(
        move || {
            x.store(0);
            for (expected, replacement) in [(0, 1), (1, 2), (2, 0), (0, 3), (3, 0)] {
                start_thread(move || {
                    require_result(expected);
                    while !x.cas(expected, replacement) {}
                });
            }
        },
        || {},
    )
}

fn run(checker: &Checker, strategy: &str) -> CheckResult<()> {
    match strategy {
        "single" => {
            let report = checker.run_single()?;
            log::info!("[Main] single: {} steps", report.steps);
        }
        "brute" => {
            let report = checker.run_brute_force()?;
            log::info!("[Main] brute force: {} interleavings", report.leaves);
        }
        "chess" => {
            let report = checker.run_chess(ChessOptions::default())?;
            log::info!(
                "[Main] chess: {} leaves over {} bounds (complete: {})",
                report.leaves,
                report.bounds_explored,
                report.complete
            );
        }
        "pct" => {
            let report = checker.run_pct(PctOptions {
                num_changes: 2,
                ..PctOptions::default()
            })?;
            log::info!(
                "[Main] pct: {} trials, max length {}",
                report.trials,
                report.max_program_length
            );
        }
        "dpor" => {
            let report = checker.run_dpor()?;
            log::info!(
                "[Main] dpor: {} leaves, {} dead ends",
                report.leaves,
                report.deadends
            );
        }
        "pbpor" => {
            let report = checker.run_pbpor()?;
            log::info!(
                "[Main] pbpor: {} leaves over {} bounds",
                report.leaves,
                report.bounds_explored
            );
        }
        "cbdpor" => {
            let report = checker.run_cbdpor()?;
            log::info!(
                "[Main] cbdpor: {} leaves over {} bounds",
                report.leaves,
                report.bounds_explored
            );
        }
        "pinner" => {
            let report = checker.run_pinner(3)?;
            log::info!("[Main] pinner: {} states", report.states);
        }
        other => {
            log::error!("[Main] unknown strategy '{other}'");
            std::process::exit(2);
        }
    }
    Ok(())
}

fn main() {
    weft::logger::init(LevelFilter::Info);

    let strategy = std::env::args().nth(1).unwrap_or_else(|| "cbdpor".into());
    let checker = cas_chain_checker();

    if let Err(error) = run(&checker, &strategy) {
        log::error!("[Main] checking aborted: {error}");
        checker.dump_stats();
        std::process::exit(1);
    }

    log::info!(
        "[Main] {} runs, {} violations, {} distinct end states",
        checker.runs(),
        checker.violations(),
        checker.distinct_end_states()
    );
    checker.dump_stats();
}
