/*
 * Brute Force
 *
 * Expand every runnable child of every node: enumerates each interleaving
 * exactly once. Only viable for tiny programs; the baseline the reduction
 * strategies are measured against.
 */

use std::rc::Rc;

use crate::error::CheckResult;
use crate::runtime::Runtime;
use crate::trace::{TraceBuilder, TraceNode};

#[derive(Debug)]
pub struct BruteReport {
    pub leaves: i64,
}

pub fn run(rt: &Runtime) -> CheckResult<BruteReport> {
    let mut builder = TraceBuilder::new(rt)?;
    let mut report = BruteReport { leaves: 0 };
    let root = builder.root();
    explore(rt, &mut builder, &root, &mut report)?;
    rt.dump_stats();
    Ok(report)
}

fn explore(
    rt: &Runtime,
    builder: &mut TraceBuilder,
    node: &Rc<TraceNode>,
    report: &mut BruteReport,
) -> CheckResult<()> {
    if node.is_leaf() {
        report.leaves += 1;
        builder.move_to(rt, node)?;
        return Ok(());
    }

    for thread in node.runnable() {
        builder.move_to(rt, node)?;
        let child = builder.extend(rt, thread)?;
        explore(rt, builder, &child, report)?;
    }
    Ok(())
}
