/*
 * Program Interface
 *
 * The API a checked program uses to interact with the checker: starting
 * threads, attaching guards and annotations to its next operation, flagging
 * violations, and reading clock vectors. All calls resolve against the
 * runtime installed on the current OS thread; the memory-access shims and
 * cell types live in `mem`, cooperative locks in `sync`, and the
 * linearizability harness in `lin`.
 */

pub mod lin;
pub mod mem;
pub mod sync;

use core::fmt;

use crate::config::{self, DebugFlags};
use crate::history::ClockVector;
use crate::runtime;
use crate::types::ThreadId;

/// Start a new logical thread running `task`. Returns its id.
pub fn start_thread(task: impl FnOnce() + 'static) -> ThreadId {
    runtime::with(|rt| rt.start_thread(Box::new(task)))
}

/// Id of the calling logical thread, or the reserved original id when the
/// caller is not one of the managed coroutines.
pub fn thread_id() -> ThreadId {
    if runtime::is_installed() {
        runtime::with(|rt| rt.current_thread())
    } else {
        ThreadId::ORIGINAL
    }
}

/// Require that the caller's next transition produce `result`; until it
/// would, the thread is not runnable.
pub fn require_result(result: i64) {
    runtime::with(|rt| rt.require_result(result));
}

/// Attach a free-form annotation to the caller's next transition. May be
/// called several times; annotations accumulate.
pub fn annotate(text: impl Into<String>) {
    runtime::with(|rt| rt.annotate(text.into()));
}

/// Mark the current trial as a violation. Sticky until the trial ends.
pub fn found() {
    runtime::with(|rt| rt.found_bug());
}

/// Current clock vector of `thread`.
pub fn get_clock_vector(thread: ThreadId) -> ClockVector {
    runtime::with(|rt| rt.clock_vector_for(thread))
}

/// Voluntary scheduling hint. The checker already interleaves at every
/// shared-memory operation, so this is a no-op.
pub fn request_yield() {}

/// Checked-program output, gated by the program-output debug flag.
pub fn output(args: fmt::Arguments<'_>) {
    if config::debug_flags().contains(DebugFlags::SHOW_PROGRAM_OUTPUT) {
        eprint!("{args}");
    }
}
