/*
 * Compile-time Configuration
 *
 * All sizing knobs for the checker live here: how many logical threads a
 * checked program may create, how big their coroutine stacks are, and how
 * large the per-address object table is. Runtime verbosity is a process-wide
 * bitflags word behind a spin lock, since test binaries drive independent
 * checkers from several OS threads.
 */

use bitflags::bitflags;
use spin::RwLock;

/// Maximum number of logical threads in a checked program.
///
/// Must stay <= 64 so a set of threads fits in one `u64` word.
pub const MAX_THREADS: usize = 32;

/// Stack size for each logical thread's coroutine, in bytes.
///
/// Checked programs run short straight-line bodies between interception
/// points, but Rust formatting machinery has fat frames, so this is kept
/// well above the minimum.
pub const STACK_SIZE: usize = 64 * 1024;

/// log2 of the per-address object table size.
pub const LOG_OBJECT_TABLE_SIZE: usize = 13;

/// Number of slots in the per-address object table.
pub const OBJECT_TABLE_SIZE: usize = 1 << LOG_OBJECT_TABLE_SIZE;

/// Size of the deterministic allocation arena, in bytes.
pub const ARENA_SIZE: usize = 1024 * 1024;

/// Default path for the structured dump of the first violating trace.
pub const DEFAULT_TRACE_PATH: &str = "data.py";

bitflags! {
    /// Runtime verbosity switches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DebugFlags: u32 {
        /// Echo every transition as it is recorded.
        const SHOW_ALL_TRANSITIONS = 1 << 0;
        /// Extra diagnostics from the exploration strategies.
        const SHOW_DEBUG_OUTPUT = 1 << 1;
        /// Let `program::output` through to stderr.
        const SHOW_PROGRAM_OUTPUT = 1 << 2;
    }
}

static DEBUG_FLAGS: RwLock<DebugFlags> = RwLock::new(DebugFlags::empty());

/// Replace the process-wide debug flags.
pub fn set_debug_flags(flags: DebugFlags) {
    *DEBUG_FLAGS.write() = flags;
}

/// Current process-wide debug flags.
pub fn debug_flags() -> DebugFlags {
    *DEBUG_FLAGS.read()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_sets_fit_in_a_word() {
        assert!(MAX_THREADS <= 64);
    }

    #[test]
    fn object_table_size_matches_its_log() {
        assert_eq!(OBJECT_TABLE_SIZE, 1 << LOG_OBJECT_TABLE_SIZE);
    }
}
