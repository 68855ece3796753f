/*
 * Transition - one shared-memory operation
 *
 * A Transition is a plain value describing the next shared-memory operation
 * a thread is about to perform: what kind of access, where, how wide, and
 * with which operands. It can predict its own outcome against a given memory
 * value (`determine_result`), decide whether it would be admitted by a
 * required-result guard (`determine_runnable`), and perform the raw memory
 * effect (`read` / `write`).
 */

use core::fmt;
use std::sync::Arc;

/// The kind of shared-memory operation a transition performs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransitionKind {
    Read,
    Write,
    Cas,
    /// Read that reports whether the value is >= a threshold.
    ReadGe,
    AtomicRmw,
}

/// Sub-operation of an atomic read-modify-write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RmwOp {
    Xchg,
    Add,
    Sub,
}

impl RmwOp {
    pub fn from_code(code: i64) -> RmwOp {
        match code {
            0 => RmwOp::Xchg,
            1 => RmwOp::Add,
            2 => RmwOp::Sub,
            _ => panic!("unknown rmw sub-operation {code}"),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            RmwOp::Xchg => 0,
            RmwOp::Add => 1,
            RmwOp::Sub => 2,
        }
    }
}

/// Outcome of executing a transition against a current memory value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Value the operation reports to the program.
    pub returned: i64,
    /// Value stored back, if the operation writes.
    pub written: Option<i64>,
}

/// One pending shared-memory operation, with everything needed to replay it.
#[derive(Debug, Clone, Default)]
pub struct Transition {
    kind: Option<TransitionKind>,
    address: usize,
    length: u32,
    arg0: i64,
    arg1: i64,
    is_atomic: bool,
    required: Option<i64>,
    annotations: Option<Arc<Vec<String>>>,
    source_tag: Option<&'static str>,
}

impl Transition {
    fn raw(
        kind: TransitionKind,
        address: usize,
        length: u32,
        arg0: i64,
        arg1: i64,
        is_atomic: bool,
        source_tag: Option<&'static str>,
    ) -> Transition {
        assert!(
            matches!(length, 1 | 2 | 4 | 8),
            "unsupported transition length {length}"
        );
        Transition {
            kind: Some(kind),
            address,
            length,
            arg0,
            arg1,
            is_atomic,
            required: None,
            annotations: None,
            source_tag,
        }
    }

    pub fn read(address: usize, length: u32, is_atomic: bool, tag: Option<&'static str>) -> Transition {
        Transition::raw(TransitionKind::Read, address, length, 0, 0, is_atomic, tag)
    }

    pub fn write(
        address: usize,
        length: u32,
        value: i64,
        is_atomic: bool,
        tag: Option<&'static str>,
    ) -> Transition {
        Transition::raw(TransitionKind::Write, address, length, value, 0, is_atomic, tag)
    }

    pub fn cas(
        address: usize,
        length: u32,
        expected: i64,
        replacement: i64,
        tag: Option<&'static str>,
    ) -> Transition {
        Transition::raw(TransitionKind::Cas, address, length, expected, replacement, true, tag)
    }

    pub fn read_ge(address: usize, length: u32, threshold: i64, tag: Option<&'static str>) -> Transition {
        Transition::raw(TransitionKind::ReadGe, address, length, threshold, 0, true, tag)
    }

    pub fn atomic_rmw(
        address: usize,
        length: u32,
        op: RmwOp,
        operand: i64,
        tag: Option<&'static str>,
    ) -> Transition {
        Transition::raw(TransitionKind::AtomicRmw, address, length, op.code(), operand, true, tag)
    }

    // ========================================================================
    // SEMANTICS
    // ========================================================================

    /// Predict the outcome of this transition against memory value `value`.
    pub fn determine_result(&self, value: i64) -> Outcome {
        match self.kind() {
            TransitionKind::Read => Outcome { returned: value, written: None },
            TransitionKind::Write => Outcome { returned: 0, written: Some(self.arg0) },
            TransitionKind::Cas => {
                if value == self.arg0 {
                    Outcome { returned: value, written: Some(self.arg1) }
                } else {
                    Outcome { returned: value, written: None }
                }
            }
            TransitionKind::ReadGe => Outcome {
                returned: (value >= self.arg0) as i64,
                written: None,
            },
            TransitionKind::AtomicRmw => {
                let written = match RmwOp::from_code(self.arg0) {
                    RmwOp::Xchg => self.arg1,
                    RmwOp::Add => value.wrapping_add(self.arg1),
                    RmwOp::Sub => value.wrapping_sub(self.arg1),
                };
                Outcome { returned: value, written: Some(written) }
            }
        }
    }

    /// Would the scheduler admit this transition, given memory value `value`?
    pub fn determine_runnable(&self, value: i64) -> bool {
        match self.required {
            Some(required) => self.determine_result(value).returned == required,
            None => true,
        }
    }

    /// `determine_runnable` against the value currently in memory. Skips the
    /// memory read when there is no guard.
    pub fn determine_runnable_now(&self) -> bool {
        self.required.is_none() || self.determine_runnable(self.read_mem())
    }

    /// Two transitions conflict iff they touch the same address and at least
    /// one of them can write.
    pub fn conflicts_with(&self, other: &Transition) -> bool {
        self.address == other.address && (self.can_write() || other.can_write())
    }

    #[inline]
    pub fn can_write(&self) -> bool {
        !matches!(self.kind(), TransitionKind::Read | TransitionKind::ReadGe)
    }

    // ========================================================================
    // MEMORY EFFECT
    // ========================================================================

    /// Read the current value at the transition's address, zero-extended for
    /// widths below 8 bytes.
    ///
    /// The address must point at live checked memory (a leaked cell or the
    /// deterministic arena); the cell layer maintains that invariant.
    pub fn read_mem(&self) -> i64 {
        unsafe {
            match self.length {
                1 => (self.address as *const u8).read() as i64,
                2 => (self.address as *const u16).read_unaligned() as i64,
                4 => (self.address as *const u32).read_unaligned() as i64,
                8 => (self.address as *const i64).read_unaligned(),
                other => panic!("unsupported transition length {other}"),
            }
        }
    }

    /// Store `value` at the transition's address, truncating to its width.
    pub fn write_mem(&self, value: i64) {
        unsafe {
            match self.length {
                1 => (self.address as *mut u8).write(value as u8),
                2 => (self.address as *mut u16).write_unaligned(value as u16),
                4 => (self.address as *mut u32).write_unaligned(value as u32),
                8 => (self.address as *mut i64).write_unaligned(value),
                other => panic!("unsupported transition length {other}"),
            }
        }
    }

    /// Execute the memory effect against the current contents of memory and
    /// report the value returned to the program.
    pub fn execute(&self) -> i64 {
        let outcome = self.determine_result(self.read_mem());
        if let Some(written) = outcome.written {
            self.write_mem(written);
        }
        outcome.returned
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    fn kind(&self) -> TransitionKind {
        self.kind.expect("empty transition")
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn is_atomic(&self) -> bool {
        self.is_atomic
    }

    pub fn required_result(&self) -> Option<i64> {
        self.required
    }

    pub fn set_required(&mut self, required: i64) {
        self.required = Some(required);
    }

    pub fn annotations(&self) -> Option<&Arc<Vec<String>>> {
        self.annotations.as_ref()
    }

    pub fn set_annotations(&mut self, annotations: Arc<Vec<String>>) {
        self.annotations = Some(annotations);
    }

    pub fn source_tag(&self) -> Option<&'static str> {
        self.source_tag
    }

    /// Human-readable rendering against memory value `value`.
    pub fn format(&self, value: i64) -> String {
        let addr = self.address;
        let body = match self.kind() {
            TransitionKind::Read => format!("Read *{addr:#x} = {value:#x}"),
            TransitionKind::Write => format!("Write *{addr:#x} = {:#x}", self.arg0),
            TransitionKind::Cas => {
                if value == self.arg0 {
                    format!("CAS success *{addr:#x} from {:#x} to {:#x}", self.arg0, self.arg1)
                } else {
                    format!(
                        "CAS fail *{addr:#x} from {:#x} to {:#x}; was {value:#x}",
                        self.arg0, self.arg1
                    )
                }
            }
            TransitionKind::ReadGe => {
                format!("Compared *{addr:#x} = {value:#x} to {:#x}", self.arg0)
            }
            TransitionKind::AtomicRmw => match RmwOp::from_code(self.arg0) {
                RmwOp::Xchg => format!("Exchanged *{addr:#x} = {value:#x} with {:#x}", self.arg1),
                RmwOp::Add => format!("*{addr:#x} = {value:#x} += {:#x}", self.arg1),
                RmwOp::Sub => format!("*{addr:#x} = {value:#x} -= {:#x}", self.arg1),
            },
        };
        format!("{body} ({} bytes)", self.length)
    }

    /// One structured record for the trace dump, matching the annotation
    /// records emitted alongside it.
    pub fn dump_record(&self, thread: crate::types::ThreadId, step: crate::types::Time, value: i64) -> String {
        let outcome = self.determine_result(value);
        let mut record = String::new();
        record.push_str(&format!(
            "{{'does_write': {}, ",
            if outcome.written.is_some() { "True" } else { "False" }
        ));
        record.push_str(&format!("'address': '{:#x}', ", self.address));
        record.push_str("'type': 'transition', ");
        record.push_str(&format!("'value': '{value:#x}', "));
        record.push_str(&format!("'thread': {thread}, "));
        record.push_str(&format!("'step': {step}, "));
        if let Some(written) = outcome.written {
            record.push_str(&format!("'new_value': '{written:#x}', "));
        }
        record.push_str(&format!("'length': {}, ", self.length));
        record.push_str(&format!("'description': '{}'", self.format(value)));
        if let Some(tag) = self.source_tag {
            record.push_str(&format!(", 'trace': '{tag}'"));
        }
        record.push('}');
        record
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(self.read_mem()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(initial: i64) -> usize {
        Box::leak(Box::new(initial)) as *mut i64 as usize
    }

    #[test]
    fn read_semantics() {
        let t = Transition::read(cell(42), 8, true, None);
        assert_eq!(t.determine_result(42), Outcome { returned: 42, written: None });
        assert_eq!(t.read_mem(), 42);
    }

    #[test]
    fn write_semantics() {
        let addr = cell(0);
        let t = Transition::write(addr, 8, 7, true, None);
        assert_eq!(t.determine_result(0), Outcome { returned: 0, written: Some(7) });
        assert_eq!(t.execute(), 0);
        assert_eq!(Transition::read(addr, 8, true, None).read_mem(), 7);
    }

    #[test]
    fn cas_success_and_failure() {
        let t = Transition::cas(cell(5), 8, 5, 9, None);
        assert_eq!(t.determine_result(5), Outcome { returned: 5, written: Some(9) });
        assert_eq!(t.determine_result(6), Outcome { returned: 6, written: None });
    }

    #[test]
    fn read_ge_reports_comparison() {
        let t = Transition::read_ge(cell(3), 8, 4, None);
        assert_eq!(t.determine_result(3).returned, 0);
        assert_eq!(t.determine_result(4).returned, 1);
        assert_eq!(t.determine_result(9).returned, 1);
        assert!(!t.can_write());
    }

    #[test]
    fn rmw_variants() {
        let t = Transition::atomic_rmw(cell(10), 8, RmwOp::Add, 3, None);
        assert_eq!(t.determine_result(10), Outcome { returned: 10, written: Some(13) });
        let t = Transition::atomic_rmw(cell(10), 8, RmwOp::Sub, 3, None);
        assert_eq!(t.determine_result(10), Outcome { returned: 10, written: Some(7) });
        let t = Transition::atomic_rmw(cell(10), 8, RmwOp::Xchg, 3, None);
        assert_eq!(t.determine_result(10), Outcome { returned: 10, written: Some(3) });
    }

    #[test]
    fn guard_controls_runnability() {
        let mut t = Transition::cas(cell(0), 8, 0, 1, None);
        assert!(t.determine_runnable(2));
        t.set_required(0);
        assert!(t.determine_runnable(0));
        assert!(!t.determine_runnable(2));
    }

    #[test]
    fn conflicts_require_same_address_and_a_writer() {
        let a = cell(0);
        let b = cell(0);
        let read_a = Transition::read(a, 8, true, None);
        let write_a = Transition::write(a, 8, 1, true, None);
        let write_b = Transition::write(b, 8, 1, true, None);

        assert!(read_a.conflicts_with(&write_a));
        assert!(write_a.conflicts_with(&write_a));
        assert!(!read_a.conflicts_with(&read_a.clone()));
        assert!(!write_a.conflicts_with(&write_b));
    }

    #[test]
    fn narrow_widths_zero_extend() {
        let addr = cell(-1);
        let t = Transition::read(addr, 1, false, None);
        assert_eq!(t.read_mem(), 0xff);
        let t = Transition::read(addr, 4, false, None);
        assert_eq!(t.read_mem(), 0xffff_ffff);
    }
}
