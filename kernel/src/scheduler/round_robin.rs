//! Round-robin scheduler policy.
//!
//! Candidates are visited in the fixed ascending-PID order of the process
//! chain, starting just after the process that ran last and wrapping to
//! the head. Only WAITING processes are eligible, so the outcome depends
//! only on the table contents and is reproducible.

use crate::process::{ProcessId, ProcessState, ProcessTable};

/// The next WAITING process after `from`, or `None` if a full cycle finds
/// none. `from == None` scans from the head of the chain.
pub fn next_waiting<S>(table: &ProcessTable<S>, from: Option<ProcessId>) -> Option<ProcessId> {
    table
        .iter_from(from)
        .find(|process| process.state() == ProcessState::Waiting)
        .map(|process| process.pid())
}
