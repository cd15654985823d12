//! KPIO Process Manager
//!
//! Process lifecycle and round-robin scheduling for the KPIO kernel.
//!
//! # Components
//!
//! - `process`: process table, PIDs, hierarchy, signal queues, lifecycle
//! - `scheduler`: round-robin selection, tick entry point, switch interface
//! - `memory`: bounded object pools and the virtual memory interface
//! - `sync`: interrupt masking
//! - `arch`: x86_64 implementations (`bare-metal` feature)
//!
//! The crate is `no_std` outside of its own unit tests.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod config;
pub mod invariants;
pub mod memory;
pub mod process;
pub mod scheduler;
pub mod sync;

#[cfg(all(feature = "bare-metal", target_arch = "x86_64"))]
pub mod arch;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

#[cfg(test)]
mod tests;

pub use config::{SchedulerConfig, TransitionPolicy};
pub use memory::{VirtualMemory, VmError};
pub use process::{ProcessError, ProcessId, ProcessManager, ProcessResult, ProcessState};
pub use scheduler::{ContextSwitch, Scheduler, SwitchTarget, TickOutcome};
pub use sync::{CriticalSection, InterruptControl};
