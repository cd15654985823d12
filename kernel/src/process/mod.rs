//! Process Management
//!
//! Process records, their identifiers, hierarchy and pending signals, and
//! the manager that creates, materializes and tears them down.

pub mod context;
pub mod hierarchy;
pub mod manager;
pub mod pid;
pub mod signal;
pub mod table;

pub use context::{ContextFlags, HardwareContext};
pub use hierarchy::{ChildIter, ChildLink, ChildList};
pub use manager::{ProcessError, ProcessManager, ProcessResult, ProcessStats, Resource};
pub use pid::PidAllocator;
pub use signal::{Signal, SignalIter, SignalQueue};
pub use table::{ChainIter, CycleIter, Process, ProcessId, ProcessState, ProcessTable};
