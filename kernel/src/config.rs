//! Process manager configuration.
//!
//! Compile-time limits shared by the process table, the PID allocator and
//! the scheduler, plus the runtime [`SchedulerConfig`] built from them.

/// Exclusive upper bound on process identifiers.
///
/// PID 0 is reserved and never handed out, so at most `PID_MAX - 1`
/// processes can be live at once.
pub const PID_MAX: usize = 32768;

/// Page size (4 KB).
pub const PAGE_SIZE: usize = 4096;

/// Pages backing each user and kernel stack.
pub const STACK_PAGES: usize = 1;

/// Bytes kept free at the top of a fresh stack.
///
/// Initial stack pointers are `base + PAGE_SIZE * STACK_PAGES - STACK_TOP_RESERVE`.
pub const STACK_TOP_RESERVE: u64 = 1;

/// Maximum number of live process records.
pub const MAX_PROCESSES: usize = PID_MAX - 1;

/// Maximum number of parent-to-child links.
pub const MAX_CHILD_LINKS: usize = PID_MAX - 1;

/// Maximum number of queued signals across all processes.
pub const MAX_PENDING_SIGNALS: usize = 4096;

// Segment selectors, matching the GDT layout installed at boot.

/// Kernel code segment selector.
pub const KERNEL_CS: u16 = 0x08;

/// Kernel data segment selector.
pub const KERNEL_DS: u16 = 0x10;

/// User data segment selector (RPL 3).
pub const USER_DS: u16 = 0x1B;

/// User code segment selector (RPL 3).
pub const USER_CS: u16 = 0x23;

/// Initial RFLAGS for a new context: IF set, reserved bit 1 set.
pub const DEFAULT_RFLAGS: u64 = 0x200 | 0x2;

/// How invalid state transitions are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Log a warning and leave the state unchanged.
    #[default]
    Lenient,
    /// Panic. Useful in debug kernels and tests.
    Strict,
}

/// Runtime limits for a [`ProcessManager`](crate::process::ProcessManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Exclusive upper bound of the PID space.
    pub pid_capacity: usize,
    /// Capacity of the process record pool.
    pub max_processes: usize,
    /// Capacity of the child link pool.
    pub max_child_links: usize,
    /// Capacity of the pending signal pool.
    pub max_signals: usize,
    /// Handling of invalid state transitions.
    pub transition_policy: TransitionPolicy,
}

impl SchedulerConfig {
    /// Kernel defaults.
    pub const fn new() -> Self {
        Self {
            pid_capacity: PID_MAX,
            max_processes: MAX_PROCESSES,
            max_child_links: MAX_CHILD_LINKS,
            max_signals: MAX_PENDING_SIGNALS,
            transition_policy: TransitionPolicy::Lenient,
        }
    }

    /// Set the PID space bound.
    pub const fn with_pid_capacity(mut self, pid_capacity: usize) -> Self {
        self.pid_capacity = pid_capacity;
        self
    }

    /// Set the process pool capacity.
    pub const fn with_max_processes(mut self, max_processes: usize) -> Self {
        self.max_processes = max_processes;
        self
    }

    /// Set the child link pool capacity.
    pub const fn with_max_child_links(mut self, max_child_links: usize) -> Self {
        self.max_child_links = max_child_links;
        self
    }

    /// Set the signal pool capacity.
    pub const fn with_max_signals(mut self, max_signals: usize) -> Self {
        self.max_signals = max_signals;
        self
    }

    /// Set the transition policy.
    pub const fn with_transition_policy(mut self, policy: TransitionPolicy) -> Self {
        self.transition_policy = policy;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = SchedulerConfig::default();
        assert_eq!(config.pid_capacity, PID_MAX);
        assert_eq!(config.max_processes, MAX_PROCESSES);
        assert_eq!(config.transition_policy, TransitionPolicy::Lenient);
    }

    #[test]
    fn test_builder_overrides() {
        let config = SchedulerConfig::new()
            .with_pid_capacity(8)
            .with_max_signals(2)
            .with_transition_policy(TransitionPolicy::Strict);
        assert_eq!(config.pid_capacity, 8);
        assert_eq!(config.max_signals, 2);
        assert_eq!(config.max_child_links, MAX_CHILD_LINKS);
        assert_eq!(config.transition_policy, TransitionPolicy::Strict);
    }

    #[test]
    fn test_user_selectors_have_rpl3() {
        assert_eq!(USER_CS & 0x3, 3);
        assert_eq!(USER_DS & 0x3, 3);
        assert_eq!(KERNEL_CS & 0x3, 0);
        assert_eq!(KERNEL_DS & 0x3, 0);
    }
}
