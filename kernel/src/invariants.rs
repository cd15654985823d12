//! Runtime-checkable invariants of the process manager.
//!
//! Used by the unit and property tests after every operation, and
//! available to debug kernels through [`assert_invariants`].
//!
//! # Invariants
//!
//! 1. **PID Accounting**: the PIDs marked in use are exactly the PIDs of live processes
//! 2. **Single Running**: at most one process is RUNNING and the running reference agrees
//! 3. **Hierarchy**: parent and child links mirror each other and form a forest
//! 4. **Address Space Ownership**: materialized processes own distinct address spaces
//! 5. **Chain Order**: the process chain is strictly ascending and covers every record
//! 6. **Pool Accounting**: link and signal pools hold exactly what processes reference

use alloc::collections::BTreeSet;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::memory::VirtualMemory;
use crate::process::{ProcessId, ProcessManager, ProcessState};

/// An invariant violation with details
#[derive(Clone, Debug)]
pub struct InvariantViolation {
    /// Name of the violated invariant
    pub invariant: &'static str,
    /// Description of what went wrong
    pub description: String,
}

fn violation(invariant: &'static str, description: String) -> InvariantViolation {
    InvariantViolation {
        invariant,
        description,
    }
}

/// Check all process manager invariants.
///
/// Returns a list of violations (empty if all invariants hold).
pub fn check_all_invariants<V: VirtualMemory>(pm: &ProcessManager<V>) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    violations.extend(check_pid_accounting(pm));
    violations.extend(check_single_running(pm));
    violations.extend(check_hierarchy(pm));
    violations.extend(check_address_space_ownership(pm));
    violations.extend(check_chain_order(pm));
    violations.extend(check_pool_accounting(pm));

    violations
}

/// Invariant 1: PIDs in use == PIDs of live processes
fn check_pid_accounting<V: VirtualMemory>(pm: &ProcessManager<V>) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    let used: BTreeSet<ProcessId> = pm.pids().iter_used().collect();
    let live: BTreeSet<ProcessId> = pm.processes().map(|p| p.pid()).collect();

    for pid in used.difference(&live) {
        violations.push(violation(
            "pid_accounting",
            format!("PID {} is allocated but no process holds it", pid),
        ));
    }
    for pid in live.difference(&used) {
        violations.push(violation(
            "pid_accounting",
            format!("Process {} holds a PID that is not allocated", pid),
        ));
    }

    violations
}

/// Invariant 2: zero or one RUNNING process, matching the running reference
fn check_single_running<V: VirtualMemory>(pm: &ProcessManager<V>) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    let running: Vec<ProcessId> = pm
        .processes()
        .filter(|p| p.state() == ProcessState::Running)
        .map(|p| p.pid())
        .collect();

    if running.len() > 1 {
        violations.push(violation(
            "single_running",
            format!("{} processes are RUNNING: {:?}", running.len(), running),
        ));
    }
    if running.first().copied() != pm.running() {
        violations.push(violation(
            "single_running",
            format!(
                "Running reference {:?} disagrees with RUNNING processes {:?}",
                pm.running(),
                running
            ),
        ));
    }

    violations
}

/// Invariant 3: parent/child links agree and contain no cycles
fn check_hierarchy<V: VirtualMemory>(pm: &ProcessManager<V>) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let links = pm.links();

    for process in pm.processes() {
        let pid = process.pid();

        if let Some(parent) = process.parent() {
            match pm.table().get(parent) {
                None => violations.push(violation(
                    "hierarchy",
                    format!("Process {} has dangling parent {}", pid, parent),
                )),
                Some(record) => {
                    let count = record.children.iter(links).filter(|c| *c == pid).count();
                    if count != 1 {
                        violations.push(violation(
                            "hierarchy",
                            format!("Parent {} lists child {} {} times", parent, pid, count),
                        ));
                    }
                }
            }
        }

        for child in process.children.iter(links) {
            match pm.table().get(child) {
                None => violations.push(violation(
                    "hierarchy",
                    format!("Process {} links to missing child {}", pid, child),
                )),
                Some(record) if record.parent() != Some(pid) => violations.push(violation(
                    "hierarchy",
                    format!(
                        "Child {} of {} has parent {:?}",
                        child,
                        pid,
                        record.parent()
                    ),
                )),
                Some(_) => {}
            }
        }

        let mut ancestor = process.parent();
        let mut steps = 0;
        while let Some(current) = ancestor {
            steps += 1;
            if current == pid || steps > pm.len() {
                violations.push(violation(
                    "hierarchy",
                    format!("Process {} is its own ancestor", pid),
                ));
                break;
            }
            ancestor = pm.table().get(current).and_then(|p| p.parent());
        }
    }

    violations
}

/// Invariant 4: schedulable processes own distinct address spaces
fn check_address_space_ownership<V: VirtualMemory>(
    pm: &ProcessManager<V>,
) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let mut roots = BTreeSet::new();

    for process in pm.processes() {
        match process.address_space() {
            Some(space) => {
                let root = pm.vm().root(space);
                if !roots.insert(root) {
                    violations.push(violation(
                        "address_space_ownership",
                        format!("Process {} shares page table root {:#x}", process.pid(), root),
                    ));
                }
            }
            None if matches!(
                process.state(),
                ProcessState::Waiting | ProcessState::Running | ProcessState::Blocked
            ) =>
            {
                violations.push(violation(
                    "address_space_ownership",
                    format!(
                        "Process {} is {:?} without an address space",
                        process.pid(),
                        process.state()
                    ),
                ));
            }
            None => {}
        }
    }

    violations
}

/// Invariant 5: chain strictly ascending and complete
fn check_chain_order<V: VirtualMemory>(pm: &ProcessManager<V>) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let mut previous: Option<ProcessId> = None;
    let mut count = 0;

    for process in pm.processes() {
        if let Some(previous) = previous {
            if process.pid() <= previous {
                violations.push(violation(
                    "chain_order",
                    format!("Process {} follows {} in the chain", process.pid(), previous),
                ));
            }
        }
        previous = Some(process.pid());
        count += 1;
    }

    if count != pm.len() || count != pm.table().pool().len() {
        violations.push(violation(
            "chain_order",
            format!(
                "Chain has {} entries, index {}, pool {}",
                count,
                pm.len(),
                pm.table().pool().len()
            ),
        ));
    }

    violations
}

/// Invariant 6: pool usage matches what processes reference
fn check_pool_accounting<V: VirtualMemory>(pm: &ProcessManager<V>) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    let links: usize = pm.processes().map(|p| p.child_count()).sum();
    if links != pm.links().len() {
        violations.push(violation(
            "pool_accounting",
            format!("{} child links referenced, {} issued", links, pm.links().len()),
        ));
    }

    let signals: usize = pm.processes().map(|p| p.pending_signal_count()).sum();
    if signals != pm.signal_pool().len() {
        violations.push(violation(
            "pool_accounting",
            format!("{} signals queued, {} issued", signals, pm.signal_pool().len()),
        ));
    }

    violations
}

/// Panic if any invariant is violated.
pub fn assert_invariants<V: VirtualMemory>(pm: &ProcessManager<V>) {
    let violations = check_all_invariants(pm);
    if let Some(first) = violations.first() {
        panic!(
            "Invariant violated: {} ({}), {} violation(s) total",
            first.invariant,
            first.description,
            violations.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::testing::MockVm;

    fn manager() -> ProcessManager<MockVm> {
        ProcessManager::with_config(MockVm::new(), SchedulerConfig::new().with_pid_capacity(32))
    }

    #[test]
    fn test_empty_manager_is_consistent() {
        assert!(check_all_invariants(&manager()).is_empty());
    }

    #[test]
    fn test_tree_is_consistent() {
        let mut pm = manager();
        let root = pm.create_process(None, 0).unwrap();
        pm.materialize(root).unwrap();
        let child = pm.create_process(Some(root), 0).unwrap();
        pm.create_process(Some(child), 0).unwrap();
        pm.clone_process(root).unwrap();
        pm.enqueue_signal(child, 1).unwrap();
        pm.set_state(root, ProcessState::Running).unwrap();

        let violations = check_all_invariants(&pm);
        assert!(violations.is_empty(), "violations: {:?}", violations);
        assert_invariants(&pm);
    }

    #[test]
    fn test_consistent_after_teardown() {
        let mut pm = manager();
        let root = pm.create_process(None, 0).unwrap();
        let child = pm.create_process(Some(root), 0).unwrap();
        pm.create_process(Some(child), 0).unwrap();
        pm.create_process(Some(root), 0).unwrap();

        pm.destroy_process(child, false).unwrap();
        assert_invariants(&pm);
        pm.destroy_process(root, true).unwrap();
        assert_invariants(&pm);
        assert_eq!(pm.len(), 1);
    }

    #[test]
    fn test_exit_before_materialize_is_consistent() {
        let mut pm = manager();
        let pid = pm.create_process(None, 0).unwrap();
        pm.exit_process(pid, 0).unwrap();
        assert_eq!(pm.get_process(pid).unwrap().state(), ProcessState::Terminated);
        assert_invariants(&pm);
    }
}
