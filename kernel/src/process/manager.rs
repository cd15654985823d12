//! Process Manager
//!
//! Creation, cloning, state changes, signals, materialization and teardown
//! of processes. Storage is bounded: PIDs, process records, child links
//! and pending signals each come from a fixed-capacity allocator, and a
//! failing operation gives back whatever it already took.

use alloc::vec::Vec;
use core::fmt;

use super::context::HardwareContext;
use super::hierarchy::{ChildIter, ChildLink};
use super::pid::PidAllocator;
use super::signal::{self, Signal, SignalIter};
use super::table::{ChainIter, Process, ProcessId, ProcessState, ProcessTable};
use crate::config::{SchedulerConfig, PAGE_SIZE, STACK_PAGES, STACK_TOP_RESERVE};
use crate::memory::{Pool, PoolError, VirtualMemory, VmError};

/// A bounded resource a process operation can run out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Pid,
    ProcessSlot,
    ChildLink,
    Signal,
    AddressSpace,
    Stack,
    /// Kernel heap backing a pool that has not reached its capacity.
    Memory,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Pid => "process identifiers",
            Resource::ProcessSlot => "process slots",
            Resource::ChildLink => "child links",
            Resource::Signal => "signal slots",
            Resource::AddressSpace => "address space",
            Resource::Stack => "stack pages",
            Resource::Memory => "kernel memory",
        };
        f.write_str(name)
    }
}

/// Process operation error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    /// A bounded resource is used up
    ResourceExhausted(Resource),
    /// Invalid argument
    InvalidArgument(&'static str),
    /// No process with that PID
    NotFound,
    /// The scheduler is already inside a critical section
    Busy,
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::ResourceExhausted(resource) => write!(f, "out of {}", resource),
            ProcessError::InvalidArgument(reason) => write!(f, "invalid argument: {}", reason),
            ProcessError::NotFound => write!(f, "no such process"),
            ProcessError::Busy => write!(f, "scheduler busy"),
        }
    }
}

impl From<VmError> for ProcessError {
    fn from(e: VmError) -> Self {
        match e {
            VmError::OutOfMemory => ProcessError::ResourceExhausted(Resource::AddressSpace),
            VmError::InvalidSpace => ProcessError::InvalidArgument("invalid address space"),
        }
    }
}

pub type ProcessResult<T> = Result<T, ProcessError>;

/// Map a pool failure to the error for `resource`.
///
/// A full pool exhausts `resource` itself; a pool that could not grow
/// below its capacity is out of kernel memory.
fn pool_error(err: PoolError, resource: Resource) -> ProcessError {
    match err {
        PoolError::Exhausted => ProcessError::ResourceExhausted(resource),
        PoolError::AllocFailed => ProcessError::ResourceExhausted(Resource::Memory),
    }
}

/// Snapshot of resource usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessStats {
    pub live: usize,
    pub running: Option<ProcessId>,
    pub pids_in_use: usize,
    pub pids_available: usize,
    pub child_links: usize,
    pub pending_signals: usize,
}

/// Process manager
///
/// Owns the process table, the PID allocator, the child link and signal
/// pools and the virtual memory service. One instance exists per kernel;
/// tests build as many as they like.
pub struct ProcessManager<V: VirtualMemory> {
    config: SchedulerConfig,
    vm: V,
    pids: PidAllocator,
    table: ProcessTable<V::Space>,
    links: Pool<ChildLink>,
    signals: Pool<Signal>,
}

impl<V: VirtualMemory> ProcessManager<V> {
    /// Create a manager with the default limits.
    pub fn new(vm: V) -> Self {
        Self::with_config(vm, SchedulerConfig::default())
    }

    /// Create a manager with explicit limits and transition policy.
    pub fn with_config(vm: V, config: SchedulerConfig) -> Self {
        log::debug!(
            "[PROC] manager: {} pids, {} processes, {} links, {} signals",
            config.pid_capacity,
            config.max_processes,
            config.max_child_links,
            config.max_signals
        );
        Self {
            pids: PidAllocator::new(config.pid_capacity),
            table: ProcessTable::new(config.max_processes, config.transition_policy),
            links: Pool::new("child_link", config.max_child_links),
            signals: Pool::new("signal", config.max_signals),
            vm,
            config,
        }
    }

    /// Limits this manager was built with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The virtual memory service.
    pub fn vm(&self) -> &V {
        &self.vm
    }

    /// Mutable access to the virtual memory service.
    pub fn vm_mut(&mut self) -> &mut V {
        &mut self.vm
    }

    /// Number of live processes.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether there are no live processes.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// The RUNNING process, if any.
    pub fn running(&self) -> Option<ProcessId> {
        self.table.running()
    }

    /// Live register state of the running process.
    pub fn active_context(&self) -> &HardwareContext {
        self.table.active_context()
    }

    /// Mutable live register state of the running process.
    pub fn active_context_mut(&mut self) -> &mut HardwareContext {
        self.table.active_context_mut()
    }

    /// Live processes in ascending PID order.
    pub fn processes(&self) -> ChainIter<'_, V::Space> {
        self.table.iter()
    }

    /// Current resource usage.
    pub fn stats(&self) -> ProcessStats {
        ProcessStats {
            live: self.table.len(),
            running: self.table.running(),
            pids_in_use: self.pids.used(),
            pids_available: self.pids.available(),
            child_links: self.links.len(),
            pending_signals: self.signals.len(),
        }
    }

    pub(crate) fn table(&self) -> &ProcessTable<V::Space> {
        &self.table
    }

    pub(crate) fn pids(&self) -> &PidAllocator {
        &self.pids
    }

    pub(crate) fn links(&self) -> &Pool<ChildLink> {
        &self.links
    }

    pub(crate) fn signal_pool(&self) -> &Pool<Signal> {
        &self.signals
    }

    fn validate(&self, pid: ProcessId) -> ProcessResult<()> {
        if pid == ProcessId::RESERVED || pid.0 >= self.config.pid_capacity as u64 {
            return Err(ProcessError::InvalidArgument("pid out of range"));
        }
        if self.table.contains(pid) {
            Ok(())
        } else {
            Err(ProcessError::NotFound)
        }
    }

    /// Look up a live process.
    pub fn get_process(&self, pid: ProcessId) -> ProcessResult<&Process<V::Space>> {
        self.validate(pid)?;
        self.table.get(pid).ok_or(ProcessError::NotFound)
    }

    /// Create a process in the CREATED state.
    ///
    /// The process gets no address space until it is materialized. With a
    /// parent, a child link is appended under it.
    pub fn create_process(
        &mut self,
        parent: Option<ProcessId>,
        entry_point: u64,
    ) -> ProcessResult<ProcessId> {
        if let Some(parent) = parent {
            self.validate(parent)?;
        }

        if self.table.is_full() {
            return Err(ProcessError::ResourceExhausted(Resource::ProcessSlot));
        }

        let pid = self
            .pids
            .allocate()
            .ok_or(ProcessError::ResourceExhausted(Resource::Pid))?;

        if let Err(err) = self.table.insert(pid) {
            log::warn!("[PROC] no process slot for pid {}: {}", pid, err);
            self.pids.release(pid);
            return Err(pool_error(err, Resource::ProcessSlot));
        }

        if let Some(process) = self.table.get_mut(pid) {
            process.entry_point = entry_point;
            process.context.rip = entry_point;
        }

        if let Some(parent) = parent {
            if let Err(err) = self.link_child(parent, pid) {
                self.table.remove(pid);
                self.pids.release(pid);
                return Err(err);
            }
        }

        log::info!(
            "[PROC] created pid {} (parent {:?}, entry {:#x})",
            pid,
            parent.map(|p| p.0),
            entry_point
        );
        Ok(pid)
    }

    fn link_child(&mut self, parent: ProcessId, child: ProcessId) -> ProcessResult<()> {
        let record = self.table.get_mut(parent).ok_or(ProcessError::NotFound)?;
        record
            .children
            .push(&mut self.links, child)
            .map_err(|err| pool_error(err, Resource::ChildLink))?;
        if let Some(record) = self.table.get_mut(child) {
            record.parent = Some(parent);
        }
        Ok(())
    }

    /// Make `child`, which must currently have no parent, a child of `parent`.
    pub fn add_child(&mut self, parent: ProcessId, child: ProcessId) -> ProcessResult<()> {
        self.validate(parent)?;
        self.validate(child)?;
        if parent == child {
            return Err(ProcessError::InvalidArgument("process cannot be its own child"));
        }
        if self.table.get(child).and_then(|p| p.parent).is_some() {
            return Err(ProcessError::InvalidArgument("process already has a parent"));
        }

        let mut ancestor = Some(parent);
        while let Some(pid) = ancestor {
            if pid == child {
                return Err(ProcessError::InvalidArgument("link would create a cycle"));
            }
            ancestor = self.table.get(pid).and_then(|p| p.parent);
        }

        self.link_child(parent, child)
    }

    /// Children of `pid` in link order.
    pub fn children(&self, pid: ProcessId) -> ProcessResult<ChildIter<'_>> {
        Ok(self.get_process(pid)?.children.iter(&self.links))
    }

    /// Create a child of `source` resuming at the same instruction pointer,
    /// with a private copy of `source`'s address space.
    pub fn clone_process(&mut self, source: ProcessId) -> ProcessResult<ProcessId> {
        let record = self.get_process(source)?;
        if record.address_space.is_none() {
            return Err(ProcessError::InvalidArgument("source has no address space"));
        }
        let rip = if self.table.running() == Some(source) {
            self.table.active_context().rip
        } else {
            record.context.rip
        };

        let pid = self.create_process(Some(source), rip)?;

        let cloned = match self.table.get(source).and_then(|p| p.address_space.as_ref()) {
            Some(space) => self.vm.clone_space(space, true),
            None => Err(VmError::InvalidSpace),
        };
        match cloned {
            Ok(space) => {
                if let Some(process) = self.table.get_mut(pid) {
                    process.address_space = Some(space);
                }
                log::debug!("[PROC] pid {} cloned into pid {}", source, pid);
                Ok(pid)
            }
            Err(err) => {
                log::warn!("[PROC] address space clone of pid {} failed: {}", source, err);
                self.destroy_process(pid, false)?;
                Err(ProcessError::ResourceExhausted(Resource::AddressSpace))
            }
        }
    }

    /// Apply a state transition. Returns whether the state changed.
    ///
    /// Illegal transitions follow the configured
    /// [`TransitionPolicy`](crate::config::TransitionPolicy). A CREATED
    /// process only reaches WAITING through [`materialize`], so asking for
    /// that edge here is illegal too.
    ///
    /// [`materialize`]: ProcessManager::materialize
    pub fn set_state(&mut self, pid: ProcessId, state: ProcessState) -> ProcessResult<bool> {
        self.validate(pid)?;
        self.table.set_state(pid, state).ok_or(ProcessError::NotFound)
    }

    /// Terminate `pid` with `status`. The record stays until destroyed.
    pub fn exit_process(&mut self, pid: ProcessId, status: i32) -> ProcessResult<()> {
        if self.set_state(pid, ProcessState::Terminated)? {
            if let Some(process) = self.table.get_mut(pid) {
                process.exit_status = Some(status);
            }
            log::info!("[PROC] pid {} exited with status {}", pid, status);
        }
        Ok(())
    }

    /// Mark `pid` as suspended inside (or outside) a system call.
    pub fn set_syscalling(&mut self, pid: ProcessId, syscalling: bool) -> ProcessResult<()> {
        self.validate(pid)?;
        if self.table.running() == Some(pid) {
            self.table.active_context_mut().set_syscalling(syscalling);
        } else if let Some(process) = self.table.get_mut(pid) {
            process.context.set_syscalling(syscalling);
        }
        Ok(())
    }

    /// Queue `signo` at the tail of `pid`'s pending signals.
    ///
    /// When the signal pool is full the signal is dropped and
    /// `ResourceExhausted(Signal)` is returned.
    pub fn enqueue_signal(&mut self, pid: ProcessId, signo: u8) -> ProcessResult<()> {
        if !signal::is_valid(signo) {
            return Err(ProcessError::InvalidArgument("invalid signal number"));
        }
        self.validate(pid)?;
        let process = self.table.get_mut(pid).ok_or(ProcessError::NotFound)?;
        process.signals.push(&mut self.signals, signo).map_err(|err| {
            log::warn!("[PROC] pid {}: dropped signal {}: {}", pid, signo, err);
            pool_error(err, Resource::Signal)
        })
    }

    /// Pending signals of `pid` in arrival order.
    pub fn pending_signals(&self, pid: ProcessId) -> ProcessResult<SignalIter<'_>> {
        Ok(self.get_process(pid)?.signals.iter(&self.signals))
    }

    /// Attach an address space and stacks to a CREATED process and move it
    /// to WAITING.
    ///
    /// An address space already attached by [`clone_process`] is kept.
    /// Otherwise the parent's space is copied, or a fresh one is built for
    /// a root process. On failure everything allocated here is released
    /// and the process stays CREATED.
    ///
    /// [`clone_process`]: ProcessManager::clone_process
    pub fn materialize(&mut self, pid: ProcessId) -> ProcessResult<()> {
        let record = self.get_process(pid)?;
        if record.state != ProcessState::Created {
            return Err(ProcessError::InvalidArgument("process already materialized"));
        }
        let parent = record.parent;
        let attached = record.address_space.is_some();

        let mut space = match self.table.get_mut(pid).and_then(|p| p.address_space.take()) {
            Some(space) => space,
            None => match parent {
                Some(parent) => {
                    let parent_space = self
                        .table
                        .get(parent)
                        .and_then(|p| p.address_space.as_ref())
                        .ok_or(ProcessError::InvalidArgument("parent has no address space"))?;
                    self.vm.clone_space(parent_space, true)?
                }
                None => self.vm.init()?,
            },
        };

        let user_stack = match self.vm.alloc_pages(&mut space, STACK_PAGES) {
            Ok(base) => base,
            Err(err) => return Err(self.abandon(pid, space, attached, err)),
        };
        let kernel_stack = match self.vm.alloc_pages(&mut space, STACK_PAGES) {
            Ok(base) => base,
            Err(err) => {
                self.vm.free_pages(&mut space, user_stack, STACK_PAGES);
                return Err(self.abandon(pid, space, attached, err));
            }
        };

        let root = self.vm.root(&space);
        let stack_size = (PAGE_SIZE * STACK_PAGES) as u64;
        let Some(process) = self.table.get_mut(pid) else {
            self.vm.free(space, true);
            return Err(ProcessError::NotFound);
        };
        process.address_space = Some(space);
        process.user_stack = Some(user_stack);
        process.kernel_stack = Some(kernel_stack);
        process.context.cr3 = root;
        process.context.rsp = user_stack + stack_size - STACK_TOP_RESERVE;
        process.context.rsp0 = kernel_stack + stack_size - STACK_TOP_RESERVE;

        self.table.set_state(pid, ProcessState::Waiting);
        log::debug!(
            "[PROC] pid {} materialized (cr3 {:#x}, stack {:#x}, kstack {:#x})",
            pid,
            root,
            user_stack,
            kernel_stack
        );
        Ok(())
    }

    fn abandon(&mut self, pid: ProcessId, space: V::Space, attached: bool, err: VmError) -> ProcessError {
        log::warn!("[PROC] pid {}: stack allocation failed: {}", pid, err);
        if attached {
            if let Some(process) = self.table.get_mut(pid) {
                process.address_space = Some(space);
                return ProcessError::ResourceExhausted(Resource::Stack);
            }
        }
        self.vm.free(space, true);
        ProcessError::ResourceExhausted(Resource::Stack)
    }

    /// Materialize every CREATED process. Returns how many succeeded.
    pub fn materialize_pending(&mut self) -> usize {
        let created: Vec<ProcessId> = self
            .table
            .iter()
            .filter(|p| p.state == ProcessState::Created)
            .map(|p| p.pid)
            .collect();

        created
            .into_iter()
            .filter(|pid| match self.materialize(*pid) {
                Ok(()) => true,
                Err(err) => {
                    log::debug!("[PROC] pid {} not materialized: {}", pid, err);
                    false
                }
            })
            .count()
    }

    /// Tear down `pid`.
    ///
    /// The process is unlinked from its parent and from the table, its
    /// address space and PID are released and its undelivered signals are
    /// discarded. Children are destroyed too with `cascade`; otherwise they
    /// are orphaned and keep running.
    pub fn destroy_process(&mut self, pid: ProcessId, cascade: bool) -> ProcessResult<()> {
        self.validate(pid)?;

        if let Some(parent) = self.table.get(pid).and_then(|p| p.parent) {
            if let Some(record) = self.table.get_mut(parent) {
                record.children.remove(&mut self.links, pid);
            }
        }

        let mut pending = Vec::new();
        pending.push(pid);
        while let Some(current) = pending.pop() {
            let mut children = Vec::new();
            if let Some(process) = self.table.get_mut(current) {
                process.children.drain(&mut self.links, |child| children.push(child));
            }
            for child in children {
                if let Some(record) = self.table.get_mut(child) {
                    record.parent = None;
                }
                if cascade {
                    pending.push(child);
                } else {
                    log::debug!("[PROC] pid {} orphaned by pid {}", child, current);
                }
            }
            self.release(current);
        }
        Ok(())
    }

    fn release(&mut self, pid: ProcessId) {
        let discarded = match self.table.get_mut(pid) {
            Some(process) => process.signals.clear(&mut self.signals),
            None => return,
        };
        // Queued signals are never delivered; teardown drops them.
        if discarded > 0 {
            log::warn!("[PROC] pid {}: discarding {} undelivered signal(s)", pid, discarded);
        }

        let space = self.table.get_mut(pid).and_then(|process| process.address_space.take());
        self.table.remove(pid);
        if let Some(space) = space {
            self.vm.free(space, true);
        }
        self.pids.release(pid);
        log::info!("[PROC] destroyed pid {}", pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransitionPolicy;
    use crate::process::signal::{SIGINT, SIGTERM};
    use crate::testing::MockVm;

    fn manager() -> ProcessManager<MockVm> {
        ProcessManager::with_config(
            MockVm::new(),
            SchedulerConfig::new()
                .with_pid_capacity(64)
                .with_transition_policy(TransitionPolicy::Strict),
        )
    }

    #[test]
    fn test_create_root_process() {
        let mut pm = manager();
        let pid = pm.create_process(None, 0x40_0000).unwrap();
        assert_eq!(pid, ProcessId(1));

        let process = pm.get_process(pid).unwrap();
        assert_eq!(process.state(), ProcessState::Created);
        assert_eq!(process.entry_point(), 0x40_0000);
        assert_eq!(process.context().rip, 0x40_0000);
        assert!(process.parent().is_none());
        assert!(process.address_space().is_none());
    }

    #[test]
    fn test_create_with_parent_links_child() {
        let mut pm = manager();
        let parent = pm.create_process(None, 0).unwrap();
        let child = pm.create_process(Some(parent), 0).unwrap();

        assert_eq!(pm.get_process(child).unwrap().parent(), Some(parent));
        let children: Vec<_> = pm.children(parent).unwrap().collect();
        assert_eq!(children, [child]);
    }

    #[test]
    fn test_create_with_missing_parent() {
        let mut pm = manager();
        assert_eq!(pm.create_process(Some(ProcessId(7)), 0), Err(ProcessError::NotFound));
        assert_eq!(pm.stats().pids_in_use, 0);
    }

    #[test]
    fn test_lookup_errors() {
        let pm = manager();
        assert!(matches!(
            pm.get_process(ProcessId(0)),
            Err(ProcessError::InvalidArgument(_))
        ));
        assert!(matches!(
            pm.get_process(ProcessId(64)),
            Err(ProcessError::InvalidArgument(_))
        ));
        assert!(matches!(pm.get_process(ProcessId(5)), Err(ProcessError::NotFound)));
    }

    #[test]
    fn test_child_link_exhaustion_rolls_back() {
        let mut pm = ProcessManager::with_config(
            MockVm::new(),
            SchedulerConfig::new().with_pid_capacity(16).with_max_child_links(1),
        );
        let parent = pm.create_process(None, 0).unwrap();
        pm.create_process(Some(parent), 0).unwrap();

        assert_eq!(
            pm.create_process(Some(parent), 0),
            Err(ProcessError::ResourceExhausted(Resource::ChildLink))
        );
        assert_eq!(pm.len(), 2);
        assert_eq!(pm.stats().pids_in_use, 2);
    }

    #[test]
    fn test_slot_exhaustion_releases_pid() {
        let mut pm = ProcessManager::with_config(
            MockVm::new(),
            SchedulerConfig::new().with_pid_capacity(16).with_max_processes(1),
        );
        pm.create_process(None, 0).unwrap();
        assert_eq!(
            pm.create_process(None, 0),
            Err(ProcessError::ResourceExhausted(Resource::ProcessSlot))
        );
        assert_eq!(pm.stats().pids_in_use, 1);
    }

    #[test]
    fn test_pool_errors_keep_their_cause() {
        assert_eq!(
            pool_error(PoolError::Exhausted, Resource::ChildLink),
            ProcessError::ResourceExhausted(Resource::ChildLink)
        );
        assert_eq!(
            pool_error(PoolError::AllocFailed, Resource::Signal),
            ProcessError::ResourceExhausted(Resource::Memory)
        );
    }

    #[test]
    fn test_materialize_root() {
        let mut pm = manager();
        let pid = pm.create_process(None, 0x1000).unwrap();
        pm.materialize(pid).unwrap();

        let process = pm.get_process(pid).unwrap();
        assert_eq!(process.state(), ProcessState::Waiting);
        assert_eq!(process.prev_state(), ProcessState::Created);
        assert!(process.is_materialized());

        let user = process.user_stack().unwrap();
        let kernel = process.kernel_stack().unwrap();
        assert_ne!(user, kernel);
        assert_eq!(process.context().rsp, user + PAGE_SIZE as u64 - 1);
        assert_eq!(process.context().rsp0, kernel + PAGE_SIZE as u64 - 1);

        let space = process.address_space().unwrap();
        assert_eq!(process.context().cr3, pm.vm().root(space));
    }

    #[test]
    fn test_materialize_twice_rejected() {
        let mut pm = manager();
        let pid = pm.create_process(None, 0).unwrap();
        pm.materialize(pid).unwrap();
        assert!(matches!(pm.materialize(pid), Err(ProcessError::InvalidArgument(_))));
    }

    #[test]
    fn test_materialize_failure_keeps_created() {
        let mut pm = manager();
        let pid = pm.create_process(None, 0).unwrap();
        pm.vm_mut().fail_alloc_pages_after(1);

        assert_eq!(
            pm.materialize(pid),
            Err(ProcessError::ResourceExhausted(Resource::Stack))
        );
        let process = pm.get_process(pid).unwrap();
        assert_eq!(process.state(), ProcessState::Created);
        assert!(process.address_space().is_none());
        assert_eq!(pm.vm().live_spaces(), 0);

        pm.materialize(pid).unwrap();
        assert_eq!(pm.vm().live_spaces(), 1);
    }

    #[test]
    fn test_materialize_init_failure() {
        let mut pm = manager();
        let pid = pm.create_process(None, 0).unwrap();
        pm.vm_mut().fail_next_init();
        assert_eq!(
            pm.materialize(pid),
            Err(ProcessError::ResourceExhausted(Resource::AddressSpace))
        );
        assert_eq!(pm.get_process(pid).unwrap().state(), ProcessState::Created);
    }

    #[test]
    fn test_child_materializes_from_parent_copy() {
        let mut pm = manager();
        let parent = pm.create_process(None, 0).unwrap();
        pm.materialize(parent).unwrap();
        let parent_space = pm.get_process(parent).unwrap().address_space().unwrap().id();
        pm.vm_mut().write(parent_space, 0x5000, 0xAB);

        let child = pm.create_process(Some(parent), 0).unwrap();
        pm.materialize(child).unwrap();

        let child_space = pm.get_process(child).unwrap().address_space().unwrap().id();
        assert_ne!(child_space, parent_space);
        assert_eq!(pm.vm().read(child_space, 0x5000), Some(0xAB));
    }

    #[test]
    fn test_clone_requires_address_space() {
        let mut pm = manager();
        let pid = pm.create_process(None, 0).unwrap();
        assert!(matches!(pm.clone_process(pid), Err(ProcessError::InvalidArgument(_))));
        assert_eq!(pm.len(), 1);
    }

    #[test]
    fn test_clone_failure_tears_down() {
        let mut pm = manager();
        let source = pm.create_process(None, 0).unwrap();
        pm.materialize(source).unwrap();
        pm.vm_mut().fail_next_clone();

        assert_eq!(
            pm.clone_process(source),
            Err(ProcessError::ResourceExhausted(Resource::AddressSpace))
        );
        assert_eq!(pm.len(), 1);
        assert_eq!(pm.stats().pids_in_use, 1);
        assert_eq!(pm.stats().child_links, 0);
    }

    #[test]
    fn test_clone_then_materialize_keeps_space() {
        let mut pm = manager();
        let source = pm.create_process(None, 0x2000).unwrap();
        pm.materialize(source).unwrap();
        let clone = pm.clone_process(source).unwrap();
        let cloned_space = pm.get_process(clone).unwrap().address_space().unwrap().id();

        pm.materialize(clone).unwrap();
        let process = pm.get_process(clone).unwrap();
        assert_eq!(process.address_space().unwrap().id(), cloned_space);
        assert_eq!(process.context().rip, 0x2000);
        assert_eq!(pm.vm().live_spaces(), 2);
    }

    #[test]
    fn test_exit_records_status() {
        let mut pm = manager();
        let pid = pm.create_process(None, 0).unwrap();
        pm.materialize(pid).unwrap();
        pm.set_state(pid, ProcessState::Running).unwrap();

        pm.exit_process(pid, 3).unwrap();
        let process = pm.get_process(pid).unwrap();
        assert_eq!(process.state(), ProcessState::Terminated);
        assert_eq!(process.exit_status(), Some(3));
        assert_eq!(pm.running(), None);
    }

    #[test]
    fn test_add_child_rejects_cycles() {
        let mut pm = manager();
        let a = pm.create_process(None, 0).unwrap();
        let b = pm.create_process(Some(a), 0).unwrap();
        let c = pm.create_process(None, 0).unwrap();

        assert!(matches!(pm.add_child(b, a), Err(ProcessError::InvalidArgument(_))));
        assert!(matches!(pm.add_child(a, a), Err(ProcessError::InvalidArgument(_))));
        assert!(matches!(pm.add_child(c, b), Err(ProcessError::InvalidArgument(_))));

        pm.add_child(b, c).unwrap();
        assert_eq!(pm.get_process(c).unwrap().parent(), Some(b));
    }

    #[test]
    fn test_signal_validation_and_order() {
        let mut pm = manager();
        let pid = pm.create_process(None, 0).unwrap();
        assert!(matches!(pm.enqueue_signal(pid, 0), Err(ProcessError::InvalidArgument(_))));
        assert!(matches!(pm.enqueue_signal(pid, 64), Err(ProcessError::InvalidArgument(_))));

        pm.enqueue_signal(pid, SIGTERM).unwrap();
        pm.enqueue_signal(pid, SIGINT).unwrap();
        let pending: Vec<u8> = pm.pending_signals(pid).unwrap().collect();
        assert_eq!(pending, [SIGTERM, SIGINT]);
    }

    #[test]
    fn test_signal_pool_exhaustion_drops_signal() {
        let mut pm = ProcessManager::with_config(
            MockVm::new(),
            SchedulerConfig::new().with_pid_capacity(16).with_max_signals(1),
        );
        let pid = pm.create_process(None, 0).unwrap();
        pm.enqueue_signal(pid, SIGTERM).unwrap();
        assert_eq!(
            pm.enqueue_signal(pid, SIGINT),
            Err(ProcessError::ResourceExhausted(Resource::Signal))
        );
        assert_eq!(pm.pending_signals(pid).unwrap().count(), 1);
    }

    #[test]
    fn test_destroy_releases_everything() {
        let mut pm = manager();
        let pid = pm.create_process(None, 0).unwrap();
        pm.materialize(pid).unwrap();
        pm.enqueue_signal(pid, SIGTERM).unwrap();

        pm.destroy_process(pid, false).unwrap();
        assert!(pm.is_empty());
        assert_eq!(pm.stats(), ProcessStats {
            pids_available: 63,
            ..ProcessStats::default()
        });
        assert_eq!(pm.vm().live_spaces(), 0);
        assert_eq!(pm.create_process(None, 0).unwrap(), pid);
    }

    #[test]
    fn test_destroy_running_clears_reference() {
        let mut pm = manager();
        let pid = pm.create_process(None, 0).unwrap();
        pm.materialize(pid).unwrap();
        pm.set_state(pid, ProcessState::Running).unwrap();

        pm.destroy_process(pid, false).unwrap();
        assert_eq!(pm.running(), None);
    }

    #[test]
    fn test_set_syscalling_targets_live_context() {
        let mut pm = manager();
        let pid = pm.create_process(None, 0).unwrap();
        pm.materialize(pid).unwrap();

        pm.set_syscalling(pid, true).unwrap();
        assert!(pm.get_process(pid).unwrap().context().is_syscalling());

        pm.set_state(pid, ProcessState::Running).unwrap();
        assert!(pm.active_context().is_syscalling());
        pm.set_syscalling(pid, false).unwrap();
        assert!(!pm.active_context().is_syscalling());
    }
}
