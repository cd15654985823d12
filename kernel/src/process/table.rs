//! Process Table
//!
//! Owns every live process record. Records live in a [`Pool`] and are
//! threaded into a chain sorted by ascending PID, which is the order the
//! scheduler walks. A PID index gives O(1) lookup, and the table tracks
//! the single running process together with the live hardware context.

use core::fmt;

use hashbrown::HashMap;

use super::context::HardwareContext;
use super::hierarchy::ChildList;
use super::signal::SignalQueue;
use crate::config::TransitionPolicy;
use crate::memory::{Pool, PoolError, SlotId};

/// Process ID type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ProcessId(pub u64);

impl ProcessId {
    /// Reserved identifier, never assigned to a process.
    pub const RESERVED: ProcessId = ProcessId(0);
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessState {
    /// Record exists, no address space or stacks yet
    #[default]
    Created,
    /// Ready to run
    Waiting,
    /// On the CPU
    Running,
    /// Waiting on an event
    Blocked,
    /// Exited; the record persists until destroyed
    Terminated,
}

impl ProcessState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, next),
            (Created, Waiting)
                | (Waiting, Running)
                | (Running, Waiting)
                | (Running, Blocked)
                | (Blocked, Waiting)
                | (Created | Waiting | Running | Blocked, Terminated)
        )
    }
}

/// A process record.
pub struct Process<S> {
    pub(crate) pid: ProcessId,
    pub(crate) state: ProcessState,
    pub(crate) prev_state: ProcessState,
    pub(crate) context: HardwareContext,
    pub(crate) address_space: Option<S>,
    pub(crate) user_stack: Option<u64>,
    pub(crate) kernel_stack: Option<u64>,
    pub(crate) parent: Option<ProcessId>,
    pub(crate) children: ChildList,
    pub(crate) signals: SignalQueue,
    pub(crate) entry_point: u64,
    pub(crate) exit_status: Option<i32>,
    /// Next record in ascending PID order.
    pub(crate) next: Option<SlotId>,
}

impl<S> Default for Process<S> {
    fn default() -> Self {
        Self {
            pid: ProcessId::RESERVED,
            state: ProcessState::Created,
            prev_state: ProcessState::Created,
            context: HardwareContext::new(),
            address_space: None,
            user_stack: None,
            kernel_stack: None,
            parent: None,
            children: ChildList::new(),
            signals: SignalQueue::new(),
            entry_point: 0,
            exit_status: None,
            next: None,
        }
    }
}

impl<S> Process<S> {
    /// Constructor hook for the process pool.
    pub(crate) fn init_record(record: &mut Self) {
        record.context = HardwareContext::baseline();
    }

    /// Process identifier.
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Current state.
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// State before the most recent transition.
    pub fn prev_state(&self) -> ProcessState {
        self.prev_state
    }

    /// Saved context. Stale while the process is running; see
    /// [`ProcessTable::active_context`].
    pub fn context(&self) -> &HardwareContext {
        &self.context
    }

    /// Parent PID, or `None` for roots and orphans.
    pub fn parent(&self) -> Option<ProcessId> {
        self.parent
    }

    /// Address the process was created to start at.
    pub fn entry_point(&self) -> u64 {
        self.entry_point
    }

    /// Status recorded by the first exit.
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
    }

    /// Owned address space, if attached.
    pub fn address_space(&self) -> Option<&S> {
        self.address_space.as_ref()
    }

    /// Base of the user stack pages, once materialized.
    pub fn user_stack(&self) -> Option<u64> {
        self.user_stack
    }

    /// Base of the kernel stack pages, once materialized.
    pub fn kernel_stack(&self) -> Option<u64> {
        self.kernel_stack
    }

    /// Whether the address space and both stacks are attached.
    pub fn is_materialized(&self) -> bool {
        self.address_space.is_some() && self.user_stack.is_some() && self.kernel_stack.is_some()
    }

    /// Number of linked children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Number of queued, undelivered signals.
    pub fn pending_signal_count(&self) -> usize {
        self.signals.len()
    }
}

/// The table of live processes.
pub struct ProcessTable<S> {
    pool: Pool<Process<S>>,
    index: HashMap<ProcessId, SlotId>,
    head: Option<SlotId>,
    running: Option<ProcessId>,
    /// Live register state of the running process.
    active: HardwareContext,
    policy: TransitionPolicy,
}

impl<S> ProcessTable<S> {
    /// Create an empty table holding at most `capacity` records.
    pub fn new(capacity: usize, policy: TransitionPolicy) -> Self {
        Self {
            pool: Pool::new("process", capacity).with_constructor(Process::init_record),
            index: HashMap::new(),
            head: None,
            running: None,
            active: HardwareContext::new(),
            policy,
        }
    }

    /// Issue a record for `pid` and link it into the chain.
    pub fn insert(&mut self, pid: ProcessId) -> Result<SlotId, PoolError> {
        let slot = self.pool.alloc()?;
        if self.index.try_reserve(1).is_err() {
            self.pool.free(slot);
            return Err(PoolError::AllocFailed);
        }
        if let Some(process) = self.pool.get_mut(slot) {
            process.pid = pid;
        }
        self.link(slot, pid);
        self.index.insert(pid, slot);
        Ok(slot)
    }

    fn link(&mut self, slot: SlotId, pid: ProcessId) {
        let mut prev: Option<SlotId> = None;
        let mut cursor = self.head;
        while let Some(current) = cursor {
            let Some(process) = self.pool.get(current) else {
                break;
            };
            if process.pid > pid {
                break;
            }
            prev = Some(current);
            cursor = process.next;
        }

        if let Some(process) = self.pool.get_mut(slot) {
            process.next = cursor;
        }
        match prev.and_then(|prev| self.pool.get_mut(prev)) {
            Some(process) => process.next = Some(slot),
            None => self.head = Some(slot),
        }
    }

    /// Unlink `pid` from the chain and free its record.
    ///
    /// The freed record keeps its contents until the slot is reissued, so
    /// the caller takes out anything it still owns (the address space)
    /// first. Returns `false` if `pid` is not in the table.
    pub fn remove(&mut self, pid: ProcessId) -> bool {
        let Some(slot) = self.index.remove(&pid) else {
            return false;
        };
        let next = self.pool.get(slot).and_then(|process| process.next);

        let mut prev: Option<SlotId> = None;
        let mut cursor = self.head;
        while let Some(current) = cursor {
            if current == slot {
                break;
            }
            prev = Some(current);
            cursor = self.pool.get(current).and_then(|process| process.next);
        }
        match prev.and_then(|prev| self.pool.get_mut(prev)) {
            Some(process) => process.next = next,
            None => self.head = next,
        }

        if self.running == Some(pid) {
            self.running = None;
        }

        self.pool.free(slot)
    }

    /// Look up a live record.
    pub fn get(&self, pid: ProcessId) -> Option<&Process<S>> {
        self.pool.get(*self.index.get(&pid)?)
    }

    /// Mutably look up a live record.
    pub fn get_mut(&mut self, pid: ProcessId) -> Option<&mut Process<S>> {
        self.pool.get_mut(*self.index.get(&pid)?)
    }

    /// Whether `pid` has a live record.
    pub fn contains(&self, pid: ProcessId) -> bool {
        self.index.contains_key(&pid)
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the table has no records.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Whether every record slot is issued.
    pub fn is_full(&self) -> bool {
        self.pool.is_full()
    }

    /// The RUNNING process, if any.
    pub fn running(&self) -> Option<ProcessId> {
        self.running
    }

    /// Live register state of the running process.
    pub fn active_context(&self) -> &HardwareContext {
        &self.active
    }

    /// Mutable live register state.
    pub fn active_context_mut(&mut self) -> &mut HardwareContext {
        &mut self.active
    }

    /// Processes in ascending PID order.
    pub fn iter(&self) -> ChainIter<'_, S> {
        ChainIter {
            pool: &self.pool,
            cursor: self.head,
        }
    }

    /// Every process once, starting just after `pid` and wrapping around
    /// the chain so that `pid` itself comes last. With `None`, or a PID
    /// not in the table, this is the plain chain order.
    pub fn iter_from(&self, pid: Option<ProcessId>) -> CycleIter<'_, S> {
        let stop = pid.and_then(|pid| self.index.get(&pid).copied());
        let cursor = stop
            .and_then(|slot| self.pool.get(slot))
            .and_then(|process| process.next);
        CycleIter {
            pool: &self.pool,
            head: self.head,
            cursor,
            stop,
            wrapped: false,
        }
    }

    /// Change `pid`'s state.
    ///
    /// Entering RUNNING demotes the current running process to WAITING
    /// after saving the live context into it, then installs `pid`'s saved
    /// context as the live one. Leaving RUNNING by any other transition
    /// saves the live context back and clears the running reference.
    ///
    /// Illegal transitions are logged and ignored under
    /// [`TransitionPolicy::Lenient`] and panic under `Strict`. The return
    /// value reports whether the state changed.
    ///
    /// CREATED -> WAITING is only legal once the address space and both
    /// stacks are attached, so only materialization can take that edge.
    pub fn set_state(&mut self, pid: ProcessId, new: ProcessState) -> Option<bool> {
        let record = self.get(pid)?;
        let current = record.state;
        let unbacked = current == ProcessState::Created && !record.is_materialized();
        if !current.can_transition_to(new) || (unbacked && new == ProcessState::Waiting) {
            return Some(self.reject(pid, current, new));
        }

        if new == ProcessState::Running {
            if let Some(previous) = self.running.take().filter(|previous| *previous != pid) {
                let active = self.active;
                if let Some(process) = self.get_mut(previous) {
                    process.context = active;
                    process.prev_state = process.state;
                    process.state = ProcessState::Waiting;
                }
            }
            self.active = self.get(pid)?.context;
            self.running = Some(pid);
        } else if self.running == Some(pid) {
            let active = self.active;
            if let Some(process) = self.get_mut(pid) {
                process.context = active;
            }
            self.running = None;
        }

        let process = self.get_mut(pid)?;
        process.prev_state = process.state;
        process.state = new;
        log::trace!("[PROC] pid {}: {:?} -> {:?}", pid, current, new);
        Some(true)
    }

    fn reject(&self, pid: ProcessId, current: ProcessState, new: ProcessState) -> bool {
        match self.policy {
            TransitionPolicy::Strict => {
                panic!("process {}: illegal transition {:?} -> {:?}", pid, current, new)
            }
            TransitionPolicy::Lenient => {
                log::warn!(
                    "[PROC] pid {}: ignoring illegal transition {:?} -> {:?}",
                    pid,
                    current,
                    new
                );
                false
            }
        }
    }

    pub(crate) fn pool(&self) -> &Pool<Process<S>> {
        &self.pool
    }
}

/// Iterator over the process chain.
pub struct ChainIter<'a, S> {
    pool: &'a Pool<Process<S>>,
    cursor: Option<SlotId>,
}

impl<'a, S> Iterator for ChainIter<'a, S> {
    type Item = &'a Process<S>;

    fn next(&mut self) -> Option<&'a Process<S>> {
        let process = self.pool.get(self.cursor?)?;
        self.cursor = process.next;
        Some(process)
    }
}

/// Iterator over the chain starting mid-way and wrapping once.
pub struct CycleIter<'a, S> {
    pool: &'a Pool<Process<S>>,
    head: Option<SlotId>,
    cursor: Option<SlotId>,
    stop: Option<SlotId>,
    wrapped: bool,
}

impl<'a, S> Iterator for CycleIter<'a, S> {
    type Item = &'a Process<S>;

    fn next(&mut self) -> Option<&'a Process<S>> {
        if self.cursor.is_none() && !self.wrapped {
            self.wrapped = true;
            self.cursor = self.head;
        }
        let slot = self.cursor?;
        let process = self.pool.get(slot)?;
        if Some(slot) == self.stop {
            self.cursor = None;
            self.wrapped = true;
        } else {
            self.cursor = process.next;
        }
        Some(process)
    }
}
