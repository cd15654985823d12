//! Kernel scheduler module.
//!
//! Round-robin scheduling over the process table. Each tick materializes
//! processes that are still CREATED, promotes the next WAITING process to
//! RUNNING and hands its context to the switch primitive.
//!
//! A [`Scheduler`] can be driven directly, which is what tests do, or
//! installed once into the global slot and driven by the timer interrupt
//! through the no-argument [`tick`].

pub mod context;
pub mod round_robin;

use alloc::boxed::Box;
use core::any::Any;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::{Mutex, Once};

pub use context::{ContextSwitch, SwitchTarget};

use crate::memory::VirtualMemory;
use crate::process::{ProcessError, ProcessId, ProcessManager, ProcessResult, ProcessState};
use crate::sync::{CriticalSection, InterruptControl};

/// Global scheduler instance.
static SCHEDULER: Mutex<Option<Box<dyn TickSource>>> = Mutex::new(None);

/// Switch primitive, kept outside the lock so it can run after the lock
/// is released.
static SWITCH: Once<Box<dyn ContextSwitch + Send + Sync>> = Once::new();

/// Boot tick counter (incremented every timer tick).
static BOOT_TICKS: AtomicU64 = AtomicU64::new(0);

/// Ticks that found the scheduler already locked.
static SKIPPED_TICKS: AtomicU64 = AtomicU64::new(0);

/// Result of one scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// There are no processes.
    Idle,
    /// No WAITING process; the running process, if any, keeps the CPU.
    Continue,
    /// The given process was promoted to RUNNING and switched to.
    Switched(ProcessId),
    /// The scheduler was busy; the tick did nothing.
    Skipped,
}

/// Scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub context_switches: u64,
    pub materialized: u64,
}

/// Round-robin scheduler over a [`ProcessManager`].
pub struct Scheduler<V: VirtualMemory, I: InterruptControl> {
    manager: ProcessManager<V>,
    interrupts: I,
    stats: SchedulerStats,
}

impl<V: VirtualMemory, I: InterruptControl> Scheduler<V, I> {
    pub fn new(manager: ProcessManager<V>, interrupts: I) -> Self {
        Self {
            manager,
            interrupts,
            stats: SchedulerStats::default(),
        }
    }

    pub fn manager(&self) -> &ProcessManager<V> {
        &self.manager
    }

    pub fn interrupts(&self) -> &I {
        &self.interrupts
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Run `f` against the process manager with interrupts masked.
    pub fn with_manager<R>(&mut self, f: impl FnOnce(&mut ProcessManager<V>) -> R) -> R {
        let _section = CriticalSection::enter(&self.interrupts);
        f(&mut self.manager)
    }

    /// Decide the next process without switching to it.
    ///
    /// The candidate is chosen before CREATED processes are materialized.
    /// This is the reverse of a materialize-then-switch tick: a process
    /// materialized by this call first becomes eligible on the following
    /// one, so a lone new process gets one tick of setup before it runs.
    pub fn schedule(&mut self) -> (TickOutcome, Option<SwitchTarget>) {
        let _section = CriticalSection::enter(&self.interrupts);
        self.stats.ticks += 1;

        if self.manager.is_empty() {
            return (TickOutcome::Idle, None);
        }

        let next = round_robin::next_waiting(self.manager.table(), self.manager.running());
        self.stats.materialized += self.manager.materialize_pending() as u64;

        let Some(next) = next else {
            return (TickOutcome::Continue, None);
        };
        match self.manager.set_state(next, ProcessState::Running) {
            Ok(true) => {}
            Ok(false) => return (TickOutcome::Continue, None),
            Err(err) => {
                log::warn!("[SCHED] cannot run pid {}: {}", next, err);
                return (TickOutcome::Continue, None);
            }
        }

        self.stats.context_switches += 1;
        let target = self.manager.active_context().switch_target();
        log::trace!(
            "[SCHED] switch to pid {} (rip {:#x}, rsp {:#x}, cs {:#x})",
            next,
            target.instruction_pointer,
            target.stack_pointer,
            target.code_selector
        );
        (TickOutcome::Switched(next), Some(target))
    }

    /// One full tick: schedule, then switch if a process was picked.
    pub fn tick<S: ContextSwitch + ?Sized>(&mut self, switch: &S) -> TickOutcome {
        let (outcome, target) = self.schedule();
        if let Some(target) = target {
            switch.switch_to(&target);
        }
        outcome
    }
}

/// Object-safe view of a [`Scheduler`] held in the global slot.
pub trait TickSource: Send {
    fn schedule(&mut self) -> (TickOutcome, Option<SwitchTarget>);
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<V, I> TickSource for Scheduler<V, I>
where
    V: VirtualMemory + Send + 'static,
    V::Space: Send + 'static,
    I: InterruptControl + Send + 'static,
{
    fn schedule(&mut self) -> (TickOutcome, Option<SwitchTarget>) {
        Scheduler::schedule(self)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Install the kernel's scheduler and switch primitive.
///
/// Only the first call succeeds.
pub fn install<V, I, S>(scheduler: Scheduler<V, I>, switch: S) -> ProcessResult<()>
where
    V: VirtualMemory + Send + 'static,
    V::Space: Send + 'static,
    I: InterruptControl + Send + 'static,
    S: ContextSwitch + Send + Sync + 'static,
{
    let mut slot = SCHEDULER.lock();
    if slot.is_some() {
        log::warn!("[SCHED] scheduler already installed");
        return Err(ProcessError::InvalidArgument("scheduler already installed"));
    }
    let switch: Box<dyn ContextSwitch + Send + Sync> = Box::new(switch);
    let scheduler: Box<dyn TickSource> = Box::new(scheduler);
    SWITCH.call_once(|| switch);
    *slot = Some(scheduler);
    log::info!("[SCHED] scheduler installed");
    Ok(())
}

/// Timer entry point.
///
/// A tick that arrives while the scheduler is locked is skipped and
/// counted. The lock is released before the switch primitive runs.
pub fn tick() -> TickOutcome {
    BOOT_TICKS.fetch_add(1, Ordering::Relaxed);

    let (outcome, target) = {
        let Some(mut slot) = SCHEDULER.try_lock() else {
            SKIPPED_TICKS.fetch_add(1, Ordering::Relaxed);
            log::trace!("[SCHED] tick skipped, scheduler busy");
            return TickOutcome::Skipped;
        };
        match slot.as_mut() {
            Some(scheduler) => scheduler.schedule(),
            None => (TickOutcome::Idle, None),
        }
    };

    if let (Some(target), Some(switch)) = (target, SWITCH.get()) {
        switch.switch_to(&target);
    }
    outcome
}

/// Run `f` against the installed scheduler.
///
/// Fails with [`ProcessError::Busy`] if the scheduler is already locked,
/// and with `InvalidArgument` if none of this type is installed.
pub fn with_scheduler<V, I, R>(f: impl FnOnce(&mut Scheduler<V, I>) -> R) -> ProcessResult<R>
where
    V: VirtualMemory + Send + 'static,
    V::Space: Send + 'static,
    I: InterruptControl + Send + 'static,
{
    let mut slot = SCHEDULER.try_lock().ok_or(ProcessError::Busy)?;
    let scheduler = slot
        .as_mut()
        .and_then(|source| source.as_any_mut().downcast_mut::<Scheduler<V, I>>())
        .ok_or(ProcessError::InvalidArgument("no scheduler of this type installed"))?;
    Ok(f(scheduler))
}

/// Timer ticks seen by [`tick`].
pub fn boot_ticks() -> u64 {
    BOOT_TICKS.load(Ordering::Relaxed)
}

/// Ticks skipped because the scheduler was busy.
pub fn skipped_ticks() -> u64 {
    SKIPPED_TICKS.load(Ordering::Relaxed)
}
