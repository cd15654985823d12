//! Context switch interface.
//!
//! The scheduler describes where execution should resume as a
//! [`SwitchTarget`] and hands it to a [`ContextSwitch`] implementation.

/// Everything the switch primitive needs to resume a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwitchTarget {
    pub stack_pointer: u64,
    pub instruction_pointer: u64,
    /// Loaded into DS, ES and SS.
    pub data_selector: u16,
    pub code_selector: u16,
    /// CR3 value for the target's address space.
    pub page_table_root: u64,
}

/// Low-level transfer of control to a process.
///
/// Hardware implementations never return: execution comes back to the
/// kernel only through a later interrupt. Host implementations may return
/// so that tests can observe the switch.
pub trait ContextSwitch {
    fn switch_to(&self, target: &SwitchTarget);
}

impl<T: ContextSwitch + ?Sized> ContextSwitch for &T {
    fn switch_to(&self, target: &SwitchTarget) {
        (**self).switch_to(target)
    }
}
