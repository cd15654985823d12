//! Interrupt masking.
//!
//! Process and scheduler state is only touched with interrupts masked, so
//! a timer tick can never observe a half-finished mutation.

/// Control over the local interrupt flag.
pub trait InterruptControl {
    fn are_enabled(&self) -> bool;
    fn disable(&self);
    fn enable(&self);

    /// Run `f` with interrupts masked, restoring the previous state after.
    fn without_interrupts<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
        Self: Sized,
    {
        let _section = CriticalSection::enter(self);
        f()
    }
}

/// Interrupts stay masked while this guard lives.
///
/// Nesting is fine: only the outermost section re-enables interrupts.
pub struct CriticalSection<'a, I: InterruptControl + ?Sized> {
    control: &'a I,
    restore: bool,
}

impl<'a, I: InterruptControl + ?Sized> CriticalSection<'a, I> {
    pub fn enter(control: &'a I) -> Self {
        let restore = control.are_enabled();
        if restore {
            control.disable();
        }
        Self { control, restore }
    }
}

impl<I: InterruptControl + ?Sized> Drop for CriticalSection<'_, I> {
    fn drop(&mut self) {
        if self.restore {
            self.control.enable();
        }
    }
}
