//! Architecture-specific code for x86_64.
//!
//! Real implementations of the interrupt and context switch seams. Only
//! built with the `bare-metal` feature.

use x86_64::instructions::interrupts;
use x86_64::registers::control::Cr3;
use x86_64::structures::paging::PhysFrame;
use x86_64::PhysAddr;

use crate::config::DEFAULT_RFLAGS;
use crate::scheduler::{ContextSwitch, SwitchTarget};
use crate::sync::InterruptControl;

/// The CPU's interrupt flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct HardwareInterrupts;

impl InterruptControl for HardwareInterrupts {
    fn are_enabled(&self) -> bool {
        interrupts::are_enabled()
    }

    fn disable(&self) {
        interrupts::disable();
    }

    fn enable(&self) {
        interrupts::enable();
    }
}

/// Switch by loading CR3 and building an interrupt frame for `iretq`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IretqSwitch;

impl ContextSwitch for IretqSwitch {
    fn switch_to(&self, target: &SwitchTarget) {
        unsafe { enter_context(target) }
    }
}

/// Load `target`'s address space and resume it.
///
/// # Safety
///
/// - `page_table_root` must point to a valid PML4 that maps the kernel
/// - the selectors must exist in the loaded GDT
/// - the stack and instruction pointers must be mapped in the target space
/// - this function never returns
pub unsafe fn enter_context(target: &SwitchTarget) -> ! {
    let frame = PhysFrame::containing_address(PhysAddr::new(target.page_table_root));
    unsafe {
        Cr3::write(frame, Cr3::read().1);

        core::arch::asm!(
            "mov ds, {ds:x}",
            "mov es, {ds:x}",
            "push {ss}",
            "push {rsp}",
            "push {rflags}",
            "push {cs}",
            "push {rip}",
            "iretq",
            ds = in(reg) target.data_selector as u64,
            ss = in(reg) target.data_selector as u64,
            rsp = in(reg) target.stack_pointer,
            rflags = in(reg) DEFAULT_RFLAGS,
            cs = in(reg) target.code_selector as u64,
            rip = in(reg) target.instruction_pointer,
            options(noreturn)
        );
    }
}
