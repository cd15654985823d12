//! Process Context
//!
//! Saved CPU state of a process that is not currently on the CPU.

use bitflags::bitflags;

use crate::config::{DEFAULT_RFLAGS, KERNEL_CS, KERNEL_DS, USER_CS, USER_DS};
use crate::scheduler::SwitchTarget;

bitflags! {
    /// Per-context execution flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ContextFlags: u32 {
        /// The process is inside a system call; resume on its kernel stack.
        const SYSCALLING = 1 << 0;
    }
}

/// CPU register context for context switching
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct HardwareContext {
    // General purpose registers (callee-saved first)
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub rbx: u64,
    pub rbp: u64,

    // Caller-saved registers
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rax: u64,

    // Segment registers
    /// Data segment
    pub ds: u16,
    /// Extra segment
    pub es: u16,
    pub fs: u16,
    pub gs: u16,

    // Interrupt frame
    /// Instruction pointer
    pub rip: u64,
    /// Code segment
    pub cs: u16,
    /// RFLAGS register
    pub rflags: u64,
    /// User stack pointer
    pub rsp: u64,
    /// Stack segment
    pub ss: u16,

    /// Kernel stack pointer used while the process is in a system call.
    pub rsp0: u64,
    /// Kernel stack segment.
    pub ss0: u16,
    /// Page table root.
    pub cr3: u64,

    pub flags: ContextFlags,
}

impl HardwareContext {
    /// Create a new empty context
    pub const fn new() -> Self {
        Self {
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            rbx: 0,
            rbp: 0,
            r11: 0,
            r10: 0,
            r9: 0,
            r8: 0,
            rdi: 0,
            rsi: 0,
            rdx: 0,
            rcx: 0,
            rax: 0,
            ds: 0,
            es: 0,
            fs: 0,
            gs: 0,
            rip: 0,
            cs: 0,
            rflags: 0,
            rsp: 0,
            ss: 0,
            rsp0: 0,
            ss0: 0,
            cr3: 0,
            flags: ContextFlags::empty(),
        }
    }

    /// Context every new process record starts from: user-mode segments,
    /// kernel stack segment, interrupts enabled.
    pub const fn baseline() -> Self {
        let mut ctx = Self::new();
        ctx.ss0 = KERNEL_DS;
        ctx.cs = USER_CS;
        ctx.ds = USER_DS;
        ctx.es = USER_DS;
        ctx.fs = USER_DS;
        ctx.gs = USER_DS;
        ctx.ss = USER_DS;
        ctx.rflags = DEFAULT_RFLAGS;
        ctx
    }

    pub fn is_syscalling(&self) -> bool {
        self.flags.contains(ContextFlags::SYSCALLING)
    }

    pub fn set_syscalling(&mut self, syscalling: bool) {
        self.flags.set(ContextFlags::SYSCALLING, syscalling);
    }

    /// Where and how to resume this context.
    ///
    /// A process inside a system call resumes on its kernel stack with
    /// kernel selectors; otherwise it returns to user mode.
    pub fn switch_target(&self) -> SwitchTarget {
        if self.is_syscalling() {
            SwitchTarget {
                stack_pointer: self.rsp0,
                instruction_pointer: self.rip,
                data_selector: KERNEL_DS,
                code_selector: KERNEL_CS,
                page_table_root: self.cr3,
            }
        } else {
            SwitchTarget {
                stack_pointer: self.rsp,
                instruction_pointer: self.rip,
                data_selector: USER_DS,
                code_selector: USER_CS,
                page_table_root: self.cr3,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_is_zeroed() {
        let ctx = HardwareContext::new();
        assert_eq!(ctx, HardwareContext::default());
        assert_eq!(ctx.rflags, 0);
        assert!(!ctx.is_syscalling());
    }

    #[test]
    fn test_baseline_selectors() {
        let ctx = HardwareContext::baseline();
        assert_eq!(ctx.ss0, KERNEL_DS);
        assert_eq!(ctx.cs, USER_CS);
        assert_eq!(ctx.ds, USER_DS);
        assert_eq!(ctx.ss, USER_DS);
        assert_ne!(ctx.rflags & 0x200, 0, "IF must be set");
    }

    #[test]
    fn test_switch_target_user_mode() {
        let mut ctx = HardwareContext::baseline();
        ctx.rip = 0x40_1000;
        ctx.rsp = 0x7000_0FFF;
        ctx.rsp0 = 0x9000_0FFF;
        ctx.cr3 = 0x1000;

        let target = ctx.switch_target();
        assert_eq!(target.stack_pointer, 0x7000_0FFF);
        assert_eq!(target.instruction_pointer, 0x40_1000);
        assert_eq!(target.code_selector, USER_CS);
        assert_eq!(target.data_selector, USER_DS);
        assert_eq!(target.page_table_root, 0x1000);
    }

    #[test]
    fn test_switch_target_in_syscall() {
        let mut ctx = HardwareContext::baseline();
        ctx.rsp = 0x7000_0FFF;
        ctx.rsp0 = 0x9000_0FFF;
        ctx.set_syscalling(true);

        let target = ctx.switch_target();
        assert_eq!(target.stack_pointer, 0x9000_0FFF);
        assert_eq!(target.code_selector, KERNEL_CS);
        assert_eq!(target.data_selector, KERNEL_DS);

        ctx.set_syscalling(false);
        assert_eq!(ctx.switch_target().code_selector, USER_CS);
    }
}
