//! Memory interfaces used by the process manager.
//!
//! # Components
//!
//! - **VirtualMemory**: the address-space service a process is built on
//! - **Slab**: bounded object pools for process records, child links and signals

pub mod slab;

use core::fmt;

pub use slab::{Pool, PoolError, SlotId};

/// Virtual memory service failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// No frames left for page tables or pages.
    OutOfMemory,
    /// The address space handle is not known to the service.
    InvalidSpace,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::OutOfMemory => write!(f, "out of memory"),
            VmError::InvalidSpace => write!(f, "invalid address space"),
        }
    }
}

/// Address-space operations the process manager depends on.
///
/// A `Space` handle is owned by exactly one process. Handles are not
/// `Clone`; [`free`](VirtualMemory::free) consumes them.
pub trait VirtualMemory {
    /// Opaque handle to one address space.
    type Space;

    /// Create an empty address space.
    fn init(&mut self) -> Result<Self::Space, VmError>;

    /// Create a new address space mirroring `source`.
    ///
    /// With `copy_contents` the new space gets a private copy of the data
    /// mapped in `source`; otherwise only the layout is mirrored.
    fn clone_space(
        &mut self,
        source: &Self::Space,
        copy_contents: bool,
    ) -> Result<Self::Space, VmError>;

    /// Map `count` fresh pages into `space` and return their base address.
    fn alloc_pages(&mut self, space: &mut Self::Space, count: usize) -> Result<u64, VmError>;

    /// Unmap pages previously returned by [`alloc_pages`](VirtualMemory::alloc_pages).
    fn free_pages(&mut self, space: &mut Self::Space, base: u64, count: usize);

    /// Destroy an address space. With `unmap_contents` every page mapped in
    /// it is released as well.
    fn free(&mut self, space: Self::Space, unmap_contents: bool);

    /// Physical address of the space's top-level page table (CR3 value).
    fn root(&self, space: &Self::Space) -> u64;
}
