//! Host-side stand-ins for the hardware and memory collaborators.
//!
//! Available to unit tests and, with the `testing` feature, to downstream
//! crates that want to drive a [`Scheduler`](crate::scheduler::Scheduler)
//! without a machine underneath it.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use spin::Mutex;

use crate::config::PAGE_SIZE;
use crate::memory::{VirtualMemory, VmError};
use crate::scheduler::{ContextSwitch, SwitchTarget};
use crate::sync::InterruptControl;

const ROOT_BASE: u64 = 0x10_0000;
const PAGE_BASE: u64 = 0x7000_0000;

/// Handle to a [`MockVm`] address space.
#[derive(Debug, PartialEq, Eq)]
pub struct MockSpace {
    id: u64,
    root: u64,
}

impl MockSpace {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Default, Clone)]
struct SpaceData {
    /// Byte-granular contents keyed by address.
    contents: BTreeMap<u64, u8>,
    /// Mapped page runs: base -> page count.
    pages: BTreeMap<u64, usize>,
    next_page: u64,
}

/// In-memory virtual memory service with failure injection.
#[derive(Debug, Default)]
pub struct MockVm {
    spaces: BTreeMap<u64, SpaceData>,
    next_id: u64,
    fail_init: bool,
    fail_clone: bool,
    fail_alloc_after: Option<usize>,
    freed: Vec<u64>,
}

impl MockVm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `init` fail with `OutOfMemory`.
    pub fn fail_next_init(&mut self) {
        self.fail_init = true;
    }

    /// Make the next `clone_space` fail with `OutOfMemory`.
    pub fn fail_next_clone(&mut self) {
        self.fail_clone = true;
    }

    /// Let `successes` more `alloc_pages` calls succeed, then fail one.
    pub fn fail_alloc_pages_after(&mut self, successes: usize) {
        self.fail_alloc_after = Some(successes);
    }

    /// Address spaces created and not yet freed.
    pub fn live_spaces(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_live(&self, id: u64) -> bool {
        self.spaces.contains_key(&id)
    }

    /// Ids of freed spaces, in order.
    pub fn freed(&self) -> &[u64] {
        &self.freed
    }

    /// Pages currently mapped in space `id`.
    pub fn mapped_pages(&self, id: u64) -> usize {
        self.spaces
            .get(&id)
            .map(|space| space.pages.values().sum())
            .unwrap_or(0)
    }

    pub fn write(&mut self, id: u64, addr: u64, value: u8) {
        if let Some(space) = self.spaces.get_mut(&id) {
            space.contents.insert(addr, value);
        }
    }

    pub fn read(&self, id: u64, addr: u64) -> Option<u8> {
        self.spaces.get(&id)?.contents.get(&addr).copied()
    }

    fn register(&mut self, data: SpaceData) -> MockSpace {
        self.next_id += 1;
        let id = self.next_id;
        self.spaces.insert(id, data);
        MockSpace {
            id,
            root: ROOT_BASE + id * PAGE_SIZE as u64,
        }
    }
}

impl VirtualMemory for MockVm {
    type Space = MockSpace;

    fn init(&mut self) -> Result<MockSpace, VmError> {
        if core::mem::take(&mut self.fail_init) {
            return Err(VmError::OutOfMemory);
        }
        Ok(self.register(SpaceData::default()))
    }

    fn clone_space(&mut self, source: &MockSpace, copy_contents: bool) -> Result<MockSpace, VmError> {
        if core::mem::take(&mut self.fail_clone) {
            return Err(VmError::OutOfMemory);
        }
        let source = self.spaces.get(&source.id).ok_or(VmError::InvalidSpace)?;
        let mut data = source.clone();
        if !copy_contents {
            data.contents.clear();
        }
        Ok(self.register(data))
    }

    fn alloc_pages(&mut self, space: &mut MockSpace, count: usize) -> Result<u64, VmError> {
        match self.fail_alloc_after {
            Some(0) => {
                self.fail_alloc_after = None;
                return Err(VmError::OutOfMemory);
            }
            Some(n) => self.fail_alloc_after = Some(n - 1),
            None => {}
        }

        let data = self.spaces.get_mut(&space.id).ok_or(VmError::InvalidSpace)?;
        let base = PAGE_BASE + data.next_page * PAGE_SIZE as u64;
        data.next_page += count as u64;
        data.pages.insert(base, count);
        Ok(base)
    }

    fn free_pages(&mut self, space: &mut MockSpace, base: u64, _count: usize) {
        if let Some(data) = self.spaces.get_mut(&space.id) {
            data.pages.remove(&base);
        }
    }

    fn free(&mut self, space: MockSpace, _unmap_contents: bool) {
        if self.spaces.remove(&space.id).is_some() {
            self.freed.push(space.id);
        }
    }

    fn root(&self, space: &MockSpace) -> u64 {
        space.root
    }
}

/// Context switch that records every target instead of jumping to it.
#[derive(Debug, Default)]
pub struct RecordingSwitch {
    targets: Mutex<Vec<SwitchTarget>>,
}

impl RecordingSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn targets(&self) -> Vec<SwitchTarget> {
        self.targets.lock().clone()
    }

    pub fn last(&self) -> Option<SwitchTarget> {
        self.targets.lock().last().copied()
    }
}

impl ContextSwitch for RecordingSwitch {
    fn switch_to(&self, target: &SwitchTarget) {
        self.targets.lock().push(*target);
    }
}

/// Software interrupt flag that counts how often it was cleared.
#[derive(Debug)]
pub struct MockInterrupts {
    enabled: AtomicBool,
    disables: AtomicUsize,
}

impl MockInterrupts {
    /// Starts with interrupts enabled.
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            disables: AtomicUsize::new(0),
        }
    }

    /// Number of enabled-to-disabled transitions.
    pub fn disable_count(&self) -> usize {
        self.disables.load(Ordering::Relaxed)
    }
}

impl Default for MockInterrupts {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptControl for MockInterrupts {
    fn are_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn disable(&self) {
        if self.enabled.swap(false, Ordering::Relaxed) {
            self.disables.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }
}
