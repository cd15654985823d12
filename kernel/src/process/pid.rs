//! PID allocation.
//!
//! Identifiers come from a bitmap over `0..capacity`. PID 0 is reserved at
//! construction and never handed out. The lowest free identifier always
//! wins, so released PIDs are reused before higher ones are touched.

use alloc::vec;
use alloc::vec::Vec;

use crate::process::ProcessId;

/// Bitmap allocator for process identifiers.
pub struct PidAllocator {
    /// Bit set = identifier in use.
    bitmap: Vec<u64>,
    capacity: usize,
    /// Identifiers in use, excluding the reserved 0.
    used: usize,
    /// No word below this index has a clear bit.
    first_candidate: usize,
}

impl PidAllocator {
    /// Create an allocator for identifiers `1..capacity`.
    pub fn new(capacity: usize) -> Self {
        let words = capacity.div_ceil(64).max(1);
        let mut bitmap = vec![0u64; words];
        bitmap[0] |= 1;
        Self {
            bitmap,
            capacity,
            used: 0,
            first_candidate: 0,
        }
    }

    /// Take the lowest free identifier.
    pub fn allocate(&mut self) -> Option<ProcessId> {
        for word_index in self.first_candidate..self.bitmap.len() {
            let word = self.bitmap[word_index];
            if word == u64::MAX {
                continue;
            }
            let pid = word_index * 64 + (!word).trailing_zeros() as usize;
            if pid >= self.capacity {
                break;
            }
            self.bitmap[word_index] |= 1u64 << (pid % 64);
            self.first_candidate = word_index;
            self.used += 1;
            return Some(ProcessId(pid as u64));
        }

        self.first_candidate = self.bitmap.len();
        log::debug!("[PID] identifier space exhausted ({} in use)", self.used);
        None
    }

    /// Return `pid` to the free set.
    ///
    /// Releasing the reserved PID 0, an out-of-range PID or one that is
    /// not in use does nothing and returns `false`.
    pub fn release(&mut self, pid: ProcessId) -> bool {
        let pid = pid.0 as usize;
        if pid == 0 || pid >= self.capacity || !self.is_used(ProcessId(pid as u64)) {
            log::warn!("[PID] release of unallocated pid {}", pid);
            return false;
        }
        self.bitmap[pid / 64] &= !(1u64 << (pid % 64));
        self.first_candidate = self.first_candidate.min(pid / 64);
        self.used -= 1;
        true
    }

    /// Whether `pid` is currently allocated. PID 0 always reports used.
    pub fn is_used(&self, pid: ProcessId) -> bool {
        let pid = pid.0 as usize;
        pid < self.capacity && self.bitmap[pid / 64] & (1u64 << (pid % 64)) != 0
    }

    /// Identifiers handed out and not yet released.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Identifiers still available.
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(1) - self.used
    }

    /// Exclusive upper bound of the identifier space.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Allocated identifiers in ascending order, excluding PID 0.
    pub fn iter_used(&self) -> impl Iterator<Item = ProcessId> + '_ {
        (1..self.capacity)
            .map(|pid| ProcessId(pid as u64))
            .filter(|pid| self.is_used(*pid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_pid_is_one() {
        let mut pids = PidAllocator::new(16);
        assert_eq!(pids.allocate(), Some(ProcessId(1)));
        assert_eq!(pids.allocate(), Some(ProcessId(2)));
        assert!(pids.is_used(ProcessId(0)));
    }

    #[test]
    fn test_lowest_free_reused() {
        let mut pids = PidAllocator::new(16);
        for _ in 0..5 {
            pids.allocate().unwrap();
        }
        assert!(pids.release(ProcessId(2)));
        assert!(pids.release(ProcessId(4)));

        assert_eq!(pids.allocate(), Some(ProcessId(2)));
        assert_eq!(pids.allocate(), Some(ProcessId(4)));
        assert_eq!(pids.allocate(), Some(ProcessId(6)));
    }

    #[test]
    fn test_exhaustion_respects_capacity() {
        let mut pids = PidAllocator::new(4);
        assert_eq!(pids.available(), 3);
        for expected in 1..4 {
            assert_eq!(pids.allocate(), Some(ProcessId(expected)));
        }
        assert_eq!(pids.allocate(), None);
        assert_eq!(pids.used(), 3);

        pids.release(ProcessId(3));
        assert_eq!(pids.allocate(), Some(ProcessId(3)));
    }

    #[test]
    fn test_release_rejects_reserved_and_free() {
        let mut pids = PidAllocator::new(8);
        assert!(!pids.release(ProcessId(0)));
        assert!(!pids.release(ProcessId(3)));
        assert!(!pids.release(ProcessId(100)));
        assert_eq!(pids.used(), 0);
    }

    #[test]
    fn test_reuse_across_word_boundary() {
        let mut pids = PidAllocator::new(200);
        for _ in 1..150 {
            pids.allocate().unwrap();
        }
        pids.release(ProcessId(10));
        pids.release(ProcessId(70));
        assert_eq!(pids.allocate(), Some(ProcessId(10)));
        assert_eq!(pids.allocate(), Some(ProcessId(70)));
        assert_eq!(pids.allocate(), Some(ProcessId(150)));
    }

    #[test]
    fn test_iter_used() {
        let mut pids = PidAllocator::new(8);
        for _ in 0..3 {
            pids.allocate();
        }
        pids.release(ProcessId(2));
        let used: Vec<u64> = pids.iter_used().map(|pid| pid.0).collect();
        assert_eq!(used, [1, 3]);
    }
}
