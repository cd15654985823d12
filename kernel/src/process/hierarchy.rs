//! Parent/child links.
//!
//! A parent keeps a singly linked list of [`ChildLink`]s drawn from a
//! shared pool. Children refer back to their parent by PID only.

use crate::memory::{Pool, PoolError, SlotId};
use crate::process::ProcessId;

/// One entry in a parent's child list.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChildLink {
    pub(crate) child: ProcessId,
    pub(crate) next: Option<SlotId>,
}

/// Head of a process's child list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChildList {
    head: Option<SlotId>,
    len: usize,
}

impl ChildList {
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append a link to `child`.
    pub fn push(&mut self, pool: &mut Pool<ChildLink>, child: ProcessId) -> Result<(), PoolError> {
        let id = pool.alloc()?;
        if let Some(link) = pool.get_mut(id) {
            link.child = child;
            link.next = None;
        }

        let mut cursor = self.head;
        let mut last = None;
        while let Some(current) = cursor {
            last = Some(current);
            cursor = pool.get(current).and_then(|link| link.next);
        }
        match last.and_then(|last| pool.get_mut(last)) {
            Some(link) => link.next = Some(id),
            None => self.head = Some(id),
        }
        self.len += 1;
        Ok(())
    }

    /// Unlink and free the link to `child`. Returns whether one was found.
    pub fn remove(&mut self, pool: &mut Pool<ChildLink>, child: ProcessId) -> bool {
        let mut prev: Option<SlotId> = None;
        let mut cursor = self.head;
        while let Some(current) = cursor {
            let Some(link) = pool.get(current) else {
                break;
            };
            let next = link.next;
            if link.child == child {
                match prev.and_then(|prev| pool.get_mut(prev)) {
                    Some(prev) => prev.next = next,
                    None => self.head = next,
                }
                pool.free(current);
                self.len -= 1;
                return true;
            }
            prev = Some(current);
            cursor = next;
        }
        false
    }

    /// Whether `child` is linked under this list.
    pub fn contains(&self, pool: &Pool<ChildLink>, child: ProcessId) -> bool {
        self.iter(pool).any(|pid| pid == child)
    }

    /// Child PIDs in insertion order.
    pub fn iter<'a>(&self, pool: &'a Pool<ChildLink>) -> ChildIter<'a> {
        ChildIter {
            pool,
            cursor: self.head,
        }
    }

    /// Free every link, handing each child PID to `f`.
    pub fn drain(&mut self, pool: &mut Pool<ChildLink>, mut f: impl FnMut(ProcessId)) {
        let mut cursor = self.head.take();
        while let Some(id) = cursor {
            let Some(link) = pool.get(id).copied() else {
                break;
            };
            cursor = link.next;
            pool.free(id);
            f(link.child);
        }
        self.len = 0;
    }
}

/// Iterator over a [`ChildList`].
pub struct ChildIter<'a> {
    pool: &'a Pool<ChildLink>,
    cursor: Option<SlotId>,
}

impl Iterator for ChildIter<'_> {
    type Item = ProcessId;

    fn next(&mut self) -> Option<ProcessId> {
        let link = self.pool.get(self.cursor?)?;
        self.cursor = link.next;
        Some(link.child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn pids(list: &ChildList, pool: &Pool<ChildLink>) -> Vec<u64> {
        list.iter(pool).map(|pid| pid.0).collect()
    }

    #[test]
    fn test_push_keeps_insertion_order() {
        let mut pool = Pool::new("children", 8);
        let mut list = ChildList::new();
        for pid in [3, 1, 2] {
            list.push(&mut pool, ProcessId(pid)).unwrap();
        }
        assert_eq!(pids(&list, &pool), [3, 1, 2]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_remove_middle_head_and_missing() {
        let mut pool = Pool::new("children", 8);
        let mut list = ChildList::new();
        for pid in [4, 5, 6] {
            list.push(&mut pool, ProcessId(pid)).unwrap();
        }

        assert!(list.remove(&mut pool, ProcessId(5)));
        assert_eq!(pids(&list, &pool), [4, 6]);
        assert!(list.remove(&mut pool, ProcessId(4)));
        assert_eq!(pids(&list, &pool), [6]);
        assert!(!list.remove(&mut pool, ProcessId(9)));
        assert_eq!(pool.len(), 1);
        assert!(list.contains(&pool, ProcessId(6)));
        assert!(!list.contains(&pool, ProcessId(5)));
    }

    #[test]
    fn test_drain_frees_links() {
        let mut pool = Pool::new("children", 8);
        let mut list = ChildList::new();
        list.push(&mut pool, ProcessId(2)).unwrap();
        list.push(&mut pool, ProcessId(3)).unwrap();

        let mut seen = Vec::new();
        list.drain(&mut pool, |pid| seen.push(pid.0));
        assert_eq!(seen, [2, 3]);
        assert!(list.is_empty());
        assert!(pool.is_empty());
    }
}
