//! Pending signal queues.
//!
//! Each process owns a FIFO of signal numbers. Entries are drawn from a
//! shared [`Pool`] and linked through their `next` field. Delivery is
//! handled elsewhere; this module only records what is pending.

use crate::memory::{Pool, PoolError, SlotId};

// ─── Signal numbers (Linux x86_64) ──────────────────────────────────

pub const SIGHUP: u8 = 1;
pub const SIGINT: u8 = 2;
pub const SIGQUIT: u8 = 3;
pub const SIGILL: u8 = 4;
pub const SIGTRAP: u8 = 5;
pub const SIGABRT: u8 = 6;
pub const SIGBUS: u8 = 7;
pub const SIGFPE: u8 = 8;
pub const SIGKILL: u8 = 9;
pub const SIGUSR1: u8 = 10;
pub const SIGSEGV: u8 = 11;
pub const SIGUSR2: u8 = 12;
pub const SIGPIPE: u8 = 13;
pub const SIGALRM: u8 = 14;
pub const SIGTERM: u8 = 15;
pub const SIGCHLD: u8 = 17;
pub const SIGCONT: u8 = 18;
pub const SIGSTOP: u8 = 19;
pub const SIGTSTP: u8 = 20;

/// Number of signal numbers, including the unused 0.
pub const SIGNALS_COUNT: usize = 64;

/// Whether `signo` names a real signal.
pub fn is_valid(signo: u8) -> bool {
    signo != 0 && (signo as usize) < SIGNALS_COUNT
}

/// One queued signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct Signal {
    pub(crate) signo: u8,
    pub(crate) next: Option<SlotId>,
}

impl Signal {
    pub fn number(&self) -> u8 {
        self.signo
    }
}

/// Per-process FIFO of pending signals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalQueue {
    head: Option<SlotId>,
    tail: Option<SlotId>,
    len: usize,
}

impl SignalQueue {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append `signo` at the tail.
    pub fn push(&mut self, pool: &mut Pool<Signal>, signo: u8) -> Result<(), PoolError> {
        let id = pool.alloc()?;
        if let Some(entry) = pool.get_mut(id) {
            entry.signo = signo;
            entry.next = None;
        }

        match self.tail.and_then(|tail| pool.get_mut(tail)) {
            Some(tail) => tail.next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
        Ok(())
    }

    /// Signal numbers in arrival order.
    pub fn iter<'a>(&self, pool: &'a Pool<Signal>) -> SignalIter<'a> {
        SignalIter {
            pool,
            cursor: self.head,
        }
    }

    /// Return every entry to the pool. Returns the number discarded.
    pub fn clear(&mut self, pool: &mut Pool<Signal>) -> usize {
        let mut cursor = self.head.take();
        let mut discarded = 0;
        while let Some(id) = cursor {
            cursor = pool.get(id).and_then(|entry| entry.next);
            if pool.free(id) {
                discarded += 1;
            }
        }
        self.tail = None;
        self.len = 0;
        discarded
    }
}

/// Iterator over a [`SignalQueue`].
pub struct SignalIter<'a> {
    pool: &'a Pool<Signal>,
    cursor: Option<SlotId>,
}

impl Iterator for SignalIter<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        let entry = self.pool.get(self.cursor?)?;
        self.cursor = entry.next;
        Some(entry.signo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn test_signal_validity() {
        assert!(!is_valid(0));
        assert!(is_valid(SIGKILL));
        assert!(is_valid((SIGNALS_COUNT - 1) as u8));
        assert!(!is_valid(SIGNALS_COUNT as u8));
    }

    #[test]
    fn test_queue_is_fifo() {
        let mut pool = Pool::new("signals", 8);
        let mut queue = SignalQueue::new();
        queue.push(&mut pool, SIGTERM).unwrap();
        queue.push(&mut pool, SIGINT).unwrap();
        queue.push(&mut pool, SIGTERM).unwrap();

        let pending: Vec<u8> = queue.iter(&pool).collect();
        assert_eq!(pending, [SIGTERM, SIGINT, SIGTERM]);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_clear_returns_entries() {
        let mut pool = Pool::new("signals", 4);
        let mut queue = SignalQueue::new();
        queue.push(&mut pool, SIGHUP).unwrap();
        queue.push(&mut pool, SIGUSR1).unwrap();

        assert_eq!(queue.clear(&mut pool), 2);
        assert!(queue.is_empty());
        assert!(pool.is_empty());
        assert_eq!(queue.iter(&pool).count(), 0);
    }

    #[test]
    fn test_push_fails_when_pool_full() {
        let mut pool = Pool::new("signals", 1);
        let mut queue = SignalQueue::new();
        queue.push(&mut pool, SIGHUP).unwrap();
        assert_eq!(queue.push(&mut pool, SIGINT), Err(PoolError::Exhausted));
        assert_eq!(queue.len(), 1);
    }
}
