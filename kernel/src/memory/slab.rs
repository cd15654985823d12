//! Fixed-capacity object pools.
//!
//! Process records, child links and pending signals are all drawn from a
//! [`Pool`]. Slots are addressed by a [`SlotId`] that carries a generation
//! counter, so a stale handle to a freed and reissued slot never resolves
//! to the new occupant.
//!
//! The backing storage grows lazily up to the configured capacity. Free
//! slots are tracked in a bitmap and the lowest free index is always
//! reused first.

use alloc::vec::Vec;
use core::fmt;

/// Handle to an issued pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    index: u32,
    generation: u32,
}

impl SlotId {
    /// Slot index inside the pool.
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Generation the slot had when this handle was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Pool allocation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// Every slot up to the capacity is in use.
    Exhausted,
    /// The backing storage could not grow.
    AllocFailed,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Exhausted => write!(f, "pool exhausted"),
            PoolError::AllocFailed => write!(f, "pool storage allocation failed"),
        }
    }
}

struct Slot<T> {
    value: T,
    generation: u32,
    in_use: bool,
}

/// A bounded pool of `T` records.
///
/// Issued records are always reset to `T::default()` and then passed to
/// the pool's constructor hook. Freed records keep their contents until
/// they are reissued.
pub struct Pool<T> {
    name: &'static str,
    capacity: usize,
    slots: Vec<Slot<T>>,
    /// Bit set = slot is materialized and free.
    free_bitmap: Vec<u64>,
    in_use: usize,
    on_init: Option<fn(&mut T)>,
    on_release: Option<fn(&mut T)>,
}

impl<T: Default> Pool<T> {
    /// Create an empty pool. No storage is reserved up front.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity: capacity.min(u32::MAX as usize),
            slots: Vec::new(),
            free_bitmap: Vec::new(),
            in_use: 0,
            on_init: None,
            on_release: None,
        }
    }

    /// Constructor hook run on every issued record.
    pub fn with_constructor(mut self, on_init: fn(&mut T)) -> Self {
        self.on_init = Some(on_init);
        self
    }

    /// Hook run on a record when it is returned to the pool.
    pub fn with_destructor(mut self, on_release: fn(&mut T)) -> Self {
        self.on_release = Some(on_release);
        self
    }

    /// Issue a fresh record.
    pub fn alloc(&mut self) -> Result<SlotId, PoolError> {
        let index = match self.first_free() {
            Some(index) => {
                self.free_bitmap[index / 64] &= !(1u64 << (index % 64));
                let slot = &mut self.slots[index];
                slot.value = T::default();
                index
            }
            None => self.grow()?,
        };

        let slot = &mut self.slots[index];
        if let Some(on_init) = self.on_init {
            on_init(&mut slot.value);
        }
        slot.in_use = true;
        self.in_use += 1;

        Ok(SlotId {
            index: index as u32,
            generation: slot.generation,
        })
    }

    fn grow(&mut self) -> Result<usize, PoolError> {
        let index = self.slots.len();
        if index >= self.capacity {
            log::debug!("[POOL] {} exhausted ({} slots)", self.name, self.capacity);
            return Err(PoolError::Exhausted);
        }

        self.slots
            .try_reserve(1)
            .map_err(|_| PoolError::AllocFailed)?;
        if index / 64 >= self.free_bitmap.len() {
            self.free_bitmap
                .try_reserve(1)
                .map_err(|_| PoolError::AllocFailed)?;
            self.free_bitmap.push(0);
        }

        self.slots.push(Slot {
            value: T::default(),
            generation: 0,
            in_use: false,
        });
        Ok(index)
    }

    fn first_free(&self) -> Option<usize> {
        self.free_bitmap
            .iter()
            .enumerate()
            .find(|(_, word)| **word != 0)
            .map(|(i, word)| i * 64 + word.trailing_zeros() as usize)
    }
}

impl<T> Pool<T> {
    /// Return a record to the pool.
    ///
    /// Returns `false` if the handle is stale or was never issued.
    pub fn free(&mut self, id: SlotId) -> bool {
        let Some(slot) = self.slots.get_mut(id.index()) else {
            return false;
        };
        if !slot.in_use || slot.generation != id.generation {
            log::warn!("[POOL] {}: free of stale slot {:?}", self.name, id);
            return false;
        }

        if let Some(on_release) = self.on_release {
            on_release(&mut slot.value);
        }
        slot.in_use = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_bitmap[id.index() / 64] |= 1u64 << (id.index() % 64);
        self.in_use -= 1;
        true
    }

    /// Borrow a live record.
    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.in_use && slot.generation == id.generation)
            .map(|slot| &slot.value)
    }

    /// Mutably borrow a live record.
    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.in_use && slot.generation == id.generation)
            .map(|slot| &mut slot.value)
    }

    /// Whether `id` refers to a live record.
    pub fn contains(&self, id: SlotId) -> bool {
        self.get(id).is_some()
    }

    /// Number of issued records.
    pub fn len(&self) -> usize {
        self.in_use
    }

    /// Whether no record is issued.
    pub fn is_empty(&self) -> bool {
        self.in_use == 0
    }

    /// Whether every slot up to the capacity is issued.
    pub fn is_full(&self) -> bool {
        self.in_use >= self.capacity
    }

    /// Maximum number of records.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Name used in log lines.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Iterate over live records in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.in_use)
            .map(|(index, slot)| {
                (
                    SlotId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    &slot.value,
                )
            })
    }
}
