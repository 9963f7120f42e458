use std::sync::atomic::{AtomicUsize, Ordering};

/// Index of the current slot, shared by both station loops
#[derive(Debug)]
pub struct SlotCounter {
    current: AtomicUsize,
    slot_count: usize,
}

impl SlotCounter {
    pub fn new(slot_count: usize) -> Self {
        SlotCounter {
            current: AtomicUsize::new(0),
            slot_count,
        }
    }

    pub fn get(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    /// Moves to an absolute slot, e.g. when aligning with the clock
    pub fn set(&self, slot: usize) {
        self.current.store(slot % self.slot_count, Ordering::Release);
    }

    /// Moves to the next slot and returns it along with whether the frame wrapped
    pub fn advance(&self) -> (usize, bool) {
        let n = self.slot_count;
        let previous = self
            .current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |slot| Some((slot + 1) % n))
            .unwrap_or_else(|slot| slot);
        let next = (previous + 1) % n;
        (next, next == 0)
    }
}

const UNASSIGNED: usize = usize::MAX;

/// This station's claimed send slot
#[derive(Debug)]
pub struct Reservation(AtomicUsize);

impl Reservation {
    pub fn new() -> Self {
        Reservation(AtomicUsize::new(UNASSIGNED))
    }

    pub fn get(&self) -> Option<usize> {
        match self.0.load(Ordering::Acquire) {
            UNASSIGNED => None,
            slot => Some(slot),
        }
    }

    pub fn set(&self, slot: usize) {
        self.0.store(slot, Ordering::Release);
    }

    /// Clears the reservation if it still holds `slot`
    pub fn release(&self, slot: usize) -> bool {
        self.0
            .compare_exchange(slot, UNASSIGNED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn holds(&self, slot: usize) -> bool {
        self.get() == Some(slot)
    }
}

impl Default for Reservation {
    fn default() -> Self {
        Self::new()
    }
}
