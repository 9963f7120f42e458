//! Frame bookkeeping
//!
//! Occupancy of the slots in the current frame, the slot counter shared by the
//! receive and send loops, and this station's own reservation.

mod slot;

pub use self::slot::{Reservation, SlotCounter};

use std::fmt;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::core::{Error, Result, StationClass};

/// Per-slot occupancy of one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupancy(Vec<Option<StationClass>>);

impl Occupancy {
    fn empty(slot_count: usize) -> Self {
        Occupancy(vec![None; slot_count])
    }

    /// Class that claimed `slot`, if any
    pub fn get(&self, slot: usize) -> Option<StationClass> {
        self.0.get(slot).copied().flatten()
    }

    pub fn is_free(&self, slot: usize) -> bool {
        self.get(slot).is_none()
    }

    pub fn slot_count(&self) -> usize {
        self.0.len()
    }

    /// Indices of occupied slots with their claimants
    pub fn occupied(&self) -> impl Iterator<Item = (usize, StationClass)> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(slot, class)| class.map(|c| (slot, c)))
    }
}

impl fmt::Display for Occupancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "|")?;
        for class in &self.0 {
            match class {
                Some(class) => write!(f, "{}|", class)?,
                None => write!(f, " |")?,
            }
        }
        Ok(())
    }
}

/// Advisory map of which slots were claimed, and by which class
///
/// Entries come from the next-slot announcements of received packets. The view can
/// be stale or differ between stations, so it only lowers the odds of a collision.
#[derive(Debug)]
pub struct FrameTable {
    occupancy: Occupancy,
    rng: StdRng,
}

impl FrameTable {
    /// Creates an empty table for a frame of `slot_count` slots
    pub fn new(slot_count: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        FrameTable {
            occupancy: Occupancy::empty(slot_count),
            rng,
        }
    }

    /// Marks a slot as claimed; the latest observation wins
    pub fn set_occupied(&mut self, slot: usize, class: StationClass) {
        if let Some(entry) = self.occupancy.0.get_mut(slot) {
            *entry = Some(class);
        }
    }

    pub fn set_unoccupied(&mut self, slot: usize) {
        if let Some(entry) = self.occupancy.0.get_mut(slot) {
            *entry = None;
        }
    }

    pub fn is_free(&self, slot: usize) -> bool {
        slot < self.occupancy.slot_count() && self.occupancy.is_free(slot)
    }

    pub fn free_count(&self) -> usize {
        self.occupancy.0.iter().filter(|c| c.is_none()).count()
    }

    /// Picks uniformly among the unoccupied slots
    pub fn random_free_slot(&mut self) -> Result<usize> {
        let free: Vec<usize> = (0..self.occupancy.slot_count())
            .filter(|&slot| self.occupancy.is_free(slot))
            .collect();

        free.choose(&mut self.rng).copied().ok_or(Error::NoFreeSlot)
    }

    /// Clears all occupancy, returning what the finished frame looked like
    pub fn reset(&mut self) -> Occupancy {
        let slot_count = self.occupancy.slot_count();
        std::mem::replace(&mut self.occupancy, Occupancy::empty(slot_count))
    }

    pub fn snapshot(&self) -> Occupancy {
        self.occupancy.clone()
    }
}
