use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

use crate::core::{FrameConfig, Result};
use crate::protocol::Packet;

/// Wall-clock reference: Unix-epoch milliseconds pinned to a monotonic instant
///
/// Later readings advance with the monotonic clock, so they are immune to
/// wall-clock steps and follow tokio's paused clock in tests.
#[derive(Debug, Clone, Copy)]
pub struct TimeBase {
    epoch_ms: u64,
    origin: Instant,
}

impl TimeBase {
    /// Anchors at the current system time
    pub fn now() -> Self {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self::at(epoch_ms)
    }

    /// Anchors the current instant at a fixed epoch time
    pub fn at(epoch_ms: u64) -> Self {
        TimeBase {
            epoch_ms,
            origin: Instant::now(),
        }
    }

    /// Current wall-clock time in ms since the Unix epoch
    pub fn wall_ms(&self) -> u64 {
        let elapsed = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.epoch_ms.saturating_add(elapsed)
    }
}

/// Logical clock shared by the receive and send loops
///
/// `now = wall + offset`. Slot boundaries fall on multiples of the slot duration,
/// frame boundaries on multiples of the frame duration. Only the receive loop moves
/// the offset.
#[derive(Debug)]
pub struct SyncClock {
    base: TimeBase,
    offset_ms: AtomicI64,
    frame: FrameConfig,
}

impl SyncClock {
    /// Creates a clock over a validated frame geometry
    pub fn new(base: TimeBase, frame: FrameConfig, offset_ms: i64) -> Result<Self> {
        frame.validate()?;
        Ok(SyncClock {
            base,
            offset_ms: AtomicI64::new(offset_ms),
            frame,
        })
    }

    /// Logical time in ms since the Unix epoch
    pub fn now_ms(&self) -> u64 {
        self.base.wall_ms().saturating_add_signed(self.offset_ms())
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::Acquire)
    }

    /// Slot index the logical time `now_ms` falls into
    pub fn slot_at(&self, now_ms: u64) -> usize {
        ((now_ms % self.frame.frame_ms()) / self.frame.slot_ms()) as usize
    }

    pub fn current_slot(&self) -> usize {
        self.slot_at(self.now_ms())
    }

    /// Time until the current slot ends; never zero
    pub fn remaining_in_slot(&self) -> Duration {
        let slot = self.frame.slot_ms();
        Duration::from_millis(slot - self.now_ms() % slot)
    }

    /// Time until the clock reaches the end of `slot`, zero if it already has
    ///
    /// Equals `remaining_in_slot` while `slot` is the current slot. After an offset
    /// correction it lengthens or shortens the window so that a slot counter
    /// following these boundaries stays in step with the clock.
    pub fn remaining_until_end_of(&self, slot: usize) -> Duration {
        let frame = self.frame.frame_ms() as i64;
        let end = ((slot as i64 + 1) * self.frame.slot_ms() as i64) % frame;
        let now = (self.now_ms() % frame as u64) as i64;

        // signed distance, wrapped into (-frame/2, frame/2]
        let mut delta = (end - now).rem_euclid(frame);
        if delta > frame / 2 {
            delta -= frame;
        }
        Duration::from_millis(delta.max(0) as u64)
    }

    /// Time until the frame wraps; never zero
    pub fn remaining_in_frame(&self) -> Duration {
        let frame = self.frame.frame_ms();
        Duration::from_millis(frame - self.now_ms() % frame)
    }

    /// Time until the middle of the current slot, zero once it has passed
    pub fn remaining_to_slot_midpoint(&self) -> Duration {
        let slot = self.frame.slot_ms();
        Duration::from_millis((slot / 2).saturating_sub(self.now_ms() % slot))
    }

    /// Pulls the offset toward the phase implied by a peer's packet
    ///
    /// `received_at` is the local logical time at which the packet arrived. The
    /// offset moves half the distance to the peer's send time, at least one
    /// millisecond and never past it. Returns the applied correction.
    pub fn sync(&self, packet: &Packet, received_at: u64) -> i64 {
        let diff = packet.send_time as i128 - received_at as i128;
        let diff = diff.clamp(i64::MIN as i128, i64::MAX as i128) as i64;

        let mut step = diff / 2;
        if step == 0 {
            step = diff.signum();
        }
        if step != 0 {
            self.offset_ms.fetch_add(step, Ordering::AcqRel);
        }
        step
    }
}
