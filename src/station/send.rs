use std::sync::Arc;

use tracing::{debug, info};

use crate::core::Result;
use crate::network::Transport;
use crate::protocol::{Packet, PacketCodec};
use crate::source::PayloadQueue;
use crate::util::sleep_or_stop;
use super::{Shared, StationEvent};

impl Shared {
    /// Claims a slot: the preferred one if it is free, otherwise a random free one
    pub(super) async fn acquire_slot(&self, preferred: Option<usize>) -> Result<usize> {
        let slot = {
            let mut table = self.table.lock().await;
            match preferred {
                Some(slot) if table.is_free(slot) => slot,
                _ => table.random_free_slot()?,
            }
        };

        self.reservation.set(slot);
        info!("chose send slot {}", slot);
        self.emit(StationEvent::SlotReserved { slot });
        Ok(slot)
    }

    /// Whether both the slot counter and the clock are in `slot`
    fn in_slot(&self, slot: usize) -> bool {
        self.slots.get() == slot && self.clock.current_slot() == slot
    }
}

/// Send loop: one payload per frame, at the middle of the reserved slot
///
/// Returns `Ok` when stopped or when the payload source is exhausted. Transmission
/// failures are fatal.
pub(super) async fn run<T: Transport>(
    shared: Arc<Shared>,
    transport: Arc<T>,
    mut queue: PayloadQueue,
) -> Result<()> {
    let mut codec = PacketCodec::new(shared.config.frame.slot_count);
    let tolerance = shared.config.tolerance;
    let stop = shared.stop.clone();

    let wait = shared.clock.remaining_in_slot() + tolerance;
    info!("waiting rest of current slot ({:?})", wait);
    if !sleep_or_stop(wait, &stop).await {
        return Ok(());
    }

    info!("listening for {} slot(s)", shared.config.startup_listen_slots);
    for _ in 0..shared.config.startup_listen_slots {
        if !sleep_or_stop(shared.clock.remaining_in_slot() + tolerance, &stop).await {
            return Ok(());
        }
    }

    let mut preferred = shared.config.preferred_slot;

    loop {
        let payload = tokio::select! {
            _ = stop.cancelled() => return Ok(()),
            payload = queue.take_data() => match payload {
                Some(payload) => payload,
                None => {
                    info!("payload source closed, send loop finished");
                    return Ok(());
                }
            },
        };

        // Reacquire whenever the receive loop drops the reservation
        let slot = loop {
            let slot = match shared.reservation.get() {
                Some(slot) => slot,
                None => match shared.acquire_slot(preferred.take()).await {
                    Ok(slot) => slot,
                    Err(e) if e.is_recoverable() => {
                        debug!("{}, backing off", e);
                        if !sleep_or_stop(shared.config.frame.slot_duration, &stop).await {
                            return Ok(());
                        }
                        continue;
                    }
                    Err(e) => return Err(e),
                },
            };

            // A payload that shows up after the midpoint waits for the next occurrence
            if shared.in_slot(slot) && !shared.clock.remaining_to_slot_midpoint().is_zero() {
                let wait = shared.clock.remaining_to_slot_midpoint() + tolerance;
                if !sleep_or_stop(wait, &stop).await {
                    return Ok(());
                }
                if shared.reservation.holds(slot) && shared.in_slot(slot) {
                    break slot;
                }
                debug!("lost slot {} while waiting for its midpoint", slot);
            }

            if !sleep_or_stop(shared.clock.remaining_in_slot() + tolerance, &stop).await {
                return Ok(());
            }
        };

        // Stations keep their slot for the session
        let mut packet = Packet::new(shared.config.station_class, payload, slot);
        packet.stamp(shared.clock.now_ms());
        let send_time = packet.send_time;
        let datagram = codec.encode_packet(packet)?;
        transport.send(&datagram).await?;

        debug!("sent in slot {} at {}", slot, send_time);
        shared.emit(StationEvent::Transmitted { slot, send_time });

        if !sleep_or_stop(shared.clock.remaining_in_frame() + tolerance, &stop).await {
            return Ok(());
        }
    }
}
