use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::core::Result;
use crate::frame::{FrameTable, Occupancy};
use crate::network::Transport;
use crate::protocol::{Packet, PacketCodec};
use crate::util::sleep_or_stop;
use super::{CollisionInjector, FrameReport, Shared, StationEvent};

/// Large enough to detect oversized datagrams instead of truncating them to size
const RECV_BUFFER_SIZE: usize = 2048;

/// Packets seen during one slot's listen window
#[derive(Debug, Default)]
pub(super) struct SlotWindow {
    received: usize,
    last: Option<(Packet, u64)>,
}

impl SlotWindow {
    pub(super) fn record(&mut self, packet: Packet, received_at: u64) {
        self.received += 1;
        self.last = Some((packet, received_at));
    }

    fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

/// What closing a slot changed
#[derive(Debug, Default, PartialEq, Eq)]
pub(super) struct SlotOutcome {
    pub slot: usize,
    pub received: usize,
    /// Clock correction applied, if the slot was used for synchronization
    pub correction: Option<i64>,
    pub collision: bool,
    pub own: bool,
    pub released: bool,
    /// Occupancy of the frame that ended with this slot
    pub finished_frame: Option<Occupancy>,
}

impl Shared {
    /// Applies the observations of the current slot and moves to the next one
    pub(super) fn close_slot(
        &self,
        table: &mut FrameTable,
        window: SlotWindow,
        injector: &mut dyn CollisionInjector,
    ) -> SlotOutcome {
        let slot = self.slots.get();
        let own = self.reservation.holds(slot);
        let mut outcome = SlotOutcome {
            slot,
            received: window.received,
            own,
            ..Default::default()
        };

        if let (1, Some((packet, received_at))) = (window.received, window.last.as_ref()) {
            table.set_occupied(packet.next_slot, packet.station_class);
            // our own packet says nothing about the peers' phase
            if !own {
                outcome.correction = Some(self.clock.sync(packet, *received_at));
            }
        }

        let simulated = window.received == 1 && injector.simulate_collision(slot);
        if window.received > 1 || simulated {
            outcome.collision = true;
            if own && self.reservation.release(slot) {
                table.set_unoccupied(slot);
                outcome.released = true;
            }
        }

        let (_, wrapped) = self.slots.advance();
        if wrapped {
            outcome.finished_frame = Some(table.reset());
        }

        outcome
    }
}

#[derive(Debug, Default)]
struct FrameStats {
    frame: u64,
    collisions: usize,
}

/// Receive loop: one listen window per slot, forever
pub(super) async fn run<T: Transport>(
    shared: Arc<Shared>,
    transport: Arc<T>,
    mut injector: Box<dyn CollisionInjector>,
) -> Result<()> {
    let mut codec = PacketCodec::new(shared.config.frame.slot_count);
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    let mut window = SlotWindow::default();
    let mut stats = FrameStats::default();

    shared.slots.set(shared.clock.current_slot());
    debug!("receive loop starting in slot {}", shared.slots.get());

    loop {
        let listen = shared.clock.remaining_until_end_of(shared.slots.get());

        tokio::select! {
            _ = shared.stop.cancelled() => break,

            res = timeout(listen, transport.recv(&mut buf)) => match res {
                Ok(Ok(len)) => {
                    let received_at = shared.clock.now_ms();
                    match codec.decode_datagram(&buf[..len]) {
                        Ok(packet) => {
                            let slot = shared.slots.get();
                            debug!("received in slot {}: {}", slot, packet);
                            window.record(packet.clone(), received_at);
                            shared.emit(StationEvent::Received { slot, packet });
                        }
                        Err(e) if e.is_recoverable() => debug!("discarding datagram: {}", e),
                        Err(e) => return Err(e),
                    }
                }
                Ok(Err(e)) => return Err(e),
                Err(_elapsed) => {
                    let outcome = {
                        let mut table = shared.table.lock().await;
                        shared.close_slot(&mut table, window.take(), injector.as_mut())
                    };
                    report(&shared, outcome, &mut stats);

                    if !sleep_or_stop(shared.config.tolerance, &shared.stop).await {
                        break;
                    }
                }
            }
        }
    }

    info!("receive loop stopped");
    Ok(())
}

fn report(shared: &Shared, outcome: SlotOutcome, stats: &mut FrameStats) {
    if let Some(correction_ms) = outcome.correction.filter(|&c| c != 0) {
        let offset_ms = shared.clock.offset_ms();
        debug!("clock adjusted by {}ms, offset now {}ms", correction_ms, offset_ms);
        shared.emit(StationEvent::ClockAdjusted { correction_ms, offset_ms });
    }

    if outcome.collision {
        stats.collisions += 1;
        if outcome.own {
            warn!("collision while sending in slot {}", outcome.slot);
        } else {
            debug!("collision in slot {} ({} packets)", outcome.slot, outcome.received);
        }
        shared.emit(StationEvent::Collision {
            slot: outcome.slot,
            received: outcome.received,
            own: outcome.own,
        });
    }

    if outcome.released {
        shared.emit(StationEvent::SlotReleased { slot: outcome.slot });
    }

    if let Some(occupancy) = outcome.finished_frame {
        let offset_ms = shared.clock.offset_ms();
        debug!(
            "frame {} {} offset: {}ms, collisions: {}",
            stats.frame, occupancy, offset_ms, stats.collisions
        );
        shared.emit(StationEvent::FrameCompleted(FrameReport {
            frame: stats.frame,
            occupancy,
            offset_ms,
            collisions: stats.collisions,
        }));
        stats.frame += 1;
        stats.collisions = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StationClass;
    use crate::protocol::Payload;
    use crate::station::fault::NeverCollide;
    use crate::station::tests::{config, shared, EPOCH};

    fn packet(class: StationClass, next_slot: usize, send_time: u64) -> Packet {
        let mut packet = Packet::new(class, Payload::new(b"data").unwrap(), next_slot);
        packet.stamp(send_time);
        packet
    }

    fn window(packets: &[Packet], received_at: u64) -> SlotWindow {
        let mut window = SlotWindow::default();
        for p in packets {
            window.record(p.clone(), received_at);
        }
        window
    }

    fn table() -> FrameTable {
        FrameTable::new(5, Some(1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_packet_marks_and_syncs() {
        let shared = shared(config());
        let mut table = table();
        shared.slots.set(2);

        let w = window(&[packet(StationClass::A, 2, EPOCH + 40)], EPOCH);
        let outcome = shared.close_slot(&mut table, w, &mut NeverCollide);

        assert_eq!(outcome.correction, Some(20));
        assert!(!outcome.collision);
        assert_eq!(table.snapshot().get(2), Some(StationClass::A));
        assert_eq!(shared.clock.offset_ms(), 20);
        assert_eq!(shared.slots.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_slot_changes_nothing() {
        let shared = shared(config());
        let mut table = table();

        let outcome = shared.close_slot(&mut table, SlotWindow::default(), &mut NeverCollide);

        assert_eq!(outcome.correction, None);
        assert!(!outcome.collision);
        assert_eq!(table.free_count(), 5);
        assert_eq!(shared.clock.offset_ms(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sync_from_multiple_packets() {
        let shared = shared(config());
        let mut table = table();
        shared.slots.set(1);

        let w = window(
            &[
                packet(StationClass::A, 1, EPOCH + 90),
                packet(StationClass::B, 1, EPOCH - 90),
            ],
            EPOCH,
        );
        let outcome = shared.close_slot(&mut table, w, &mut NeverCollide);

        assert!(outcome.collision);
        assert!(!outcome.own);
        assert_eq!(outcome.correction, None);
        assert_eq!(shared.clock.offset_ms(), 0);
        assert_eq!(table.free_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sync_from_own_slot() {
        let shared = shared(config());
        let mut table = table();
        shared.slots.set(3);
        shared.reservation.set(3);

        let w = window(&[packet(StationClass::B, 3, EPOCH + 50)], EPOCH);
        let outcome = shared.close_slot(&mut table, w, &mut NeverCollide);

        assert_eq!(outcome.correction, None);
        assert_eq!(shared.clock.offset_ms(), 0);
        assert_eq!(table.snapshot().get(3), Some(StationClass::B));
        assert_eq!(shared.reservation.get(), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_collision_in_own_slot_releases() {
        let shared = shared(config());
        let mut table = table();
        shared.slots.set(1);
        shared.reservation.set(1);
        table.set_occupied(1, StationClass::B);

        let w = window(
            &[
                packet(StationClass::B, 1, EPOCH),
                packet(StationClass::A, 1, EPOCH),
            ],
            EPOCH,
        );
        let outcome = shared.close_slot(&mut table, w, &mut NeverCollide);

        assert!(outcome.collision);
        assert!(outcome.own);
        assert!(outcome.released);
        assert_eq!(shared.reservation.get(), None);
        assert!(table.is_free(1));
        assert_eq!(table.random_free_slot().map(|s| s < 5).ok(), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_collision_elsewhere_keeps_reservation() {
        let shared = shared(config());
        let mut table = table();
        shared.slots.set(1);
        shared.reservation.set(4);

        let w = window(
            &[
                packet(StationClass::B, 1, EPOCH),
                packet(StationClass::A, 1, EPOCH),
            ],
            EPOCH,
        );
        let outcome = shared.close_slot(&mut table, w, &mut NeverCollide);

        assert!(outcome.collision);
        assert!(!outcome.released);
        assert_eq!(shared.reservation.get(), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_collision_on_single_reception() {
        let shared = shared(config());
        let mut table = table();
        shared.slots.set(2);
        shared.reservation.set(2);

        let mut always = |_slot: usize| true;
        let w = window(&[packet(StationClass::B, 2, EPOCH)], EPOCH);
        let outcome = shared.close_slot(&mut table, w, &mut always);

        assert!(outcome.collision);
        assert!(outcome.released);
        assert!(table.is_free(2));

        // an empty slot is never a simulated collision
        let outcome = shared.close_slot(&mut table, SlotWindow::default(), &mut always);
        assert!(!outcome.collision);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrap_resets_occupancy_once() {
        let shared = shared(config());
        let mut table = table();
        shared.slots.set(3);

        let w = window(&[packet(StationClass::A, 0, EPOCH)], EPOCH);
        assert!(shared.close_slot(&mut table, w, &mut NeverCollide).finished_frame.is_none());

        let outcome = shared.close_slot(&mut table, SlotWindow::default(), &mut NeverCollide);
        let finished = outcome.finished_frame.expect("frame should wrap after slot 4");
        assert_eq!(finished.get(0), Some(StationClass::A));
        assert_eq!(table.free_count(), 5);
        assert_eq!(shared.slots.get(), 0);

        let mut resets = 0;
        for _ in 0..10 {
            let outcome = shared.close_slot(&mut table, SlotWindow::default(), &mut NeverCollide);
            if outcome.finished_frame.is_some() {
                resets += 1;
            }
        }
        assert_eq!(resets, 2);
    }
}
