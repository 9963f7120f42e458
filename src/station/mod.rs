//! Station orchestration
//!
//! A station runs two concurrent loops over shared slot state:
//!
//! - the receive loop listens for the rest of each slot, records which slots peers
//!   announce, pulls the clock toward peers, detects collisions and advances the
//!   slot counter
//! - the send loop claims a free slot and transmits one payload per frame at the
//!   midpoint of that slot
//!
//! Shared state is the slot counter, the occupancy table, the clock offset and the
//! reservation. The receive loop is the only writer except for the reservation,
//! which the send loop sets and the receive loop clears.

mod events;
mod fault;
mod receive;
mod send;

pub use self::events::{FrameReport, StationEvent};
pub use self::fault::{CollisionInjector, NeverCollide, RandomCollisions};

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::{Error, Result, StationConfig};
use crate::frame::{FrameTable, Occupancy, Reservation, SlotCounter};
use crate::network::{MulticastTransport, Transport};
use crate::source::PayloadQueue;
use crate::time::{SyncClock, TimeBase};

const EVENT_CAPACITY: usize = 256;

/// State shared by the receive and send loops
#[derive(Debug)]
pub(crate) struct Shared {
    config: StationConfig,
    clock: SyncClock,
    slots: SlotCounter,
    table: Mutex<FrameTable>,
    reservation: Reservation,
    events: broadcast::Sender<StationEvent>,
    stop: CancellationToken,
}

impl Shared {
    fn new(config: StationConfig, base: TimeBase) -> Result<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Shared {
            clock: SyncClock::new(base, config.frame, config.clock_offset_ms)?,
            slots: SlotCounter::new(config.frame.slot_count),
            table: Mutex::new(FrameTable::new(config.frame.slot_count, config.rng_seed)),
            reservation: Reservation::new(),
            events,
            stop: CancellationToken::new(),
            config,
        })
    }

    fn emit(&self, event: StationEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Builder for [`Station`]
pub struct StationBuilder {
    config: StationConfig,
    base: Option<TimeBase>,
    injector: Option<Box<dyn CollisionInjector>>,
}

impl StationBuilder {
    pub fn new(config: StationConfig) -> Self {
        StationBuilder {
            config,
            base: None,
            injector: None,
        }
    }

    /// Uses an explicit wall-clock reference, e.g. one shared by simulated stations
    pub fn time_base(mut self, base: TimeBase) -> Self {
        self.base = Some(base);
        self
    }

    /// Replaces the collision injector derived from the configuration
    pub fn collision_injector(mut self, injector: impl CollisionInjector) -> Self {
        self.injector = Some(Box::new(injector));
        self
    }

    /// Creates a station on the given transport
    pub fn build<T: Transport>(self, transport: T) -> Result<Station<T>> {
        self.config.validate()?;

        let injector = match self.injector {
            Some(injector) => injector,
            None if self.config.simulated_collision_rate > 0.0 => Box::new(RandomCollisions::new(
                self.config.simulated_collision_rate,
                self.config.rng_seed,
            )),
            None => Box::new(NeverCollide),
        };
        let base = self.base.unwrap_or_else(TimeBase::now);

        Ok(Station {
            shared: Arc::new(Shared::new(self.config, base)?),
            transport: Arc::new(transport),
            injector,
        })
    }

    /// Joins the configured multicast group and creates a station on it
    pub fn bind(self) -> Result<Station<MulticastTransport>> {
        self.config.validate()?;
        let transport = MulticastTransport::bind(
            &self.config.interface,
            self.config.multicast_addr,
            self.config.port,
        )?;
        self.build(transport)
    }
}

/// One participant on the shared medium
pub struct Station<T: Transport> {
    shared: Arc<Shared>,
    transport: Arc<T>,
    injector: Box<dyn CollisionInjector>,
}

impl Station<MulticastTransport> {
    /// Joins the configured multicast group
    pub fn bind(config: StationConfig) -> Result<Self> {
        StationBuilder::new(config).bind()
    }
}

impl<T: Transport> Station<T> {
    /// Creates a station on the given transport with default timing and no fault injection
    pub fn new(config: StationConfig, transport: T) -> Result<Self> {
        StationBuilder::new(config).build(transport)
    }

    pub fn config(&self) -> &StationConfig {
        &self.shared.config
    }

    pub fn clock(&self) -> &SyncClock {
        &self.shared.clock
    }

    /// Slot the station currently believes the medium is in
    pub fn current_slot(&self) -> usize {
        self.shared.slots.get()
    }

    /// Slot this station has claimed, if any
    pub fn reserved_slot(&self) -> Option<usize> {
        self.shared.reservation.get()
    }

    /// Claims observed so far in the current frame
    pub async fn occupancy(&self) -> Occupancy {
        self.shared.table.lock().await.snapshot()
    }

    /// Subscribes to protocol events; only events after this call are delivered
    pub fn subscribe(&self) -> broadcast::Receiver<StationEvent> {
        self.shared.events.subscribe()
    }

    /// Token that stops both loops when cancelled
    pub fn stop_token(&self) -> CancellationToken {
        self.shared.stop.clone()
    }

    /// Runs the receive and send loops until stopped or a fatal error occurs
    pub async fn run(self, queue: PayloadQueue) -> Result<()> {
        let Station { shared, transport, injector } = self;

        info!(
            "station {} starting: {} slots of {:?}, offset {}ms",
            shared.config.station_class,
            shared.config.frame.slot_count,
            shared.config.frame.slot_duration,
            shared.clock.offset_ms()
        );

        let receive_handle = tokio::spawn(receive::run(
            Arc::clone(&shared),
            Arc::clone(&transport),
            injector,
        ));
        let send_handle = tokio::spawn(send::run(Arc::clone(&shared), transport, queue));

        let stop = shared.stop.clone();
        let result = tokio::try_join!(
            async {
                let res = receive_handle
                    .await
                    .map_err(|e| Error::interrupted(format!("receive task failed: {}", e)))?;
                if res.is_err() {
                    stop.cancel();
                }
                res
            },
            async {
                let res = send_handle
                    .await
                    .map_err(|e| Error::interrupted(format!("send task failed: {}", e)))?;
                if res.is_err() {
                    stop.cancel();
                }
                res
            }
        );

        shared.stop.cancel();
        info!("station {} stopped", shared.config.station_class);
        result.map(|_| ())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::FrameConfig;
    use crate::network::MemoryBus;
    use std::time::Duration;

    pub(crate) const EPOCH: u64 = 1_700_000_000_000;

    pub(crate) fn config() -> StationConfig {
        StationConfig {
            frame: FrameConfig::new(5, Duration::from_millis(200)),
            rng_seed: Some(9),
            ..Default::default()
        }
    }

    pub(crate) fn shared(config: StationConfig) -> Shared {
        Shared::new(config, TimeBase::at(EPOCH)).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let bus = MemoryBus::default();
        let config = StationConfig {
            queue_capacity: 0,
            ..config()
        };
        assert!(matches!(Station::new(config, bus.endpoint()), Err(Error::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_station_state() {
        let bus = MemoryBus::default();
        let station = StationBuilder::new(config())
            .time_base(TimeBase::at(EPOCH + 450))
            .build(bus.endpoint())
            .unwrap();

        assert_eq!(station.reserved_slot(), None);
        assert_eq!(station.clock().current_slot(), 2);
        assert_eq!(station.occupancy().await.occupied().count(), 0);
    }
}
