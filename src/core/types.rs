use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Error, Result};

/// Category of a transmitting station, carried in every packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StationClass {
    A,
    B,
}

impl StationClass {
    /// Wire representation (ASCII letter)
    pub fn as_byte(self) -> u8 {
        match self {
            StationClass::A => b'A',
            StationClass::B => b'B',
        }
    }

    /// Parses the wire representation
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            b'A' => Ok(StationClass::A),
            b'B' => Ok(StationClass::B),
            other => Err(Error::malformed(format!("unknown station class 0x{:02x}", other))),
        }
    }
}

impl fmt::Display for StationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_byte() as char)
    }
}

impl std::str::FromStr for StationClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "A" | "a" => Ok(StationClass::A),
            "B" | "b" => Ok(StationClass::B),
            other => Err(Error::config(format!("unknown station class '{}'", other))),
        }
    }
}

/// Frame geometry shared by every station on the medium
///
/// All participants must agree on these values; there is no negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Number of slots per frame
    pub slot_count: usize,
    /// Duration of a single slot
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub slot_duration: Duration,
}

impl FrameConfig {
    /// Creates a frame configuration
    pub fn new(slot_count: usize, slot_duration: Duration) -> Self {
        FrameConfig { slot_count, slot_duration }
    }

    /// Slot duration in whole milliseconds
    pub fn slot_ms(&self) -> u64 {
        u64::try_from(self.slot_duration.as_millis()).unwrap_or(u64::MAX)
    }

    /// Frame duration in whole milliseconds
    pub fn frame_ms(&self) -> u64 {
        self.slot_ms().saturating_mul(self.slot_count as u64)
    }

    /// Duration of a full frame
    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(self.frame_ms())
    }

    pub fn validate(&self) -> Result<()> {
        if self.slot_count == 0 || self.slot_count > super::MAX_SLOT_COUNT {
            return Err(Error::config(format!(
                "slot count must be within 1..={}, got {}",
                super::MAX_SLOT_COUNT,
                self.slot_count
            )));
        }
        if self.slot_ms() < 2 {
            return Err(Error::config("slot duration must be at least 2ms"));
        }
        Ok(())
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        FrameConfig {
            slot_count: super::DEFAULT_SLOT_COUNT,
            slot_duration: Duration::from_millis(super::DEFAULT_SLOT_DURATION_MS),
        }
    }
}

/// Configuration for a single station
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Network interface to send and receive on (empty for any)
    pub interface: String,
    /// Multicast group
    pub multicast_addr: Ipv4Addr,
    /// Multicast port
    pub port: u16,
    /// This station's class tag
    pub station_class: StationClass,
    /// Initial clock offset in milliseconds
    pub clock_offset_ms: i64,
    /// Frame geometry
    pub frame: FrameConfig,
    /// Delay applied after each slot boundary to absorb scheduling jitter
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub tolerance: Duration,
    /// Full slots to listen passively before the first transmission
    pub startup_listen_slots: u32,
    /// Capacity of the outgoing payload queue
    pub queue_capacity: usize,
    /// Slot to claim on the first acquisition, if free
    pub preferred_slot: Option<usize>,
    /// Probability of treating a clean single reception as a collision
    pub simulated_collision_rate: f64,
    /// Seed for slot selection and fault injection
    pub rng_seed: Option<u64>,
}

impl StationConfig {
    /// Checks that the configuration is consistent
    pub fn validate(&self) -> Result<()> {
        self.frame.validate()?;

        if self.tolerance * 2 >= self.frame.slot_duration {
            return Err(Error::config("tolerance must be less than half a slot"));
        }
        if self.queue_capacity == 0 {
            return Err(Error::config("queue capacity must be positive"));
        }
        if let Some(slot) = self.preferred_slot {
            if slot >= self.frame.slot_count {
                return Err(Error::config(format!(
                    "preferred slot {} outside frame of {} slots",
                    slot, self.frame.slot_count
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.simulated_collision_rate) {
            return Err(Error::config("simulated collision rate must be within [0, 1]"));
        }
        if !self.multicast_addr.is_multicast() {
            return Err(Error::config(format!(
                "{} is not a multicast address",
                self.multicast_addr
            )));
        }

        Ok(())
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        StationConfig {
            interface: String::new(),
            multicast_addr: super::DEFAULT_MULTICAST_ADDR,
            port: super::DEFAULT_PORT,
            station_class: StationClass::B,
            clock_offset_ms: 0,
            frame: FrameConfig::default(),
            tolerance: Duration::from_millis(super::DEFAULT_TOLERANCE_MS),
            startup_listen_slots: 1,
            queue_capacity: super::DEFAULT_QUEUE_CAPACITY,
            preferred_slot: None,
            simulated_collision_rate: 0.0,
            rng_seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_class_wire() {
        assert_eq!(StationClass::A.as_byte(), b'A');
        assert_eq!(StationClass::from_byte(b'B').unwrap(), StationClass::B);
        assert!(matches!(StationClass::from_byte(b'C'), Err(Error::MalformedPacket(_))));
        assert_eq!("a".parse::<StationClass>().unwrap(), StationClass::A);
    }

    #[test]
    fn test_frame_timing() {
        let frame = FrameConfig::new(5, Duration::from_millis(200));
        assert_eq!(frame.slot_ms(), 200);
        assert_eq!(frame.frame_ms(), 1000);
        assert_eq!(frame.frame_duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(StationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = StationConfig {
            frame: FrameConfig::new(0, Duration::from_millis(40)),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StationConfig {
            frame: FrameConfig::new(300, Duration::from_millis(40)),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StationConfig {
            tolerance: Duration::from_millis(20),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StationConfig {
            preferred_slot: Some(25),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StationConfig {
            simulated_collision_rate: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StationConfig {
            multicast_addr: Ipv4Addr::new(10, 0, 0, 1),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_json() {
        let json = r#"{
            "station_class": "A",
            "frame": { "slot_count": 5, "slot_duration": 200 },
            "tolerance": 3
        }"#;
        let config: StationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.station_class, StationClass::A);
        assert_eq!(config.frame, FrameConfig::new(5, Duration::from_millis(200)));
        assert_eq!(config.tolerance, Duration::from_millis(3));
        assert_eq!(config.port, crate::core::DEFAULT_PORT);

        let text = serde_json::to_string(&config).unwrap();
        let back: StationConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.frame, config.frame);
        assert_eq!(back.tolerance, config.tolerance);
    }
}
