use std::fmt;

use crate::core::{Error, Result, StationClass};

/// Length of the fixed payload carried by every packet
pub const PAYLOAD_LEN: usize = 24;

/// Size of an encoded packet: class, payload, next slot, send time
pub const PACKET_SIZE: usize = 1 + PAYLOAD_LEN + 1 + 8;

/// Fixed-length payload, zero padded
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Payload([u8; PAYLOAD_LEN]);

impl Payload {
    /// Creates a payload from at most `PAYLOAD_LEN` bytes
    pub fn new(data: &[u8]) -> Result<Self> {
        if data.len() > PAYLOAD_LEN {
            return Err(Error::malformed(format!(
                "payload of {} bytes exceeds {} bytes",
                data.len(),
                PAYLOAD_LEN
            )));
        }
        let mut bytes = [0u8; PAYLOAD_LEN];
        bytes[..data.len()].copy_from_slice(data);
        Ok(Payload(bytes))
    }

    /// Wraps exactly `PAYLOAD_LEN` bytes as received, padding included
    pub fn from_array(bytes: [u8; PAYLOAD_LEN]) -> Self {
        Payload(bytes)
    }

    /// All `PAYLOAD_LEN` bytes, padding included
    pub fn as_bytes(&self) -> &[u8; PAYLOAD_LEN] {
        &self.0
    }

    /// Payload without trailing zero padding
    pub fn trimmed(&self) -> &[u8] {
        let end = self.0.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        &self.0[..end]
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({:?})", String::from_utf8_lossy(self.trimmed()))
    }
}

/// One slot's transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Sender's class
    pub station_class: StationClass,
    /// Application data
    pub payload: Payload,
    /// Slot the sender intends to use in the next frame
    pub next_slot: usize,
    /// Sender's logical time at transmission, ms since the Unix epoch
    pub send_time: u64,
}

impl Packet {
    /// Creates an unstamped packet; the send time is set right before transmission
    pub fn new(station_class: StationClass, payload: Payload, next_slot: usize) -> Self {
        Packet {
            station_class,
            payload,
            next_slot,
            send_time: 0,
        }
    }

    /// Sets the send time
    pub fn stamp(&mut self, now_ms: u64) {
        self.send_time = now_ms;
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} next={} t={} {:?}]",
            self.station_class,
            self.next_slot,
            self.send_time,
            String::from_utf8_lossy(self.payload.trimmed())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_padding() {
        let payload = Payload::new(b"hello").unwrap();
        assert_eq!(payload.trimmed(), b"hello");
        assert_eq!(&payload.as_bytes()[5..], &[0u8; PAYLOAD_LEN - 5]);
    }

    #[test]
    fn test_payload_too_long() {
        let data = [b'x'; PAYLOAD_LEN + 1];
        assert!(matches!(Payload::new(&data), Err(Error::MalformedPacket(_))));
        assert!(Payload::new(&data[..PAYLOAD_LEN]).is_ok());
    }

    #[test]
    fn test_packet_stamp() {
        let mut packet = Packet::new(StationClass::A, Payload::default(), 3);
        assert_eq!(packet.send_time, 0);
        packet.stamp(1_700_000_000_123);
        assert_eq!(packet.send_time, 1_700_000_000_123);
        assert_eq!(packet.payload.trimmed(), b"");
    }
}
