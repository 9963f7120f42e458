use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{Error, Result, StationClass};
use super::packet::{Packet, Payload, PACKET_SIZE, PAYLOAD_LEN};

/// Fixed-size packet codec
///
/// Every datagram on the medium is exactly [`PACKET_SIZE`] bytes:
///
/// | offset | size | field                             |
/// |--------|------|-----------------------------------|
/// | 0      | 1    | station class (`'A'` / `'B'`)     |
/// | 1      | 24   | payload                           |
/// | 25     | 1    | next slot index                   |
/// | 26     | 8    | send time, ms since epoch (BE)    |
#[derive(Debug, Clone, Copy)]
pub struct PacketCodec {
    slot_count: usize,
}

impl PacketCodec {
    /// Creates a codec rejecting slot indices outside a frame of `slot_count` slots
    pub fn new(slot_count: usize) -> Self {
        PacketCodec { slot_count }
    }

    /// Encodes a packet into a freshly allocated buffer
    pub fn encode_packet(&mut self, packet: Packet) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(PACKET_SIZE);
        self.encode(packet, &mut dst)?;
        Ok(dst.freeze())
    }

    /// Decodes a single received datagram
    pub fn decode_datagram(&mut self, datagram: &[u8]) -> Result<Packet> {
        let mut src = BytesMut::from(datagram);
        self.decode(&mut src)?
            .ok_or_else(|| Error::malformed("empty datagram"))
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.is_empty() {
            return Ok(None);
        }

        // A datagram is either a whole packet or garbage
        if src.len() != PACKET_SIZE {
            let len = src.len();
            src.clear();
            return Err(Error::malformed(format!(
                "expected {} bytes, got {}",
                PACKET_SIZE, len
            )));
        }

        let mut buf = src.split_to(PACKET_SIZE);

        let station_class = StationClass::from_byte(buf.get_u8())?;

        let mut payload = [0u8; PAYLOAD_LEN];
        buf.copy_to_slice(&mut payload);

        let next_slot = buf.get_u8() as usize;
        if next_slot >= self.slot_count {
            return Err(Error::malformed(format!(
                "next slot {} outside frame of {} slots",
                next_slot, self.slot_count
            )));
        }

        let send_time = buf.get_u64();

        Ok(Some(Packet {
            station_class,
            payload: Payload::from_array(payload),
            next_slot,
            send_time,
        }))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = Error;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<()> {
        if item.next_slot >= self.slot_count {
            return Err(Error::malformed(format!(
                "cannot announce slot {} in a frame of {} slots",
                item.next_slot, self.slot_count
            )));
        }

        dst.reserve(PACKET_SIZE);
        dst.put_u8(item.station_class.as_byte());
        dst.put_slice(item.payload.as_bytes());
        dst.put_u8(item.next_slot as u8);
        dst.put_u64(item.send_time);

        Ok(())
    }
}
