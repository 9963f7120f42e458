//! Protocol implementation module
//!
//! This module defines the STDMA packet and its fixed-size wire encoding.

pub mod codec;
pub mod packet;

pub use self::codec::PacketCodec;
pub use self::packet::{Packet, Payload, PACKET_SIZE, PAYLOAD_LEN};
