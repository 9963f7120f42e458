//! Core types and traits for the STDMA link layer
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod error;
pub mod types;
pub mod serde;

use std::net::Ipv4Addr;

pub use self::error::{Error, Result};
pub use self::types::{
    FrameConfig,
    StationClass,
    StationConfig,
};

/// Default number of slots per frame
pub const DEFAULT_SLOT_COUNT: usize = 25;

/// Default slot duration in milliseconds
pub const DEFAULT_SLOT_DURATION_MS: u64 = 40;

/// Slot indices travel in a single byte
pub const MAX_SLOT_COUNT: usize = 256;

/// Default post-boundary jitter allowance in milliseconds
pub const DEFAULT_TOLERANCE_MS: u64 = 2;

/// Default capacity of the outgoing payload queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;

/// Default multicast port
pub const DEFAULT_PORT: u16 = 15000;

/// Default multicast group
pub const DEFAULT_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 0, 1);
