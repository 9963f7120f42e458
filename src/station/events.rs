use crate::frame::Occupancy;
use crate::protocol::Packet;

/// Observable protocol activity of one station
#[derive(Debug, Clone)]
pub enum StationEvent {
    /// The send loop claimed a slot
    SlotReserved { slot: usize },

    /// A packet went out in `slot`
    Transmitted { slot: usize, send_time: u64 },

    /// A well-formed packet arrived during `slot`
    Received { slot: usize, packet: Packet },

    /// More than one packet arrived in `slot`, or a collision was simulated
    Collision {
        slot: usize,
        received: usize,
        /// Whether `slot` was this station's reservation
        own: bool,
    },

    /// The reservation on `slot` was dropped after a collision
    SlotReleased { slot: usize },

    /// The clock offset moved after a clean reception
    ClockAdjusted { correction_ms: i64, offset_ms: i64 },

    /// The slot counter wrapped
    FrameCompleted(FrameReport),
}

/// Summary of a finished frame
#[derive(Debug, Clone)]
pub struct FrameReport {
    /// Frames completed since the receive loop started, starting at 0
    pub frame: u64,
    /// Claims observed during the frame
    pub occupancy: Occupancy,
    /// Clock offset at the end of the frame
    pub offset_ms: i64,
    /// Collisions observed during the frame
    pub collisions: usize,
}
