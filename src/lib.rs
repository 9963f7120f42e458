//! STDMA: self-organizing time-division multiple access over IP multicast
//!
//! Stations share a cyclic frame of equally long slots. Each station claims a free
//! slot, transmits once per frame in the middle of it, and keeps its slot clock
//! aligned with its peers purely by observing their traffic. There is no
//! coordinator and no external clock source; collisions are detected when a slot
//! carries more than one packet and resolved by the affected station picking a new
//! slot.
//!
//! ```no_run
//! use stdma::{payload_queue, Station, StationConfig};
//!
//! #[tokio::main]
//! async fn main() -> stdma::Result<()> {
//!     let config = StationConfig::default();
//!     let (producer, queue) = payload_queue(config.queue_capacity);
//!     tokio::spawn(stdma::source::pump(tokio::io::stdin(), producer));
//!
//!     Station::bind(config)?.run(queue).await
//! }
//! ```
pub mod core;
pub mod frame;
pub mod network;
pub mod protocol;
pub mod source;
pub mod station;
pub mod time;
mod util;

// Re-export commonly used items
pub use crate::core::{Error, FrameConfig, Result, StationClass, StationConfig};
pub use crate::source::{payload_queue, PayloadProducer, PayloadQueue};
pub use crate::station::{FrameReport, Station, StationBuilder, StationEvent};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
