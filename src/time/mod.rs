//! Slot timing
//!
//! Every station keeps a logical clock, `wall + offset`, and derives all of its
//! waits from it:
//!
//! - time remaining in the current slot (receive window)
//! - time remaining in the frame (one transmission per frame)
//! - time remaining to the slot midpoint (transmission instant)
//!
//! There is no reference clock. The offset is nudged toward the phase implied by
//! peers' send timestamps whenever a slot carried exactly one packet, so the
//! stations' slot boundaries converge over time.
//!
//! # Examples
//!
//! ```
//! use stdma::time::{SyncClock, TimeBase};
//! use stdma::FrameConfig;
//! use std::time::Duration;
//!
//! let frame = FrameConfig::new(25, Duration::from_millis(40));
//! let clock = SyncClock::new(TimeBase::now(), frame, 0)?;
//!
//! assert!(clock.remaining_in_slot() <= Duration::from_millis(40));
//! assert!(clock.current_slot() < 25);
//! # Ok::<(), stdma::Error>(())
//! ```

mod clock;

pub use self::clock::{SyncClock, TimeBase};
