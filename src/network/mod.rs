//! Network transports
//!
//! A station needs exactly two things from the medium: put a datagram on the
//! shared group, and take the next datagram off it. Deadlines are applied by the
//! caller.

mod memory;
mod multicast;

pub use self::memory::{MemoryBus, MemoryTransport};
pub use self::multicast::MulticastTransport;

use std::future::Future;

use crate::core::Result;

/// Group-addressed datagram transport
///
/// Every datagram sent by any participant, including this one, is delivered to
/// every participant's `recv`.
pub trait Transport: Send + Sync + 'static {
    /// Sends one datagram to the group
    fn send(&self, datagram: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Waits for the next datagram and copies it into `buf`, returning its length
    ///
    /// Must be cancel safe: dropping the future loses no datagram.
    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = Result<usize>> + Send;
}
