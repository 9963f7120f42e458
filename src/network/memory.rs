use std::io;

use bytes::Bytes;
use tokio::sync::{broadcast, Mutex};
use tracing::warn;

use crate::core::{Error, Result};
use super::Transport;

/// In-process broadcast medium
///
/// Behaves like a loss-free multicast group with loopback: every endpoint sees
/// every datagram sent after it was created, its own included.
#[derive(Debug, Clone)]
pub struct MemoryBus {
    tx: broadcast::Sender<Bytes>,
}

impl MemoryBus {
    /// Creates a bus buffering up to `capacity` datagrams per slow receiver
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        MemoryBus { tx }
    }

    /// Attaches a new endpoint
    pub fn endpoint(&self) -> MemoryTransport {
        MemoryTransport {
            tx: self.tx.clone(),
            rx: Mutex::new(self.tx.subscribe()),
        }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// One station's attachment to a [`MemoryBus`]
#[derive(Debug)]
pub struct MemoryTransport {
    tx: broadcast::Sender<Bytes>,
    rx: Mutex<broadcast::Receiver<Bytes>>,
}

impl Transport for MemoryTransport {
    async fn send(&self, datagram: &[u8]) -> Result<()> {
        // The sender's own receiver keeps the channel open
        self.tx
            .send(Bytes::copy_from_slice(datagram))
            .map(|_| ())
            .map_err(|_| Error::Transmit(not_connected("bus has no receivers")))
    }

    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let mut rx = self.rx.lock().await;
        loop {
            match rx.recv().await {
                Ok(datagram) => {
                    let len = datagram.len().min(buf.len());
                    buf[..len].copy_from_slice(&datagram[..len]);
                    return Ok(len);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("memory bus receiver lagged, {} datagrams dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(Error::Receive(not_connected("bus closed")));
                }
            }
        }
    }
}

fn not_connected(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_delivers_to_all_endpoints_including_sender() {
        let bus = MemoryBus::new(16);
        let a = bus.endpoint();
        let b = bus.endpoint();

        a.send(b"ping").await.unwrap();

        let mut buf = [0u8; 64];
        let n = a.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
        let n = b.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
    }

    #[tokio::test]
    async fn test_late_endpoint_misses_earlier_traffic() {
        let bus = MemoryBus::new(16);
        let a = bus.endpoint();
        a.send(b"early").await.unwrap();

        let late = bus.endpoint();
        let mut buf = [0u8; 64];
        let res = timeout(Duration::from_millis(20), late.recv(&mut buf)).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn test_recv_survives_cancellation() {
        let bus = MemoryBus::new(16);
        let a = bus.endpoint();
        let mut buf = [0u8; 64];

        assert!(timeout(Duration::from_millis(5), a.recv(&mut buf)).await.is_err());

        a.send(b"after").await.unwrap();
        let n = a.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"after");
    }
}
