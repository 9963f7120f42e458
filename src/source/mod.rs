//! Outgoing data source
//!
//! A bounded queue of payload-sized chunks. Producers block once the queue is full;
//! the send loop takes one chunk per frame.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::{Error, Result};
use crate::protocol::{Payload, PAYLOAD_LEN};

/// Creates a queue holding at most `capacity` payloads
pub fn payload_queue(capacity: usize) -> (PayloadProducer, PayloadQueue) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        PayloadProducer {
            tx,
            pending: BytesMut::with_capacity(PAYLOAD_LEN),
        },
        PayloadQueue { rx },
    )
}

/// Consumer side, owned by the send loop
#[derive(Debug)]
pub struct PayloadQueue {
    rx: mpsc::Receiver<Payload>,
}

impl PayloadQueue {
    /// Waits for the next payload; `None` once every producer is gone and the queue is drained
    pub async fn take_data(&mut self) -> Option<Payload> {
        self.rx.recv().await
    }
}

/// Producer side: accumulates bytes and enqueues full payloads
#[derive(Debug)]
pub struct PayloadProducer {
    tx: mpsc::Sender<Payload>,
    pending: BytesMut,
}

impl PayloadProducer {
    /// Appends bytes, enqueueing every completed payload
    ///
    /// Waits while the queue is full.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(data);
        while self.pending.len() >= PAYLOAD_LEN {
            let chunk = self.pending.split_to(PAYLOAD_LEN);
            self.enqueue(Payload::new(&chunk)?).await?;
        }
        Ok(())
    }

    /// Enqueues buffered bytes as a zero-padded payload
    pub async fn flush(&mut self) -> Result<()> {
        if self.pending.has_remaining() {
            let payload = Payload::new(&self.pending)?;
            self.pending.clear();
            self.enqueue(payload).await?;
        }
        Ok(())
    }

    async fn enqueue(&self, payload: Payload) -> Result<()> {
        self.tx
            .send(payload)
            .await
            .map_err(|_| Error::interrupted("payload queue closed"))
    }
}

/// Feeds a byte stream into the queue until end of input
pub async fn pump<R>(mut reader: R, mut producer: PayloadProducer) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; PAYLOAD_LEN];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        producer.write(&buf[..n]).await?;
    }
    producer.flush().await?;
    debug!("payload source reached end of input");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_chunks_and_pads() {
        let (mut producer, mut queue) = payload_queue(4);

        let mut data = vec![b'x'; PAYLOAD_LEN];
        data.extend_from_slice(b"tail");
        assert_ok!(producer.write(&data).await);
        assert_ok!(producer.flush().await);
        drop(producer);

        let first = queue.take_data().await.unwrap();
        assert_eq!(first.trimmed(), &[b'x'; PAYLOAD_LEN][..]);
        let second = queue.take_data().await.unwrap();
        assert_eq!(second.trimmed(), b"tail");
        assert!(queue.take_data().await.is_none());
    }

    #[tokio::test]
    async fn test_flush_without_data_is_noop() {
        let (mut producer, mut queue) = payload_queue(1);
        assert_ok!(producer.flush().await);
        drop(producer);
        assert!(queue.take_data().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_applies_backpressure() {
        let (mut producer, mut queue) = payload_queue(1);
        assert_ok!(producer.write(&[1u8; PAYLOAD_LEN]).await);

        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            producer.write(&[2u8; PAYLOAD_LEN]),
        )
        .await;
        assert!(blocked.is_err());

        assert_eq!(queue.take_data().await.unwrap().as_bytes(), &[1u8; PAYLOAD_LEN]);
    }

    #[tokio::test]
    async fn test_pump_reads_until_eof() {
        let (producer, mut queue) = payload_queue(8);
        let input: &[u8] = b"hello world, this is more than one payload";
        assert_ok!(pump(input, producer).await);

        let mut received = Vec::new();
        while let Some(payload) = queue.take_data().await {
            received.extend_from_slice(payload.trimmed());
        }
        assert_eq!(received, input);
    }

    #[tokio::test]
    async fn test_closed_queue_interrupts_producer() {
        let (mut producer, queue) = payload_queue(1);
        drop(queue);
        let err = producer.write(&[0u8; PAYLOAD_LEN]).await.unwrap_err();
        assert!(matches!(err, Error::Interrupted(_)));
    }
}
