//! Loopback Baseband Gateway
//!
//! In-memory radio for tests and the test bench. Transmitted blocks are
//! handed to a [`LoopbackReceiver`] instead of a device. The gateway keeps a
//! sample clock advanced by the caller: a block whose timestamp is already in
//! the past is dropped and reported as late, a clock advance past the end of
//! the transmitted samples is reported as an underflow, and a block that finds
//! the receive queue full is reported as an overflow.

use crate::buffer_pool::SampleBuffer;
use crate::radio_notifier::{RadioEvent, RadioEventKind, RadioNotificationHandler};
use crate::InterfaceError;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Where and when a block goes on air
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxMetadata {
    /// First sample of the block, counted from radio start
    pub timestamp: u64,
    pub channel: usize,
}

pub trait BasebandTransmitter: Send + Sync {
    /// Samples per transmitted block
    fn block_size(&self) -> usize;

    /// Queue a block. A late block is dropped and reported, which is not an error.
    fn transmit(&self, metadata: TxMetadata, buffer: SampleBuffer) -> Result<(), InterfaceError>;
}

#[derive(Debug, Default)]
struct Clock {
    /// Current radio time in samples
    now: u64,
    /// End of the last block accepted for transmission
    tx_end: u64,
    /// An underflow at `tx_end` was already reported
    underflow_reported: bool,
}

pub struct LoopbackGateway {
    block_size: usize,
    stream_id: usize,
    clock: Mutex<Clock>,
    tx: mpsc::Sender<(TxMetadata, SampleBuffer)>,
    notifier: Arc<dyn RadioNotificationHandler>,
}

/// Far end of the loopback
pub struct LoopbackReceiver {
    rx: mpsc::Receiver<(TxMetadata, SampleBuffer)>,
}

impl LoopbackReceiver {
    pub async fn recv(&mut self) -> Option<(TxMetadata, SampleBuffer)> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<(TxMetadata, SampleBuffer)> {
        self.rx.try_recv().ok()
    }
}

impl LoopbackGateway {
    pub fn new(
        block_size: usize,
        queue_size: usize,
        notifier: Arc<dyn RadioNotificationHandler>,
    ) -> Result<(Self, LoopbackReceiver), InterfaceError> {
        if block_size == 0 || queue_size == 0 {
            return Err(InterfaceError::InvalidConfig(format!(
                "loopback needs a positive block and queue size, got {} and {}",
                block_size, queue_size
            )));
        }
        let (tx, rx) = mpsc::channel(queue_size);
        let gateway = Self {
            block_size,
            stream_id: 0,
            clock: Mutex::new(Clock::default()),
            tx,
            notifier,
        };
        Ok((gateway, LoopbackReceiver { rx }))
    }

    /// Current radio time in samples
    pub fn now(&self) -> u64 {
        self.lock_clock().now
    }

    /// Move the radio clock forward
    pub fn advance(&self, nof_samples: u64) {
        let mut clock = self.lock_clock();
        clock.now += nof_samples;
        if clock.now > clock.tx_end && !clock.underflow_reported {
            clock.underflow_reported = true;
            let timestamp = clock.tx_end;
            drop(clock);
            self.notifier.on_radio_tx_event(RadioEvent {
                kind: RadioEventKind::Underflow,
                stream_id: self.stream_id,
                channel: 0,
                timestamp,
            });
        }
    }

    fn lock_clock(&self) -> std::sync::MutexGuard<'_, Clock> {
        self.clock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, kind: RadioEventKind, metadata: TxMetadata) {
        let event = RadioEvent {
            kind,
            stream_id: self.stream_id,
            channel: metadata.channel,
            timestamp: metadata.timestamp,
        };
        match kind {
            RadioEventKind::Overflow => self.notifier.on_radio_rx_event(event),
            _ => self.notifier.on_radio_tx_event(event),
        }
    }
}

impl BasebandTransmitter for LoopbackGateway {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn transmit(&self, metadata: TxMetadata, buffer: SampleBuffer) -> Result<(), InterfaceError> {
        if buffer.len() != self.block_size {
            return Err(InterfaceError::BufferSizeMismatch {
                expected: self.block_size,
                actual: buffer.len(),
            });
        }
        {
            let mut clock = self.lock_clock();
            if metadata.timestamp < clock.now {
                let now = clock.now;
                drop(clock);
                debug!("Late TX block at {} (now {}), dropped", metadata.timestamp, now);
                self.notify(RadioEventKind::Late, metadata);
                return Ok(());
            }
            let end = metadata.timestamp + self.block_size as u64;
            if end > clock.tx_end {
                clock.tx_end = end;
                clock.underflow_reported = false;
            }
        }

        match self.tx.try_send((metadata, buffer)) {
            Ok(()) => {
                trace!("TX block at {} on channel {}", metadata.timestamp, metadata.channel);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.notify(RadioEventKind::Overflow, metadata);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(InterfaceError::NotRunning),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_pool::BufferPool;
    use crate::radio_notifier::{CountingRadioNotifier, RadioStats};
    use num_complex::Complex32;

    const BLOCK: usize = 8;

    fn setup(queue_size: usize) -> (BufferPool, Arc<CountingRadioNotifier>, LoopbackGateway, LoopbackReceiver) {
        let pool = BufferPool::new(4, BLOCK).unwrap();
        let notifier = Arc::new(CountingRadioNotifier::new());
        let (gw, rx) = LoopbackGateway::new(BLOCK, queue_size, notifier.clone()).unwrap();
        (pool, notifier, gw, rx)
    }

    fn md(timestamp: u64) -> TxMetadata {
        TxMetadata { timestamp, channel: 0 }
    }

    #[tokio::test]
    async fn test_blocks_are_looped_back() {
        let (pool, notifier, gw, mut rx) = setup(4);
        let mut buf = pool.acquire().unwrap();
        buf[0] = Complex32::new(0.5, 0.25);
        gw.transmit(md(0), buf).unwrap();

        let (meta, buf) = rx.recv().await.unwrap();
        assert_eq!(meta, md(0));
        assert_eq!(buf[0], Complex32::new(0.5, 0.25));
        drop(buf);
        assert_eq!(pool.available(), 4);
        assert_eq!(notifier.stats(), RadioStats::default());
    }

    #[test]
    fn test_late_block_dropped_and_reported() {
        let (pool, notifier, gw, mut rx) = setup(4);
        gw.transmit(md(0), pool.acquire().unwrap()).unwrap();
        gw.advance(BLOCK as u64);
        gw.transmit(md(BLOCK as u64), pool.acquire().unwrap()).unwrap();
        gw.advance(2 * BLOCK as u64);
        // Timestamp already passed
        gw.transmit(md(BLOCK as u64), pool.acquire().unwrap()).unwrap();

        assert_eq!(notifier.stats().tx_late, 1);
        assert!(rx.try_recv().is_some());
        assert!(rx.try_recv().is_some());
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_gap_reported_once_as_underflow() {
        let (pool, notifier, gw, _rx) = setup(4);
        gw.transmit(md(0), pool.acquire().unwrap()).unwrap();
        gw.advance(BLOCK as u64);
        assert_eq!(notifier.stats().tx_underflow, 0);
        gw.advance(1);
        gw.advance(BLOCK as u64);
        assert_eq!(notifier.stats().tx_underflow, 1);
    }

    #[test]
    fn test_full_queue_is_overflow() {
        let (pool, notifier, gw, _rx) = setup(1);
        gw.transmit(md(0), pool.acquire().unwrap()).unwrap();
        gw.transmit(md(BLOCK as u64), pool.acquire().unwrap()).unwrap();
        assert_eq!(notifier.stats().rx_overflow, 1);
        // The dropped buffer went back to the pool
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn test_wrong_block_size_rejected() {
        let (_, _, gw, _rx) = setup(1);
        let other = BufferPool::new(1, BLOCK + 1).unwrap();
        assert_eq!(
            gw.transmit(md(0), other.acquire().unwrap()),
            Err(InterfaceError::BufferSizeMismatch { expected: BLOCK, actual: BLOCK + 1 })
        );
    }
}
