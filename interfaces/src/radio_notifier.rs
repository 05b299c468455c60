//! Radio Notifications
//!
//! Events raised by the radio side of the baseband gateway.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioEventKind {
    /// A transmit buffer arrived after its timestamp had passed
    Late,
    /// The radio ran out of samples to transmit
    Underflow,
    /// Received samples were lost because nobody read them in time
    Overflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioEvent {
    pub kind: RadioEventKind,
    pub stream_id: usize,
    pub channel: usize,
    /// Sample count at which the event happened
    pub timestamp: u64,
}

/// Receiver of radio events. Called from the radio threads.
pub trait RadioNotificationHandler: Send + Sync {
    fn on_radio_tx_event(&self, event: RadioEvent);

    fn on_radio_rx_event(&self, event: RadioEvent);
}

/// Snapshot of [`CountingRadioNotifier`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RadioStats {
    pub tx_late: u64,
    pub tx_underflow: u64,
    pub rx_overflow: u64,
}

/// Counts radio events and logs the first of each kind
#[derive(Debug, Default)]
pub struct CountingRadioNotifier {
    tx_late: AtomicU64,
    tx_underflow: AtomicU64,
    rx_overflow: AtomicU64,
}

impl CountingRadioNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> RadioStats {
        RadioStats {
            tx_late: self.tx_late.load(Ordering::Relaxed),
            tx_underflow: self.tx_underflow.load(Ordering::Relaxed),
            rx_overflow: self.rx_overflow.load(Ordering::Relaxed),
        }
    }

    fn count(counter: &AtomicU64, event: RadioEvent) {
        let previous = counter.fetch_add(1, Ordering::Relaxed);
        if previous == 0 {
            warn!(
                "Radio {:?} on stream {} channel {} at {}",
                event.kind, event.stream_id, event.channel, event.timestamp
            );
        } else {
            trace!("Radio {:?} #{} at {}", event.kind, previous + 1, event.timestamp);
        }
    }
}

impl RadioNotificationHandler for CountingRadioNotifier {
    fn on_radio_tx_event(&self, event: RadioEvent) {
        match event.kind {
            RadioEventKind::Late => Self::count(&self.tx_late, event),
            RadioEventKind::Underflow => Self::count(&self.tx_underflow, event),
            RadioEventKind::Overflow => warn!("Unexpected TX overflow event at {}", event.timestamp),
        }
    }

    fn on_radio_rx_event(&self, event: RadioEvent) {
        match event.kind {
            RadioEventKind::Overflow => Self::count(&self.rx_overflow, event),
            kind => warn!("Unexpected RX {:?} event at {}", kind, event.timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: RadioEventKind, timestamp: u64) -> RadioEvent {
        RadioEvent { kind, stream_id: 0, channel: 0, timestamp }
    }

    #[test]
    fn test_events_counted_per_direction() {
        let notifier = CountingRadioNotifier::new();
        notifier.on_radio_tx_event(event(RadioEventKind::Late, 100));
        notifier.on_radio_tx_event(event(RadioEventKind::Late, 200));
        notifier.on_radio_tx_event(event(RadioEventKind::Underflow, 300));
        notifier.on_radio_rx_event(event(RadioEventKind::Overflow, 400));
        // Mismatched direction is ignored
        notifier.on_radio_rx_event(event(RadioEventKind::Late, 500));

        assert_eq!(
            notifier.stats(),
            RadioStats { tx_late: 2, tx_underflow: 1, rx_overflow: 1 }
        );
    }
}
