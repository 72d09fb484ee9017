//! Per-tick subscriber counters and their metric surface.
//!
//! Counters accumulate between ticks and are emitted as absolute per-window
//! counts through the `metrics` facade; whichever recorder the operator
//! installs (statsd bridge, Prometheus exporter) picks them up. The exported
//! names fix the misspelling the C importer shipped with
//! (`subscriber.messsages.*`).

use metrics::counter;
use tracing::info;

pub const RECEIVED_COUNT: &str = "subscriber.messages.received.count";
pub const MISSED_COUNT: &str = "subscriber.messages.missed.count";
pub const DROPPED_COUNT: &str = "subscriber.messages.dropped.count";
pub const BLOCKED_COUNT: &str = "subscriber.messages.blocked.count";

/// Everything a subscriber counts within one tick window.
///
/// All fields reset to zero after emission. The `== 0` checks in the
/// subscriber double as "first occurrence this tick" tests for the
/// aggregated warnings.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberCounters {
    /// Messages received on any socket.
    pub messages: u64,
    /// Messages whose meta frame failed to decode.
    pub meta_failures: u64,
    /// Messages from the synthetic device 0.
    pub messages_dev_zero: u64,
    /// Sequence numbers missed across all devices.
    pub gap_total: u64,
    /// Messages dropped because the parser PUSH send timed out.
    pub drops: u64,
    /// Times the parser PUSH was not writable when a message arrived.
    pub blocks: u64,
    /// Messages dropped for an invalid frame count.
    pub invalid: u64,
}

impl SubscriberCounters {
    /// Emit the tick window to the metrics surface and the log, then reset.
    pub fn emit_and_reset(&mut self, id: usize) {
        info!(
            "subscriber[{id}]: {:5} messages (gap_size: {}, no_info: {}, dev_zero: {}, blocks: {}, drops: {})",
            self.messages,
            self.gap_total,
            self.meta_failures,
            self.messages_dev_zero,
            self.blocks,
            self.drops,
        );
        counter!(RECEIVED_COUNT, self.messages);
        counter!(MISSED_COUNT, self.gap_total);
        counter!(DROPPED_COUNT, self.drops);
        counter!(BLOCKED_COUNT, self.blocks);
        *self = Self::default();
    }
}
