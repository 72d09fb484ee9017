//! Per-device sequence tracking: gap accounting and stale reconnection.
//!
//! One tracker per subscriber actor, driven entirely from that actor's event
//! loop; no locking. Heartbeats refresh the advertised PUB endpoint so a
//! device that migrates hosts can be re-targeted without a restart.

use std::collections::HashMap;

use logjam_proto::MsgMeta;
use tracing::{info, warn};

/// Hard cap on tracked devices. Devices beyond this are ignored with a
/// single diagnostic.
pub const MAX_DEVICES: usize = 4096;

#[derive(Debug, Clone, Default)]
pub struct DeviceRecord {
    /// Highest sequence number observed; 0 if never seen.
    pub last_sequence: u64,
    pub last_seen_ms: i64,
    /// Most recent PUB endpoint advertised via heartbeat.
    pub endpoint: Option<String>,
    /// Endpoint the SUB socket currently holds open for this device, if any.
    pub connected_endpoint: Option<String>,
}

pub struct DeviceTracker {
    devices: HashMap<u32, DeviceRecord>,
    stale_after_ms: i64,
    capacity_warned: bool,
}

impl DeviceTracker {
    pub fn new(stale_after_ms: i64) -> Self {
        Self {
            devices: HashMap::new(),
            stale_after_ms,
            capacity_warned: false,
        }
    }

    /// Update the record for `meta.device_number` and return the number of
    /// sequence numbers missed since the last observation.
    ///
    /// First observation and out-of-order arrivals contribute 0. Device 0 is
    /// synthetic and never tracked.
    pub fn calculate_gap(
        &mut self,
        meta: &MsgMeta,
        observed_endpoint: Option<String>,
        now_ms: i64,
    ) -> u64 {
        if meta.device_number == 0 {
            return 0;
        }
        if !self.devices.contains_key(&meta.device_number) && self.devices.len() >= MAX_DEVICES {
            if !self.capacity_warned {
                warn!(
                    "device tracker full ({MAX_DEVICES} devices), ignoring device {}",
                    meta.device_number
                );
                self.capacity_warned = true;
            }
            return 0;
        }
        let record = self.devices.entry(meta.device_number).or_default();
        let seq = meta.sequence_number;
        let gap = if record.last_sequence == 0 {
            record.last_sequence = seq;
            0
        } else if seq > record.last_sequence {
            let gap = seq - record.last_sequence - 1;
            record.last_sequence = seq;
            gap
        } else {
            0
        };
        record.last_seen_ms = now_ms;
        if let Some(endpoint) = observed_endpoint {
            record.endpoint = Some(endpoint);
        }
        gap
    }

    /// Walk all devices and re-target the SUB socket for every stale one
    /// with a known endpoint.
    ///
    /// Disconnect failures are non-fatal. A failed connect leaves
    /// `connected_endpoint` unchanged so the next maintenance run retries.
    pub fn reconnect_stale_devices(&mut self, sub: &zmq::Socket, now_ms: i64) {
        for (device, record) in self.devices.iter_mut() {
            if record.last_seen_ms + self.stale_after_ms > now_ms {
                continue;
            }
            let endpoint = match record.endpoint.clone() {
                Some(endpoint) => endpoint,
                None => continue,
            };
            if let Some(old) = record.connected_endpoint.as_deref() {
                if let Err(err) = sub.disconnect(old) {
                    warn!("device {device}: failed to disconnect from {old}: {err}");
                }
            }
            match sub.connect(&endpoint) {
                Ok(()) => {
                    info!("device {device}: reconnecting stale subscription to {endpoint}");
                    record.connected_endpoint = Some(endpoint);
                }
                Err(err) => {
                    warn!("device {device}: failed to connect to {endpoint}: {err}");
                }
            }
        }
    }

    pub fn device(&self, device_number: u32) -> Option<&DeviceRecord> {
        self.devices.get(&device_number)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn meta(device: u32, seq: u64) -> MsgMeta {
        MsgMeta {
            device_number: device,
            sequence_number: seq,
            ..Default::default()
        }
    }

    #[test]
    fn first_observation_contributes_no_gap() {
        let mut tracker = DeviceTracker::new(5_000);
        assert_eq!(tracker.calculate_gap(&meta(7, 1), None, 100), 0);
        let record = tracker.device(7).unwrap();
        assert_eq!(record.last_sequence, 1);
        assert_eq!(record.last_seen_ms, 100);
    }

    #[test]
    fn gap_between_consecutive_observations() {
        let mut tracker = DeviceTracker::new(5_000);
        tracker.calculate_gap(&meta(7, 5), None, 100);
        assert_eq!(tracker.calculate_gap(&meta(7, 8), None, 200), 2);
        assert_eq!(tracker.device(7).unwrap().last_sequence, 8);
    }

    #[test]
    fn adjacent_sequences_contribute_zero() {
        let mut tracker = DeviceTracker::new(5_000);
        tracker.calculate_gap(&meta(7, 1), None, 0);
        assert_eq!(tracker.calculate_gap(&meta(7, 2), None, 0), 0);
        assert_eq!(tracker.calculate_gap(&meta(7, 3), None, 0), 0);
    }

    #[test]
    fn out_of_order_contributes_zero_and_keeps_max() {
        let mut tracker = DeviceTracker::new(5_000);
        tracker.calculate_gap(&meta(7, 10), None, 0);
        assert_eq!(tracker.calculate_gap(&meta(7, 4), None, 50), 0);
        let record = tracker.device(7).unwrap();
        assert_eq!(record.last_sequence, 10);
        assert_eq!(record.last_seen_ms, 50);
    }

    #[test]
    fn device_zero_is_never_tracked() {
        let mut tracker = DeviceTracker::new(5_000);
        assert_eq!(tracker.calculate_gap(&meta(0, 99), None, 0), 0);
        assert!(tracker.is_empty());
    }

    #[test]
    fn heartbeat_endpoint_is_remembered() {
        let mut tracker = DeviceTracker::new(5_000);
        tracker.calculate_gap(&meta(9, 100), Some("tcp://host:1234".into()), 0);
        let record = tracker.device(9).unwrap();
        assert_eq!(record.endpoint.as_deref(), Some("tcp://host:1234"));
        assert_eq!(record.last_sequence, 100);
        assert_eq!(record.connected_endpoint, None);
    }

    #[test]
    fn capacity_is_clamped() {
        let mut tracker = DeviceTracker::new(5_000);
        for device in 1..=(MAX_DEVICES as u32) {
            tracker.calculate_gap(&meta(device, 1), None, 0);
        }
        assert_eq!(tracker.len(), MAX_DEVICES);
        // one over capacity: ignored, known devices still update
        assert_eq!(tracker.calculate_gap(&meta(50_000, 1), None, 0), 0);
        assert_eq!(tracker.len(), MAX_DEVICES);
        assert_eq!(tracker.calculate_gap(&meta(1, 3), None, 0), 1);
    }

    #[test]
    fn stale_device_is_reconnected() {
        let ctx = zmq::Context::new();
        let sub = ctx.socket(zmq::SUB).unwrap();
        let mut tracker = DeviceTracker::new(1_000);
        tracker.calculate_gap(&meta(3, 1), Some("tcp://127.0.0.1:19876".into()), 0);

        // not yet stale
        tracker.reconnect_stale_devices(&sub, 500);
        assert_eq!(tracker.device(3).unwrap().connected_endpoint, None);

        // past the deadline: connect happens and is recorded
        tracker.reconnect_stale_devices(&sub, 2_000);
        assert_eq!(
            tracker.device(3).unwrap().connected_endpoint.as_deref(),
            Some("tcp://127.0.0.1:19876")
        );
    }

    #[test]
    fn failed_connect_leaves_connected_endpoint_unchanged() {
        let ctx = zmq::Context::new();
        let sub = ctx.socket(zmq::SUB).unwrap();
        let mut tracker = DeviceTracker::new(1_000);
        tracker.calculate_gap(&meta(4, 1), Some("bogus-endpoint".into()), 0);
        tracker.reconnect_stale_devices(&sub, 5_000);
        assert_eq!(tracker.device(4).unwrap().connected_endpoint, None);
    }

    #[test]
    fn fresh_endpoint_wins_over_old() {
        let mut tracker = DeviceTracker::new(5_000);
        tracker.calculate_gap(&meta(5, 1), Some("tcp://old:1".into()), 0);
        tracker.calculate_gap(&meta(5, 2), Some("tcp://new:2".into()), 10);
        assert_eq!(
            tracker.device(5).unwrap().endpoint.as_deref(),
            Some("tcp://new:2")
        );
    }
}
