//! The collector event loop: a STREAM listener and a PUB socket on one
//! thread.
//!
//! Each poll wakeup handles at most one request; the poll timeout is slaved
//! to the next 1 Hz tick, which prints the throughput summary and refreshes
//! the cached `started_at` timestamp. Reply sends are bounded by the 10 ms
//! send timeout; a connection that cannot take the answer is abandoned.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use logjam_proto::socket;
use tracing::{debug, error, info};

use crate::request::{
    analyze_request, IngressState, RequestOutcome, MAX_REQUEST_BYTES, RESPONSE_ALIVE,
    RESPONSE_FAIL, RESPONSE_OK,
};

/// High-water-marks matching the C collector's process-wide defaults.
const HWM: i32 = 100_000;

pub struct Ingress {
    http: zmq::Socket,
    publisher: zmq::Socket,
    state: IngressState,
    last_count: u64,
    last_bytes: u64,
}

impl Ingress {
    /// Bind the HTTP STREAM socket and the PUB socket.
    pub fn bind(
        ctx: &zmq::Context,
        device_number: u32,
        http_port: u16,
        pub_port: u16,
    ) -> Result<Self> {
        let http = socket::stream_socket(ctx)?;
        http.set_rcvhwm(HWM)?;
        http.set_sndhwm(HWM)?;
        http.bind(&format!("tcp://*:{http_port}"))
            .with_context(|| format!("failed to bind HTTP socket to port {http_port}"))?;
        info!("accepting beacons on tcp://*:{http_port}");

        let publisher = socket::pub_socket(ctx)?;
        publisher.set_sndhwm(HWM)?;
        publisher
            .bind(&format!("tcp://*:{pub_port}"))
            .with_context(|| format!("failed to bind PUB socket to port {pub_port}"))?;
        info!("publishing beacons on tcp://*:{pub_port}");

        Ok(Self {
            http,
            publisher,
            state: IngressState::new(device_number),
            last_count: 0,
            last_bytes: 0,
        })
    }

    /// Run the event loop. Only a fatal socket error returns.
    pub fn run(mut self) -> Result<()> {
        info!("starting main event loop");
        let mut next_tick = Instant::now() + Duration::from_secs(1);
        loop {
            let timeout = next_tick
                .saturating_duration_since(Instant::now())
                .as_millis() as i64;
            let readable = match self.http.poll(zmq::POLLIN, timeout.max(1)) {
                Ok(n) => n > 0,
                Err(zmq::Error::EINTR) => continue,
                Err(err) => return Err(err.into()),
            };
            if Instant::now() >= next_tick {
                next_tick += Duration::from_secs(1);
                self.tick();
            }
            if readable {
                self.process_http_request()?;
            }
        }
    }

    /// Handle one STREAM delivery: `[identity, data]`.
    fn process_http_request(&mut self) -> Result<()> {
        let identity = self.http.recv_bytes(0)?;
        let raw = self.http.recv_bytes(0)?;

        // empty data frame: connection open/close notification, not a request
        if raw.is_empty() {
            return Ok(());
        }

        self.state.received_messages_count += 1;
        let considered = raw.len().min(MAX_REQUEST_BYTES);
        let message_size = (identity.len() + considered) as u64;
        self.state.received_messages_bytes += message_size;
        if message_size > self.state.received_messages_max_bytes {
            self.state.received_messages_max_bytes = message_size;
        }

        match analyze_request(&mut self.state, &raw) {
            RequestOutcome::Alive => self.answer(&identity, RESPONSE_ALIVE),
            RequestOutcome::Publish(msg) => {
                debug!(
                    "publishing beacon seq {} for {:?}",
                    self.state.sequence_number,
                    String::from_utf8_lossy(&msg.topic)
                );
                if let Err(err) = self.publisher.send_multipart(msg.into_frames(), 0) {
                    error!("failed to publish beacon: {err}");
                }
                self.answer(&identity, RESPONSE_OK);
            }
            RequestOutcome::Invalid => {
                self.state.http_failures += 1;
                self.answer(&identity, RESPONSE_FAIL);
            }
        }
        Ok(())
    }

    /// Send the response, then close the connection with an empty frame.
    /// Failures are logged and the connection abandoned.
    fn answer(&self, identity: &[u8], response: &[u8]) {
        if let Err(err) = self.http.send(identity, zmq::SNDMORE) {
            error!("failed to send identity frame, aborting request: {err}");
            return;
        }
        if let Err(err) = self.http.send(response, 0) {
            error!("failed to send answer frame, aborting request: {err}");
            return;
        }
        if let Err(err) = self.http.send(identity, zmq::SNDMORE) {
            error!("failed to send closing identity frame: {err}");
            return;
        }
        if let Err(err) = self.http.send(&b""[..], 0) {
            error!("failed to send closing delimiter frame: {err}");
        }
    }

    /// 1 Hz statistics and timestamp refresh.
    fn tick(&mut self) {
        let count = self.state.received_messages_count - self.last_count;
        let bytes = self.state.received_messages_bytes - self.last_bytes;
        let avg_kb = if count > 0 {
            (bytes as f64 / 1024.0) / count as f64
        } else {
            0.0
        };
        info!(
            "processed {count} messages (invalid: {}), size: {:.2} KB, avg: {avg_kb:.2} KB, max: {:.2} KB",
            self.state.http_failures,
            bytes as f64 / 1024.0,
            self.state.received_messages_max_bytes as f64 / 1024.0,
        );
        self.last_count = self.state.received_messages_count;
        self.last_bytes = self.state.received_messages_bytes;
        self.state.http_failures = 0;
        self.state.received_messages_max_bytes = 0;
        self.state.refresh_started_at();
    }
}
