//! Centralized ZMQ socket construction for logjam components.
//!
//! All socket setup goes through these helpers so every component gets the
//! same reconnect and shutdown behavior. Fixing an option here fixes it
//! everywhere.
//!
//! ## Configuration applied
//!
//! - `LINGER` 0 for clean shutdown (no flushing on close)
//! - `RECONNECT_IVL` 100 ms, ramping to `RECONNECT_IVL_MAX` 10 s
//! - `SNDTIMEO` 10 ms on the sockets that must never block the hot path
//!   (parser PUSH, HTTP STREAM replies)

use anyhow::{Context, Result};

/// Initial reconnect interval in milliseconds.
pub const RECONNECT_IVL_MS: i32 = 100;

/// Maximum reconnect interval in milliseconds. Caps the exponential ramp.
pub const RECONNECT_IVL_MAX_MS: i32 = 10_000;

/// Bounded send timeout in milliseconds.
///
/// Converts head-of-line blocking into an observable drop: a send that
/// cannot complete within this window fails with `EAGAIN` instead of
/// stalling the event loop.
pub const SEND_TIMEOUT_MS: i32 = 10;

fn apply_common(socket: &zmq::Socket) -> Result<()> {
    socket.set_linger(0)?;
    socket.set_reconnect_ivl(RECONNECT_IVL_MS)?;
    socket.set_reconnect_ivl_max(RECONNECT_IVL_MAX_MS)?;
    Ok(())
}

/// SUB socket for upstream device data. Caller connects and subscribes.
pub fn sub_socket(ctx: &zmq::Context, rcv_hwm: i32) -> Result<zmq::Socket> {
    let socket = ctx.socket(zmq::SUB).context("failed to create SUB socket")?;
    apply_common(&socket)?;
    socket.set_rcvhwm(rcv_hwm)?;
    Ok(socket)
}

/// PUSH socket for the parser fan-out, with the bounded send timeout.
pub fn push_socket(ctx: &zmq::Context) -> Result<zmq::Socket> {
    let socket = ctx
        .socket(zmq::PUSH)
        .context("failed to create PUSH socket")?;
    socket.set_linger(0)?;
    socket.set_sndtimeo(SEND_TIMEOUT_MS)?;
    Ok(socket)
}

/// PULL socket for asynchronous direct submissions.
pub fn pull_socket(ctx: &zmq::Context) -> Result<zmq::Socket> {
    let socket = ctx
        .socket(zmq::PULL)
        .context("failed to create PULL socket")?;
    apply_common(&socket)?;
    Ok(socket)
}

/// ROUTER socket for synchronous direct submissions with replies.
pub fn router_socket(ctx: &zmq::Context) -> Result<zmq::Socket> {
    let socket = ctx
        .socket(zmq::ROUTER)
        .context("failed to create ROUTER socket")?;
    apply_common(&socket)?;
    Ok(socket)
}

/// PUB socket for republishing beacons downstream.
pub fn pub_socket(ctx: &zmq::Context) -> Result<zmq::Socket> {
    let socket = ctx.socket(zmq::PUB).context("failed to create PUB socket")?;
    socket.set_linger(0)?;
    Ok(socket)
}

/// STREAM socket speaking raw TCP (the HTTP ingress listener).
///
/// Replies are bounded by `SEND_TIMEOUT_MS` so one stuck browser cannot
/// stall the collector.
pub fn stream_socket(ctx: &zmq::Context) -> Result<zmq::Socket> {
    let socket = ctx
        .socket(zmq::STREAM)
        .context("failed to create STREAM socket")?;
    socket.set_linger(0)?;
    socket.set_sndtimeo(SEND_TIMEOUT_MS)?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants() {
        assert_eq!(RECONNECT_IVL_MS, 100);
        assert_eq!(RECONNECT_IVL_MAX_MS, 10_000);
        assert_eq!(SEND_TIMEOUT_MS, 10);
    }

    #[test]
    fn push_socket_has_send_timeout() {
        let ctx = zmq::Context::new();
        let socket = push_socket(&ctx).unwrap();
        assert_eq!(socket.get_sndtimeo().unwrap(), SEND_TIMEOUT_MS);
        assert_eq!(socket.get_linger().unwrap(), 0);
    }

    #[test]
    fn sub_socket_applies_hwm_and_reconnect_ramp() {
        let ctx = zmq::Context::new();
        let socket = sub_socket(&ctx, 50_000).unwrap();
        assert_eq!(socket.get_rcvhwm().unwrap(), 50_000);
        assert_eq!(socket.get_reconnect_ivl().unwrap(), RECONNECT_IVL_MS);
        assert_eq!(
            socket.get_reconnect_ivl_max().unwrap(),
            RECONNECT_IVL_MAX_MS
        );
    }
}
