//! Subscriber actor: fan-in from logjam devices to the parser fan-out.
//!
//! ```text
//!                                  supervisor
//!                                      |
//!                 PUB      SUB        PIPE          o ROUTER
//!  logjam device  o----------<  subscriber(n_s)  o----------<  direct connections
//!                                PUSH o            o PULL       (subscriber 0 only)
//!                                    /
//!                              PULL ^
//!                            parser(n_p)
//! ```
//!
//! Each actor owns a disjoint shard of the upstream endpoints (index modulo
//! `num_subscribers`), validates frames, consumes heartbeats, tracks
//! per-device sequence gaps and forwards everything else to
//! `inproc://subscriber-{id}` with a bounded send. Subscriber 0 additionally
//! hosts the direct-submission PULL and ROUTER sockets.

use anyhow::Result;
use logjam_proto::{socket, Actor, Pipe, WireMessage, CMD_TERM, CMD_TICK, PING_TOPIC};
use tracing::{debug, error, info, warn};

use crate::config::ImporterConfig;
use crate::device_tracker::DeviceTracker;
use crate::stats::SubscriberCounters;

/// Fixed intra-process alias for the direct-submission PULL socket.
pub const PULL_INPROC_ENDPOINT: &str = "inproc://subscriber-pull";

/// Intra-process address of a subscriber's parser-facing PUSH socket.
pub fn push_endpoint(id: usize) -> String {
    format!("inproc://subscriber-{id}")
}

/// Spawn subscriber actor `id` of `config.num_subscribers`.
pub fn spawn(ctx: &zmq::Context, id: usize, config: &ImporterConfig) -> Result<Actor> {
    let thread_ctx = ctx.clone();
    let config = config.clone();
    Actor::spawn(ctx, &format!("subscriber-{id}"), move |pipe| {
        run(pipe, thread_ctx, id, config)
    })
}

struct SubscriberState {
    id: usize,
    counters: SubscriberCounters,
    tracker: DeviceTracker,
    ticks: u64,
    heart_beat_interval: u64,
    fqdn: String,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn local_fqdn() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string())
}

/// What to do with a message received on a data socket.
enum MessageAction {
    Forward(WireMessage),
    Discard,
}

/// Reply owed on the ROUTER socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouterStatus {
    Accepted,
    BadRequest,
    Pong,
}

struct RouterDecision {
    /// Identity to reply to; `None` for fire-and-forget submissions.
    reply_to: Option<Vec<u8>>,
    status: RouterStatus,
    forward: Option<WireMessage>,
}

struct MetaOutcome {
    is_heartbeat: bool,
    meta_ok: bool,
}

/// Decode the meta frame, count device-0 traffic, and feed the tracker.
///
/// Heartbeat status is decided by the topic alone, so a heartbeat with a
/// broken meta frame is still consumed rather than forwarded.
fn process_meta_and_heartbeat(
    state: &mut SubscriberState,
    msg: &WireMessage,
    now_ms: i64,
) -> MetaOutcome {
    let is_heartbeat = msg.is_heartbeat();
    let meta = match msg.meta() {
        Some(Ok(meta)) => meta,
        Some(Err(err)) => {
            if state.counters.meta_failures == 0 {
                error!("subscriber[{}]: received invalid meta info: {err}", state.id);
            }
            state.counters.meta_failures += 1;
            return MetaOutcome {
                is_heartbeat,
                meta_ok: false,
            };
        }
        None => {
            return MetaOutcome {
                is_heartbeat: false,
                meta_ok: false,
            }
        }
    };
    if meta.device_number == 0 {
        state.counters.messages_dev_zero += 1;
        return MetaOutcome {
            is_heartbeat,
            meta_ok: true,
        };
    }
    let observed_endpoint = if is_heartbeat {
        debug!(
            "subscriber[{}]: received heartbeat from device {}",
            state.id, meta.device_number
        );
        Some(String::from_utf8_lossy(&msg.payload).into_owned())
    } else {
        None
    };
    state.counters.gap_total += state.tracker.calculate_gap(&meta, observed_endpoint, now_ms);
    MetaOutcome {
        is_heartbeat,
        meta_ok: true,
    }
}

/// Validate one inbound multipart message from the SUB or PULL socket.
fn screen_message(
    state: &mut SubscriberState,
    frames: Vec<Vec<u8>>,
    now_ms: i64,
) -> MessageAction {
    state.counters.messages += 1;
    let msg = match WireMessage::from_frames(frames) {
        Ok(msg) => msg,
        Err(err) => {
            if state.counters.invalid == 0 {
                error!("subscriber[{}]: dropped {err}", state.id);
            }
            state.counters.invalid += 1;
            return MessageAction::Discard;
        }
    };
    if msg.meta_frame.is_some() && process_meta_and_heartbeat(state, &msg, now_ms).is_heartbeat {
        return MessageAction::Discard;
    }
    MessageAction::Forward(msg)
}

/// Validate one submission from the ROUTER socket.
///
/// The leading identity frame is preserved byte-for-byte for the reply. An
/// empty second frame marks a REQ-style request expecting a reply; anything
/// else is fire-and-forget.
fn screen_router_message(
    state: &mut SubscriberState,
    mut frames: Vec<Vec<u8>>,
    now_ms: i64,
) -> RouterDecision {
    state.counters.messages += 1;
    let sender_id = if frames.is_empty() {
        Vec::new()
    } else {
        frames.remove(0)
    };
    let wants_reply = frames.first().is_some_and(|frame| frame.is_empty());
    let reply_to = if wants_reply {
        frames.remove(0);
        Some(sender_id)
    } else {
        None
    };
    let msg = match WireMessage::from_frames(frames) {
        Ok(msg) => msg,
        Err(err) => {
            if state.counters.invalid == 0 {
                error!("subscriber[{}]: dropped {err}", state.id);
            }
            state.counters.invalid += 1;
            return RouterDecision {
                reply_to,
                status: RouterStatus::BadRequest,
                forward: None,
            };
        }
    };
    if msg.meta_frame.is_some() {
        let outcome = process_meta_and_heartbeat(state, &msg, now_ms);
        if outcome.is_heartbeat {
            return RouterDecision {
                reply_to,
                status: RouterStatus::Accepted,
                forward: None,
            };
        }
        if outcome.meta_ok && msg.topic.as_ref() == PING_TOPIC {
            return RouterDecision {
                reply_to,
                status: RouterStatus::Pong,
                forward: None,
            };
        }
    }
    RouterDecision {
        reply_to,
        status: RouterStatus::Accepted,
        forward: Some(msg),
    }
}

/// Push a validated message towards the parsers, surfacing backpressure as
/// `blocks` (not writable right now) and `drops` (send timed out).
fn forward_to_parsers(state: &mut SubscriberState, push: &zmq::Socket, msg: WireMessage) {
    match push.poll(zmq::POLLOUT, 0) {
        Ok(0) => {
            if state.counters.blocks == 0 {
                warn!("subscriber[{}]: push socket not ready, blocking", state.id);
            }
            state.counters.blocks += 1;
        }
        Ok(_) => {}
        Err(err) => {
            warn!("subscriber[{}]: push readiness poll failed: {err}", state.id);
        }
    }
    if let Err(err) = push.send_multipart(msg.into_frames(), 0) {
        if state.counters.drops == 0 {
            error!(
                "subscriber[{}]: dropped message on push socket ({err})",
                state.id
            );
        }
        state.counters.drops += 1;
    }
}

fn read_and_forward(
    state: &mut SubscriberState,
    from: &zmq::Socket,
    push: &zmq::Socket,
) -> Result<()> {
    let frames = from.recv_multipart(0)?;
    if let MessageAction::Forward(msg) = screen_message(state, frames, now_ms()) {
        forward_to_parsers(state, push, msg);
    }
    Ok(())
}

fn read_router_and_forward(
    state: &mut SubscriberState,
    router: &zmq::Socket,
    push: &zmq::Socket,
) -> Result<()> {
    let frames = router.recv_multipart(0)?;
    let decision = screen_router_message(state, frames, now_ms());
    if let Some(msg) = decision.forward {
        forward_to_parsers(state, push, msg);
    }
    if let Some(identity) = decision.reply_to {
        let mut reply: Vec<Vec<u8>> = vec![identity, Vec::new()];
        match decision.status {
            RouterStatus::Pong => {
                reply.push(b"200 Pong".to_vec());
                reply.push(state.fqdn.clone().into_bytes());
            }
            RouterStatus::Accepted => reply.push(b"202 Accepted".to_vec()),
            RouterStatus::BadRequest => reply.push(b"400 Bad Request".to_vec()),
        }
        if let Err(err) = router.send_multipart(reply, 0) {
            error!("subscriber[{}]: could not send response ({err})", state.id);
        }
    }
    Ok(())
}

fn handle_tick(state: &mut SubscriberState, sub: &zmq::Socket) {
    state.counters.emit_and_reset(state.id);
    state.ticks += 1;
    if state.heart_beat_interval > 0 && state.ticks % state.heart_beat_interval == 0 {
        state.tracker.reconnect_stale_devices(sub, now_ms());
    }
}

fn run(pipe: Pipe, ctx: zmq::Context, id: usize, config: ImporterConfig) -> Result<()> {
    let sub = socket::sub_socket(&ctx, config.rcv_hwm)?;
    for (pos, spec) in config.endpoints.iter().enumerate() {
        if pos % config.num_subscribers == id {
            info!("subscriber[{id}]: connecting SUB socket to {spec}");
            sub.connect(spec)?;
        }
    }

    let push = socket::push_socket(&ctx)?;
    push.bind(&push_endpoint(id))?;

    let (pull, router) = if id == 0 {
        let pull = socket::pull_socket(&ctx)?;
        info!(
            "subscriber[{id}]: binding PULL socket to {}",
            config.pull_endpoint()
        );
        pull.bind(&config.pull_endpoint())?;
        info!("subscriber[{id}]: binding PULL socket to {PULL_INPROC_ENDPOINT}");
        pull.bind(PULL_INPROC_ENDPOINT)?;

        let router = socket::router_socket(&ctx)?;
        info!(
            "subscriber[{id}]: binding ROUTER socket to {}",
            config.router_endpoint()
        );
        router.bind(&config.router_endpoint())?;
        (Some(pull), Some(router))
    } else {
        (None, None)
    };

    let mut state = SubscriberState {
        id,
        counters: SubscriberCounters::default(),
        tracker: DeviceTracker::new(config.stale_after_ms()),
        ticks: 0,
        heart_beat_interval: config.heart_beat_interval,
        fqdn: local_fqdn(),
    };

    // Sockets exist; let the supervisor continue.
    pipe.signal_ready()?;

    // Install subscriptions before the first read so no matching message
    // slips through unfiltered.
    if config.subscriptions.is_empty() {
        sub.set_subscribe(b"")?;
    } else {
        for prefix in &config.subscriptions {
            sub.set_subscribe(prefix.as_bytes())?;
        }
    }

    info!("subscriber[{id}]: listening");
    loop {
        let mut items = vec![
            pipe.socket().as_poll_item(zmq::POLLIN),
            sub.as_poll_item(zmq::POLLIN),
        ];
        if let (Some(pull), Some(router)) = (&pull, &router) {
            items.push(pull.as_poll_item(zmq::POLLIN));
            items.push(router.as_poll_item(zmq::POLLIN));
        }
        match zmq::poll(&mut items, -1) {
            Ok(_) => {}
            Err(zmq::Error::EINTR) => continue,
            Err(err) => return Err(err.into()),
        }
        let pipe_ready = items[0].is_readable();
        let sub_ready = items[1].is_readable();
        let pull_ready = items.len() > 2 && items[2].is_readable();
        let router_ready = items.len() > 3 && items[3].is_readable();
        drop(items);

        if pipe_ready {
            match pipe.recv_command()?.as_str() {
                CMD_TICK => handle_tick(&mut state, &sub),
                CMD_TERM => break,
                other => {
                    error!("subscriber[{id}]: received unknown actor command: {other}");
                }
            }
        }
        if sub_ready {
            read_and_forward(&mut state, &sub, &push)?;
        }
        if pull_ready {
            if let Some(pull) = &pull {
                read_and_forward(&mut state, pull, &push)?;
            }
        }
        if router_ready {
            if let Some(router) = &router {
                read_router_and_forward(&mut state, router, &push)?;
            }
        }
    }

    info!("subscriber[{id}]: terminated");
    Ok(())
}
