//! End-to-end subscriber pipeline over real ZMQ sockets.
//!
//! Drives a subscriber actor through its public surfaces: direct submission
//! on the PULL and ROUTER sockets, parser delivery on the inproc PUSH, and
//! the pipe protocol.

use std::sync::atomic::{AtomicU16, Ordering};

use logjam_importer::config::ImporterConfig;
use logjam_importer::subscriber;
use logjam_proto::{MsgMeta, CMD_TICK};

static PORT: AtomicU16 = AtomicU16::new(29600);

fn next_port() -> u16 {
    PORT.fetch_add(1, Ordering::SeqCst)
}

fn test_config() -> ImporterConfig {
    ImporterConfig {
        // nothing listens here; the SUB socket just keeps retrying
        endpoints: vec![format!("tcp://127.0.0.1:{}", next_port())],
        num_subscribers: 1,
        rcv_hwm: 1_000,
        pull_port: next_port(),
        router_port: next_port(),
        subscriptions: Vec::new(),
        heart_beat_interval: 1_000,
    }
}

fn envelope(device: u32, seq: u64) -> Vec<Vec<u8>> {
    let meta = MsgMeta {
        device_number: device,
        sequence_number: seq,
        ..Default::default()
    };
    vec![
        b"my-app".to_vec(),
        b"frontend.page.my.app".to_vec(),
        b"{\"x\":1}".to_vec(),
        meta.encode().to_vec(),
    ]
}

#[test]
fn pull_submission_reaches_the_parser_socket() {
    let ctx = zmq::Context::new();
    let config = test_config();
    let actor = subscriber::spawn(&ctx, 0, &config).unwrap();

    let parser = ctx.socket(zmq::PULL).unwrap();
    parser.set_rcvtimeo(5_000).unwrap();
    parser.connect(&subscriber::push_endpoint(0)).unwrap();

    let submitter = ctx.socket(zmq::PUSH).unwrap();
    submitter.set_linger(0).unwrap();
    submitter
        .connect(&format!("tcp://127.0.0.1:{}", config.pull_port))
        .unwrap();

    let frames = envelope(7, 1);
    submitter.send_multipart(frames.clone(), 0).unwrap();

    let received = parser.recv_multipart(0).unwrap();
    assert_eq!(received, frames);

    // heartbeats are consumed; the next data message comes straight through
    let meta = MsgMeta {
        device_number: 9,
        sequence_number: 100,
        ..Default::default()
    };
    let heartbeat = vec![
        b"".to_vec(),
        b"heartbeat".to_vec(),
        b"tcp://host:1234".to_vec(),
        meta.encode().to_vec(),
    ];
    submitter.send_multipart(heartbeat, 0).unwrap();
    let data = envelope(7, 2);
    submitter.send_multipart(data.clone(), 0).unwrap();

    let received = parser.recv_multipart(0).unwrap();
    assert_eq!(received, data);

    // tick flushes counters without disturbing the stream
    actor.send(CMD_TICK).unwrap();
    let after_tick = envelope(7, 3);
    submitter.send_multipart(after_tick.clone(), 0).unwrap();
    assert_eq!(parser.recv_multipart(0).unwrap(), after_tick);

    actor.terminate().unwrap();
}

#[test]
fn router_replies_follow_submission_kind() {
    let ctx = zmq::Context::new();
    let config = test_config();
    let actor = subscriber::spawn(&ctx, 0, &config).unwrap();

    let requester = ctx.socket(zmq::REQ).unwrap();
    requester.set_linger(0).unwrap();
    requester.set_rcvtimeo(5_000).unwrap();
    requester
        .connect(&format!("tcp://127.0.0.1:{}", config.router_port))
        .unwrap();

    // ping: two payload frames, no forwarding
    let meta = MsgMeta {
        device_number: 1,
        sequence_number: 1,
        ..Default::default()
    };
    requester
        .send_multipart(
            vec![
                b"app-env".to_vec(),
                b"ping".to_vec(),
                b"{}".to_vec(),
                meta.encode().to_vec(),
            ],
            0,
        )
        .unwrap();
    let reply = requester.recv_multipart(0).unwrap();
    assert_eq!(reply.len(), 2);
    assert_eq!(reply[0], b"200 Pong");
    assert!(!reply[1].is_empty(), "pong must carry the local hostname");

    // well-formed submission: accepted
    requester.send_multipart(envelope(7, 1), 0).unwrap();
    let reply = requester.recv_multipart(0).unwrap();
    assert_eq!(reply, vec![b"202 Accepted".to_vec()]);

    // undersized submission: rejected
    requester
        .send_multipart(vec![b"just".to_vec(), b"two".to_vec()], 0)
        .unwrap();
    let reply = requester.recv_multipart(0).unwrap();
    assert_eq!(reply, vec![b"400 Bad Request".to_vec()]);

    actor.terminate().unwrap();
}
