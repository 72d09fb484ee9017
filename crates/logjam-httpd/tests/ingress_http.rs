//! End-to-end collector test: real TCP requests in, PUB envelopes out.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use logjam_httpd::Ingress;
use logjam_proto::MsgMeta;
use serde_json::Value;

static PORT: AtomicU16 = AtomicU16::new(29700);

fn next_port() -> u16 {
    PORT.fetch_add(1, Ordering::SeqCst)
}

fn http_roundtrip(port: u16, request: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream.write_all(request.as_bytes()).unwrap();
    let mut response = Vec::new();
    // the collector closes the connection after each answer
    let _ = stream.read_to_end(&mut response);
    String::from_utf8_lossy(&response).into_owned()
}

#[test]
fn beacons_are_published_and_answered() {
    let http_port = next_port();
    let pub_port = next_port();

    let ctx = zmq::Context::new();
    let ingress = Ingress::bind(&ctx, 42, http_port, pub_port).unwrap();

    let collector = ctx.socket(zmq::SUB).unwrap();
    collector.set_rcvtimeo(5_000).unwrap();
    collector.set_subscribe(b"").unwrap();
    collector
        .connect(&format!("tcp://127.0.0.1:{pub_port}"))
        .unwrap();

    std::thread::spawn(move || {
        let _ = ingress.run();
    });

    // give the SUB connection time to settle before traffic flows
    std::thread::sleep(Duration::from_millis(300));

    let response = http_roundtrip(
        http_port,
        "GET /logjam/ajax?v=1&logjam_request_id=my-app-prod-abc&logjam_action=X HTTP/1.1\r\nHost: t\r\n\r\n",
    );
    assert!(response.starts_with("HTTP/1.1 200 OK"), "got: {response}");
    assert!(response.contains("Content-Type: image/png"));
    assert!(response.contains("Connection: close"));

    let frames = collector.recv_multipart(0).unwrap();
    assert_eq!(frames.len(), 4);
    assert_eq!(frames[0], b"my-app");
    assert_eq!(frames[1], b"frontend.ajax.my.app");

    let json: Value = serde_json::from_slice(&frames[2]).unwrap();
    assert_eq!(json["v"], Value::from(1));
    assert_eq!(json["logjam_action"], Value::from("X"));
    assert!(json["started_ms"].is_i64());
    assert!(json["started_at"].is_string());

    let meta = MsgMeta::decode(&frames[3]).unwrap();
    assert_eq!(meta.device_number, 42);
    assert_eq!(meta.sequence_number, 1);

    // an invalid beacon gets a 400 and publishes nothing
    let response = http_roundtrip(
        http_port,
        "GET /logjam/ajax?v=2&logjam_request_id=my-app-prod&logjam_action=X HTTP/1.1\r\n\r\n",
    );
    assert!(
        response.starts_with("HTTP/1.1 400 Bad Request"),
        "got: {response}"
    );

    // the next valid beacon carries sequence 2: the reject consumed nothing
    let response = http_roundtrip(
        http_port,
        "GET /logjam/page?v=1&logjam_request_id=my-app-prod&logjam_action=Y HTTP/1.1\r\n\r\n",
    );
    assert!(response.starts_with("HTTP/1.1 200 OK"));

    let frames = collector.recv_multipart(0).unwrap();
    assert_eq!(frames[1], b"frontend.page.my.app");
    let meta = MsgMeta::decode(&frames[3]).unwrap();
    assert_eq!(meta.sequence_number, 2);
}

#[test]
fn alive_endpoint_answers_inline() {
    let http_port = next_port();
    let pub_port = next_port();

    let ctx = zmq::Context::new();
    let ingress = Ingress::bind(&ctx, 1, http_port, pub_port).unwrap();
    std::thread::spawn(move || {
        let _ = ingress.run();
    });

    let response = http_roundtrip(http_port, "GET /alive.txt HTTP/1.1\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 200 OK"), "got: {response}");
    assert!(response.ends_with("ALIVE\n"));

    let response = http_roundtrip(http_port, "GET /somewhere/else HTTP/1.1\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 400 Bad Request"));
}
