//! Beacon request parsing: request-line classification, query decoding,
//! JSON envelope construction.
//!
//! Everything here is socket-free. [`analyze_request`] consumes the raw
//! bytes of one request and either produces the canned liveness answer, a
//! ready-to-publish wire message, or a rejection.

use logjam_proto::{MsgMeta, WireMessage};
use serde_json::{Map, Value};
use tracing::warn;

/// At most this many request bytes are considered; longer requests are
/// truncated before parsing.
pub const MAX_REQUEST_BYTES: usize = 4096;

const PATH_PREFIX_AJAX: &[u8] = b"GET /logjam/ajax?";
const PATH_PREFIX_PAGE: &[u8] = b"GET /logjam/page?";
const PATH_PREFIX_ALIVE: &[u8] = b"GET /alive.txt ";

pub const RESPONSE_OK: &[u8] = b"HTTP/1.1 200 OK\r\n\
Cache-Control: private\r\n\
Content-Disposition: inline\r\n\
Content-Transfer-Encoding: binary\r\n\
Content-Type: image/png\r\n\
Content-Length: 0\r\n\
Connection: close\r\n\
\r\n";

pub const RESPONSE_FAIL: &[u8] = b"HTTP/1.1 400 Bad Request\r\n\
Cache-Control: private\r\n\
Content-Type: text/plain\r\n\
Content-Length: 0\r\n\
Connection: close\r\n\
\r\n";

pub const RESPONSE_ALIVE: &[u8] = b"HTTP/1.1 200 OK\r\n\
Cache-Control: private\r\n\
Content-Type: text/plain\r\n\
Content-Length: 6\r\n\
Connection: close\r\n\
\r\n\
ALIVE\n";

/// Query keys whose values become 64-bit integers in the JSON envelope.
const INTEGER_KEYS: [&str; 6] = [
    "viewport_height",
    "viewport_width",
    "html_nodes",
    "script_nodes",
    "style_nodes",
    "v",
];

/// Process-wide mutable state of the collector, owned by the event loop.
#[derive(Debug)]
pub struct IngressState {
    /// Device number stamped into every published meta frame (CLI `-d`).
    pub device_number: u32,
    /// Sequence number of the last published envelope; the first published
    /// envelope carries 1.
    pub sequence_number: u64,
    /// Local time string injected as `started_at`, refreshed once per tick.
    pub started_at: String,
    pub received_messages_count: u64,
    pub received_messages_bytes: u64,
    pub received_messages_max_bytes: u64,
    pub http_failures: u64,
}

impl IngressState {
    pub fn new(device_number: u32) -> Self {
        Self {
            device_number,
            sequence_number: 0,
            started_at: current_time_string(),
            received_messages_count: 0,
            received_messages_bytes: 0,
            received_messages_max_bytes: 0,
            http_failures: 0,
        }
    }

    pub fn refresh_started_at(&mut self) {
        self.started_at = current_time_string();
    }
}

/// ISO-8601 local time with timezone offset, second granularity.
pub fn current_time_string() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%z").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BeaconKind {
    Ajax,
    Page,
}

impl BeaconKind {
    fn as_str(self) -> &'static str {
        match self {
            BeaconKind::Ajax => "ajax",
            BeaconKind::Page => "page",
        }
    }
}

/// Result of analyzing one HTTP request.
#[derive(Debug)]
pub enum RequestOutcome {
    /// `GET /alive.txt`: answer with the liveness body.
    Alive,
    /// Valid beacon: publish this message, then answer 200.
    Publish(WireMessage),
    /// Anything else: answer 400.
    Invalid,
}

/// Classify and parse one raw HTTP request.
pub fn analyze_request(state: &mut IngressState, raw: &[u8]) -> RequestOutcome {
    let raw = &raw[..raw.len().min(MAX_REQUEST_BYTES)];

    let eol = match find_crlf(raw) {
        Some(eol) => eol,
        None => {
            warn!(
                "first {} bytes of request did not include a CR/LF pair",
                raw.len()
            );
            return RequestOutcome::Invalid;
        }
    };
    let first_line = String::from_utf8_lossy(&raw[..eol]).into_owned();

    if raw.starts_with(PATH_PREFIX_ALIVE) {
        return RequestOutcome::Alive;
    }
    let kind = if raw.starts_with(PATH_PREFIX_AJAX) {
        BeaconKind::Ajax
    } else if raw.starts_with(PATH_PREFIX_PAGE) {
        BeaconKind::Page
    } else {
        warn!("invalid request prefix: {first_line}");
        return RequestOutcome::Invalid;
    };

    // the query string runs from the prefix to the next space
    let query_start = PATH_PREFIX_AJAX.len();
    let mut query_end = query_start;
    while query_end < raw.len() && raw[query_end] != b' ' {
        query_end += 1;
    }
    let rest = &raw[query_end..];
    if !rest.starts_with(b" HTTP/1.1\r\n") && !rest.starts_with(b" HTTP/1.0\r\n") {
        warn!("invalid protocol spec: {first_line}");
        return RequestOutcome::Invalid;
    }

    match build_beacon(state, kind, &raw[query_start..query_end]) {
        Some(msg) => RequestOutcome::Publish(msg),
        None => {
            warn!("invalid query string: {first_line}");
            RequestOutcome::Invalid
        }
    }
}

fn find_crlf(raw: &[u8]) -> Option<usize> {
    raw.windows(2).position(|pair| pair == b"\r\n")
}

fn hex_digit(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Percent-decode a query value: `%HH` to its byte, `+` to space.
/// Malformed escapes are copied through literally.
fn decode_value(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        match raw[i] {
            b'%' if i + 2 < raw.len() => {
                match (hex_digit(raw[i + 1]), hex_digit(raw[i + 2])) {
                    (Some(high), Some(low)) => {
                        out.push(high << 4 | low);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    out
}

/// Split the query on `&` and build the JSON object, coercing the fixed key
/// set to integers. Pairs without `=` are skipped; keys are not decoded.
fn parse_query(query: &[u8]) -> Map<String, Value> {
    let mut object = Map::new();
    for pair in query.split(|&b| b == b'&') {
        let eq = match pair.iter().position(|&b| b == b'=') {
            Some(eq) => eq,
            None => continue,
        };
        let key = String::from_utf8_lossy(&pair[..eq]).into_owned();
        let value = decode_value(&pair[eq + 1..]);
        if INTEGER_KEYS.contains(&key.as_str()) {
            let number = String::from_utf8_lossy(&value).parse::<i64>().unwrap_or(0);
            object.insert(key, Value::from(number));
        } else {
            object.insert(key, Value::from(String::from_utf8_lossy(&value).into_owned()));
        }
    }
    object
}

/// `^([^-]+)-([^-]+)`: app and env are the first two hyphen-separated tokens.
fn split_request_id(request_id: &str) -> Option<(&str, &str)> {
    let mut parts = request_id.splitn(3, '-');
    let app = parts.next()?;
    let env = parts.next()?;
    if app.is_empty() || env.is_empty() {
        return None;
    }
    Some((app, env))
}

fn build_beacon(state: &mut IngressState, kind: BeaconKind, query: &[u8]) -> Option<WireMessage> {
    let mut object = parse_query(query);

    let created_ms = chrono::Utc::now().timestamp_millis();
    object.insert("started_ms".to_string(), Value::from(created_ms));
    object.insert(
        "started_at".to_string(),
        Value::from(state.started_at.clone()),
    );

    if object.get("v").and_then(Value::as_i64) != Some(1) {
        return None;
    }
    let request_id = object.get("logjam_request_id")?.as_str()?.to_owned();
    if request_id.len() > 255 {
        return None;
    }
    let (app, env) = split_request_id(&request_id)?;
    if !object.contains_key("logjam_action") {
        return None;
    }

    let app_env = format!("{app}-{env}");
    let routing_key = format!("frontend.{}.{}.{}", kind.as_str(), app, env);
    let payload = serde_json::to_vec(&Value::Object(object)).ok()?;

    let meta = MsgMeta {
        device_number: state.device_number,
        created_ms,
        sequence_number: state.sequence_number + 1,
        ..Default::default()
    };
    let msg = WireMessage::build(app_env, routing_key, payload, meta).ok()?;
    // the sequence number is consumed only by an actually publishable beacon
    state.sequence_number += 1;
    Some(msg)
}
