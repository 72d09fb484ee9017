//! logjam-proto - wire protocol types for the logjam ingestion front-end
//!
//! This crate defines the multipart message format exchanged between logjam
//! devices, the importer and downstream parsers, plus the shared ZMQ socket
//! construction and the actor/pipe plumbing every long-lived component is
//! built on.
//!
//! A message on the bus is 3 or 4 frames:
//!
//! ```text
//! Frame 0: app-env      UTF-8 routing prefix, e.g. "my-app-production"
//! Frame 1: topic        UTF-8, e.g. "frontend.page.my-app.production"
//! Frame 2: payload      opaque bytes, typically compressed JSON
//! Frame 3: meta         fixed-width record (optional, see `meta`)
//! ```

pub mod actor;
pub mod envelope;
pub mod meta;
pub mod socket;

pub use actor::{Actor, Pipe, CMD_TERM, CMD_TICK};
pub use envelope::{WireError, WireMessage, HEARTBEAT_TOPIC, PING_TOPIC};
pub use meta::{MsgMeta, META_SIZE, META_TAG, META_VERSION};
