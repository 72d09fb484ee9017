//! logjam-httpd - HTTP beacon collector.
//!
//! Accepts minimal GET beacons from browsers on a raw STREAM socket, decodes
//! the query string into a JSON envelope, and republishes it on a PUB socket
//! with the process device number and a strictly increasing sequence number.
//!
//! ```text
//!  browser  --- GET /logjam/ajax?... --->  STREAM o  logjam-httpd  o PUB ---> importer
//! ```

pub mod ingress;
pub mod request;

pub use ingress::Ingress;
pub use request::{IngressState, RequestOutcome};
