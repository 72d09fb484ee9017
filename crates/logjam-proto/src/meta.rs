//! Fixed-width meta record carried as the final frame of a 4-frame message.
//!
//! Wire layout (24 bytes, all fields big-endian):
//!
//! ```text
//! offset  0: u16  tag                 always 0xcabd
//! offset  2: u8   compression_method  0 = uncompressed
//! offset  3: u8   version             currently 1
//! offset  4: u32  device_number       0 = synthetic / untracked
//! offset  8: i64  created_ms          wall clock at publish time
//! offset 16: u64  sequence_number     per-device, monotonically increasing
//! ```
//!
//! Unknown versions decode fine; compression methods are carried opaquely and
//! interpreted by the parsers downstream.

use bytes::{BufMut, Bytes, BytesMut};

use crate::envelope::WireError;

/// Marker identifying a well-formed meta frame.
pub const META_TAG: u16 = 0xcabd;

/// Encoded size of a meta record in bytes.
pub const META_SIZE: usize = 24;

/// Meta record version written by this crate.
pub const META_VERSION: u8 = 1;

/// Per-message metadata: device identity, sequencing and timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgMeta {
    pub compression_method: u8,
    pub version: u8,
    pub device_number: u32,
    pub created_ms: i64,
    pub sequence_number: u64,
}

impl Default for MsgMeta {
    fn default() -> Self {
        Self {
            compression_method: 0,
            version: META_VERSION,
            device_number: 0,
            created_ms: 0,
            sequence_number: 0,
        }
    }
}

impl MsgMeta {
    /// Serialize to the 24-byte wire form.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(META_SIZE);
        buf.put_u16(META_TAG);
        buf.put_u8(self.compression_method);
        buf.put_u8(self.version);
        buf.put_u32(self.device_number);
        buf.put_i64(self.created_ms);
        buf.put_u64(self.sequence_number);
        buf.freeze()
    }

    /// Parse a meta frame. Rejects wrong sizes and unknown tags.
    pub fn decode(frame: &[u8]) -> Result<Self, WireError> {
        if frame.len() != META_SIZE {
            return Err(WireError::MetaLength {
                expected: META_SIZE,
                actual: frame.len(),
            });
        }
        let tag = u16::from_be_bytes([frame[0], frame[1]]);
        if tag != META_TAG {
            return Err(WireError::MetaTag(tag));
        }
        Ok(Self {
            compression_method: frame[2],
            version: frame[3],
            device_number: u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]),
            created_ms: i64::from_be_bytes([
                frame[8], frame[9], frame[10], frame[11], frame[12], frame[13], frame[14],
                frame[15],
            ]),
            sequence_number: u64::from_be_bytes([
                frame[16], frame[17], frame[18], frame[19], frame[20], frame[21], frame[22],
                frame[23],
            ]),
        })
    }
}
