//! The 3/4-frame wire envelope.
//!
//! `WireMessage` takes ownership of a received multipart message, validates
//! the frame count, and hands the frames back unchanged for forwarding.
//! Heartbeats are ordinary 4-frame messages whose topic is the literal
//! `"heartbeat"`; their payload frame carries the publisher's PUB endpoint
//! advertisement and they never travel past the subscriber.

use bytes::Bytes;
use thiserror::Error;

use crate::meta::MsgMeta;

/// Topic marking a publisher heartbeat.
pub const HEARTBEAT_TOPIC: &[u8] = b"heartbeat";

/// Topic marking a liveness probe on the direct-submission endpoint.
pub const PING_TOPIC: &[u8] = b"ping";

/// Upper bound on the app-env routing prefix.
pub const MAX_APP_ENV_LEN: usize = 255;

/// Errors while parsing or building wire messages.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("invalid message of size {0}")]
    InvalidFrameCount(usize),
    #[error("meta frame has {actual} bytes, expected {expected}")]
    MetaLength { expected: usize, actual: usize },
    #[error("invalid meta tag: {0:#06x}")]
    MetaTag(u16),
    #[error("app-env exceeds {MAX_APP_ENV_LEN} bytes: {0}")]
    AppEnvTooLong(usize),
}

/// A parsed message envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub app_env: Bytes,
    pub topic: Bytes,
    pub payload: Bytes,
    pub meta_frame: Option<Bytes>,
}

impl WireMessage {
    /// Take ownership of a received multipart message.
    ///
    /// Only the frame count is validated here; the meta frame is decoded
    /// lazily via [`WireMessage::meta`] so that messages with broken meta can
    /// still be forwarded.
    pub fn from_frames(mut frames: Vec<Vec<u8>>) -> Result<Self, WireError> {
        if frames.len() < 3 || frames.len() > 4 {
            return Err(WireError::InvalidFrameCount(frames.len()));
        }
        let meta_frame = if frames.len() == 4 {
            frames.pop().map(Bytes::from)
        } else {
            None
        };
        let mut iter = frames.into_iter();
        let app_env = Bytes::from(iter.next().unwrap_or_default());
        let topic = Bytes::from(iter.next().unwrap_or_default());
        let payload = Bytes::from(iter.next().unwrap_or_default());
        Ok(Self {
            app_env,
            topic,
            payload,
            meta_frame,
        })
    }

    /// Build an outbound 4-frame message, encoding the meta record.
    pub fn build(
        app_env: impl Into<Bytes>,
        topic: impl Into<Bytes>,
        payload: impl Into<Bytes>,
        meta: MsgMeta,
    ) -> Result<Self, WireError> {
        let app_env = app_env.into();
        if app_env.len() > MAX_APP_ENV_LEN {
            return Err(WireError::AppEnvTooLong(app_env.len()));
        }
        Ok(Self {
            app_env,
            topic: topic.into(),
            payload: payload.into(),
            meta_frame: Some(meta.encode()),
        })
    }

    /// Whether this message is a publisher heartbeat.
    pub fn is_heartbeat(&self) -> bool {
        self.topic.as_ref() == HEARTBEAT_TOPIC
    }

    /// Decode the meta frame, if one is present.
    pub fn meta(&self) -> Option<Result<MsgMeta, WireError>> {
        self.meta_frame.as_deref().map(MsgMeta::decode)
    }

    pub fn frame_count(&self) -> usize {
        if self.meta_frame.is_some() {
            4
        } else {
            3
        }
    }

    /// Rebuild the multipart frames, byte-exact.
    pub fn into_frames(self) -> Vec<Vec<u8>> {
        let mut frames = Vec::with_capacity(self.frame_count());
        frames.push(self.app_env.to_vec());
        frames.push(self.topic.to_vec());
        frames.push(self.payload.to_vec());
        if let Some(meta) = self.meta_frame {
            frames.push(meta.to_vec());
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frames(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| vec![i as u8]).collect()
    }

    #[test]
    fn rejects_bad_frame_counts() {
        for n in [0, 1, 2, 5, 6] {
            let err = WireMessage::from_frames(frames(n)).unwrap_err();
            assert!(matches!(err, WireError::InvalidFrameCount(m) if m == n));
        }
    }

    #[test]
    fn three_frames_have_no_meta() {
        let msg = WireMessage::from_frames(vec![
            b"my-app".to_vec(),
            b"frontend.page".to_vec(),
            b"{}".to_vec(),
        ])
        .unwrap();
        assert_eq!(msg.frame_count(), 3);
        assert!(msg.meta().is_none());
        assert!(!msg.is_heartbeat());
    }

    #[test]
    fn four_frames_decode_meta() {
        let meta = MsgMeta {
            device_number: 7,
            sequence_number: 1,
            ..Default::default()
        };
        let msg = WireMessage::from_frames(vec![
            b"my-app".to_vec(),
            b"frontend.page".to_vec(),
            b"{\"x\":1}".to_vec(),
            meta.encode().to_vec(),
        ])
        .unwrap();
        assert_eq!(msg.meta().unwrap().unwrap(), meta);
    }

    #[test]
    fn broken_meta_is_still_a_message() {
        let msg = WireMessage::from_frames(vec![
            b"my-app".to_vec(),
            b"t".to_vec(),
            b"p".to_vec(),
            b"junk".to_vec(),
        ])
        .unwrap();
        assert!(msg.meta().unwrap().is_err());
    }

    #[test]
    fn heartbeat_detection() {
        let msg = WireMessage::from_frames(vec![
            b"".to_vec(),
            b"heartbeat".to_vec(),
            b"tcp://host:1234".to_vec(),
            MsgMeta::default().encode().to_vec(),
        ])
        .unwrap();
        assert!(msg.is_heartbeat());
    }

    #[test]
    fn into_frames_is_byte_exact() {
        let original = vec![
            b"app-env".to_vec(),
            b"topic".to_vec(),
            vec![0x00, 0xff, 0x7f],
            MsgMeta::default().encode().to_vec(),
        ];
        let msg = WireMessage::from_frames(original.clone()).unwrap();
        assert_eq!(msg.into_frames(), original);
    }

    #[test]
    fn build_rejects_oversized_app_env() {
        let err = WireMessage::build(
            vec![b'a'; MAX_APP_ENV_LEN + 1],
            "topic",
            "{}",
            MsgMeta::default(),
        )
        .unwrap_err();
        assert!(matches!(err, WireError::AppEnvTooLong(256)));
    }
}
