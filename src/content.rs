//! Request body classification.
//!
//! A request body is either absent, a single owned buffer, or a stream of
//! byte sources with known or unknown total length. Which variant is chosen
//! decides the framing the action layer (`action.rs`) uses on the wire:
//! `Buffer`/`StreamKnown` get `Content-Length`, `StreamUnknown` gets
//! `Transfer-Encoding: chunked`.

use crate::error::ClientError;
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;

/// A source of outbound body bytes that can be replayed.
///
/// Redirect handling (307/308, and any caller-approved redirect that
/// preserves the method) requires restarting the body from the beginning.
/// Implementations that cannot rewind should return
/// [`ClientError::Protocol`] from a second call to [`next`](BodySource::next)
/// after having already been drained once; the redirect controller treats
/// that as "not replayable" and surfaces the error rather than retrying.
pub trait BodySource: Send + Sync {
    /// Produces the next chunk of body bytes, or `None` at end of stream.
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<Bytes>, ClientError>> + Send + '_>>;

    /// Rewinds the source so it can be read again from the start. The default
    /// implementation reports the source as single-shot.
    fn restart(&mut self) -> Result<(), ClientError> {
        Err(ClientError::Protocol(
            "body source is not replayable".into(),
        ))
    }
}

/// Which broad shape a [`Content`] has, without exposing the payload itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// [`Content::Empty`].
    Empty,
    /// [`Content::Buffer`].
    Buffer,
    /// [`Content::StreamKnown`] or [`Content::StreamUnknown`].
    Stream,
}

/// Classification of a request body.
pub enum Content {
    /// No request body at all.
    Empty,
    /// A single, already-materialized buffer. Replayable by construction.
    Buffer(Bytes),
    /// A streamed body whose total length is known ahead of time.
    StreamKnown {
        /// Declared length; framed with `Content-Length`.
        length: usize,
        /// Byte source. The action layer stops reading once `length` bytes
        /// have been taken and discards any surplus the source still yields.
        source: Box<dyn BodySource>,
    },
    /// A streamed body whose total length is not known ahead of time.
    /// Framed with `Transfer-Encoding: chunked`.
    StreamUnknown(Box<dyn BodySource>),
}

impl Content {
    /// Declared length in bytes, or `-1` if unknown (absent bodies are `0`).
    pub fn length(&self) -> i64 {
        match self {
            Content::Empty => 0,
            Content::Buffer(b) => b.len() as i64,
            Content::StreamKnown { length, .. } => *length as i64,
            Content::StreamUnknown(_) => -1,
        }
    }

    /// Whether this content is framed with `Transfer-Encoding: chunked`.
    pub fn is_chunked(&self) -> bool {
        matches!(self, Content::StreamUnknown(_))
    }

    /// Which shape this content has.
    pub fn kind(&self) -> ContentKind {
        match self {
            Content::Empty => ContentKind::Empty,
            Content::Buffer(_) => ContentKind::Buffer,
            Content::StreamKnown { .. } | Content::StreamUnknown(_) => ContentKind::Stream,
        }
    }

    /// Takes the buffer out of a `Buffer` content, leaving `Empty` behind.
    /// Returns `None` for any other variant.
    pub fn take_buffer(&mut self) -> Option<Bytes> {
        match std::mem::replace(self, Content::Empty) {
            Content::Buffer(bytes) => Some(bytes),
            other => {
                *self = other;
                None
            }
        }
    }

    /// Takes the body source out of a `StreamKnown`/`StreamUnknown` content,
    /// leaving `Empty` behind. Returns `None` for any other variant.
    pub fn take_source(&mut self) -> Option<Box<dyn BodySource>> {
        match std::mem::replace(self, Content::Empty) {
            Content::StreamKnown { source, .. } | Content::StreamUnknown(source) => Some(source),
            other => {
                *self = other;
                None
            }
        }
    }

    /// Releases any bytes held by a `Buffer` variant. A no-op for the other
    /// variants since they hold no chunk-accounted allocation of their own.
    /// Safe to call any number of times — repeated calls on an already-empty
    /// `Buffer` are inexpensive `Bytes` drops, matching the idempotent
    /// `discard()` contract chunk disposal relies on elsewhere.
    pub fn discard(&mut self) {
        if let Content::Buffer(bytes) = self {
            *bytes = Bytes::new();
        }
    }
}
