//! Client error taxonomy.
//!
//! Every failure surfaced by this crate fits one of the variants below. Unlike
//! the wire-format errors a server renders to a peer, a client error is never
//! serialized — it only needs to be classified and, in the streaming path,
//! carried across a channel to a subscriber.

use std::io;

/// Errors produced while building, sending, or streaming a request.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The connect phase did not finish within [`crate::defaults::ClientDefaults::connect_timeout`].
    #[error("connect timed out")]
    ConnectTimeout,

    /// No byte arrived within [`crate::defaults::ClientDefaults::read_timeout`].
    #[error("read timed out")]
    ReadTimeout,

    /// TLS handshake or parameter application failed.
    #[error("tls error: {0}")]
    Tls(String),

    /// A redirect response carried no usable `Location`.
    #[error("bad redirect: {0}")]
    BadRedirect(String),

    /// The configured redirect bound would have been exceeded.
    #[error("too many redirects (limit {limit})")]
    TooManyRedirects {
        /// The `max_redirects` value that was reached.
        limit: usize,
    },

    /// A buffered response exceeded `max_content_length`.
    #[error("response body exceeded max_content_length ({limit} bytes)")]
    MaxContentLengthExceeded {
        /// The configured limit, in bytes.
        limit: i64,
    },

    /// The request body publisher finished before its declared length.
    #[error("request body incomplete: expected {expected} bytes, sent {sent}")]
    IncompleteBody {
        /// Declared `Content-Length`.
        expected: usize,
        /// Bytes actually written before the source completed.
        sent: usize,
    },

    /// The peer closed the connection in the middle of a response.
    #[error("connection closed before response was complete")]
    TransportClosed,

    /// The response did not parse as valid HTTP.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The subscriber cancelled the stream, or the owning execution was aborted.
    #[error("cancelled")]
    Cancelled,

    /// An I/O failure not otherwise classified.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl ClientError {
    /// A secondary failure observed while disposing of a transport after a
    /// primary error, attached so no information is lost. Mirrors the way a
    /// cause chain is threaded through rather than discarded.
    pub fn with_suppressed(self, suppressed: ClientError) -> DecoratedError {
        DecoratedError {
            primary: self,
            suppressed: Some(Box::new(suppressed)),
        }
    }
}

impl From<ClientError> for DecoratedError {
    fn from(primary: ClientError) -> Self {
        DecoratedError {
            primary,
            suppressed: None,
        }
    }
}

/// A [`ClientError`] plus an optional secondary failure that occurred while
/// disposing of the transport in reaction to the primary one.
#[derive(Debug, thiserror::Error)]
#[error("{primary}")]
pub struct DecoratedError {
    /// The error that triggered disposal.
    pub primary: ClientError,
    /// A failure that occurred while disposing of the transport, if any.
    pub suppressed: Option<Box<ClientError>>,
}

pub(crate) type Result<T> = std::result::Result<T, DecoratedError>;
