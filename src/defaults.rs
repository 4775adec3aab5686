//! Client-wide tunables, seeded into every request's [`RequestConfig`](crate::config::RequestConfig).
//!
//! Mirrors the shape of a server's limits struct: one plain, `Clone + Debug`
//! record with conservative defaults, overridable field-by-field.
//!
//! # Example
//!
//! ```
//! use conduit_http::defaults::ClientDefaults;
//! use std::time::Duration;
//!
//! let defaults = ClientDefaults {
//!     read_timeout: Duration::from_secs(10),
//!     ..ClientDefaults::default()
//! };
//! ```

use std::time::Duration;

/// Defaults applied to every request built from a [`Client`](crate::client::Client)
/// unless the request's own configurator overrides them.
#[derive(Debug, Clone)]
pub struct ClientDefaults {
    /// Maximum duration to wait for the TCP connect (and TLS handshake, if
    /// any) to finish (default: `30 seconds`).
    pub connect_timeout: Duration,

    /// Maximum duration to wait between inbound bytes once the request has
    /// been sent (default: `30 seconds`). Resets on every byte received.
    pub read_timeout: Duration,

    /// Maximum number of bytes to buffer when a response is read in full
    /// rather than streamed; `-1` means unbounded (default: `-1`).
    pub max_content_length: i64,

    /// Maximum size, in bytes, of a single chunk delivered to a streaming
    /// subscriber (default: `8192`).
    pub response_max_chunk_size: usize,

    /// Maximum number of redirect hops a single `execute()` will follow
    /// (default: `10`). `0` disables redirect chasing entirely.
    pub max_redirects: usize,

    /// Whether a recognized `Content-Encoding` on the response triggers
    /// automatic decompression before bytes reach the subscriber
    /// (default: `true`).
    pub decompress_response: bool,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ClientDefaults {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            max_content_length: -1,
            response_max_chunk_size: 8 * 1024,
            max_redirects: 10,
            decompress_response: true,

            _priv: (),
        }
    }
}

/// Minimal pool sizing knobs; the pool's internal eviction policy is kept
/// deliberately small (bounded idle list, no warm-up, no load balancing) per
/// the transport adapter contract.
#[derive(Debug, Clone)]
pub struct PoolLimits {
    /// Maximum idle connections retained per `(scheme, host, port)` key
    /// (default: `8`).
    pub max_idle_per_host: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            max_idle_per_host: 8,
            _priv: (),
        }
    }
}
