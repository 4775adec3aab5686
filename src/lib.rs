//! conduit_http - streaming, backpressured HTTP/1.1 client core for a
//! non-blocking web toolkit.
//!
//! A request's body is handed to the caller either fully buffered or as a
//! live, demand-driven stream of reference-counted chunks: nothing is read
//! off the wire ahead of what a subscriber has asked for, and redirect
//! chains replay the request transparently up to a configurable hop bound.
//!
//! # Design
//!
//! - **Backpressure by construction** — the transport never reads from the
//!   socket except in direct response to demand; see [`response`] for how
//!   a bounded channel carries this all the way to the subscriber.
//! - **Exactly-once chunk ownership** — every [`ByteChunk`] carries its own
//!   release bookkeeping so cancellation, redirects, and errors can never
//!   double-release or leak a buffer; see [`chunk`].
//! - **Redirects as replay, not recursion in the wire layer** — the
//!   redirect controller (`redirect`) builds a fresh, independent request
//!   configuration per hop; see [`action::execute`].
//!
//! # Quick start
//!
//! ```no_run
//! use conduit_http::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder().build();
//!     let uri = "http://example.invalid/widgets".parse()?;
//!
//!     let response = client.get(uri).await?;
//!     let received = response.collect().await?;
//!     println!("{} ({} bytes)", received.head().status(), received.body().len());
//!     Ok(())
//! }
//! ```
//!
//! Streaming a response instead of buffering it is a matter of polling the
//! handle directly rather than calling [`StreamedResponse::collect`]:
//!
//! ```no_run
//! # async fn run(mut response: conduit_http::StreamedResponse) {
//! use tokio_stream::StreamExt;
//!
//! while let Some(chunk) = response.next().await {
//!     let chunk = chunk.expect("stream error");
//!     // ... consume chunk.as_slice() ...
//!     chunk.release();
//! }
//! # }
//! ```

pub(crate) mod action;
pub mod chunk;
pub mod client;
pub mod config;
pub mod content;
pub mod defaults;
pub(crate) mod decompress;
pub mod error;
pub(crate) mod redirect;
pub mod response;
pub(crate) mod transport;
pub(crate) mod wire;

pub use crate::chunk::ByteChunk;
pub use crate::client::{Client, ClientBuilder};
pub use crate::config::{RedirectDecision, RequestBuilder, RequestConfig, RequestConfigurator, TlsParamsCustomizer};
pub use crate::content::{BodySource, Content, ContentKind};
pub use crate::defaults::{ClientDefaults, PoolLimits};
pub use crate::error::{ClientError, DecoratedError};
pub use crate::response::{ReceivedResponse, ResponseHead, StreamedResponse};
