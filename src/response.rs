//! The streaming response handler: turns a parsed status
//! line and header block plus whatever body framing applies into either a
//! live [`StreamedResponse`] or, via [`StreamedResponse::collect`], a fully
//! buffered [`ReceivedResponse`].
//!
//! # State machine, mapped onto channel mechanics
//!
//! Rather than a hand-rolled state enum, the four states this handler moves
//! through ride on a bounded [`tokio::sync::mpsc`] channel:
//!
//! - **await head**: handled by the caller (`action.rs`) before this module
//!   is ever involved — headers are parsed synchronously off the buffered
//!   bytes already read.
//! - **buffering pre-subscribe**: chunks produced before the caller ever
//!   polls the returned stream simply queue in the channel's buffer (bounded
//!   to a small prefetch depth), with the producing task naturally pausing
//!   once that buffer fills — this is also where backpressure comes from
//!   once a subscriber *is* polling steadily.
//! - **streaming**: every `.await` on `sender.send(..)` only resolves once
//!   the consumer has freed a slot, so the producer never reads further
//!   ahead than the channel can hold.
//! - **drained / errored**: the channel closes (normal end) or carries a
//!   final `Err` item; if the consumer instead drops the stream first, the
//!   next `send` fails and the producer force-disposes the transport.
use crate::chunk::ByteChunk;
use crate::decompress::DecompressStage;
use crate::error::{ClientError, DecoratedError};
use crate::transport::{Pool, TcpTransport};
use crate::wire::{ChunkedDecoder, DecodeOutcome, Framing};
use bytes::{Buf, Bytes};
use http::{HeaderMap, Method, StatusCode, Version};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{trace, warn};

/// Depth of the pre-subscription / in-flight buffer. `1`, not more: §8
/// scenario (b) requires "at most one chunk is buffered beyond the
/// subscriber at any instant," and a `tokio::sync::mpsc` channel of capacity
/// `N` lets the sender queue `N` items ahead of what the receiver has taken,
/// so anything above `1` here would let the body driver race ahead of
/// demand rather than track it.
const CHANNEL_DEPTH: usize = 1;

/// Status line and headers, with `Content-Length` stripped for responses
/// that are defined to never carry a body.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    status: StatusCode,
    version: Version,
    reason: String,
    headers: HeaderMap,
}

impl ResponseHead {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub(crate) fn is_redirect(&self) -> bool {
        matches!(
            self.status,
            StatusCode::MOVED_PERMANENTLY
                | StatusCode::FOUND
                | StatusCode::SEE_OTHER
                | StatusCode::TEMPORARY_REDIRECT
                | StatusCode::PERMANENT_REDIRECT
        )
    }

    /// A bodyless `http::Response<()>` view of this head, for handing to a
    /// caller-supplied redirect decision function without exposing the live
    /// body stream it would otherwise have to drain itself.
    pub(crate) fn to_http_response(&self) -> http::Response<()> {
        let mut builder = http::Response::builder()
            .status(self.status)
            .version(self.version);
        if let Some(headers) = builder.headers_mut() {
            *headers = self.headers.clone();
        }
        builder
            .body(())
            .expect("status and version were already validated while parsing the head")
    }

    /// A clone of this head's headers with `Connection` removed, for a
    /// caller forwarding this response onward (e.g. through a reverse proxy)
    /// without leaking this hop's connection-management header.
    pub fn headers_for_forwarding(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        headers.remove(http::header::CONNECTION);
        headers
    }
}

/// A live, backpressured handle to a response body. Dropping it before the
/// body is fully drained force-disposes the transport instead of returning
/// it to the pool.
pub struct StreamedResponse {
    head: ResponseHead,
    receiver: ReceiverStream<Result<ByteChunk, DecoratedError>>,
    max_content_length: i64,
}

impl StreamedResponse {
    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    /// Splits the handle into its head and body stream.
    pub fn into_parts(self) -> (ResponseHead, ReceiverStream<Result<ByteChunk, DecoratedError>>) {
        (self.head, self.receiver)
    }

    /// Drains the body into one buffer, releasing each chunk as it is
    /// appended, enforcing the request's configured `max_content_length`
    /// (`-1` means unbounded). Fails with
    /// [`ClientError::MaxContentLengthExceeded`] if the accumulated length
    /// would exceed it.
    pub async fn collect(self) -> Result<ReceivedResponse, DecoratedError> {
        self.collect_with_limit(self.max_content_length).await
    }

    /// Like [`collect`](Self::collect) but overrides the request's configured
    /// limit for this call only, e.g. to apply a tighter bound than the one
    /// the request was built with.
    pub async fn collect_with_limit(self, max_content_length: i64) -> Result<ReceivedResponse, DecoratedError> {
        use tokio_stream::StreamExt;

        let ResponseHead {
            status,
            version,
            reason,
            headers,
        } = self.head.clone();
        let mut body = Vec::new();
        let mut receiver = self.receiver;

        while let Some(item) = receiver.next().await {
            let chunk = item?;
            if max_content_length >= 0 && (body.len() + chunk.len()) as i64 > max_content_length {
                chunk.release();
                return Err(ClientError::MaxContentLengthExceeded {
                    limit: max_content_length,
                }
                .into());
            }
            body.extend_from_slice(chunk.as_slice());
            chunk.release();
        }

        Ok(ReceivedResponse {
            head: ResponseHead {
                status,
                version,
                reason,
                headers,
            },
            body: Bytes::from(body),
        })
    }
}

impl futures_core::Stream for StreamedResponse {
    type Item = Result<ByteChunk, DecoratedError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}

/// A fully buffered response, produced by [`StreamedResponse::collect`].
#[derive(Debug, Clone)]
pub struct ReceivedResponse {
    head: ResponseHead,
    body: Bytes,
}

impl ReceivedResponse {
    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// Parses the accumulated buffer into a [`ResponseHead`], stripping
/// `Content-Length` from bodyless statuses and deciding body framing for the
/// given request method. Returns `None` if more bytes are needed.
pub(crate) fn try_parse_head(
    buf: &[u8],
    method: &Method,
) -> Result<Option<(ResponseHead, Framing, usize)>, ClientError> {
    let Some((parsed, consumed)) = crate::wire::parse_head(buf)? else {
        return Ok(None);
    };
    let mut parsed = parsed;
    crate::wire::head::strip_length_if_bodyless(&mut parsed);
    let framing = crate::wire::head::framing_for(method, &parsed)?;

    Ok(Some((
        ResponseHead {
            status: parsed.status,
            version: parsed.version,
            reason: parsed.reason,
            headers: parsed.headers,
        },
        framing,
        consumed,
    )))
}

/// Spawns the body-driving task and returns the [`StreamedResponse`] handle
/// immediately, the way headers are delivered to the caller as soon as they
/// are available while the body is still in flight.
pub(crate) fn start_streaming(
    head: ResponseHead,
    transport: TcpTransport,
    framing: Framing,
    defaults_chunk_size: usize,
    read_timeout: Duration,
    reusable: bool,
    pool: Arc<Pool>,
    decompress_response: bool,
    max_content_length: i64,
) -> StreamedResponse {
    let decompress = if decompress_response {
        let content_encoding = head
            .headers
            .get(http::header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_owned());
        DecompressStage::for_content_encoding(content_encoding.as_deref())
    } else {
        DecompressStage::for_content_encoding(None)
    };

    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
    tokio::spawn(drive_body(
        transport,
        framing,
        decompress,
        defaults_chunk_size,
        read_timeout,
        reusable,
        tx,
        pool,
    ));

    StreamedResponse {
        head,
        receiver: ReceiverStream::new(rx),
        max_content_length,
    }
}

/// A response with no body at all: resolves immediately, returning the
/// transport to the pool without spawning anything.
pub(crate) async fn start_bodyless(
    head: ResponseHead,
    transport: TcpTransport,
    reusable: bool,
    pool: Arc<Pool>,
    max_content_length: i64,
) -> StreamedResponse {
    if reusable {
        pool.release(transport).await;
    } else if let Err(err) = transport.close().await {
        trace!(%err, "error closing bodyless non-reusable connection");
    }
    let (_tx, rx) = mpsc::channel(1);
    StreamedResponse {
        head,
        receiver: ReceiverStream::new(rx),
        max_content_length,
    }
}

async fn drive_body(
    mut transport: TcpTransport,
    framing: Framing,
    mut decompress: DecompressStage,
    max_chunk: usize,
    read_timeout: Duration,
    reusable: bool,
    sender: mpsc::Sender<Result<ByteChunk, DecoratedError>>,
    pool: Arc<Pool>,
) {
    transport.set_auto_read(false);
    let mut chunked = matches!(framing, Framing::Chunked).then(ChunkedDecoder::new);
    let mut remaining = match framing {
        Framing::ContentLength(n) => Some(n),
        _ => None,
    };

    loop {
        // Race the next read against the subscriber going away so a response
        // that stalls on the wire after filling the pre-subscription buffer
        // still force-disposes promptly instead of waiting out read_timeout:
        // a dropped `StreamedResponse` (subscribed or never subscribed at
        // all) closes the receiver, and `closed()` resolves immediately
        // regardless of what the socket is doing.
        let piece = tokio::select! {
            _ = sender.closed() => {
                trace!("subscriber gone while awaiting next body piece; force-disposing");
                if let Err(err) = transport.close().await {
                    trace!(%err, "error force-disposing after subscriber went away");
                }
                return;
            }
            result = next_raw_piece(&mut transport, framing, &mut chunked, &mut remaining, read_timeout) => {
                match result {
                    Ok(Some(piece)) => piece,
                    Ok(None) => break,
                    Err(err) => return fail(transport, err, &sender).await,
                }
            }
        };

        let decoded = match decompress.push(&piece).await {
            Ok(d) => d,
            Err(err) => return fail(transport, err, &sender).await,
        };

        if !deliver(&decoded, max_chunk, &sender).await {
            // Subscriber dropped the stream; force-dispose rather than pool.
            if let Err(err) = transport.close().await {
                trace!(%err, "error force-disposing after subscriber dropped the stream");
            }
            return;
        }
    }

    match decompress.finish().await {
        Ok(tail) if !tail.is_empty() => {
            if !deliver(&tail, max_chunk, &sender).await {
                if let Err(err) = transport.close().await {
                    trace!(%err, "error force-disposing after subscriber dropped the stream");
                }
                return;
            }
        }
        Ok(_) => {}
        Err(err) => return fail(transport, err, &sender).await,
    }

    if reusable {
        pool.release(transport).await;
    } else if let Err(err) = transport.close().await {
        trace!(%err, "error closing non-reusable connection");
    }
}

/// Force-disposes `transport` after `err`, attaching a disposal failure as a
/// suppressed cause per the disposal contract, and delivers the resulting
/// error to the subscriber if one is still listening. A failed send here
/// means the subscriber (or the response handle itself) was dropped between
/// the last successful delivery and this error — not silently swallowed,
/// just unreachable, which is worth a log line since it's the one path where
/// a real failure has no recipient.
async fn fail(
    transport: TcpTransport,
    err: ClientError,
    sender: &mpsc::Sender<Result<ByteChunk, DecoratedError>>,
) {
    let decorated = match transport.close().await {
        Ok(()) => err.into(),
        Err(close_err) => err.with_suppressed(close_err),
    };
    if sender.send(Err(decorated)).await.is_err() {
        warn!("body error had no subscriber left to deliver to");
    }
}

/// Sends `data` to the subscriber in pieces no larger than `max_chunk`.
/// Returns `false` if the subscriber has gone away.
async fn deliver(
    data: &Bytes,
    max_chunk: usize,
    sender: &mpsc::Sender<Result<ByteChunk, DecoratedError>>,
) -> bool {
    if data.is_empty() {
        return true;
    }
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + max_chunk).min(data.len());
        let slice = data.slice(offset..end);
        offset = end;
        let chunk = ByteChunk::new(slice);
        if sender.send(Ok(chunk)).await.is_err() {
            return false;
        }
    }
    true
}

/// Produces the next raw (possibly still compressed) piece of body bytes
/// according to the active framing, pulling more socket bytes only when the
/// already-buffered bytes are insufficient. Returns `Ok(None)` once the body
/// is fully delimited.
async fn next_raw_piece(
    transport: &mut TcpTransport,
    framing: Framing,
    chunked: &mut Option<ChunkedDecoder>,
    remaining: &mut Option<usize>,
    read_timeout: Duration,
) -> Result<Option<Bytes>, ClientError> {
    match framing {
        Framing::None => Ok(None),
        Framing::ContentLength(_) => {
            let remaining = remaining.as_mut().expect("content-length framing carries a counter");
            loop {
                if *remaining == 0 {
                    return Ok(None);
                }
                if transport.buf().is_empty() {
                    if transport.fill_more(read_timeout).await? == 0 {
                        return Err(ClientError::TransportClosed);
                    }
                    continue;
                }
                let take = (*remaining).min(transport.buf().len());
                let bytes = transport.buf_mut().split_to(take).freeze();
                *remaining -= take;
                return Ok(Some(bytes));
            }
        }
        Framing::Chunked => {
            let decoder = chunked.as_mut().expect("chunked framing carries a decoder");
            loop {
                match decoder.decode(transport.buf_mut())? {
                    DecodeOutcome::Chunk(bytes) => return Ok(Some(bytes)),
                    DecodeOutcome::End => return Ok(None),
                    DecodeOutcome::NeedMore => {
                        if transport.fill_more(read_timeout).await? == 0 {
                            return Err(ClientError::TransportClosed);
                        }
                    }
                }
            }
        }
        Framing::UntilClose => {
            if transport.buf().is_empty() {
                if transport.fill_more(read_timeout).await? == 0 {
                    return Ok(None);
                }
            }
            let len = transport.buf().len();
            Ok(Some(transport.buf_mut().split_to(len).freeze()))
        }
    }
}

/// Determines whether a connection may be reused after this response,
/// mirroring HTTP/1.1 keep-alive defaults: persistent unless the peer (or an
/// HTTP/1.0 peer's absence of `Connection: keep-alive`) says otherwise.
pub(crate) fn is_keep_alive(head: &ResponseHead) -> bool {
    let connection = head
        .headers
        .get(http::header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_ascii_lowercase());

    match head.version {
        Version::HTTP_11 => connection.as_deref() != Some("close"),
        Version::HTTP_10 => connection.as_deref() == Some("keep-alive"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_head_and_strips_length_for_204() {
        let buf = b"HTTP/1.1 204 No Content\r\nContent-Length: 5\r\n\r\n";
        let (head, framing, consumed) = try_parse_head(buf, &Method::GET).unwrap().unwrap();
        assert_eq!(consumed, buf.len());
        assert!(head.headers().get(http::header::CONTENT_LENGTH).is_none());
        assert_eq!(framing, Framing::None);
    }

    #[test]
    fn redirect_statuses_are_flagged() {
        let buf = b"HTTP/1.1 302 Found\r\nLocation: /x\r\n\r\n";
        let (head, _, _) = try_parse_head(buf, &Method::GET).unwrap().unwrap();
        assert!(head.is_redirect());
    }
}
