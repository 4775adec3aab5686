//! Request action: connection acquisition, request
//! framing and write, and dispatch into either the redirect controller or a
//! delivered [`StreamedResponse`].

use crate::config::RequestConfig;
use crate::content::Content;
use crate::error::{ClientError, DecoratedError, Result as ClientResult};
use crate::redirect;
use crate::response::{self, ResponseHead, StreamedResponse};
use crate::transport::{Pool, TransportKey};
use bytes::{Buf, BytesMut};
use http::Method;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{info_span, Instrument};

/// The outcome of `execute()`'s single hop.
pub(crate) enum Attempt {
    Delivered(StreamedResponse),
    Redirect { config: RequestConfig },
}

/// Runs a request to completion, following redirects (each a fresh attempt
/// with its own transport) up to the configured hop bound.
pub(crate) async fn execute(
    pool: Arc<Pool>,
    mut config: RequestConfig,
) -> ClientResult<StreamedResponse> {
    let mut hops = 0usize;
    loop {
        let span = info_span!("request", method = %config.method, uri = %config.uri, hop = hops);
        match run_one(&pool, config, hops).instrument(span).await? {
            Attempt::Delivered(response) => return Ok(response),
            Attempt::Redirect { config: next } => {
                config = next;
                hops += 1;
            }
        }
    }
}

/// Runs one attempt: acquire a transport, write the request, await the head,
/// then either evaluate a redirect or deliver the response as-is.
///
/// A 3xx status only triggers redirect evaluation (Location resolution, the
/// caller's `on_redirect` decision, body drain-and-replace) while hops remain
/// under the configured bound; at `max_redirects == 0` or once the bound is
/// reached, the 3xx is delivered to the caller exactly like any other status
/// rather than raised as an error.
async fn run_one(
    pool: &Arc<Pool>,
    mut config: RequestConfig,
    hops: usize,
) -> ClientResult<Attempt> {
    let key = transport_key(&config)?;
    let mut transport = pool
        .acquire(
            key,
            config.tls_config.clone(),
            config.tls_params.clone(),
            config.connect_timeout,
        )
        .await?;

    let (head, framing, reusable_hint) = match write_request(&mut transport, &mut config).await {
        Ok(HeadersWritten::Preempted { head, framing }) => {
            // Peer answered the 100-continue negotiation with its real
            // status instead of `100`; the body was never written, and
            // there is nothing left to await — this head is the response.
            let reusable_hint = !matches!(framing, crate::wire::Framing::UntilClose);
            (head, framing, reusable_hint)
        }
        Ok(HeadersWritten::Proceeded) => {
            match await_head(&mut transport, &config.method, config.read_timeout).await {
                Ok(parts) => parts,
                Err(err) => return Err(force_dispose(transport, err).await),
            }
        }
        Err(err) => return Err(force_dispose(transport, err).await),
    };

    let reusable = reusable_hint && response::is_keep_alive(&head);
    if !reusable {
        transport.mark_not_reusable();
    }

    let evaluating_redirect = head.is_redirect() && config.max_redirects > 0 && hops < config.max_redirects;

    if evaluating_redirect {
        match redirect::next_request(config, &head) {
            Ok(redirect::NextOutcome::Follow(next)) => {
                // Redirected bodies are always fully drained and released;
                // never surfaced to the caller.
                let drained = response::start_streaming(
                    head,
                    transport,
                    framing,
                    next.response_max_chunk_size,
                    next.read_timeout,
                    reusable,
                    Arc::clone(pool),
                    next.decompress_response,
                    next.max_content_length,
                );
                drain_and_release(drained).await;
                return Ok(Attempt::Redirect { config: next });
            }
            Ok(redirect::NextOutcome::Abort(restored)) => {
                // The caller's decision function aborted redirect chasing;
                // deliver this response live, exactly as if it had never
                // been a candidate for redirection.
                config = restored;
            }
            Err(err) => return Err(force_dispose(transport, err).await),
        }
    }

    if matches!(framing, crate::wire::Framing::None) {
        let response = response::start_bodyless(
            head,
            transport,
            reusable,
            Arc::clone(pool),
            config.max_content_length,
        )
        .await;
        return Ok(Attempt::Delivered(response));
    }

    let response = response::start_streaming(
        head,
        transport,
        framing,
        config.response_max_chunk_size,
        config.read_timeout,
        reusable,
        Arc::clone(pool),
        config.decompress_response,
        config.max_content_length,
    );
    Ok(Attempt::Delivered(response))
}

/// Force-disposes `transport` after `primary` triggered the failure,
/// attaching the disposal failure as a suppressed cause per the disposal
/// contract ("if disposal itself fails, attach the disposal failure as a
/// secondary cause").
async fn force_dispose(transport: crate::transport::TcpTransport, primary: ClientError) -> DecoratedError {
    match transport.close().await {
        Ok(()) => primary.into(),
        Err(close_err) => primary.with_suppressed(close_err),
    }
}

async fn drain_and_release(mut response: StreamedResponse) {
    use futures_core::Stream;
    use std::pin::Pin;

    loop {
        let next = std::future::poll_fn(|cx| Pin::new(&mut response).poll_next(cx)).await;
        match next {
            Some(Ok(chunk)) => chunk.release(),
            Some(Err(_)) | None => break,
        }
    }
}

fn transport_key(config: &RequestConfig) -> Result<TransportKey, ClientError> {
    let uri = config.uri();
    let scheme = uri.scheme_str().unwrap_or("http");
    let tls = match scheme {
        "http" => false,
        "https" => true,
        other => return Err(ClientError::Protocol(format!("unsupported scheme: {other}"))),
    };
    let host = uri
        .host()
        .ok_or_else(|| ClientError::Protocol("request URI has no host".into()))?
        .to_owned();
    let port = uri.port_u16().unwrap_or(if tls { 443 } else { 80 });

    Ok(TransportKey { tls, host, port })
}

/// Outcome of [`write_request`]: either the body was written and a normal
/// `await_head` should follow, or the peer preempted that by answering the
/// `Expect: 100-continue` negotiation with its real, final status instead of
/// `100` — in which case the body was never written and that status is the
/// response to deliver, exactly as if it had arrived after a body write.
enum HeadersWritten {
    Proceeded,
    Preempted {
        head: ResponseHead,
        framing: crate::wire::Framing,
    },
}

async fn write_request(
    transport: &mut crate::transport::TcpTransport,
    config: &mut RequestConfig,
) -> Result<HeadersWritten, ClientError> {
    let mut head = BytesMut::with_capacity(512);
    let path = config
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    head.extend_from_slice(config.method.as_str().as_bytes());
    head.extend_from_slice(b" ");
    head.extend_from_slice(path.as_bytes());
    head.extend_from_slice(b" HTTP/1.1\r\n");

    let host_header = config
        .uri()
        .host()
        .map(|h| match config.uri().port_u16() {
            Some(p) => format!("{h}:{p}"),
            None => h.to_owned(),
        })
        .unwrap_or_default();
    head.extend_from_slice(b"host: ");
    head.extend_from_slice(host_header.as_bytes());
    head.extend_from_slice(b"\r\n");

    for (name, value) in config.headers.iter() {
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }

    let expect_continue = config
        .headers
        .get(http::header::EXPECT)
        .map(|v| v.as_bytes().eq_ignore_ascii_case(b"100-continue"))
        .unwrap_or(false);

    match &config.body {
        Content::Empty => {
            head.extend_from_slice(b"content-length: 0\r\n");
        }
        Content::Buffer(bytes) => {
            head.extend_from_slice(format!("content-length: {}\r\n", bytes.len()).as_bytes());
        }
        Content::StreamKnown { length, .. } => {
            head.extend_from_slice(format!("content-length: {length}\r\n").as_bytes());
        }
        Content::StreamUnknown(_) => {
            head.extend_from_slice(b"transfer-encoding: chunked\r\n");
        }
    }
    head.extend_from_slice(b"\r\n");

    transport.write_all(&head).await?;

    if expect_continue {
        match await_continue(transport, &config.method, config.read_timeout).await? {
            ContinueOutcome::Continue => {}
            ContinueOutcome::Preempted { head, framing } => {
                return Ok(HeadersWritten::Preempted { head, framing });
            }
        }
    }

    write_body(transport, &mut config.body).await?;
    Ok(HeadersWritten::Proceeded)
}

/// What arrived while waiting for `100 Continue`.
enum ContinueOutcome {
    /// A `100` was observed, or none arrived within `read_timeout` — either
    /// way the caller proceeds to write the body, per the negotiation
    /// fallback ("a timeout elapses; then write anyway", §4.D step 3).
    Continue,
    /// The peer answered with its real, final status instead of `100`
    /// (e.g. rejecting the request outright with `417`/`413`) — the body
    /// must never be written to a peer that has already responded.
    Preempted {
        head: ResponseHead,
        framing: crate::wire::Framing,
    },
}

/// Waits (bounded by `read_timeout`) for a response head, classifying it as
/// `100 Continue` (proceed) or any other status (preempted, final response).
async fn await_continue(
    transport: &mut crate::transport::TcpTransport,
    method: &Method,
    read_timeout: std::time::Duration,
) -> Result<ContinueOutcome, ClientError> {
    let wait = timeout(read_timeout, async {
        loop {
            if let Some((head, framing, consumed)) = response::try_parse_head(transport.buf(), method)? {
                transport.buf_mut().advance(consumed);
                if head.status().as_u16() == 100 {
                    return Ok::<ContinueOutcome, ClientError>(ContinueOutcome::Continue);
                }
                tracing::debug!(status = head.status().as_u16(), "peer preempted 100-continue with a final response");
                return Ok(ContinueOutcome::Preempted { head, framing });
            }
            if transport.fill_more(read_timeout).await? == 0 {
                return Err(ClientError::TransportClosed);
            }
        }
    })
    .await;

    match wait {
        Ok(result) => result,
        Err(_) => {
            tracing::debug!("no 100-continue within timeout, writing body unconditionally");
            Ok(ContinueOutcome::Continue)
        }
    }
}

async fn write_body(
    transport: &mut crate::transport::TcpTransport,
    body: &mut Content,
) -> Result<(), ClientError> {
    match body {
        Content::Empty => Ok(()),
        Content::Buffer(bytes) => {
            transport.write_all(bytes).await?;
            // Written in full; release the buffer rather than let it ride
            // until the whole `RequestConfig` drops.
            body.discard();
            Ok(())
        }
        Content::StreamKnown { length, source } => {
            write_known_stream(transport, *length, source.as_mut()).await
        }
        Content::StreamUnknown(source) => write_chunked_stream(transport, source.as_mut()).await,
    }
}

async fn write_known_stream(
    transport: &mut crate::transport::TcpTransport,
    length: usize,
    source: &mut dyn crate::content::BodySource,
) -> Result<(), ClientError> {
    let mut sent = 0usize;
    while sent < length {
        match source.next().await? {
            Some(bytes) => {
                let take = bytes.len().min(length - sent);
                transport.write_all(&bytes[..take]).await?;
                sent += take;
            }
            None => {
                return Err(ClientError::IncompleteBody {
                    expected: length,
                    sent,
                })
            }
        }
    }
    Ok(())
}

async fn write_chunked_stream(
    transport: &mut crate::transport::TcpTransport,
    source: &mut dyn crate::content::BodySource,
) -> Result<(), ClientError> {
    while let Some(bytes) = source.next().await? {
        if bytes.is_empty() {
            continue;
        }
        let header = format!("{:x}\r\n", bytes.len());
        transport.write_all(header.as_bytes()).await?;
        transport.write_all(&bytes).await?;
        transport.write_all(b"\r\n").await?;
    }
    transport.write_all(b"0\r\n\r\n").await
}

/// Reads until a full status line and header block are available, then
/// classifies body framing for the request method that produced it. Returns
/// whether the connection is structurally eligible for reuse (definite body
/// framing), independent of `Connection`/keep-alive headers which are
/// checked afterward.
async fn await_head(
    transport: &mut crate::transport::TcpTransport,
    method: &Method,
    read_timeout: std::time::Duration,
) -> Result<(ResponseHead, crate::wire::Framing, bool), ClientError> {
    loop {
        if let Some((head, framing, consumed)) = response::try_parse_head(transport.buf(), method)? {
            transport.buf_mut().advance(consumed);
            let reusable = !matches!(framing, crate::wire::Framing::UntilClose);
            return Ok((head, framing, reusable));
        }
        if transport.fill_more(read_timeout).await? == 0 {
            return Err(ClientError::TransportClosed);
        }
    }
}
