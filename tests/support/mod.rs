//! Shared fixture plumbing for the end-to-end tests: a bare-bones
//! in-process TCP server good enough to drive the scenarios in the
//! spec's testable-properties section without pulling in a second HTTP
//! implementation to act as the peer.
//!
//! Deliberately minimal: just enough request parsing to find the method,
//! path, and (if present) a `Content-Length`-framed body, and raw byte
//! writes for responses so each test controls its framing precisely.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Once;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

static TRACING_INIT: Once = Once::new();

/// Installs a `tracing_subscriber` console subscriber the first time any
/// fixture test in this binary calls it, so a failing scenario's
/// `debug!`/`trace!` output (connection lifecycle, body framing decisions)
/// is visible under `RUST_LOG` instead of silently discarded. Idempotent
/// across the many `#[tokio::test]` functions sharing one test binary.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "conduit_http=debug".into()),
            )
            .with_test_writer()
            .init();
    });
}

/// Starts a one-shot fixture listener and runs `handler` against the first
/// accepted connection on a spawned task. Returns the bound address before
/// the connection is accepted, so the caller can issue a request against it
/// immediately.
pub async fn spawn<F, Fut>(handler: F) -> SocketAddr
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fixture listener");
    let addr = listener.local_addr().expect("fixture local addr");
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept fixture connection");
        handler(stream).await;
    });
    addr
}

/// Like [`spawn`], but also returns the fixture task's `JoinHandle` so a
/// test that makes assertions inside the handler (rather than purely by
/// observing client-side behavior) can await it and have those assertions'
/// panics actually fail the test.
pub async fn spawn_joined<F, Fut>(handler: F) -> (SocketAddr, tokio::task::JoinHandle<()>)
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fixture listener");
    let addr = listener.local_addr().expect("fixture local addr");
    let join = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept fixture connection");
        handler(stream).await;
    });
    (addr, join)
}

/// Builds a request URI against a fixture's bound address.
pub fn uri(addr: SocketAddr, path: &str) -> http::Uri {
    format!("http://{addr}{path}")
        .parse()
        .expect("valid fixture uri")
}

/// One parsed inbound request: method, path, and body (already trimmed to
/// its declared `Content-Length`, or empty if absent).
pub struct ReceivedRequest {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

/// Reads one HTTP/1.1 request off `stream`: the status line, headers up to
/// the blank line, and (if `Content-Length` is present) exactly that many
/// body bytes.
pub async fn read_request(stream: &mut TcpStream) -> ReceivedRequest {
    let mut buf = Vec::new();
    let mut scratch = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut scratch).await.expect("read request head");
        assert!(n > 0, "peer closed before a full request head arrived");
        buf.extend_from_slice(&scratch[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split(' ');
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let content_length: usize = lines
        .clone()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut scratch).await.expect("read request body");
        assert!(n > 0, "peer closed before the declared body arrived");
        body.extend_from_slice(&scratch[..n]);
    }
    body.truncate(content_length);

    ReceivedRequest { method, path, body }
}

/// Writes a status line, headers, and body verbatim — no framing decisions
/// made on the fixture's behalf, so each test controls exactly what the
/// client sees on the wire.
pub async fn write_response(
    stream: &mut TcpStream,
    status_line: &str,
    headers: &[(&str, &str)],
    body: &[u8],
) {
    let mut out = format!("{status_line}\r\n");
    for (name, value) in headers {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }
    out.push_str("\r\n");
    stream
        .write_all(out.as_bytes())
        .await
        .expect("write response head");
    if !body.is_empty() {
        stream.write_all(body).await.expect("write response body");
    }
}

/// Writes just a status line and headers, no blank-line-terminated body —
/// used by tests that need to stall mid-response.
pub async fn write_head_only(stream: &mut TcpStream, status_line: &str, headers: &[(&str, &str)]) {
    write_response(stream, status_line, headers, &[]).await;
}

/// Writes one `Transfer-Encoding: chunked` data chunk (size line, payload,
/// trailing CRLF).
pub async fn write_chunk(stream: &mut TcpStream, payload: &[u8]) {
    let header = format!("{:x}\r\n", payload.len());
    stream
        .write_all(header.as_bytes())
        .await
        .expect("write chunk size line");
    stream.write_all(payload).await.expect("write chunk payload");
    stream
        .write_all(b"\r\n")
        .await
        .expect("write chunk trailing crlf");
}

/// Writes the terminal zero-length chunk and an empty trailer section.
pub async fn write_chunked_end(stream: &mut TcpStream) {
    stream
        .write_all(b"0\r\n\r\n")
        .await
        .expect("write terminal chunk");
}

/// Head-only view of an inbound request: method, path, and declared
/// `Content-Length` (`0` if absent) — deliberately stops before reading any
/// body bytes, for fixtures that must react to the request line before
/// deciding whether the peer ever sends a body, such as `Expect:
/// 100-continue` negotiation.
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub content_length: usize,
}

/// Reads one HTTP/1.1 request's status line and headers, stopping at the
/// blank line. Returns the parsed head plus any body bytes that had already
/// arrived in the same read, for the caller to prepend to a subsequent
/// [`read_body_bytes`] call.
pub async fn read_request_head(stream: &mut TcpStream) -> (RequestHead, Vec<u8>) {
    let mut buf = Vec::new();
    let mut scratch = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut scratch).await.expect("read request head");
        assert!(n > 0, "peer closed before a full request head arrived");
        buf.extend_from_slice(&scratch[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split(' ');
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let content_length: usize = lines
        .clone()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    (
        RequestHead {
            method,
            path,
            content_length,
        },
        buf[header_end..].to_vec(),
    )
}

/// Reads exactly `len` total body bytes, treating `leftover` (already read
/// alongside the head) as the first bytes.
pub async fn read_body_bytes(stream: &mut TcpStream, leftover: Vec<u8>, len: usize) -> Vec<u8> {
    let mut body = leftover;
    let mut scratch = [0u8; 4096];
    while body.len() < len {
        let n = stream.read(&mut scratch).await.expect("read request body");
        assert!(n > 0, "peer closed before the declared body arrived");
        body.extend_from_slice(&scratch[..n]);
    }
    body.truncate(len);
    body
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
