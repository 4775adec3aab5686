use crate::error::ClientError;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Version};
use memchr::memchr;

/// A fully parsed status line plus headers.
pub(crate) struct ParsedHead {
    pub(crate) version: Version,
    pub(crate) status: StatusCode,
    pub(crate) reason: String,
    pub(crate) headers: HeaderMap,
}

/// How the response body is framed, once headers and the request method are
/// both known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Framing {
    /// No body is present at all (HEAD responses, 1xx, 204, 304).
    None,
    /// `Content-Length: N` — read exactly `N` bytes.
    ContentLength(usize),
    /// `Transfer-Encoding: chunked`.
    Chunked,
    /// Neither header present; body runs until the connection closes.
    UntilClose,
}

/// Attempts to parse a status line and header block from the front of `buf`.
///
/// Returns `Ok(None)` if `buf` does not yet contain a full header block (the
/// caller should read more bytes and try again) — mirroring the
/// "accumulate, then reparse" idiom used for request parsing on the server
/// side, just without the `'static` slice aliasing that approach relies on.
pub(crate) fn parse_head(buf: &[u8]) -> Result<Option<(ParsedHead, usize)>, ClientError> {
    let first_nl = match memchr(b'\n', buf) {
        Some(p) => p,
        None => return Ok(None),
    };
    let (version, status, reason) = parse_status_line(strip_cr(&buf[..first_nl]))?;

    let mut headers = HeaderMap::new();
    let mut pos = first_nl + 1;
    loop {
        let rel_nl = match memchr(b'\n', &buf[pos..]) {
            Some(p) => p,
            None => return Ok(None),
        };
        let line = strip_cr(&buf[pos..pos + rel_nl]);
        pos += rel_nl + 1;

        if line.is_empty() {
            break;
        }

        let (name, value) = parse_header_line(line)?;
        headers.append(name, value);
    }

    Ok(Some((
        ParsedHead {
            version,
            status,
            reason,
            headers,
        },
        pos,
    )))
}

#[inline]
fn strip_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

fn parse_status_line(line: &[u8]) -> Result<(Version, StatusCode, String), ClientError> {
    let mut parts = line.splitn(3, |&b| b == b' ');
    let version_bytes = parts
        .next()
        .ok_or_else(|| ClientError::Protocol("missing HTTP version".into()))?;
    let status_bytes = parts
        .next()
        .ok_or_else(|| ClientError::Protocol("missing status code".into()))?;
    let reason_bytes = parts.next().unwrap_or(b"");

    let version = match version_bytes {
        b"HTTP/1.1" => Version::HTTP_11,
        b"HTTP/1.0" => Version::HTTP_10,
        b"HTTP/0.9" => Version::HTTP_09,
        other => {
            return Err(ClientError::Protocol(format!(
                "unsupported HTTP version: {}",
                String::from_utf8_lossy(other)
            )))
        }
    };

    let status = std::str::from_utf8(status_bytes)
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .and_then(|n| StatusCode::from_u16(n).ok())
        .ok_or_else(|| ClientError::Protocol("invalid status code".into()))?;

    let reason = String::from_utf8_lossy(reason_bytes).into_owned();

    Ok((version, status, reason))
}

fn parse_header_line(line: &[u8]) -> Result<(HeaderName, HeaderValue), ClientError> {
    let colon = memchr(b':', line)
        .ok_or_else(|| ClientError::Protocol("header line missing ':'".into()))?;
    let name = HeaderName::from_bytes(&line[..colon])
        .map_err(|_| ClientError::Protocol("invalid header name".into()))?;

    let mut value_bytes = &line[colon + 1..];
    while let [b' ' | b'\t', rest @ ..] = value_bytes {
        value_bytes = rest;
    }
    let value = HeaderValue::from_bytes(value_bytes)
        .map_err(|_| ClientError::Protocol("invalid header value".into()))?;

    Ok((name, value))
}

/// Decides how the body following `head` is framed, given the request method
/// that produced this response (HEAD responses never carry a body even if
/// `Content-Length` is present).
pub(crate) fn framing_for(method: &Method, head: &ParsedHead) -> Result<Framing, ClientError> {
    let status = head.status.as_u16();
    if method == Method::HEAD
        || (100..200).contains(&status)
        || status == 204
        || status == 304
    {
        return Ok(Framing::None);
    }

    if head
        .headers
        .get(http::header::TRANSFER_ENCODING)
        .map(|v| v.as_bytes().eq_ignore_ascii_case(b"chunked"))
        .unwrap_or(false)
    {
        return Ok(Framing::Chunked);
    }

    if let Some(value) = head.headers.get(http::header::CONTENT_LENGTH) {
        let text = value
            .to_str()
            .map_err(|_| ClientError::Protocol("invalid Content-Length".into()))?;
        let len = text
            .parse::<usize>()
            .map_err(|_| ClientError::Protocol("invalid Content-Length".into()))?;
        return Ok(Framing::ContentLength(len));
    }

    Ok(Framing::UntilClose)
}

/// Strips `Content-Length` from an informational/204/304 head, per the
/// invariant that such responses never expose a length to the caller even
/// if the peer sent one.
pub(crate) fn strip_length_if_bodyless(head: &mut ParsedHead) {
    let status = head.status.as_u16();
    if (100..200).contains(&status) || status == 204 {
        head.headers.remove(http::header::CONTENT_LENGTH);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_head() {
        let buf = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nServer: x\r\n\r\nhello";
        let (head, consumed) = parse_head(buf).unwrap().unwrap();
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(head.reason, "OK");
        assert_eq!(consumed, buf.len() - 5);
        assert_eq!(
            framing_for(&Method::GET, &head).unwrap(),
            Framing::ContentLength(5)
        );
    }

    #[test]
    fn incomplete_head_requests_more_bytes() {
        let buf = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n";
        assert!(parse_head(buf).unwrap().is_none());
    }

    #[test]
    fn head_request_has_no_body_despite_content_length() {
        let buf = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n";
        let (head, _) = parse_head(buf).unwrap().unwrap();
        assert_eq!(framing_for(&Method::HEAD, &head).unwrap(), Framing::None);
    }

    #[test]
    fn chunked_takes_precedence_over_content_length() {
        let buf = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nContent-Length: 5\r\n\r\n";
        let (head, _) = parse_head(buf).unwrap().unwrap();
        assert_eq!(framing_for(&Method::GET, &head).unwrap(), Framing::Chunked);
    }
}
