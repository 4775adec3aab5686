use crate::error::ClientError;
use bytes::{Buf, Bytes, BytesMut};
use memchr::memchr;

/// Incremental decoder for `Transfer-Encoding: chunked` bodies.
///
/// Fed bytes as they arrive off the socket; each call to
/// [`decode`](ChunkedDecoder::decode) consumes whatever is available from the
/// front of `buf` and returns the next piece of progress. Emitting a chunk
/// payload as soon as any of it is available (rather than buffering a whole
/// wire chunk first) keeps chunk size decoupled from the `response_max_chunk_size`
/// the handler slices its own deliveries to.
pub(crate) struct ChunkedDecoder {
    state: State,
}

enum State {
    Size,
    Data(usize),
    DataCrlf,
    Trailer,
    Done,
}

/// Result of one decode attempt.
pub(crate) enum DecodeOutcome {
    /// `buf` does not yet contain enough bytes to make progress.
    NeedMore,
    /// A slice of body payload, already stripped of chunk-size lines and
    /// trailing CRLFs.
    Chunk(Bytes),
    /// The terminating zero-length chunk and any trailers were consumed.
    End,
}

impl ChunkedDecoder {
    pub(crate) fn new() -> Self {
        Self { state: State::Size }
    }

    pub(crate) fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    pub(crate) fn decode(&mut self, buf: &mut BytesMut) -> Result<DecodeOutcome, ClientError> {
        loop {
            match self.state {
                State::Size => {
                    let nl = match memchr(b'\n', buf) {
                        Some(p) => p,
                        None => return Ok(DecodeOutcome::NeedMore),
                    };
                    let line = strip_cr(&buf[..nl]);
                    let size_field = line.split(|&b| b == b';').next().unwrap_or(line);
                    let size = parse_hex_size(size_field)?;
                    buf.advance(nl + 1);

                    self.state = if size == 0 {
                        State::Trailer
                    } else {
                        State::Data(size)
                    };
                }
                State::Data(remaining) => {
                    if buf.is_empty() {
                        return Ok(DecodeOutcome::NeedMore);
                    }
                    let take = remaining.min(buf.len());
                    let chunk = buf.split_to(take).freeze();
                    let left = remaining - take;
                    self.state = if left == 0 {
                        State::DataCrlf
                    } else {
                        State::Data(left)
                    };
                    return Ok(DecodeOutcome::Chunk(chunk));
                }
                State::DataCrlf => {
                    if buf.len() < 2 {
                        return Ok(DecodeOutcome::NeedMore);
                    }
                    if &buf[..2] != b"\r\n" {
                        return Err(ClientError::Protocol(
                            "malformed chunk terminator".into(),
                        ));
                    }
                    buf.advance(2);
                    self.state = State::Size;
                }
                State::Trailer => {
                    let nl = match memchr(b'\n', buf) {
                        Some(p) => p,
                        None => return Ok(DecodeOutcome::NeedMore),
                    };
                    let line_is_empty = strip_cr(&buf[..nl]).is_empty();
                    buf.advance(nl + 1);
                    if line_is_empty {
                        self.state = State::Done;
                        return Ok(DecodeOutcome::End);
                    }
                    // Trailer headers are intentionally discarded; nothing in
                    // this crate's surface exposes them to the caller.
                }
                State::Done => return Ok(DecodeOutcome::End),
            }
        }
    }
}

#[inline]
fn strip_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

fn parse_hex_size(field: &[u8]) -> Result<usize, ClientError> {
    let text = std::str::from_utf8(field)
        .map_err(|_| ClientError::Protocol("invalid chunk size".into()))?
        .trim();
    usize::from_str_radix(text, 16).map_err(|_| ClientError::Protocol("invalid chunk size".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_two_chunks_then_end() {
        let mut buf = BytesMut::from(&b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let mut collected = Vec::new();
        loop {
            match decoder.decode(&mut buf).unwrap() {
                DecodeOutcome::NeedMore => panic!("unexpected need-more on a complete buffer"),
                DecodeOutcome::Chunk(c) => collected.extend_from_slice(&c),
                DecodeOutcome::End => break,
            }
        }
        assert_eq!(collected, b"Wikipedia");
        assert!(decoder.is_done());
    }

    #[test]
    fn needs_more_on_split_chunk_size_line() {
        let mut buf = BytesMut::from(&b"4\r\nWi"[..]);
        let mut decoder = ChunkedDecoder::new();
        match decoder.decode(&mut buf).unwrap() {
            DecodeOutcome::Chunk(c) => assert_eq!(&c[..], b"Wi"),
            _ => panic!("expected partial chunk payload"),
        }
        match decoder.decode(&mut buf).unwrap() {
            DecodeOutcome::NeedMore => {}
            _ => panic!("expected need-more"),
        }
    }
}
