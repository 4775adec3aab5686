//! The one policy point this crate owns for compressed responses: deciding
//! *whether* to decompress, and wiring the matching codec in. The codecs
//! themselves are `async-compression`'s — nothing here reimplements gzip,
//! zlib, or brotli.
//!
//! Bytes arrive one already-framed (by content-length or chunk boundary)
//! piece at a time from the body driver. Rather than bridge that into an
//! `AsyncRead` for `async-compression`'s read-side adapters, this stage uses
//! its *write*-side decoders: each piece is pushed in with `write_all`, and
//! whatever the codec produces is drained out of an in-memory sink. Since the
//! sink is a plain growable buffer, no poll ever actually needs to return
//! `Pending` — decompression completes synchronously within the `.await`.

use crate::error::ClientError;
use async_compression::tokio::write::{BrotliDecoder, GzipDecoder, ZlibDecoder};
use bytes::Bytes;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// An in-memory [`AsyncWrite`] sink. `poll_write` only ever appends to a
/// `Vec`, so it is always ready — there is no underlying I/O to wait on.
#[derive(Default)]
struct VecSink(Vec<u8>);

impl AsyncWrite for VecSink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.get_mut().0.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// The active decompression codec for a response, selected from its
/// `Content-Encoding`, or the identity pass-through if none applies.
pub(crate) enum DecompressStage {
    Identity,
    Gzip(GzipDecoder<VecSink>),
    /// HTTP's `deflate` token is, in near-universal practice, zlib-wrapped
    /// deflate rather than a raw deflate stream — `ZlibDecoder` matches what
    /// real servers actually send.
    Deflate(ZlibDecoder<VecSink>),
    Brotli(BrotliDecoder<VecSink>),
}

impl DecompressStage {
    /// Selects a stage for the given `Content-Encoding` header value.
    /// Unrecognized or absent encodings pass bytes through unchanged.
    pub(crate) fn for_content_encoding(encoding: Option<&str>) -> Self {
        match encoding.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("gzip") | Some("x-gzip") => Self::Gzip(GzipDecoder::new(VecSink::default())),
            Some("deflate") => Self::Deflate(ZlibDecoder::new(VecSink::default())),
            Some("br") => Self::Brotli(BrotliDecoder::new(VecSink::default())),
            _ => Self::Identity,
        }
    }

    /// Feeds one piece of (possibly compressed) wire bytes and returns
    /// whatever decoded bytes the codec produced from it.
    pub(crate) async fn push(&mut self, piece: &[u8]) -> Result<Bytes, ClientError> {
        match self {
            Self::Identity => Ok(Bytes::copy_from_slice(piece)),
            Self::Gzip(d) => {
                d.write_all(piece).await.map_err(ClientError::from)?;
                d.flush().await.map_err(ClientError::from)?;
                Ok(Bytes::from(std::mem::take(&mut d.get_mut().0)))
            }
            Self::Deflate(d) => {
                d.write_all(piece).await.map_err(ClientError::from)?;
                d.flush().await.map_err(ClientError::from)?;
                Ok(Bytes::from(std::mem::take(&mut d.get_mut().0)))
            }
            Self::Brotli(d) => {
                d.write_all(piece).await.map_err(ClientError::from)?;
                d.flush().await.map_err(ClientError::from)?;
                Ok(Bytes::from(std::mem::take(&mut d.get_mut().0)))
            }
        }
    }

    /// Finalizes the codec (writes any trailer) and returns the last bytes
    /// it produces. Called once the raw body is fully drained.
    pub(crate) async fn finish(&mut self) -> Result<Bytes, ClientError> {
        match self {
            Self::Identity => Ok(Bytes::new()),
            Self::Gzip(d) => {
                d.shutdown().await.map_err(ClientError::from)?;
                Ok(Bytes::from(std::mem::take(&mut d.get_mut().0)))
            }
            Self::Deflate(d) => {
                d.shutdown().await.map_err(ClientError::from)?;
                Ok(Bytes::from(std::mem::take(&mut d.get_mut().0)))
            }
            Self::Brotli(d) => {
                d.shutdown().await.map_err(ClientError::from)?;
                Ok(Bytes::from(std::mem::take(&mut d.get_mut().0)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identity_stage_is_a_passthrough() {
        let mut stage = DecompressStage::for_content_encoding(None);
        let out = stage.push(b"hello").await.unwrap();
        assert_eq!(&out[..], b"hello");
    }

    #[tokio::test]
    async fn unrecognized_encoding_falls_back_to_identity() {
        let mut stage = DecompressStage::for_content_encoding(Some("identity"));
        let out = stage.push(b"hello").await.unwrap();
        assert_eq!(&out[..], b"hello");
    }
}
