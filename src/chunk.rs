//! Reference-counted byte chunks that cross component boundaries.
//!
//! A [`ByteChunk`] wraps a [`bytes::Bytes`] region read off the wire. Unlike a
//! plain `Bytes` clone, release is tracked explicitly: every chunk handed to a
//! subscriber carries a release hook the subscriber is told to invoke on
//! cancellation, rather than relying solely on scope-based `Drop`. That is
//! what lets the streaming handler (`response.rs`) account for "did this
//! chunk get released" even when ownership has crossed a channel into task
//! the handler does not control.

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Inner {
    bytes: Bytes,
    released: AtomicBool,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Release accounting is bookkeeping, not a safety requirement — the
        // `Bytes` region is freed regardless. A chunk dropped without ever
        // calling `release()` still means some path (a redirect drain, a
        // disposal sweep, a cancelled sink) forgot to account for it, so
        // it's worth a trace line to catch during development.
        if !self.bytes.is_empty() && !self.released.load(Ordering::Acquire) {
            tracing::trace!("byte chunk dropped without an explicit release()");
        }
    }
}

/// An immutable view over a reference-counted region of inbound bytes.
///
/// Cloning a `ByteChunk` is cheap (it clones the underlying `Arc` and the
/// `Bytes` refcount beneath it) but does not duplicate ownership for release
/// accounting purposes: [`release`](ByteChunk::release) is idempotent and
/// only the first call on any clone actually runs teardown.
#[derive(Debug, Clone)]
pub struct ByteChunk {
    inner: Arc<Inner>,
}

impl ByteChunk {
    /// Wraps a region of bytes as a fresh, unreleased chunk.
    pub fn new(bytes: Bytes) -> Self {
        Self {
            inner: Arc::new(Inner {
                bytes,
                released: AtomicBool::new(false),
            }),
        }
    }

    /// An empty chunk, used internally to signal "no bytes, but also not the
    /// terminal marker" in places that need a concrete value.
    pub fn empty() -> Self {
        Self::new(Bytes::new())
    }

    /// Borrowed view of the bytes. Valid regardless of release state — release
    /// governs accounting, not memory safety, since the backing `Bytes` is
    /// retained until every clone (and the `Arc`) drops.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.inner.bytes
    }

    /// Number of bytes carried by this chunk.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.bytes.len()
    }

    /// Whether this chunk carries no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.bytes.is_empty()
    }

    /// A cheap clone of the underlying `Bytes`, for handing to code that does
    /// not need the release-accounting wrapper (e.g. assembling a buffered
    /// response body).
    #[inline]
    pub fn to_bytes(&self) -> Bytes {
        self.inner.bytes.clone()
    }

    /// Marks this chunk released. Idempotent: calling it any number of times,
    /// from any clone, only has an effect once. Returns `true` if this call
    /// was the one that performed the release.
    pub fn release(&self) -> bool {
        !self.inner.released.swap(true, Ordering::AcqRel)
    }

    /// Whether [`release`](Self::release) has fired on any clone of this chunk.
    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }
}
