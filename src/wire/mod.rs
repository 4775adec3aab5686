//! HTTP/1.x wire parsing for responses.
//!
//! Grounded in the scanning idiom of a sibling server's request parser
//! (`memchr` over the accumulated buffer, incremental "not enough bytes yet"
//! returns) but producing owned [`http`](http) crate types instead of
//! `'static`-lifetime-extended slices: a response buffer is filled
//! incrementally across possibly-many socket reads and handed off to a
//! subscriber across task boundaries, so nothing here can borrow from a
//! buffer the caller still owns.

pub(crate) mod chunked;
pub(crate) mod head;

pub(crate) use chunked::{ChunkedDecoder, DecodeOutcome};
pub(crate) use head::{parse_head, Framing, ParsedHead};
