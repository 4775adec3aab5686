//! The transport adapter contract and its one concrete,
//! shipped implementation: a plain or TLS-wrapped TCP socket plus a minimal
//! connection pool.
//!
//! Everything above this module (the action and response layers) only ever
//! calls [`TcpTransport::fill_more`] — never reads the socket on its own — so
//! that the "read only on demand" rule lives in one place. `set_auto_read`
//! exists so callers can record which phase they are in (the continuous
//! read-until-head phase, versus pull-driven streaming) for diagnostics and
//! tests; the backpressure guarantee itself is enforced by the response
//! handler choosing *when* to call `fill_more`, not by the transport
//! refusing calls.

use crate::config::TlsParamsCustomizer;
use crate::defaults::PoolLimits;
use crate::error::ClientError;
use bytes::{Buf, BytesMut};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};

/// Identifies a pool slot: same scheme, host, port, and TLS identity share a
/// connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct TransportKey {
    pub(crate) tls: bool,
    pub(crate) host: String,
    pub(crate) port: u16,
}

enum Socket {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Socket {
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Socket::Plain(s) => s.read(buf).await,
            Socket::Tls(s) => s.read(buf).await,
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Socket::Plain(s) => s.write_all(buf).await,
            Socket::Tls(s) => s.write_all(buf).await,
        }
    }

    async fn shutdown(&mut self) -> std::io::Result<()> {
        match self {
            Socket::Plain(s) => s.shutdown().await,
            Socket::Tls(s) => s.shutdown().await,
        }
    }
}

/// One leased connection. Holds whatever bytes have been read off the wire
/// but not yet consumed by the parser — across both the continuous
/// read-until-head phase and the subsequent pull-driven body phase.
pub(crate) struct TcpTransport {
    key: TransportKey,
    socket: Socket,
    buf: BytesMut,
    auto_read: bool,
    reusable: bool,
}

impl TcpTransport {
    async fn connect(
        key: TransportKey,
        tls_config: Option<Arc<rustls::ClientConfig>>,
        tls_params: Option<TlsParamsCustomizer>,
        connect_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let addr = (key.host.as_str(), key.port);
        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::ConnectTimeout)??;
        let _ = stream.set_nodelay(true);

        let socket = if key.tls {
            let config = tls_config.ok_or_else(|| {
                ClientError::Tls("https target requires a ClientConfig".into())
            })?;
            let config = match tls_params {
                Some(customize) => {
                    let mut config = (*config).clone();
                    customize(&mut config);
                    Arc::new(config)
                }
                None => config,
            };
            let connector = TlsConnector::from(config);
            let server_name = rustls::pki_types::ServerName::try_from(key.host.clone())
                .map_err(|e| ClientError::Tls(e.to_string()))?;
            let tls_stream = timeout(connect_timeout, connector.connect(server_name, stream))
                .await
                .map_err(|_| ClientError::ConnectTimeout)?
                .map_err(|e| ClientError::Tls(e.to_string()))?;
            Socket::Tls(Box::new(tls_stream))
        } else {
            Socket::Plain(stream)
        };

        debug!(host = %key.host, port = key.port, tls = key.tls, "connected");

        Ok(Self {
            key,
            socket,
            buf: BytesMut::with_capacity(8 * 1024),
            auto_read: true,
            reusable: true,
        })
    }

    pub(crate) fn set_auto_read(&mut self, enabled: bool) {
        self.auto_read = enabled;
    }

    pub(crate) fn buf(&self) -> &BytesMut {
        &self.buf
    }

    pub(crate) fn buf_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Performs exactly one read from the socket (subject to `read_timeout`),
    /// appending whatever arrived to the internal buffer. Returns the number
    /// of bytes read; `0` means the peer closed the connection.
    pub(crate) async fn fill_more(&mut self, read_timeout: Duration) -> Result<usize, ClientError> {
        let mut scratch = [0u8; 8 * 1024];
        let n = timeout(read_timeout, self.socket.read(&mut scratch))
            .await
            .map_err(|_| ClientError::ReadTimeout)??;
        if n > 0 {
            self.buf.extend_from_slice(&scratch[..n]);
            trace!(bytes = n, "read from socket");
        }
        Ok(n)
    }

    pub(crate) async fn write_all(&mut self, buf: &[u8]) -> Result<(), ClientError> {
        self.socket.write_all(buf).await.map_err(ClientError::from)
    }

    /// Marks this connection as unfit to return to the pool (e.g. `Connection: close`,
    /// or a body that could not be framed to a definite end).
    pub(crate) fn mark_not_reusable(&mut self) {
        self.reusable = false;
    }

    pub(crate) fn is_reusable(&self) -> bool {
        self.reusable && self.buf.is_empty()
    }

    /// Closes the underlying socket. Per the disposal contract, a failure
    /// here is a secondary failure: the caller attaches it as a suppressed
    /// cause on whatever primary error triggered the force-dispose, if any.
    pub(crate) async fn close(mut self) -> Result<(), ClientError> {
        self.socket.shutdown().await.map_err(ClientError::from)
    }
}

/// A small, intentionally unsophisticated connection pool keyed by
/// `(scheme, host, port)`. Sizing and eviction policy beyond a bounded idle
/// list per key are out of scope — this is the shipped contract
/// implementation, not a general-purpose pool.
pub(crate) struct Pool {
    idle: Mutex<HashMap<TransportKey, Vec<TcpTransport>>>,
    limits: PoolLimits,
}

impl Pool {
    pub(crate) fn new(limits: PoolLimits) -> Self {
        Self {
            idle: Mutex::new(HashMap::new()),
            limits,
        }
    }

    pub(crate) async fn acquire(
        &self,
        key: TransportKey,
        tls_config: Option<Arc<rustls::ClientConfig>>,
        tls_params: Option<TlsParamsCustomizer>,
        connect_timeout: Duration,
    ) -> Result<TcpTransport, ClientError> {
        let leased = {
            let mut idle = self.idle.lock().expect("pool mutex poisoned");
            idle.get_mut(&key).and_then(|list| list.pop())
        };
        if let Some(mut transport) = leased {
            transport.auto_read = true;
            trace!(host = %key.host, port = key.port, "reused pooled connection");
            return Ok(transport);
        }
        TcpTransport::connect(key, tls_config, tls_params, connect_timeout).await
    }

    /// Returns a transport to the idle pool if it is keep-alive eligible and
    /// the per-host idle cap has not been reached; otherwise closes it.
    pub(crate) async fn release(&self, transport: TcpTransport) {
        if !transport.is_reusable() {
            if let Err(err) = transport.close().await {
                trace!(%err, "error closing non-reusable connection");
            }
            return;
        }

        let key = transport.key.clone();
        let rejected = {
            let mut idle = self.idle.lock().expect("pool mutex poisoned");
            let list = idle.entry(key).or_default();
            if list.len() >= self.limits.max_idle_per_host {
                Some(transport)
            } else {
                list.push(transport);
                None
            }
        };
        if let Some(transport) = rejected {
            if let Err(err) = transport.close().await {
                trace!(%err, "error closing evicted idle connection");
            }
        }
    }
}
