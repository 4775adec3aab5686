//! The public entry point: [`Client`] and its builder.

use crate::action;
use crate::config::RequestBuilder;
use crate::defaults::{ClientDefaults, PoolLimits};
use crate::error::DecoratedError;
use crate::response::StreamedResponse;
use crate::transport::Pool;
use http::{Method, Uri};
use std::sync::Arc;

struct Inner {
    pool: Arc<Pool>,
    defaults: ClientDefaults,
    tls_config: Option<Arc<rustls::ClientConfig>>,
}

/// A handle to the request machinery: connection pool, defaults, and
/// optional shared TLS configuration. Cheap to clone (an `Arc` underneath),
/// the way a connection pool handle is expected to be shared across tasks.
///
/// # Example
///
/// ```no_run
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// use conduit_http::Client;
///
/// let client = Client::builder().build();
/// let uri = "http://example.invalid/".parse()?;
/// let response = client.get(uri).await?;
/// let received = response.collect().await?;
/// println!("{}", received.head().status());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Starts building a [`Client`] with its defaults.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Issues a request against `uri`, applying `configurator` to the
    /// builder seeded from this client's defaults, and drives it (including
    /// any redirects) to a [`StreamedResponse`].
    pub async fn request(
        &self,
        uri: Uri,
        configurator: impl FnOnce(&mut RequestBuilder),
    ) -> Result<StreamedResponse, DecoratedError> {
        let mut config = RequestBuilder::new(uri, &self.inner.defaults, configurator)?;
        if config.tls_config.is_none() {
            config.tls_config = self.inner.tls_config.clone();
        }
        action::execute(Arc::clone(&self.inner.pool), config).await
    }

    /// Convenience wrapper for a bodyless `GET`.
    pub async fn get(&self, uri: Uri) -> Result<StreamedResponse, DecoratedError> {
        self.request(uri, |_| {}).await
    }

    /// Convenience wrapper for a `POST` with a buffered body.
    pub async fn post(
        &self,
        uri: Uri,
        body: impl Into<bytes::Bytes>,
    ) -> Result<StreamedResponse, DecoratedError> {
        let body = body.into();
        self.request(uri, move |b| {
            b.method(Method::POST).bytes(body.clone());
        })
        .await
    }
}

/// Configures and constructs a [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    defaults: ClientDefaults,
    pool_limits: PoolLimits,
    tls_config: Option<Arc<rustls::ClientConfig>>,
}

impl ClientBuilder {
    /// Overrides the per-request defaults every built `Client` seeds new
    /// requests from.
    pub fn client_defaults(mut self, defaults: ClientDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Overrides the connection pool's sizing knobs.
    pub fn pool_limits(mut self, limits: PoolLimits) -> Self {
        self.pool_limits = limits;
        self
    }

    /// Supplies a shared `rustls` client configuration used for `https`
    /// targets that don't set their own via `RequestBuilder::tls_config`.
    pub fn tls_config(mut self, config: Arc<rustls::ClientConfig>) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Builds the [`Client`].
    pub fn build(self) -> Client {
        Client {
            inner: Arc::new(Inner {
                pool: Arc::new(Pool::new(self.pool_limits)),
                defaults: self.defaults,
                tls_config: self.tls_config,
            }),
        }
    }
}
