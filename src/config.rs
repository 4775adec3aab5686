//! Per-request configuration: the immutable snapshot [`crate::action::execute`]
//! acts on, and the mutable builder a caller-supplied configurator mutates to
//! produce it.

use crate::content::Content;
use crate::defaults::ClientDefaults;
use crate::error::ClientError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use std::sync::Arc;
use std::time::Duration;

/// A function the caller may supply to decide whether, and how, to follow a
/// redirect. Returning `None` aborts redirect chasing and surfaces the
/// response that triggered the call; returning `Some(configurator)` composes
/// the configurator onto the next request.
pub type RedirectDecision =
    Arc<dyn Fn(&http::response::Response<()>) -> Option<RequestConfigurator> + Send + Sync>;

/// A caller-supplied function that mutates a [`RequestBuilder`].
pub type RequestConfigurator = Arc<dyn Fn(&mut RequestBuilder) + Send + Sync>;

/// Immutable, fully-validated request configuration. Produced by
/// [`RequestBuilder::build`]; consumed by the action layer.
pub struct RequestConfig {
    pub(crate) uri: Uri,
    pub(crate) method: Method,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Content,
    pub(crate) connect_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) max_content_length: i64,
    pub(crate) response_max_chunk_size: usize,
    pub(crate) max_redirects: usize,
    pub(crate) decompress_response: bool,
    pub(crate) tls_config: Option<Arc<rustls::ClientConfig>>,
    pub(crate) tls_params: Option<TlsParamsCustomizer>,
    pub(crate) on_redirect: Option<RedirectDecision>,
}

impl RequestConfig {
    pub(crate) fn uri(&self) -> &Uri {
        &self.uri
    }
}

/// A function the caller may supply to tweak a cloned `rustls::ClientConfig`
/// before it is used to negotiate TLS for this request.
pub type TlsParamsCustomizer = Arc<dyn Fn(&mut rustls::ClientConfig) + Send + Sync>;

/// Mutable builder seeded from [`ClientDefaults`], mutated by a caller's
/// configurator closure, then validated into a [`RequestConfig`].
///
/// # Example
///
/// ```
/// use conduit_http::config::RequestBuilder;
/// use conduit_http::defaults::ClientDefaults;
/// use http::Method;
///
/// let uri = "http://example.invalid/widgets".parse().unwrap();
/// let config = RequestBuilder::new(uri, &ClientDefaults::default(), |b| {
///     b.method(Method::POST).text("hello", "UTF-8");
/// })
/// .unwrap();
/// ```
pub struct RequestBuilder {
    uri: Uri,
    method: Method,
    headers: HeaderMap,
    body: Content,
    connect_timeout: Duration,
    read_timeout: Duration,
    max_content_length: i64,
    response_max_chunk_size: usize,
    max_redirects: usize,
    decompress_response: bool,
    tls_config: Option<Arc<rustls::ClientConfig>>,
    tls_params: Option<TlsParamsCustomizer>,
    on_redirect: Option<RedirectDecision>,
}

impl RequestBuilder {
    fn seeded(uri: Uri, defaults: &ClientDefaults) -> Self {
        Self {
            uri,
            method: Method::GET,
            headers: HeaderMap::new(),
            body: Content::Empty,
            connect_timeout: defaults.connect_timeout,
            read_timeout: defaults.read_timeout,
            max_content_length: defaults.max_content_length,
            response_max_chunk_size: defaults.response_max_chunk_size,
            max_redirects: defaults.max_redirects,
            decompress_response: defaults.decompress_response,
            tls_config: None,
            tls_params: None,
            on_redirect: None,
        }
    }

    /// Re-seeds a builder from an already-built [`RequestConfig`], the way
    /// the redirect controller composes a caller's decision-function
    /// configurator onto a config it already derived (method/body downgrade,
    /// resolved URI) rather than starting over from client defaults.
    pub(crate) fn from_config(config: RequestConfig) -> Self {
        Self {
            uri: config.uri,
            method: config.method,
            headers: config.headers,
            body: config.body,
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
            max_content_length: config.max_content_length,
            response_max_chunk_size: config.response_max_chunk_size,
            max_redirects: config.max_redirects,
            decompress_response: config.decompress_response,
            tls_config: config.tls_config,
            tls_params: config.tls_params,
            on_redirect: config.on_redirect,
        }
    }

    /// Applies `defaults` then `configurator` to produce a validated
    /// [`RequestConfig`]. If the configurator leaves the builder in an
    /// invalid state, any body buffer already assigned is discarded before
    /// the error propagates — a body is never left half-owned on a failed
    /// build.
    pub fn new(
        uri: Uri,
        defaults: &ClientDefaults,
        configurator: impl FnOnce(&mut RequestBuilder),
    ) -> Result<RequestConfig, ClientError> {
        let mut builder = Self::seeded(uri, defaults);
        configurator(&mut builder);
        builder.build()
    }

    /// Sets the request method.
    pub fn method(&mut self, method: Method) -> &mut Self {
        self.method = method;
        self
    }

    /// Inserts a header, replacing any existing value under that name.
    pub fn header(&mut self, name: HeaderName, value: HeaderValue) -> &mut Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets `Authorization: Basic <base64(user:pass)>`, replacing any prior
    /// `Authorization` header. `user`/`pass` are encoded as ISO-8859-1 bytes
    /// before base64, per the original Basic scheme.
    pub fn basic_auth(&mut self, user: &str, pass: &str) -> &mut Self {
        // ISO-8859-1 maps code points 0..=0xFF to the identical byte value.
        // Encoding char-by-char (rather than truncating the UTF-8 byte
        // stream) keeps any Latin-1-representable credential correct instead
        // of mangling multi-byte UTF-8 sequences into the wrong octets; a
        // scalar outside that range has no ISO-8859-1 representation and is
        // truncated to its low byte, matching the common-client fallback.
        let raw: Vec<u8> = format!("{user}:{pass}")
            .chars()
            .map(|c| c as u32 as u8)
            .collect();
        let encoded = BASE64.encode(raw);
        let value = HeaderValue::from_str(&format!("Basic {encoded}"))
            .expect("base64 alphabet is valid header-value ASCII");
        self.headers.insert(http::header::AUTHORIZATION, value);
        self
    }

    /// Sets a buffered body from raw bytes. Replaces any previously set body,
    /// discarding it first.
    pub fn bytes(&mut self, bytes: impl Into<Bytes>) -> &mut Self {
        self.body.discard();
        self.body = Content::Buffer(bytes.into());
        self
    }

    /// Sets a buffered text body, applying `Content-Type: text/plain;charset=<charset>`
    /// only if no `Content-Type` header is already present.
    pub fn text(&mut self, text: impl Into<String>, charset: &str) -> &mut Self {
        self.bytes(Bytes::from(text.into()));
        if !self.headers.contains_key(http::header::CONTENT_TYPE) {
            let value = format!("text/plain;charset={charset}");
            if let Ok(header_value) = HeaderValue::from_str(&value) {
                self.headers.insert(http::header::CONTENT_TYPE, header_value);
            }
        }
        self
    }

    /// Sets a streamed body with a declared total length.
    pub fn stream_known(&mut self, length: usize, source: Box<dyn crate::content::BodySource>) -> &mut Self {
        self.body.discard();
        self.body = Content::StreamKnown { length, source };
        self
    }

    /// Sets a streamed body whose total length is not known ahead of time.
    pub fn stream_unknown(&mut self, source: Box<dyn crate::content::BodySource>) -> &mut Self {
        self.body.discard();
        self.body = Content::StreamUnknown(source);
        self
    }

    /// Overrides the connect timeout for this request.
    pub fn connect_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.connect_timeout = timeout;
        self
    }

    /// Overrides the read timeout for this request.
    pub fn read_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.read_timeout = timeout;
        self
    }

    /// Overrides the maximum buffered response length; `-1` for unbounded.
    pub fn max_content_length(&mut self, bytes: i64) -> &mut Self {
        self.max_content_length = bytes;
        self
    }

    /// Overrides the maximum chunk size delivered to a streaming subscriber.
    pub fn response_max_chunk_size(&mut self, bytes: usize) -> &mut Self {
        self.response_max_chunk_size = bytes;
        self
    }

    /// Overrides the redirect hop bound for this request.
    pub fn redirects(&mut self, max_redirects: usize) -> &mut Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Supplies a per-response redirect decision function.
    pub fn on_redirect(&mut self, decision: RedirectDecision) -> &mut Self {
        self.on_redirect = Some(decision);
        self
    }

    /// Supplies a shared TLS client configuration for `https` targets.
    pub fn tls_config(&mut self, config: Arc<rustls::ClientConfig>) -> &mut Self {
        self.tls_config = Some(config);
        self
    }

    /// Supplies a customizer applied to a clone of the TLS client
    /// configuration immediately before the handshake, for per-request
    /// tweaks (e.g. ALPN protocols) that don't belong on the shared config.
    pub fn tls_params(
        &mut self,
        customizer: impl Fn(&mut rustls::ClientConfig) + Send + Sync + 'static,
    ) -> &mut Self {
        self.tls_params = Some(Arc::new(customizer));
        self
    }

    pub(crate) fn build(self) -> Result<RequestConfig, ClientError> {
        if self.response_max_chunk_size == 0 {
            return Err(ClientError::Protocol(
                "response_max_chunk_size must be > 0".into(),
            ));
        }
        if let Content::StreamKnown { length, .. } = &self.body {
            if *length == 0 {
                return Err(ClientError::Protocol(
                    "stream_known length must be > 0".into(),
                ));
            }
        }

        Ok(RequestConfig {
            uri: self.uri,
            method: self.method,
            headers: self.headers,
            body: self.body,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            max_content_length: self.max_content_length,
            response_max_chunk_size: self.response_max_chunk_size,
            max_redirects: self.max_redirects,
            decompress_response: self.decompress_response,
            tls_config: self.tls_config,
            tls_params: self.tls_params,
            on_redirect: self.on_redirect,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_chunk_size() {
        let uri: Uri = "http://h/".parse().unwrap();
        let err = RequestBuilder::new(uri, &ClientDefaults::default(), |b| {
            b.response_max_chunk_size(0);
        })
        .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn basic_auth_sets_expected_header() {
        let uri: Uri = "http://h/".parse().unwrap();
        let config = RequestBuilder::new(uri, &ClientDefaults::default(), |b| {
            b.basic_auth("Aladdin", "open sesame");
        })
        .unwrap();
        let value = config.headers.get(http::header::AUTHORIZATION).unwrap();
        assert_eq!(value, "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==");
    }

    #[test]
    fn text_default_content_type_not_overridden() {
        let uri: Uri = "http://h/".parse().unwrap();
        let config = RequestBuilder::new(uri, &ClientDefaults::default(), |b| {
            b.header(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
            b.text("{}", "UTF-8");
        })
        .unwrap();
        assert_eq!(
            config.headers.get(http::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }
}
