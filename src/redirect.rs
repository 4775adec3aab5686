//! Redirect controller: decides, for a 3xx response,
//! where the next hop goes and how the method/body carry forward.

use crate::config::{RequestBuilder, RequestConfig};
use crate::content::Content;
use crate::error::ClientError;
use crate::response::ResponseHead;
use http::{Method, StatusCode, Uri};

/// What the redirect controller decided to do with a 3xx response that is
/// still within the hop bound.
pub(crate) enum NextOutcome {
    /// The caller's decision function (or the absence of one) approved
    /// following the redirect; here is the config for the next hop.
    Follow(RequestConfig),
    /// The caller's decision function returned `None`: redirect chasing is
    /// aborted and `config` (handed back unconsumed) should be delivered to
    /// the caller as the final response instead.
    Abort(RequestConfig),
}

/// Decides the next hop after `head` (already confirmed to be a redirect
/// status, with hops remaining, by the caller). Consults the caller's
/// `on_redirect` decision function, if any, before touching `config`'s body —
/// so an aborted redirect hands back an untouched config whose body has not
/// been replayed or discarded.
pub(crate) fn next_request(
    config: RequestConfig,
    head: &ResponseHead,
) -> Result<NextOutcome, ClientError> {
    let location = head
        .headers()
        .get(http::header::LOCATION)
        .ok_or_else(|| ClientError::BadRedirect("missing Location header".into()))?
        .to_str()
        .map_err(|_| ClientError::BadRedirect("Location is not valid UTF-8".into()))?;
    let uri = resolve_location(config.uri(), location)?;

    let configurator = match &config.on_redirect {
        Some(decision) => {
            let synthetic = head.to_http_response();
            match decision(&synthetic) {
                Some(configurator) => Some(configurator),
                None => return Ok(NextOutcome::Abort(config)),
            }
        }
        None => None,
    };

    let RequestConfig {
        method,
        headers,
        body,
        connect_timeout,
        read_timeout,
        max_content_length,
        response_max_chunk_size,
        max_redirects,
        decompress_response,
        tls_config,
        tls_params,
        on_redirect,
        ..
    } = config;

    let (method, body) = downgrade(head.status(), &method, body)?;

    let mut builder = RequestBuilder::from_config(RequestConfig {
        uri,
        method,
        headers,
        body,
        connect_timeout,
        read_timeout,
        max_content_length,
        response_max_chunk_size,
        max_redirects,
        decompress_response,
        tls_config,
        tls_params,
        on_redirect,
    });

    if let Some(configurator) = configurator {
        configurator(&mut builder);
    }

    builder.build().map(NextOutcome::Follow)
}

/// Resolves a `Location` header value against the URI it was received in
/// response to, per RFC 3986 §4.2: absolute URIs pass through unchanged,
/// everything else (scheme-relative, absolute-path, or plain relative) is
/// merged against the base.
fn resolve_location(base: &Uri, location: &str) -> Result<Uri, ClientError> {
    if let Ok(absolute) = location.parse::<Uri>() {
        if absolute.scheme().is_some() {
            return Ok(absolute);
        }
    }

    let mut parts = http::uri::Parts::default();
    parts.scheme = base.scheme().cloned();

    if let Some(rest) = location.strip_prefix("//") {
        // Scheme-relative: `//host/path` borrows the base's scheme only.
        let reconstructed = format!("{}://{}", base.scheme_str().unwrap_or("http"), rest);
        return reconstructed
            .parse()
            .map_err(|e| ClientError::BadRedirect(format!("{e}")));
    }

    parts.authority = base.authority().cloned();
    parts.path_and_query = Some(if location.starts_with('/') {
        location
            .parse()
            .map_err(|e| ClientError::BadRedirect(format!("{e}")))?
    } else {
        merge_relative(base, location)?
    });

    Uri::from_parts(parts).map_err(|e| ClientError::BadRedirect(e.to_string()))
}

fn merge_relative(base: &Uri, location: &str) -> Result<http::uri::PathAndQuery, ClientError> {
    let base_path = base.path();
    let last_slash = base_path.rfind('/').map(|i| i + 1).unwrap_or(0);
    let merged = format!("{}{}", &base_path[..last_slash], location);
    merged
        .parse()
        .map_err(|e| ClientError::BadRedirect(format!("{e}")))
}

/// Method/body carry-forward rules for each redirecting status.
///
/// 303 always downgrades to GET with no body. 301/302 downgrade any non-GET/
/// HEAD method to GET with no body, matching the behavior most HTTP clients
/// settled on in practice over the letter of the original RFC (which allowed
/// the method to be preserved); see `DESIGN.md` for the rationale. 307/308
/// preserve both method and body: a buffered body carries forward by
/// construction, a streamed body is restarted via [`BodySource::restart`],
/// failing with [`ClientError::Protocol`] if the source refuses a second
/// pass.
fn downgrade(
    status: StatusCode,
    method: &Method,
    mut body: Content,
) -> Result<(Method, Content), ClientError> {
    match status {
        StatusCode::SEE_OTHER => {
            body.discard();
            Ok((Method::GET, Content::Empty))
        }
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND
            if *method != Method::GET && *method != Method::HEAD =>
        {
            body.discard();
            Ok((Method::GET, Content::Empty))
        }
        _ => {
            match &mut body {
                Content::StreamKnown { source, .. } => source.restart()?,
                Content::StreamUnknown(source) => source.restart()?,
                Content::Empty | Content::Buffer(_) => {}
            }
            Ok((method.clone(), body))
        }
    }
}
