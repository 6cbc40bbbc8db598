//! Streaming pass-through to the backend service.
//!
//! One attempt per request, no retries. The request body is handed to the
//! client as-is and the backend's body is relayed frame by frame, so neither
//! direction is ever buffered in full. Dropping the response (client gone)
//! drops the backend connection with it.

use std::io;
use std::time::Duration;

use axum::{
    body::Body,
    http::{
        HeaderMap, HeaderName, HeaderValue, Request, Response, Uri,
        header::{CONNECTION, CONTENT_LENGTH, HOST},
        uri::PathAndQuery,
    },
};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use log::{debug, error, warn};
use tokio_stream::StreamExt;

use super::ProxyError;

/// Default bound on waiting for a response head.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on silence between response body frames.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

pub type HttpClient = Client<HttpConnector, Body>;

/// Connection-scoped headers that never cross a proxy.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }

    let hop: Vec<HeaderName> = headers
        .keys()
        .filter(|name| is_hop_by_hop(name))
        .cloned()
        .collect();
    for name in hop {
        headers.remove(name);
    }
}

/// Forwards authenticated requests to a fixed backend.
#[derive(Clone)]
pub struct ProxyForwarder {
    client: HttpClient,
    base: Uri,
    timeout: Duration,
    idle_timeout: Duration,
}

impl ProxyForwarder {
    /// `base` must be an absolute `http` URI; any path it carries is
    /// prepended to every forwarded path.
    pub fn new(base: Uri, timeout: Duration, idle_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));
        connector.set_nodelay(true);

        // One attempt per request, even on a pooled connection that closed
        // before the request went out.
        let client = Client::builder(TokioExecutor::new())
            .retry_canceled_requests(false)
            .build(connector);

        Self {
            client,
            base,
            timeout,
            idle_timeout,
        }
    }

    pub fn base(&self) -> &Uri {
        &self.base
    }

    /// Backend URI for an inbound path and query.
    pub fn target_uri(&self, path: &str, query: Option<&str>) -> Result<Uri, ProxyError> {
        let prefix = self.base.path().trim_end_matches('/');

        let mut target = String::with_capacity(prefix.len() + path.len() + 1);
        target.push_str(prefix);
        if !path.starts_with('/') {
            target.push('/');
        }
        target.push_str(path);
        if let Some(query) = query {
            target.push('?');
            target.push_str(query);
        }

        let path_and_query: PathAndQuery = target
            .parse()
            .map_err(|e| ProxyError::Internal(format!("invalid target path {target}: {e}")))?;

        let mut parts = self.base.clone().into_parts();
        parts.path_and_query = Some(path_and_query);
        Uri::from_parts(parts).map_err(|e| ProxyError::Internal(format!("invalid target URI: {e}")))
    }

    /// Build the outgoing request: same method, headers and body, aimed at
    /// the backend.
    pub fn build_request(&self, req: Request<Body>) -> Result<Request<Body>, ProxyError> {
        let (parts, body) = req.into_parts();
        let uri = self.target_uri(parts.uri.path(), parts.uri.query())?;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        // Framing is recomputed by the client from the streamed body.
        headers.remove(CONTENT_LENGTH);

        // Host header must match the target authority.
        if let Some(authority) = uri.authority() {
            let value = HeaderValue::from_str(authority.as_str()).map_err(|e| {
                ProxyError::Internal(format!("invalid Host header {}: {e}", authority.as_str()))
            })?;
            headers.insert(HOST, value);
        }

        let mut forwarded = Request::builder()
            .method(parts.method)
            .uri(uri)
            .body(body)
            .map_err(|e| ProxyError::Internal(format!("failed to build proxy request: {e}")))?;
        *forwarded.headers_mut() = headers;

        Ok(forwarded)
    }

    /// Forward `req` and return the backend's response with a streaming body.
    pub async fn forward(&self, req: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let forwarded = self.build_request(req)?;
        debug!("Proxying {} {}", forwarded.method(), forwarded.uri());

        let response = match tokio::time::timeout(self.timeout, self.client.request(forwarded)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(err)) if err.is_connect() => {
                warn!("Proxy target unreachable: {err:?}");
                return Err(ProxyError::Unreachable(err.to_string()));
            }
            Ok(Err(err)) => {
                error!("Proxy request failed: {err:?}");
                return Err(ProxyError::Internal(err.to_string()));
            }
            Err(_) => {
                warn!("Proxy target did not answer within {:?}", self.timeout);
                return Err(ProxyError::Timeout(self.timeout));
            }
        };

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        debug!("Proxy response status {}", parts.status);

        Ok(Response::from_parts(
            parts,
            relay_body(body, self.idle_timeout),
        ))
    }
}

/// Relay the backend body frame by frame, failing the stream if the backend
/// goes quiet for longer than `idle`.
fn relay_body(body: Incoming, idle: Duration) -> Body {
    let stream = body
        .into_data_stream()
        .timeout(idle)
        .map(move |item| match item {
            Ok(Ok(chunk)) => Ok(chunk),
            Ok(Err(err)) => {
                warn!("Backend body failed mid-stream: {err}");
                Err(io::Error::other(err))
            }
            Err(_) => {
                warn!("Backend body idle for more than {idle:?}; aborting relay");
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "backend body stalled",
                ))
            }
        });

    Body::from_stream(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, header};

    fn forwarder(base: &str) -> ProxyForwarder {
        ProxyForwarder::new(base.parse().unwrap(), DEFAULT_TIMEOUT, DEFAULT_IDLE_TIMEOUT)
    }

    #[test]
    fn test_target_uri_root_base() {
        let f = forwarder("http://127.0.0.1:9000");
        assert_eq!(
            f.target_uri("/items/42", Some("a=1&b=two%20words"))
                .unwrap()
                .to_string(),
            "http://127.0.0.1:9000/items/42?a=1&b=two%20words"
        );
        assert_eq!(
            f.target_uri("/", None).unwrap().to_string(),
            "http://127.0.0.1:9000/"
        );
    }

    #[test]
    fn test_target_uri_with_prefix() {
        let f = forwarder("http://backend:8080/api/");
        assert_eq!(
            f.target_uri("/items", None).unwrap().to_string(),
            "http://backend:8080/api/items"
        );

        let f = forwarder("http://backend:8080/api");
        assert_eq!(
            f.target_uri("/items", Some("")).unwrap().to_string(),
            "http://backend:8080/api/items?"
        );
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-session-hint"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-session-hint", HeaderValue::from_static("abc"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(header::PROXY_AUTHORIZATION, HeaderValue::from_static("Basic x"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-custom", HeaderValue::from_static("kept"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 2);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(headers["x-custom"], "kept");
    }

    #[test]
    fn test_build_request_preserves_everything_but_transport_headers() {
        let f = forwarder("http://10.1.2.3:7000/base");
        let req = Request::builder()
            .method(Method::PATCH)
            .uri("/things/7?verbose=true")
            .header(header::HOST, "gateway.example.com")
            .header(header::AUTHORIZATION, "Bearer abc")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, "2")
            .header("x-request-tag", "t-1")
            .header("x-multi", "one")
            .body(Body::from("{}"))
            .unwrap();
        let mut req = req;
        req.headers_mut()
            .append("x-multi", HeaderValue::from_static("two"));

        let out = f.build_request(req).unwrap();

        assert_eq!(out.method(), Method::PATCH);
        assert_eq!(
            out.uri().to_string(),
            "http://10.1.2.3:7000/base/things/7?verbose=true"
        );
        assert_eq!(out.headers()[header::HOST], "10.1.2.3:7000");
        assert_eq!(out.headers()[header::AUTHORIZATION], "Bearer abc");
        assert_eq!(out.headers()["x-request-tag"], "t-1");
        let multi: Vec<_> = out.headers().get_all("x-multi").iter().collect();
        assert_eq!(multi, ["one", "two"]);
        assert!(out.headers().get(header::CONTENT_LENGTH).is_none());
    }

    #[tokio::test]
    async fn test_forward_to_closed_port_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let f = forwarder(&format!("http://{addr}"));
        let req = Request::builder().uri("/x").body(Body::empty()).unwrap();
        let err = f.forward(req).await.unwrap_err();
        assert!(matches!(err, ProxyError::Unreachable(_)), "{err:?}");
    }
}
