use bytes::Bytes;
use http::HeaderMap;
use http::header::{CONTENT_LENGTH, HOST, HeaderName, HeaderValue};
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::time::Duration;

use super::estimate::{estimate_http_request_bytes_parts, estimate_http1_response_head_bytes};
use super::util::{has_header, host_header_value, parse_http_url};
use super::{Error, HttpRequest, HttpResponse, Result};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// A request validated and converted once, then sent any number of times.
///
/// URL parsing, header validation and the bytes-sent estimate happen in
/// [`HttpClient::prepare`]; [`HttpClient::send`] only clones the header map and the body handle.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    method: http::Method,
    uri: hyper::Uri,
    headers: HeaderMap,
    body: Bytes,
    timeout: Option<Duration>,
    bytes_sent: u64,
}

impl PreparedRequest {
    pub fn method(&self) -> &http::Method {
        &self.method
    }

    pub fn uri(&self) -> &hyper::Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }
}

/// Pooled HTTP/1.1 client shared by every VU of a run.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        // Without a connect timeout an unreachable target stalls every VU for the OS default.
        Self::new(Some(DEFAULT_CONNECT_TIMEOUT))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_nodelay(true);
        http_connector.set_connect_timeout(connect_timeout);

        let https_connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let inner = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build(https_connector);

        Self { inner }
    }

    /// Validate `req` and fix its wire form. `host` and `content-length` are added when absent
    /// so the bytes-sent estimate matches what goes out.
    pub fn prepare(&self, req: HttpRequest) -> Result<PreparedRequest> {
        let parsed = parse_http_url(&req.url)?;
        let bytes_sent = estimate_http_request_bytes_parts(
            &req.method,
            &req.url,
            &req.headers,
            req.body.len() as u64,
        )?;
        let uri: hyper::Uri = req
            .url
            .parse()
            .map_err(|_| Error::InvalidUrl(req.url.clone()))?;

        let mut headers = HeaderMap::with_capacity(req.headers.len() + 2);
        if !has_header(&req.headers, "host")
            && let Some(host) = host_header_value(&parsed)
        {
            headers.insert(HOST, HeaderValue::from_str(&host)?);
        }
        if !req.body.is_empty() && !has_header(&req.headers, "content-length") {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(req.body.len()));
        }
        for (k, v) in &req.headers {
            headers.append(
                HeaderName::from_bytes(k.as_bytes())?,
                HeaderValue::from_str(v)?,
            );
        }

        Ok(PreparedRequest {
            method: req.method,
            uri,
            headers,
            body: req.body,
            timeout: req.timeout,
            bytes_sent,
        })
    }

    /// Send a prepared request and drain the response body.
    ///
    /// Any status is a response; only transport failures and timeouts are errors.
    pub async fn send(&self, prepared: &PreparedRequest) -> Result<HttpResponse> {
        let mut builder = Request::builder()
            .method(prepared.method.clone())
            .uri(prepared.uri.clone());
        if let Some(headers) = builder.headers_mut() {
            headers.clone_from(&prepared.headers);
        }
        let req = builder.body(Full::new(prepared.body.clone()))?;

        let exchange = async {
            let res = self.inner.request(req).await?;
            let (parts, body) = res.into_parts();
            let head_bytes =
                estimate_http1_response_head_bytes(parts.version, parts.status, &parts.headers);
            let body = body.collect().await?.to_bytes();
            Ok::<_, Error>((parts.status.as_u16(), head_bytes, body))
        };

        let (status, head_bytes, body) = match prepared.timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| Error::Timeout(limit))??,
            None => exchange.await?,
        };

        Ok(HttpResponse {
            status,
            bytes_received: head_bytes.saturating_add(body.len() as u64),
            bytes_sent: prepared.bytes_sent,
            body,
        })
    }

    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        let prepared = self.prepare(req)?;
        self.send(&prepared).await
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.request(HttpRequest::get(url)).await
    }
}
