use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use wreq::{Client, Method, Proxy};

use wprelay_common::RelayConfig;

use crate::headers::Headers;

/// Streamed body chunks. An `Err` means the upstream body ended early and
/// the receiver must not treat what it got as complete.
pub type ByteStream = tokio::sync::mpsc::Receiver<Result<Bytes, io::Error>>;

const STREAM_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug)]
pub enum UpstreamBody {
    Bytes(Bytes),
    Stream(ByteStream),
}

impl UpstreamBody {
    /// Drains the body into a single buffer.
    pub async fn collect(self) -> Result<Bytes, io::Error> {
        match self {
            UpstreamBody::Bytes(bytes) => Ok(bytes),
            UpstreamBody::Stream(mut rx) => {
                let mut buf = Vec::new();
                while let Some(chunk) = rx.recv().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(Bytes::from(buf))
            }
        }
    }
}

#[derive(Debug)]
pub struct UpstreamHttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: UpstreamBody,
}

#[derive(Debug, Clone)]
pub struct UpstreamHttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub body: Option<Bytes>,
    /// Deadline for the whole exchange. For streamed responses it covers the
    /// response head only.
    pub timeout: Option<Duration>,
    /// Stream 2xx bodies instead of buffering them.
    pub is_stream: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamTransportErrorKind {
    Timeout,
    Connect,
    Other,
}

/// Transport-level failure (no HTTP response).
#[derive(Debug, Clone)]
pub struct UpstreamFailure {
    pub kind: UpstreamTransportErrorKind,
    pub message: String,
}

/// Seam for the single outbound call a relay makes. No retries happen here.
pub trait UpstreamClient: Send + Sync {
    fn send<'a>(
        &'a self,
        req: UpstreamHttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>>;
}

#[derive(Debug, Clone)]
pub struct UpstreamClientConfig {
    pub proxy: Option<String>,
    pub connect_timeout: Duration,
    /// Longest gap allowed between two chunks of a streamed body.
    pub stream_idle_timeout: Duration,
}

impl UpstreamClientConfig {
    pub fn from_relay(config: &RelayConfig) -> Self {
        Self {
            proxy: config.proxy.clone(),
            ..Self::default()
        }
    }
}

impl Default for UpstreamClientConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            connect_timeout: Duration::from_secs(10),
            stream_idle_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Clone)]
pub struct WreqUpstreamClient {
    client: Client,
    stream_idle_timeout: Duration,
}

impl WreqUpstreamClient {
    pub fn new(config: UpstreamClientConfig) -> Result<Self, wreq::Error> {
        let proxy = normalize_proxy(config.proxy.clone());
        let client = build_client(&config, proxy.as_deref())?;
        Ok(Self {
            client,
            stream_idle_timeout: config.stream_idle_timeout,
        })
    }

    async fn exchange(
        &self,
        req: UpstreamHttpRequest,
    ) -> Result<UpstreamHttpResponse, UpstreamFailure> {
        let method = http_method_to_wreq(req.method);
        let mut builder = self.client.request(method, &req.url);

        for (k, v) in &req.headers {
            builder = builder.header(k, v);
        }

        if let Some(body) = req.body {
            builder = builder.body(body);
        }

        let resp = builder.send().await.map_err(map_wreq_error)?;
        convert_response(resp, req.is_stream, self.stream_idle_timeout).await
    }
}

fn normalize_proxy(value: Option<String>) -> Option<String> {
    value
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
}

fn build_client(config: &UpstreamClientConfig, proxy: Option<&str>) -> Result<Client, wreq::Error> {
    let mut builder = Client::builder()
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.stream_idle_timeout);

    if let Some(proxy) = proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    builder.build()
}

impl UpstreamClient for WreqUpstreamClient {
    fn send<'a>(
        &'a self,
        req: UpstreamHttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>>
    {
        Box::pin(async move {
            let Some(limit) = req.timeout else {
                return self.exchange(req).await;
            };
            match tokio::time::timeout(limit, self.exchange(req)).await {
                Ok(result) => result,
                Err(_) => Err(UpstreamFailure {
                    kind: UpstreamTransportErrorKind::Timeout,
                    message: format!("no upstream response within {}ms", limit.as_millis()),
                }),
            }
        })
    }
}

fn http_method_to_wreq(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
    }
}

async fn convert_response(
    resp: wreq::Response,
    want_stream: bool,
    stream_idle_timeout: Duration,
) -> Result<UpstreamHttpResponse, UpstreamFailure> {
    let status = resp.status().as_u16();
    let headers = headers_from_wreq(resp.headers());

    let is_success = (200..300).contains(&status);
    if !is_success || !want_stream {
        let body = resp.bytes().await.map_err(map_wreq_error)?;
        return Ok(UpstreamHttpResponse {
            status,
            headers,
            body: UpstreamBody::Bytes(body),
        });
    }

    let (tx, rx) = tokio::sync::mpsc::channel(STREAM_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut stream = resp.bytes_stream();
        loop {
            let item = match tokio::time::timeout(stream_idle_timeout, stream.next()).await {
                Ok(Some(Ok(chunk))) => Ok(chunk),
                Ok(Some(Err(err))) => {
                    tracing::warn!(event = "upstream_stream_aborted", error = %err);
                    Err(io::Error::other(err.to_string()))
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        event = "upstream_stream_stalled",
                        idle_ms = stream_idle_timeout.as_millis()
                    );
                    Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "upstream body stalled",
                    ))
                }
            };
            let failed = item.is_err();
            if tx.send(item).await.is_err() || failed {
                break;
            }
        }
    });

    Ok(UpstreamHttpResponse {
        status,
        headers,
        body: UpstreamBody::Stream(rx),
    })
}

fn headers_from_wreq(map: &wreq::header::HeaderMap) -> Headers {
    let mut out = Vec::new();
    for (k, v) in map {
        if let Ok(s) = v.to_str() {
            out.push((k.as_str().to_string(), s.to_string()));
        }
    }
    out
}

fn map_wreq_error(err: wreq::Error) -> UpstreamFailure {
    let kind = classify_wreq_error(&err);
    UpstreamFailure {
        kind,
        message: err.to_string(),
    }
}

fn classify_wreq_error(err: &wreq::Error) -> UpstreamTransportErrorKind {
    if err.is_timeout() {
        UpstreamTransportErrorKind::Timeout
    } else if err.is_connect() || err.is_connection_reset() {
        UpstreamTransportErrorKind::Connect
    } else {
        UpstreamTransportErrorKind::Other
    }
}
