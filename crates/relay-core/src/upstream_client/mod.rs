use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use relay_pool::TransportErrorKind;

#[derive(Debug, Clone)]
pub struct AttemptTimeouts {
    pub connect: Duration,
    /// None means no read deadline; the caller owns the body deadline
    /// (responses pool, adaptive).
    pub read: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub stream: bool,
    pub timeouts: AttemptTimeouts,
}

#[derive(Debug, Clone)]
pub struct TransportFailure {
    pub kind: TransportErrorKind,
    pub message: String,
}

pub enum UpstreamBody {
    Bytes(Bytes),
    /// Chunk errors are forwarded, not swallowed: mid-stream failures are
    /// classified upstream-failure input.
    Stream(mpsc::Receiver<Result<Bytes, TransportFailure>>),
}

pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: UpstreamBody,
}

/// One upstream attempt. Implementations construct a brand-new HTTP client
/// inside `send` and drop it with the response: stale pooled TLS
/// connections cause exactly the silent read errors this proxy exists to
/// survive.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn send(&self, req: UpstreamRequest) -> Result<UpstreamResponse, TransportFailure>;
}

pub struct FreshWreqClient;

#[async_trait]
impl UpstreamClient for FreshWreqClient {
    async fn send(&self, req: UpstreamRequest) -> Result<UpstreamResponse, TransportFailure> {
        let mut builder = wreq::Client::builder().connect_timeout(req.timeouts.connect);
        if let Some(read) = req.timeouts.read {
            builder = builder.read_timeout(read);
        }
        let client = builder.build().map_err(|err| map_wreq_error(&err))?;

        let mut request = client.request(wreq::Method::POST, &req.url);
        for (name, value) in &req.headers {
            request = request.header(name, value);
        }
        let resp = request
            .body(req.body.clone())
            .send()
            .await
            .map_err(|err| map_wreq_error(&err))?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let is_success = (200..300).contains(&status);
        if !is_success || !req.stream {
            let body = resp.bytes().await.map_err(|err| map_wreq_error(&err))?;
            return Ok(UpstreamResponse {
                status,
                headers,
                body: UpstreamBody::Bytes(body),
            });
        }

        let (tx, rx) = mpsc::channel::<Result<Bytes, TransportFailure>>(16);
        tokio::spawn(async move {
            // The client moves in here so the connection lives exactly as
            // long as the stream and is closed with it.
            let _client = client;
            let mut stream = resp.bytes_stream();
            while let Some(item) = stream.next().await {
                let forwarded = item.map_err(|err| map_wreq_error(&err));
                let failed = forwarded.is_err();
                if tx.send(forwarded).await.is_err() || failed {
                    break;
                }
            }
        });

        Ok(UpstreamResponse {
            status,
            headers,
            body: UpstreamBody::Stream(rx),
        })
    }
}

fn map_wreq_error(err: &wreq::Error) -> TransportFailure {
    let message = err.to_string();
    let lower = message.to_ascii_lowercase();
    let kind = if err.is_timeout() {
        TransportErrorKind::ReadTimeout
    } else if err.is_connect() {
        TransportErrorKind::ConnectError
    } else if err.is_connection_reset()
        || lower.contains("peer closed")
        || lower.contains("incomplete")
        || lower.contains("reset")
        || lower.contains("broken pipe")
    {
        TransportErrorKind::ReadError
    } else {
        TransportErrorKind::Other
    };
    TransportFailure { kind, message }
}
