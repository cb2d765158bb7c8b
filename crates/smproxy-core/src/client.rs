use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use wreq::{Client, Method};

use smproxy_protocol::smithery::chat::request::ChatRequest;

use crate::error::TransportError;

pub const CHAT_URL: &str = "https://smithery.ai/api/chat";
pub const PLAYGROUND_URL: &str = "https://smithery.ai/playground";
const ORIGIN: &str = "https://smithery.ai";

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug)]
pub enum UpstreamBody {
    Bytes(Bytes),
    Stream(mpsc::Receiver<Bytes>),
}

impl UpstreamBody {
    pub fn into_receiver(self) -> mpsc::Receiver<Bytes> {
        match self {
            UpstreamBody::Stream(rx) => rx,
            UpstreamBody::Bytes(bytes) => {
                let (tx, rx) = mpsc::channel(1);
                let _ = tx.try_send(bytes);
                rx
            }
        }
    }

    pub async fn collect_text(self) -> String {
        match self {
            UpstreamBody::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            UpstreamBody::Stream(mut rx) => {
                let mut out = Vec::new();
                while let Some(chunk) = rx.recv().await {
                    out.extend_from_slice(&chunk);
                }
                String::from_utf8_lossy(&out).into_owned()
            }
        }
    }
}

#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: UpstreamBody,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Seam between the chat pipeline and the network. The production
/// implementation talks to the playground backend; tests substitute
/// scripted responses.
pub trait UpstreamClient: Send + Sync {
    /// Issue one chat call. With `buffered` the whole body is read before
    /// returning; otherwise a successful response carries a live stream.
    fn chat<'a>(
        &'a self,
        request: &'a ChatRequest,
        credential: Option<&'a str>,
        buffered: bool,
    ) -> BoxFuture<'a, Result<UpstreamResponse, TransportError>>;

    /// Plain GET returning the body as text; used by the model catalog.
    fn fetch_text<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, TransportError>>;
}

#[derive(Clone)]
pub struct SmitheryClient {
    client: Client,
}

impl SmitheryClient {
    pub fn new() -> Result<Self, TransportError> {
        // No request or read timeout: turns may idle for minutes and the
        // keepalive layer owns liveness.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|err| TransportError::new(err.to_string()))?;
        Ok(Self { client })
    }
}

impl UpstreamClient for SmitheryClient {
    fn chat<'a>(
        &'a self,
        request: &'a ChatRequest,
        credential: Option<&'a str>,
        buffered: bool,
    ) -> BoxFuture<'a, Result<UpstreamResponse, TransportError>> {
        Box::pin(async move {
            let body =
                serde_json::to_vec(request).map_err(|err| TransportError::new(err.to_string()))?;
            let mut builder = self
                .client
                .request(Method::POST, CHAT_URL)
                .header("content-type", "application/json")
                .header("accept", "text/event-stream")
                .header("origin", ORIGIN)
                .header("referer", PLAYGROUND_URL)
                .body(body);
            if let Some(cookie) = credential {
                builder = builder.header("cookie", cookie);
            }

            let resp = builder
                .send()
                .await
                .map_err(|err| TransportError::new(err.to_string()))?;
            let status = resp.status().as_u16();

            if buffered || !(200..300).contains(&status) {
                let bytes = resp
                    .bytes()
                    .await
                    .map_err(|err| TransportError::new(err.to_string()))?;
                return Ok(UpstreamResponse {
                    status,
                    body: UpstreamBody::Bytes(bytes),
                });
            }

            let (tx, rx) = mpsc::channel::<Bytes>(16);
            tokio::spawn(async move {
                let mut stream = resp.bytes_stream();
                while let Some(item) = stream.next().await {
                    let Ok(chunk) = item else {
                        break;
                    };
                    if tx.send(chunk).await.is_err() {
                        break;
                    }
                }
            });
            Ok(UpstreamResponse {
                status,
                body: UpstreamBody::Stream(rx),
            })
        })
    }

    fn fetch_text<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, TransportError>> {
        Box::pin(async move {
            let resp = self
                .client
                .request(Method::GET, url)
                .header("user-agent", "Mozilla/5.0")
                .send()
                .await
                .map_err(|err| TransportError::new(err.to_string()))?;
            let status = resp.status().as_u16();
            if !(200..300).contains(&status) {
                return Err(TransportError::new(format!("GET {url} {status}")));
            }
            let bytes = resp
                .bytes()
                .await
                .map_err(|err| TransportError::new(err.to_string()))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        })
    }
}
