use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::events::ndjson_chunks;
use crate::client::{ChatTransport, ChunkStream};
use crate::error::transport::TransportError;
use crate::types::chunk::ChatRequest;
use crate::types::message::ModelMessage;

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [ModelMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP client for an Ollama server's `/api/chat` endpoint.
#[derive(Clone)]
pub struct OllamaClient {
    base: Url,
    http: reqwest::Client,
}

impl OllamaClient {
    /// `host` may be a bare `host:port` (as written in agentx.toml) or a full URL.
    pub fn new(host: &str) -> Result<Self, TransportError> {
        let base = Url::parse(&normalize_host(host)).map_err(|e| TransportError::Url(e.to_string()))?;
        Ok(Self {
            base,
            // No client-wide timeout: a streamed answer may legitimately run for minutes.
            http: reqwest::Client::builder()
                .build()
                .map_err(|e| TransportError::Http(e.to_string()))?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn chat_url(&self) -> Result<Url, TransportError> {
        self.base
            .join("api/chat")
            .map_err(|e| TransportError::Url(e.to_string()))
    }
}

#[async_trait]
impl ChatTransport for OllamaClient {
    async fn warm_up(&self, model: &str, timeout: Duration) -> Result<(), TransportError> {
        let url = self.chat_url()?;
        let body = ChatBody {
            model,
            messages: &[],
            stream: false,
        };
        let resp = self
            .http
            .post(url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await?;
        resp.error_for_status()?;
        info!(model, "service handshake and model invocation successful");
        Ok(())
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<ChunkStream, TransportError> {
        let url = self.chat_url()?;
        let body = ChatBody {
            model: &request.model,
            messages: &request.messages,
            stream: true,
        };
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "opening chat stream"
        );
        let resp = self.http.post(url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ErrorBody>(&text) {
                Ok(err) => TransportError::Remote(err.error),
                Err(_) => TransportError::Status(status.as_u16()),
            });
        }

        Ok(Box::pin(ndjson_chunks(resp.bytes_stream())))
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.contains("://") {
        format!("{host}/")
    } else {
        format!("http://{host}/")
    }
}
