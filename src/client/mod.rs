pub mod api;
pub mod events;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;

use crate::error::transport::TransportError;
use crate::types::chunk::{ChatRequest, StreamChunk};

/// Decoded fragments of one streamed response, in arrival order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, TransportError>> + Send>>;

/// The model server as the session sees it.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// One non-streaming request with no messages, used only to make the
    /// server load `model` into memory.
    async fn warm_up(&self, model: &str, timeout: Duration) -> Result<(), TransportError>;

    /// Open a streaming chat request.
    async fn stream_chat(&self, request: ChatRequest) -> Result<ChunkStream, TransportError>;
}
