use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc as chunk_channel;

use crate::client::{ChatTransport, ChunkStream};
use crate::error::transport::TransportError;
use crate::session::{SessionEvent, SessionSettings};
use crate::types::chunk::{ChatRequest, StreamChunk};

pub(crate) type ChunkResult = Result<StreamChunk, TransportError>;

pub(crate) fn settings(root: &Path) -> SessionSettings {
    SessionSettings {
        user: "tester".to_string(),
        sessions_root: root.to_path_buf(),
        model: "test-model".to_string(),
        initial_load_timeout: Duration::from_millis(50),
    }
}

pub(crate) fn content(text: &str) -> ChunkResult {
    Ok(StreamChunk::Content(text.to_string()))
}

pub(crate) fn thinking(text: &str) -> ChunkResult {
    Ok(StreamChunk::Thinking(text.to_string()))
}

/// Event sink that forwards into a channel the test can read.
pub(crate) fn collector() -> (
    impl Fn(SessionEvent) + Send + Sync + 'static,
    mpsc::Receiver<SessionEvent>,
) {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let sink = move |event| {
        let _ = tx.lock().unwrap().send(event);
    };
    (sink, rx)
}

/// Read events until one matches, failing after a few seconds.
pub(crate) fn wait_for(
    events: &mpsc::Receiver<SessionEvent>,
    predicate: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    loop {
        match events.recv_timeout(Duration::from_secs(5)) {
            Ok(event) if predicate(&event) => return event,
            Ok(_) => continue,
            Err(e) => panic!("expected event never arrived: {e}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WarmUp {
    Ok,
    Fail,
    Hang,
}

/// Replays one prepared list of chunks per request and records every request.
pub(crate) struct ScriptedTransport {
    turns: Mutex<VecDeque<Vec<ChunkResult>>>,
    pub requests: Mutex<Vec<ChatRequest>>,
    warm_up: WarmUp,
}

impl ScriptedTransport {
    pub(crate) fn new(turns: Vec<Vec<ChunkResult>>) -> Arc<Self> {
        Self::with_warm_up(turns, WarmUp::Ok)
    }

    pub(crate) fn with_warm_up(turns: Vec<Vec<ChunkResult>>, warm_up: WarmUp) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
            warm_up,
        })
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn warm_up(&self, _model: &str, _timeout: Duration) -> Result<(), TransportError> {
        match self.warm_up {
            WarmUp::Ok => Ok(()),
            WarmUp::Fail => Err(TransportError::Http("connection refused".to_string())),
            WarmUp::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        }
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<ChunkStream, TransportError> {
        self.requests.lock().unwrap().push(request);
        let items = self.turns.lock().unwrap().pop_front().unwrap_or_default();
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

/// Streams whatever the test pushes, and stays open until the sender is
/// dropped. Only the first request gets the channel.
pub(crate) struct ChannelTransport {
    rx: Mutex<Option<chunk_channel::UnboundedReceiver<ChunkResult>>>,
}

pub(crate) fn channel_transport() -> (
    chunk_channel::UnboundedSender<ChunkResult>,
    Arc<ChannelTransport>,
) {
    let (tx, rx) = chunk_channel::unbounded();
    let transport = Arc::new(ChannelTransport {
        rx: Mutex::new(Some(rx)),
    });
    (tx, transport)
}

#[async_trait]
impl ChatTransport for ChannelTransport {
    async fn warm_up(&self, _model: &str, _timeout: Duration) -> Result<(), TransportError> {
        Ok(())
    }

    async fn stream_chat(&self, _request: ChatRequest) -> Result<ChunkStream, TransportError> {
        match self.rx.lock().unwrap().take() {
            Some(rx) => Ok(Box::pin(rx)),
            None => Ok(Box::pin(futures::stream::empty::<ChunkResult>())),
        }
    }
}
