use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ChatTransport;
use crate::context::Context;
use crate::error::storage::StorageError;
use crate::session::{EventSink, SessionEvent};
use crate::types::chunk::{Channel, ChatRequest, StreamChunk};
use crate::types::message::Message;

/// Accumulators for one assistant turn, routed by channel.
#[derive(Debug)]
pub(crate) struct Turn {
    thinking: Message,
    content: Message,
    last_channel: Option<Channel>,
    thinking_committed: bool,
}

/// What applying one chunk asks the worker to do.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct Step {
    /// Thinking accumulator to persist before anything else.
    pub commit: Option<Message>,
    /// Text to show right away.
    pub delta: Option<(Channel, String)>,
}

impl Turn {
    pub(crate) fn new() -> Self {
        Self {
            thinking: Message::thinking_accumulator(),
            content: Message::content_accumulator(),
            last_channel: None,
            thinking_committed: false,
        }
    }

    pub(crate) fn apply(&mut self, chunk: StreamChunk) -> Step {
        let channel = chunk.channel();
        let mut step = Step::default();

        if self.last_channel == Some(Channel::Thinking)
            && channel == Channel::Content
            && !self.thinking_committed
        {
            self.thinking_committed = true;
            step.commit = Some(self.thinking.clone());
        }

        match chunk {
            StreamChunk::Thinking(text) => {
                self.thinking.content.push_str(&text);
                step.delta = Some((Channel::Thinking, text));
            }
            StreamChunk::Content(text) => {
                self.content.content.push_str(&text);
                step.delta = Some((Channel::Content, text));
            }
            StreamChunk::ToolName(name) => info!(tool = %name, "tool name received"),
            StreamChunk::ToolCalls(calls) => info!(count = calls.len(), "tool calls received"),
            StreamChunk::Images(images) => info!(count = images.len(), "images received"),
            StreamChunk::Unknown(name) => warn!(channel = %name, "unknown channel received"),
        }

        self.last_channel = Some(channel);
        step
    }

    /// Messages still to persist once the stream is over: reasoning that never
    /// reached a content transition, then the answer.
    pub(crate) fn finish(self) -> Vec<Message> {
        let mut out = Vec::with_capacity(2);
        if !self.thinking_committed && !self.thinking.content.is_empty() {
            out.push(self.thinking);
        }
        out.push(self.content);
        out
    }
}

/// Clears the streaming flag however the worker exits, including a panic.
struct StreamingGuard(Arc<AtomicBool>);

impl Drop for StreamingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub(crate) struct Worker {
    pub context: Arc<Mutex<Context>>,
    pub transport: Arc<dyn ChatTransport>,
    pub request: ChatRequest,
    pub token: CancellationToken,
    pub streaming: Arc<AtomicBool>,
    pub sink: EventSink,
}

enum Outcome {
    Completed,
    Cancelled,
}

impl Worker {
    pub(crate) async fn run(self) {
        let guard = StreamingGuard(self.streaming.clone());
        let mut turn = Turn::new();

        let outcome = match self.consume(&mut turn).await {
            Ok(outcome) => outcome,
            Err(message) => {
                warn!(error = %message, "stream failed");
                (self.sink)(SessionEvent::Error(message));
                drop(guard);
                (self.sink)(SessionEvent::StreamFinished { cancelled: false });
                return;
            }
        };

        for message in turn.finish() {
            if let Err(e) = self.commit(message) {
                (self.sink)(SessionEvent::Error(e.to_string()));
                break;
            }
        }

        let cancelled = matches!(outcome, Outcome::Cancelled);
        debug!(cancelled, "stream finished");
        // Idle before the front end hears about it, so it can submit again.
        drop(guard);
        (self.sink)(SessionEvent::StreamFinished { cancelled });
    }

    async fn consume(&self, turn: &mut Turn) -> Result<Outcome, String> {
        let mut stream = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Ok(Outcome::Cancelled),
            opened = self.transport.stream_chat(self.request.clone()) => {
                opened.map_err(|e| e.to_string())?
            }
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    info!("streaming interrupted");
                    return Ok(Outcome::Cancelled);
                }
                next = stream.next() => next,
            };

            let Some(item) = next else {
                return Ok(Outcome::Completed);
            };
            let chunk = item.map_err(|e| e.to_string())?;

            let step = turn.apply(chunk);
            if let Some(thinking) = step.commit {
                self.commit(thinking).map_err(|e| e.to_string())?;
            }
            if let Some((channel, text)) = step.delta {
                (self.sink)(SessionEvent::Delta { channel, text });
            }

            if self.token.is_cancelled() {
                info!("streaming interrupted");
                return Ok(Outcome::Cancelled);
            }
        }
    }

    fn commit(&self, message: Message) -> Result<(), StorageError> {
        {
            let mut context = self
                .context
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let timestamp = context.next_timestamp();
            context.add_message(timestamp, message)?;
        }
        (self.sink)(SessionEvent::ContextChanged);
        Ok(())
    }
}
