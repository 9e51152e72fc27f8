use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use futures::Stream;
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::transport::TransportError;
use crate::types::chunk::StreamChunk;

#[derive(Debug, Deserialize)]
struct WireChunk {
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    images: Option<Vec<String>>,
    #[serde(default)]
    tool_name: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<Value>>,
    #[serde(flatten)]
    other: Map<String, Value>,
}

impl WireMessage {
    /// First populated channel, if any.
    fn into_chunk(self) -> Option<StreamChunk> {
        if let Some(text) = self.content.filter(|s| !s.is_empty()) {
            return Some(StreamChunk::Content(text));
        }
        if let Some(text) = self.thinking.filter(|s| !s.is_empty()) {
            return Some(StreamChunk::Thinking(text));
        }
        if let Some(images) = self.images.filter(|v| !v.is_empty()) {
            return Some(StreamChunk::Images(images));
        }
        if let Some(name) = self.tool_name.filter(|s| !s.is_empty()) {
            return Some(StreamChunk::ToolName(name));
        }
        if let Some(calls) = self.tool_calls.filter(|v| !v.is_empty()) {
            return Some(StreamChunk::ToolCalls(calls));
        }
        self.other
            .into_iter()
            .find(|(key, value)| key != "role" && is_populated(value))
            .map(|(key, _)| StreamChunk::Unknown(key))
    }
}

fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(_) => true,
    }
}

/// Decode one NDJSON line. Returns the chunk it carries (if any) and whether
/// the server marked the stream as done.
pub(crate) fn decode_line(line: &[u8]) -> Result<(Option<StreamChunk>, bool), TransportError> {
    let wire: WireChunk =
        serde_json::from_slice(line).map_err(|e| TransportError::Decode(e.to_string()))?;
    if let Some(error) = wire.error {
        return Err(TransportError::Remote(error));
    }
    let chunk = wire.message.and_then(WireMessage::into_chunk);
    Ok((chunk, wire.done))
}

struct LineState<S> {
    body: Pin<Box<S>>,
    buf: Vec<u8>,
    pending: VecDeque<Result<StreamChunk, TransportError>>,
    finished: bool,
}

impl<S> LineState<S> {
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            self.handle_line(&line);
            if self.finished {
                self.buf.clear();
                break;
            }
        }
    }

    fn flush_tail(&mut self) {
        let tail = std::mem::take(&mut self.buf);
        self.handle_line(&tail);
        self.finished = true;
    }

    fn handle_line(&mut self, line: &[u8]) {
        let line = line.trim_ascii();
        if line.is_empty() {
            return;
        }
        match decode_line(line) {
            Ok((chunk, done)) => {
                if let Some(chunk) = chunk {
                    self.pending.push_back(Ok(chunk));
                }
                if done {
                    self.finished = true;
                }
            }
            Err(e) => {
                self.pending.push_back(Err(e));
                self.finished = true;
            }
        }
    }
}

/// Turn a raw response body into decoded chunks. Lines may be split across
/// body frames. Lines without any populated channel are dropped. The stream
/// ends after `done`, after the first error, or when the body ends.
pub fn ndjson_chunks<S, B, E>(body: S) -> impl Stream<Item = Result<StreamChunk, TransportError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = LineState {
        body: Box::pin(body),
        buf: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    state.buf.extend_from_slice(bytes.as_ref());
                    state.drain_lines();
                }
                Some(Err(e)) => {
                    state
                        .pending
                        .push_back(Err(TransportError::Http(e.to_string())));
                    state.finished = true;
                }
                None => state.flush_tail(),
            }
        }
    })
}
