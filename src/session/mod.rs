mod stream;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ChatTransport;
use crate::config::AppConfig;
use crate::context::Context;
use crate::error::session::SessionError;
use crate::error::storage::StorageError;
use crate::history::{CONTEXT_DIR, History};
use crate::types::chunk::{Channel, ChatRequest};
use crate::types::message::Message;

use self::stream::Worker;

/// Everything a session needs, resolved once from config and environment.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub user: String,
    pub sessions_root: PathBuf,
    pub model: String,
    pub initial_load_timeout: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            user: current_user(),
            sessions_root: PathBuf::from(&config.agentx.sessions_root),
            model: config.agentx.ollama_model.clone(),
            initial_load_timeout: Duration::from_secs(
                config.agentx.ollama_initial_load_timeout_seconds,
            ),
        }
    }
}

fn current_user() -> String {
    std::env::var("USER")
        .ok()
        .filter(|u| !u.is_empty())
        .or_else(|| std::env::var("USERNAME").ok().filter(|u| !u.is_empty()))
        .unwrap_or_else(|| "User".to_string())
}

/// Notifications for the presentation layer, delivered from whichever
/// thread produced them.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Soft rejection or status line meant for the user.
    Notice(String),
    StreamStarted,
    /// Streamed text as it arrives.
    Delta { channel: Channel, text: String },
    /// The context gained or changed a message; re-render it.
    ContextChanged,
    StreamFinished { cancelled: bool },
    Error(String),
}

pub type EventSink = Arc<dyn Fn(SessionEvent) + Send + Sync>;

/// Result of a submit that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Started,
    /// Prompt was blank.
    Empty,
    /// A response is still streaming.
    Busy,
}

struct ActiveStream {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// One running conversation with the model server.
pub struct Session {
    settings: SessionSettings,
    start_time: DateTime<Local>,
    session_folder: PathBuf,
    context_folder: PathBuf,
    context: Arc<Mutex<Context>>,
    history: OnceLock<History>,
    transport: Arc<dyn ChatTransport>,
    runtime: Runtime,
    streaming: Arc<AtomicBool>,
    active: Mutex<Option<ActiveStream>>,
    sink: EventSink,
}

impl Session {
    /// Create the session folders under `<root>/<user>/` and an empty context.
    pub fn new(
        settings: SessionSettings,
        transport: Arc<dyn ChatTransport>,
        sink: impl Fn(SessionEvent) + Send + Sync + 'static,
    ) -> Result<Self, SessionError> {
        let start_time = Local::now();
        let session_folder = settings
            .sessions_root
            .join(&settings.user)
            .join(format!("session_{}", start_time.format("%Y-%m-%d_%H-%M-%S")));
        let context_folder = session_folder.join(CONTEXT_DIR);
        std::fs::create_dir_all(&context_folder).map_err(|e| StorageError::CreateDir {
            path: context_folder.display().to_string(),
            message: e.to_string(),
        })?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|e| SessionError::Runtime(e.to_string()))?;

        let mut context = Context::new(&context_folder);
        context.session_id = session_folder
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());

        info!(folder = %session_folder.display(), user = %settings.user, "session started");

        Ok(Self {
            settings,
            start_time,
            session_folder,
            context_folder,
            context: Arc::new(Mutex::new(context)),
            history: OnceLock::new(),
            transport,
            runtime,
            streaming: Arc::new(AtomicBool::new(false)),
            active: Mutex::new(None),
            sink: Arc::new(sink),
        })
    }

    pub fn user(&self) -> &str {
        &self.settings.user
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    pub fn start_time(&self) -> DateTime<Local> {
        self.start_time
    }

    pub fn session_folder(&self) -> &Path {
        &self.session_folder
    }

    pub fn context_folder(&self) -> &Path {
        &self.context_folder
    }

    pub fn user_root(&self) -> PathBuf {
        self.settings.sessions_root.join(&self.settings.user)
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Ask the server to load the model before the user starts typing.
    /// Failure here is fatal to startup and is not retried.
    pub fn perform_service_handshake(&self) -> Result<(), SessionError> {
        let timeout = self.settings.initial_load_timeout;
        let model = self.settings.model.clone();
        info!(%model, ?timeout, "performing service handshake");

        let result = self.runtime.block_on(async {
            tokio::time::timeout(timeout, self.transport.warm_up(&model, timeout)).await
        });
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SessionError::Handshake(e.to_string())),
            Err(_) => Err(SessionError::HandshakeTimeout(timeout)),
        }
    }

    pub fn submit(&self, prompt: &str) -> Result<Submission, SessionError> {
        self.submit_with_attachments(prompt, Vec::new())
    }

    /// Persist the prompt as a user message and start streaming the reply on
    /// the runtime. Blank prompts and submits during a stream are rejected
    /// with a notice.
    pub fn submit_with_attachments(
        &self,
        prompt: &str,
        attachments: Vec<PathBuf>,
    ) -> Result<Submission, SessionError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            (self.sink)(SessionEvent::Notice("No input provided.".to_string()));
            return Ok(Submission::Empty);
        }

        if self
            .streaming
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("submit rejected, stream in progress");
            (self.sink)(SessionEvent::Notice(
                "Streaming already in progress".to_string(),
            ));
            return Ok(Submission::Busy);
        }

        let mut user_message = Message::user(prompt);
        for path in attachments {
            user_message.attach(path);
        }

        let request = {
            let mut context = self.lock_context();
            let timestamp = context.next_timestamp();
            if let Err(e) = context.add_message(timestamp, user_message) {
                self.streaming.store(false, Ordering::Release);
                return Err(e.into());
            }
            ChatRequest {
                model: self.settings.model.clone(),
                messages: context.model_request_messages(),
            }
        };
        (self.sink)(SessionEvent::ContextChanged);
        (self.sink)(SessionEvent::StreamStarted);

        let token = CancellationToken::new();
        let worker = Worker {
            context: self.context.clone(),
            transport: self.transport.clone(),
            request,
            token: token.clone(),
            streaming: self.streaming.clone(),
            sink: self.sink.clone(),
        };
        let task = self.runtime.spawn(worker.run());

        let mut active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *active = Some(ActiveStream { token, task });
        Ok(Submission::Started)
    }

    /// Stop the active stream at its next chunk. Whatever content arrived so
    /// far is still committed. No-op when idle.
    pub fn cancel(&self) {
        let active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(stream) = active.as_ref() {
            if !stream.task.is_finished() {
                info!("interrupting streaming");
                stream.token.cancel();
            }
        }
    }

    /// Block until the active stream task, if any, has finished.
    pub fn wait_for_idle(&self) {
        let stream = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(stream) = stream {
            if let Err(e) = self.runtime.block_on(stream.task) {
                warn!(error = %e, "stream task did not complete");
            }
        }
    }

    /// Include or exclude a message from future model calls. Refused while
    /// streaming, since the worker owns the context until it finishes.
    pub fn toggle_message_enabled(&self, index: usize, enabled: bool) -> Result<(), SessionError> {
        if self.is_streaming() {
            return Err(SessionError::Busy);
        }
        self.lock_context().set_enabled(index, enabled)?;
        (self.sink)(SessionEvent::ContextChanged);
        Ok(())
    }

    pub fn toggle_context_expanded(&self) {
        self.lock_context().toggle_expanded();
        (self.sink)(SessionEvent::ContextChanged);
    }

    /// Copy of the live context for rendering.
    pub fn context_snapshot(&self) -> Context {
        self.lock_context().clone()
    }

    /// Past sessions of this user, scanned on first access only.
    pub fn history(&self) -> &History {
        self.history.get_or_init(|| History::load(&self.user_root()))
    }

    fn lock_context(&self) -> MutexGuard<'_, Context> {
        self.context
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel();
        self.wait_for_idle();
    }
}
