use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc;

use tracing::{debug, warn};

use crate::render::{render_context, render_history};
use crate::session::{Session, SessionEvent, Submission};
use crate::types::chunk::Channel;
use crate::types::message::Message;

/// Everything the foreground loop reacts to, fed by the stdin reader thread
/// and by the session's event sink.
#[derive(Debug)]
pub enum UiMsg {
    Input(String),
    InputClosed,
    Session(SessionEvent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Submit(String),
    Cancel,
    ShowContext,
    ShowHistory,
    Toggle(usize),
    Expand,
    Attach(PathBuf),
    Detach(PathBuf),
    Help,
    Quit,
    Invalid(String),
}

pub(crate) fn parse_command(line: &str) -> Command {
    let trimmed = line.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Command::Submit(line.to_string());
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    match name {
        "cancel" => Command::Cancel,
        "context" => Command::ShowContext,
        "history" => Command::ShowHistory,
        "expand" => Command::Expand,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "toggle" => match arg.parse() {
            Ok(index) => Command::Toggle(index),
            Err(_) => Command::Invalid("usage: /toggle <message number>".to_string()),
        },
        "attach" if !arg.is_empty() => Command::Attach(PathBuf::from(arg)),
        "detach" if !arg.is_empty() => Command::Detach(PathBuf::from(arg)),
        "attach" | "detach" => Command::Invalid(format!("usage: /{name} <path>")),
        other => Command::Invalid(format!("unknown command: /{other}")),
    }
}

/// Attach `path` to the pending prompt if the file is there.
pub(crate) fn attach_existing(draft: &mut Message, path: PathBuf) -> Result<(), String> {
    if !path.exists() {
        return Err(format!("no such file: {}", path.display()));
    }
    draft.attach(path);
    Ok(())
}

const HELP: &str = "\
commands:
  <text>           send a prompt
  /cancel          stop the current response
  /context         show the current conversation
  /history         show earlier sessions
  /toggle <n>      include or exclude message n from future prompts
  /expand          fold or unfold the current conversation
  /attach <path>   attach a file to the next prompt
  /detach <path>   remove a pending attachment
  /quit            leave";

pub struct TerminalApp {
    session: Session,
    rx: mpsc::Receiver<UiMsg>,
    /// Attachments waiting for the next prompt.
    draft: Message,
    last_channel: Option<Channel>,
}

impl TerminalApp {
    pub fn new(session: Session, rx: mpsc::Receiver<UiMsg>) -> Self {
        Self {
            session,
            rx,
            draft: Message::user(String::new()),
            last_channel: None,
        }
    }

    /// Read stdin on its own thread so the loop below stays responsive
    /// while a response streams in.
    pub fn spawn_input_reader(tx: mpsc::Sender<UiMsg>) {
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(UiMsg::Input(line)).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "stdin read failed");
                        break;
                    }
                }
            }
            let _ = tx.send(UiMsg::InputClosed);
        });
    }

    pub fn run(mut self) {
        println!(
            "{} - AgentX Session - {} ({})",
            self.session.user(),
            self.session.start_time().format("%Y-%m-%d %H:%M:%S"),
            self.session.model()
        );
        println!("type /help for commands");

        while let Ok(msg) = self.rx.recv() {
            match msg {
                UiMsg::Input(line) => {
                    if !self.handle_command(parse_command(&line)) {
                        break;
                    }
                }
                UiMsg::InputClosed => {
                    debug!("input closed, waiting for the active stream");
                    self.session.wait_for_idle();
                    break;
                }
                UiMsg::Session(event) => self.handle_event(event),
            }
            let _ = std::io::stdout().flush();
        }
    }

    /// Returns false when the loop should stop.
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Submit(prompt) => {
                let attachments = std::mem::take(&mut self.draft.attachments);
                match self.session.submit_with_attachments(&prompt, attachments.clone()) {
                    Ok(Submission::Started) => {}
                    Ok(Submission::Empty | Submission::Busy) => self.draft.attachments = attachments,
                    Err(e) => {
                        self.draft.attachments = attachments;
                        println!("Error: {e}");
                    }
                }
            }
            Command::Cancel => self.session.cancel(),
            Command::ShowContext => print!("{}", render_context(&self.session.context_snapshot(), "")),
            Command::ShowHistory => {
                print!("{}", render_history(self.session.history(), self.session.user()))
            }
            Command::Toggle(index) => {
                let current = self
                    .session
                    .context_snapshot()
                    .messages()
                    .get(index)
                    .map(|(_, m)| m.enabled);
                match current {
                    Some(enabled) => {
                        if let Err(e) = self.session.toggle_message_enabled(index, !enabled) {
                            println!("Error: {e}");
                        }
                    }
                    None => println!("no message {index}"),
                }
            }
            Command::Expand => self.session.toggle_context_expanded(),
            Command::Attach(path) => {
                if let Err(reason) = attach_existing(&mut self.draft, path) {
                    println!("{reason}");
                }
            }
            Command::Detach(path) => self.draft.detach(&path),
            Command::Help => println!("{HELP}"),
            Command::Invalid(reason) => println!("{reason}"),
            Command::Quit => {
                self.session.cancel();
                self.session.wait_for_idle();
                return false;
            }
        }
        true
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Notice(text) => println!("{text}"),
            SessionEvent::StreamStarted => self.last_channel = None,
            SessionEvent::Delta { channel, text } => {
                if self.last_channel != Some(channel) {
                    match channel {
                        Channel::Thinking => print!("\n(Agent is thinking...)\n\n"),
                        _ if self.last_channel.is_some() => print!("\n\n"),
                        _ => println!(),
                    }
                    self.last_channel = Some(channel);
                }
                print!("{text}");
            }
            SessionEvent::ContextChanged => {}
            SessionEvent::StreamFinished { cancelled } => {
                if cancelled {
                    print!("\n[cancelled]");
                }
                println!("\n");
            }
            SessionEvent::Error(message) => println!("\nError: {message}\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_prompt() {
        assert_eq!(
            parse_command("  what is rust? "),
            Command::Submit("  what is rust? ".to_string())
        );
    }

    #[test]
    fn slash_commands_parse() {
        assert_eq!(parse_command("/cancel"), Command::Cancel);
        assert_eq!(parse_command("/toggle 3"), Command::Toggle(3));
        assert_eq!(
            parse_command("/attach /tmp/a b.txt"),
            Command::Attach(PathBuf::from("/tmp/a b.txt"))
        );
        assert!(matches!(parse_command("/toggle x"), Command::Invalid(_)));
        assert!(matches!(parse_command("/attach"), Command::Invalid(_)));
        assert!(matches!(parse_command("/frobnicate"), Command::Invalid(_)));
    }

    #[test]
    fn attach_requires_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut draft = Message::user(String::new());

        let missing = dir.path().join("missing.txt");
        assert!(attach_existing(&mut draft, missing).is_err());
        assert!(draft.attachments.is_empty());
    }

    #[test]
    fn detach_removes_one_copy_of_a_repeated_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notes.txt");
        std::fs::write(&notes, "x").unwrap();
        let mut draft = Message::user(String::new());

        attach_existing(&mut draft, notes.clone()).unwrap();
        attach_existing(&mut draft, notes.clone()).unwrap();
        draft.detach(&notes);

        assert_eq!(draft.attachments, vec![notes]);
    }
}
