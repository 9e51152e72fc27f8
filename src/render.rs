//! Plain-text transcript tree: the terminal stand-in for the foldable
//! context and history panes.

use std::fmt::Write;

use crate::context::Context;
use crate::history::History;
use crate::types::message::Message;

const PREVIEW_CHARS: usize = 40;

fn fold_marker(expanded: bool) -> &'static str {
    if expanded { "▼" } else { "▶" }
}

/// `[x] 🤖  That is a great question...` plus one line per attachment.
pub fn render_message(out: &mut String, index: usize, message: &Message, indent: &str) {
    let check = if message.enabled { "x" } else { " " };
    let _ = writeln!(
        out,
        "{indent}{index:>3} [{check}] {}  {}",
        message.role.icon(),
        message.preview(PREVIEW_CHARS)
    );
    for attachment in &message.attachments {
        let name = attachment
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| attachment.display().to_string());
        let _ = writeln!(out, "{indent}          📁 {name}");
    }
}

pub fn render_context(context: &Context, indent: &str) -> String {
    let mut out = String::new();
    let label = context.session_id.as_deref().unwrap_or("Context");
    let _ = writeln!(
        out,
        "{indent}{}  {label} ({} messages)",
        fold_marker(context.expanded),
        context.len()
    );
    if context.expanded {
        let inner = format!("{indent}    ");
        for (index, (_, message)) in context.messages().iter().enumerate() {
            render_message(&mut out, index, message, &inner);
        }
    }
    out
}

pub fn render_history(history: &History, user: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "▼ {user} History ({} contexts)", history.len());
    for context in &history.records {
        out.push_str(&render_context(context, "    "));
    }
    if !history.warnings.is_empty() {
        let _ = writeln!(out, "    ({} files could not be loaded)", history.warnings.len());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn collapsed_context_shows_only_header() {
        let dir = tempfile::tempdir().unwrap();
        let mut context = Context::new(dir.path());
        context
            .add_message(Utc::now(), Message::user("hello"))
            .unwrap();
        context.expanded = false;

        let text = render_context(&context, "");
        assert_eq!(text, "▶  Context (1 messages)\n");
    }

    #[test]
    fn expanded_context_lists_messages_with_flags() {
        let dir = tempfile::tempdir().unwrap();
        let mut context = Context::new(dir.path());
        let mut question = Message::user("What does this file do? It is rather long, honestly");
        question.attach("/tmp/notes/plan.txt");
        context.add_message(Utc::now(), question).unwrap();
        context
            .add_message(context.next_timestamp(), Message::thinking_accumulator())
            .unwrap();

        let text = render_context(&context, "");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].contains("[x] 👤  What does this file do? It is rather lon..."));
        assert!(lines[2].ends_with("📁 plan.txt"));
        assert!(lines[3].contains("[ ] 🤖"));
    }
}
