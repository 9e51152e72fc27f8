use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::context::{Context, LoadWarning};

/// Name of the folder inside a session folder that holds its message files.
pub const CONTEXT_DIR: &str = "context";

/// Snapshot of every past conversation under one user's session root.
#[derive(Debug, Clone, Default)]
pub struct History {
    pub records: Vec<Context>,
    pub warnings: Vec<LoadWarning>,
}

impl History {
    /// Scan `user_root` once. Each subdirectory is a session folder and
    /// becomes one `Context`, in name order. A missing root gives an empty
    /// history; unreadable folders and files are skipped with a warning.
    pub fn load(user_root: &Path) -> Self {
        let mut history = History::default();
        if !user_root.exists() {
            debug!(root = %user_root.display(), "no history yet");
            return history;
        }

        let entries = match fs::read_dir(user_root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(root = %user_root.display(), error = %e, "cannot list history root");
                history.warnings.push(LoadWarning {
                    path: user_root.to_path_buf(),
                    reason: e.to_string(),
                });
                return history;
            }
        };

        let mut folders: Vec<String> = entries
            .flatten()
            // Symlinked session folders count too; a dangling link then
            // fails to list and is reported below.
            .filter(|entry| {
                entry.path().is_dir()
                    || entry.file_type().is_ok_and(|kind| kind.is_symlink())
            })
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        folders.sort();

        for name in folders {
            let folder = user_root.join(&name);
            let nested = folder.join(CONTEXT_DIR);
            let dir = if nested.is_dir() { nested } else { folder };

            let mut context = Context::new(&dir);
            context.session_id = Some(name);
            context.expanded = false;
            match context.load_from_directory(&dir) {
                Ok(warnings) => {
                    history.warnings.extend(warnings);
                    history.records.push(context);
                }
                Err(e) => {
                    warn!(folder = %dir.display(), error = %e, "skipping session folder");
                    history.warnings.push(LoadWarning {
                        path: dir,
                        reason: e.to_string(),
                    });
                }
            }
        }

        debug!(
            contexts = history.records.len(),
            warnings = history.warnings.len(),
            "history loaded"
        );
        history
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
