use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use crate::error::storage::StorageError;
use crate::types::message::{Message, MessageRecord, ModelMessage, Role};

/// A message file that could not be loaded. Loading continues without it.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadWarning {
    pub path: PathBuf,
    pub reason: String,
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "skipped {}: {}", self.path.display(), self.reason)
    }
}

/// One conversation: timestamped messages in the order they were added,
/// backed by a directory with one JSON file per message.
#[derive(Debug, Clone)]
pub struct Context {
    messages: Vec<(DateTime<Utc>, Message)>,
    pub session_id: Option<String>,
    storage_directory: PathBuf,
    pub expanded: bool,
}

impl Context {
    pub fn new(storage_directory: impl Into<PathBuf>) -> Self {
        Self {
            messages: Vec::new(),
            session_id: None,
            storage_directory: storage_directory.into(),
            expanded: true,
        }
    }

    pub fn storage_directory(&self) -> &Path {
        &self.storage_directory
    }

    pub fn messages(&self) -> &[(DateTime<Utc>, Message)] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn toggle_expanded(&mut self) {
        self.expanded = !self.expanded;
    }

    /// Current time, nudged forward so it is strictly after the last message.
    /// Two messages of one context never share a file name.
    pub fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.messages.last() {
            Some((last, _)) if now <= *last => *last + TimeDelta::microseconds(1),
            _ => now,
        }
    }

    /// Append a message, writing it to the storage directory first if it has
    /// never been persisted. On a write failure nothing is appended.
    ///
    /// An existing file is never overwritten: the timestamp is moved forward
    /// by one microsecond until its file name is free.
    pub fn add_message(
        &mut self,
        mut timestamp: DateTime<Utc>,
        mut message: Message,
    ) -> Result<(), StorageError> {
        if message.backing_file.is_none() {
            let mut path = self
                .storage_directory
                .join(message_file_name(timestamp, message.role));
            while path.exists() {
                timestamp += TimeDelta::microseconds(1);
                path = self
                    .storage_directory
                    .join(message_file_name(timestamp, message.role));
            }
            let mut record = message.serialize();
            record.file = Some(path.clone());
            write_record(&path, &record)?;
            debug!(path = %path.display(), "persisted message");
            message.backing_file = Some(path);
        }
        self.messages.push((timestamp, message));
        Ok(())
    }

    /// Flip a message's enabled flag and rewrite its file so disk matches.
    pub fn set_enabled(&mut self, index: usize, enabled: bool) -> Result<(), StorageError> {
        let (_, message) = self
            .messages
            .get_mut(index)
            .ok_or(StorageError::MissingMessage(index))?;
        if message.enabled == enabled {
            return Ok(());
        }
        message.enabled = enabled;
        if let Some(path) = message.backing_file.clone() {
            if let Err(e) = write_record(&path, &message.serialize()) {
                message.enabled = !enabled;
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn enabled_records(&self) -> Vec<MessageRecord> {
        self.messages
            .iter()
            .filter(|(_, m)| m.enabled)
            .map(|(_, m)| m.serialize())
            .collect()
    }

    /// JSON array of the enabled messages' records, in conversation order.
    pub fn serialize_enabled(&self) -> Result<String, StorageError> {
        serde_json::to_string(&self.enabled_records())
            .map_err(|e| StorageError::Encode(e.to_string()))
    }

    /// Enabled messages in the form the model server expects.
    pub fn model_request_messages(&self) -> Vec<ModelMessage> {
        self.messages
            .iter()
            .filter(|(_, m)| m.enabled)
            .map(|(_, m)| m.to_model_request_form())
            .collect()
    }

    /// Append every message file in `dir`, oldest first. The storage
    /// directory becomes `dir`. Files that cannot be read or parsed are
    /// skipped and reported back.
    pub fn load_from_directory(&mut self, dir: &Path) -> Result<Vec<LoadWarning>, StorageError> {
        self.storage_directory = dir.to_path_buf();

        let entries = fs::read_dir(dir).map_err(|e| StorageError::Read {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;

        let mut files: Vec<(String, DateTime<Utc>)> = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some((timestamp, _)) = parse_message_file_name(&name) {
                files.push((name, timestamp));
            }
        }
        // Legacy names have variable-width fractions, so order by time first.
        files.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let mut warnings = Vec::new();
        for (name, timestamp) in files {
            let path = dir.join(&name);
            match read_record(&path) {
                Ok(record) => {
                    let message = Message::from_record(record, Some(path));
                    self.messages.push((timestamp, message));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping message file");
                    warnings.push(LoadWarning {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(warnings)
    }
}

/// `<epoch seconds>.<6-digit micros>_<role>.json`. The fraction is fixed
/// width so names sort in time order.
pub fn message_file_name(timestamp: DateTime<Utc>, role: Role) -> String {
    format!(
        "{}.{:06}_{}.json",
        timestamp.timestamp(),
        timestamp.timestamp_subsec_micros(),
        role
    )
}

/// Timestamp and role tag of a message file name, or `None` when the name
/// does not follow the scheme. Fractions of any length up to nanoseconds are
/// accepted.
pub fn parse_message_file_name(name: &str) -> Option<(DateTime<Utc>, &str)> {
    let stem = name.strip_suffix(".json")?;
    let (stamp, role) = stem.split_once('_')?;
    if role.is_empty() {
        return None;
    }

    let (secs, fraction) = match stamp.split_once('.') {
        Some((secs, fraction)) => (secs, fraction),
        None => (stamp, ""),
    };
    if secs.is_empty() || !secs.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if fraction.len() > 9 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let secs: i64 = secs.parse().ok()?;
    let nanos: u32 = if fraction.is_empty() {
        0
    } else {
        format!("{fraction:0<9}").parse().ok()?
    };
    let timestamp = DateTime::from_timestamp(secs, nanos)?;
    Some((timestamp, role))
}

fn read_record(path: &Path) -> Result<MessageRecord, StorageError> {
    let text = fs::read_to_string(path).map_err(|e| StorageError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| StorageError::Decode {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Write to a sibling temp file, then rename over the target.
fn write_record(path: &Path, record: &MessageRecord) -> Result<(), StorageError> {
    let bytes =
        serde_json::to_vec_pretty(record).map_err(|e| StorageError::Encode(e.to_string()))?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, &bytes).map_err(|e| StorageError::Write {
        path: tmp.display().to_string(),
        message: e.to_string(),
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        StorageError::Write {
            path: path.display().to_string(),
            message: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_uses_fixed_width_fraction() {
        let ts = DateTime::from_timestamp(1_769_529_115, 19_000).unwrap();
        assert_eq!(
            message_file_name(ts, Role::User),
            "1769529115.000019_user.json"
        );
    }

    #[test]
    fn parses_legacy_variable_width_names() {
        let (ts, role) = parse_message_file_name("1769529115.019496_user.json").unwrap();
        assert_eq!(ts.timestamp(), 1_769_529_115);
        assert_eq!(ts.timestamp_subsec_micros(), 19_496);
        assert_eq!(role, "user");

        let (ts, _) = parse_message_file_name("1769529115.5_assistant.json").unwrap();
        assert_eq!(ts.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn rejects_names_outside_the_scheme() {
        assert!(parse_message_file_name("notes.json").is_none());
        assert!(parse_message_file_name("1769529115.1_user.json.tmp").is_none());
        assert!(parse_message_file_name("abc.1_user.json").is_none());
        assert!(parse_message_file_name("1769529115.1_.json").is_none());
    }

    #[test]
    fn next_timestamp_is_strictly_increasing() {
        let dir = tempfile::tempdir().unwrap();
        let mut context = Context::new(dir.path());
        let future = Utc::now() + TimeDelta::seconds(60);
        context.add_message(future, Message::user("a")).unwrap();
        assert!(context.next_timestamp() > future);
    }
}
