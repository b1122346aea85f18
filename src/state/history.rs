//! Conversation history: an append-only, line-delimited log pruned to at
//! most `MAX_HISTORY_MESSAGES` (spec §4.8), separate from `ProjectState`.

use crate::errors::PersistError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

pub struct ConversationHistory {
    path: PathBuf,
    max_messages: usize,
}

impl ConversationHistory {
    pub fn new(path: PathBuf, max_messages: usize) -> Self {
        Self { path, max_messages }
    }

    pub fn append(&self, message: HistoryMessage) -> Result<(), PersistError> {
        let mut messages = self.read_all()?;
        messages.push(message);
        self.prune_and_write(&mut messages)
    }

    pub fn read_all(&self) -> Result<Vec<HistoryMessage>, PersistError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| PersistError::Read {
            path: self.path.clone(),
            source: e,
        })?;
        let messages = content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str::<HistoryMessage>(l).ok())
            .collect();
        Ok(messages)
    }

    /// Keep the first message (conventionally the system prompt) plus the
    /// most recent `max_messages - 1` messages (spec §4.8).
    fn prune_and_write(&self, messages: &mut Vec<HistoryMessage>) -> Result<(), PersistError> {
        if messages.len() > self.max_messages && self.max_messages > 0 {
            let first = messages[0].clone();
            let keep_recent = self.max_messages - 1;
            let tail_start = messages.len() - keep_recent;
            let mut pruned = Vec::with_capacity(self.max_messages);
            pruned.push(first);
            pruned.extend_from_slice(&messages[tail_start..]);
            *messages = pruned;
        }

        let mut out = String::new();
        for m in messages.iter() {
            out.push_str(&serde_json::to_string(m).map_err(PersistError::Parse)?);
            out.push('\n');
        }

        let tmp_path = self.path.with_extension("jsonl.tmp");
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| PersistError::Write {
                path: self.path.clone(),
                source: e,
            })?;
        }
        {
            let mut f = fs::File::create(&tmp_path).map_err(|e| PersistError::Write {
                path: tmp_path.clone(),
                source: e,
            })?;
            f.write_all(out.as_bytes()).map_err(|e| PersistError::Write {
                path: tmp_path.clone(),
                source: e,
            })?;
        }
        fs::rename(&tmp_path, &self.path).map_err(|e| PersistError::Write {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn msg(role: &str, content: &str) -> HistoryMessage {
        HistoryMessage {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn appends_and_reads_back() {
        let dir = tempdir().unwrap();
        let history = ConversationHistory::new(dir.path().join("conversation_history.jsonl"), 50);
        history.append(msg("system", "you are helpful")).unwrap();
        history.append(msg("user", "hello")).unwrap();
        let messages = history.read_all().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
    }

    #[test]
    fn prunes_to_first_plus_most_recent_49() {
        let dir = tempdir().unwrap();
        let history = ConversationHistory::new(dir.path().join("h.jsonl"), 50);
        history.append(msg("system", "prompt")).unwrap();
        for i in 0..60 {
            history.append(msg("user", &format!("msg-{i}"))).unwrap();
        }
        let messages = history.read_all().unwrap();
        assert_eq!(messages.len(), 50);
        assert_eq!(messages[0].content, "prompt");
        assert_eq!(messages.last().unwrap().content, "msg-59");
    }

    #[test]
    fn exactly_at_limit_is_not_pruned() {
        let dir = tempdir().unwrap();
        let history = ConversationHistory::new(dir.path().join("h.jsonl"), 5);
        for i in 0..5 {
            history.append(msg("user", &format!("m{i}"))).unwrap();
        }
        assert_eq!(history.read_all().unwrap().len(), 5);
    }
}
