//! Session and conversation-history persistence.
//!
//! The session index is a JSON array of ids in `sessions.json`; each
//! session's history is a JSON array of `[role, content]` pairs in its own
//! file under the history directory. Histories are append-only and the
//! whole file is rewritten (atomically) on every append, so disk always
//! reflects memory once `append_and_save` returns. A corrupt history file
//! is reported and treated as empty, never as a crash.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::core::config::AppPaths;
use crate::core::errors::ApiError;
use crate::core::fsutil::write_atomic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One immutable entry of a conversation history, serialized as a
/// two-element `[role, content]` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(Role, String)", into = "(Role, String)")]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

impl From<(Role, String)> for Turn {
    fn from((role, content): (Role, String)) -> Self {
        Self { role, content }
    }
}

impl From<Turn> for (Role, String) {
    fn from(turn: Turn) -> Self {
        (turn.role, turn.content)
    }
}

pub struct SessionStore {
    sessions_file: PathBuf,
    history_dir: PathBuf,
    sessions: Mutex<Vec<String>>,
    histories: Mutex<HashMap<String, Vec<Turn>>>,
}

impl SessionStore {
    pub fn new(paths: &AppPaths) -> Result<Self, ApiError> {
        Self::with_paths(paths.sessions_file.clone(), paths.history_dir.clone())
    }

    pub fn with_paths(sessions_file: PathBuf, history_dir: PathBuf) -> Result<Self, ApiError> {
        fs::create_dir_all(&history_dir).map_err(ApiError::internal)?;

        let sessions = load_session_index(&sessions_file);
        Ok(Self {
            sessions_file,
            history_dir,
            sessions: Mutex::new(sessions),
            histories: Mutex::new(HashMap::new()),
        })
    }

    pub fn list_sessions(&self) -> Vec<String> {
        lock(&self.sessions).clone()
    }

    pub fn exists(&self, session_id: &str) -> bool {
        lock(&self.sessions).iter().any(|id| id == session_id)
    }

    pub fn create_session(&self, session_id: &str) -> Result<(), ApiError> {
        validate_session_id(session_id)?;

        let mut sessions = lock(&self.sessions);
        if sessions.iter().any(|id| id == session_id) {
            return Err(ApiError::DuplicateSession(session_id.to_string()));
        }

        sessions.push(session_id.to_string());
        self.persist_index(&sessions)?;
        drop(sessions);

        let empty: Vec<Turn> = Vec::new();
        self.persist_history(session_id, &empty)?;
        lock(&self.histories).insert(session_id.to_string(), empty);
        Ok(())
    }

    /// Remove the session's history file and index entry. Deleting a
    /// session that does not exist is a no-op.
    pub fn delete_session(&self, session_id: &str) -> Result<(), ApiError> {
        let mut sessions = lock(&self.sessions);
        let before = sessions.len();
        sessions.retain(|id| id != session_id);
        if sessions.len() != before {
            self.persist_index(&sessions)?;
        }
        drop(sessions);

        lock(&self.histories).remove(session_id);

        let history_path = self.history_path(session_id);
        if history_path.exists() {
            fs::remove_file(&history_path).map_err(ApiError::internal)?;
        }
        Ok(())
    }

    /// The session's history, loading from disk on first access. Missing
    /// or empty file means an empty history; a file that fails to parse is
    /// reported and treated as empty.
    pub fn load_history(&self, session_id: &str) -> Vec<Turn> {
        let mut histories = lock(&self.histories);
        if let Some(history) = histories.get(session_id) {
            return history.clone();
        }

        let history = read_history_file(&self.history_path(session_id));
        histories.insert(session_id.to_string(), history.clone());
        history
    }

    /// Append a turn and persist the full updated history before
    /// returning.
    pub fn append_and_save(&self, session_id: &str, turn: Turn) -> Result<(), ApiError> {
        let mut histories = lock(&self.histories);
        let history = histories
            .entry(session_id.to_string())
            .or_insert_with(|| read_history_file(&self.history_path(session_id)));
        history.push(turn);
        let snapshot = history.clone();
        drop(histories);

        self.persist_history(session_id, &snapshot)
    }

    fn history_path(&self, session_id: &str) -> PathBuf {
        self.history_dir.join(format!("{}.json", session_id))
    }

    fn persist_index(&self, sessions: &[String]) -> Result<(), ApiError> {
        let bytes = serde_json::to_vec_pretty(sessions).map_err(ApiError::internal)?;
        write_atomic(&self.sessions_file, &bytes).map_err(ApiError::internal)
    }

    fn persist_history(&self, session_id: &str, history: &[Turn]) -> Result<(), ApiError> {
        let bytes = serde_json::to_vec_pretty(history).map_err(ApiError::internal)?;
        write_atomic(&self.history_path(session_id), &bytes).map_err(ApiError::internal)
    }
}

fn load_session_index(path: &PathBuf) -> Vec<String> {
    if !path.exists() {
        return Vec::new();
    }

    match fs::read_to_string(path) {
        Ok(raw) if raw.trim().is_empty() => Vec::new(),
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(sessions) => sessions,
            Err(err) => {
                tracing::warn!(
                    "Session index {} is not valid JSON: {}; starting empty",
                    path.display(),
                    err
                );
                Vec::new()
            }
        },
        Err(err) => {
            tracing::warn!("Failed to read {}: {}; starting empty", path.display(), err);
            Vec::new()
        }
    }
}

fn read_history_file(path: &PathBuf) -> Vec<Turn> {
    if !path.exists() {
        return Vec::new();
    }

    match fs::read_to_string(path) {
        Ok(raw) if raw.trim().is_empty() => Vec::new(),
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(history) => history,
            Err(err) => {
                tracing::warn!(
                    "History file {} is not valid JSON: {}; treating as empty",
                    path.display(),
                    err
                );
                Vec::new()
            }
        },
        Err(err) => {
            tracing::warn!(
                "Failed to read {}: {}; treating as empty",
                path.display(),
                err
            );
            Vec::new()
        }
    }
}

fn validate_session_id(session_id: &str) -> Result<(), ApiError> {
    if session_id.trim().is_empty() {
        return Err(ApiError::BadRequest("session id must not be empty".into()));
    }
    if session_id
        .chars()
        .any(|c| c == '/' || c == '\\' || c == '.')
    {
        return Err(ApiError::BadRequest(
            "session id must not contain path separators or dots".into(),
        ));
    }
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store(dir: &std::path::Path) -> SessionStore {
        SessionStore::with_paths(dir.join("sessions.json"), dir.join("histories")).unwrap()
    }

    #[test]
    fn create_list_and_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        store.create_session("s1").unwrap();
        store.create_session("s2").unwrap();
        assert_eq!(store.list_sessions(), vec!["s1", "s2"]);

        assert!(matches!(
            store.create_session("s1"),
            Err(ApiError::DuplicateSession(_))
        ));
        assert_eq!(store.list_sessions(), vec!["s1", "s2"]);
    }

    #[test]
    fn history_round_trips_as_role_content_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        store.create_session("s1").unwrap();
        store
            .append_and_save("s1", Turn::user("hello there"))
            .unwrap();
        store
            .append_and_save("s1", Turn::assistant("hi, how can I help?"))
            .unwrap();

        let raw = fs::read_to_string(dir.path().join("histories").join("s1.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed[0][0], "user");
        assert_eq!(parsed[0][1], "hello there");
        assert_eq!(parsed[1][0], "assistant");

        // A fresh store sees the same turns.
        let reopened = open_store(dir.path());
        let history = reopened.load_history("s1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], Turn::user("hello there"));
    }

    #[test]
    fn sessions_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        store.create_session("a").unwrap();
        store.create_session("b").unwrap();
        store.append_and_save("b", Turn::user("for b only")).unwrap();

        let a_raw = fs::read_to_string(dir.path().join("histories").join("a.json")).unwrap();
        assert_eq!(a_raw.trim(), "[]");
        assert!(store.load_history("a").is_empty());
        assert_eq!(store.load_history("b").len(), 1);
    }

    #[test]
    fn delete_removes_file_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        store.create_session("s1").unwrap();
        for i in 0..5 {
            store
                .append_and_save("s1", Turn::user(format!("turn {}", i)))
                .unwrap();
        }

        let history_path = dir.path().join("histories").join("s1.json");
        assert!(history_path.exists());

        store.delete_session("s1").unwrap();
        assert!(!history_path.exists());
        assert!(store.list_sessions().is_empty());

        // Deleting again is a no-op, not an error.
        store.delete_session("s1").unwrap();
    }

    #[test]
    fn corrupt_history_is_empty_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let histories = dir.path().join("histories");
        fs::create_dir_all(&histories).unwrap();
        fs::write(histories.join("s1.json"), b"{ definitely not an array").unwrap();

        let store = open_store(dir.path());
        assert!(store.load_history("s1").is_empty());
    }

    #[test]
    fn appending_to_unknown_session_starts_from_disk_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        store.append_and_save("lazy", Turn::user("first")).unwrap();
        assert_eq!(store.load_history("lazy").len(), 1);
    }

    #[test]
    fn session_ids_with_path_tricks_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        for bad in ["", "  ", "../escape", "a/b", "a\\b", "dotted.name"] {
            assert!(matches!(
                store.create_session(bad),
                Err(ApiError::BadRequest(_))
            ));
        }
    }
}
