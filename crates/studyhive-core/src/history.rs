//! Bounded local history stores.
//!
//! The application has no server-side source of truth: quizzes, chat
//! sessions and Q&A history live only in a small client-local key-value
//! store. The store surface is synchronous and infallible — corrupted or
//! missing data loads as empty, write failures are swallowed — so history
//! can never take down the primary flow.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use studyhive_schema::{ChatMessage, ChatRole, ChatSessionHistoryEntry, QaHistoryEntry, Quiz};

pub const QUIZ_HISTORY_KEY: &str = "quiz_history_v1";
pub const CHAT_HISTORY_KEY: &str = "chat_sessions_v1";
pub const QA_HISTORY_KEY: &str = "qa_history_v1";

pub const MAX_QUIZ_HISTORY: usize = 50;
pub const MAX_CHAT_SESSIONS: usize = 10;
pub const MAX_QA_HISTORY: usize = 200;

const CHAT_TITLE_CHARS: usize = 60;

pub trait HistoryStore: Send + Sync {
    fn load_raw(&self, key: &str) -> Option<String>;
    fn save_raw(&self, key: &str, raw: &str);
}

/// Deserialize a stored list, degrading to empty on any failure.
pub fn load_list<T: DeserializeOwned>(store: &dyn HistoryStore, key: &str) -> Vec<T> {
    store
        .load_raw(key)
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default()
}

/// Persist at most `max` entries; serialization failures are swallowed.
pub fn save_list<T: Serialize>(store: &dyn HistoryStore, key: &str, items: &[T], max: usize) {
    let bounded = &items[..items.len().min(max)];
    if let Ok(raw) = serde_json::to_string(bounded) {
        store.save_raw(key, &raw);
    }
}

/// One JSON file per key under a data directory.
pub struct FileHistoryStore {
    dir: PathBuf,
}

impl FileHistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl HistoryStore for FileHistoryStore {
    fn load_raw(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(key)).ok()
    }

    fn save_raw(&self, key: &str, raw: &str) {
        if std::fs::create_dir_all(&self.dir).is_err() {
            return;
        }
        if let Err(e) = std::fs::write(self.path_for(key), raw) {
            tracing::debug!("history write failed for {key}: {e}");
        }
    }
}

#[derive(Default)]
pub struct MemoryHistoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl HistoryStore for MemoryHistoryStore {
    fn load_raw(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn save_raw(&self, key: &str, raw: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), raw.to_string());
        }
    }
}

// ============================================================
// Typed helpers
// ============================================================

pub fn load_quiz_history(store: &dyn HistoryStore) -> Vec<Quiz> {
    load_list(store, QUIZ_HISTORY_KEY)
}

/// Newest first, bounded to [`MAX_QUIZ_HISTORY`].
pub fn push_quiz_history(store: &dyn HistoryStore, quiz: &Quiz) {
    let mut list = load_quiz_history(store);
    list.insert(0, quiz.clone());
    save_list(store, QUIZ_HISTORY_KEY, &list, MAX_QUIZ_HISTORY);
}

pub fn load_qa_history(store: &dyn HistoryStore) -> Vec<QaHistoryEntry> {
    load_list(store, QA_HISTORY_KEY)
}

pub fn push_qa_history(store: &dyn HistoryStore, entry: &QaHistoryEntry) {
    let mut list = load_qa_history(store);
    list.insert(0, entry.clone());
    save_list(store, QA_HISTORY_KEY, &list, MAX_QA_HISTORY);
}

pub fn load_chat_history(store: &dyn HistoryStore) -> Vec<ChatSessionHistoryEntry> {
    load_list(store, CHAT_HISTORY_KEY)
}

/// Insert or replace a session entry, keeping the list ordered by
/// `updated_at` descending and bounded to [`MAX_CHAT_SESSIONS`].
pub fn upsert_chat_session(store: &dyn HistoryStore, entry: ChatSessionHistoryEntry) {
    let mut list = load_chat_history(store);
    match list.iter_mut().find(|s| s.id == entry.id) {
        Some(existing) => *existing = entry,
        None => list.insert(0, entry),
    }
    list.sort_by_key(|s| std::cmp::Reverse(s.updated_at));
    save_list(store, CHAT_HISTORY_KEY, &list, MAX_CHAT_SESSIONS);
}

/// Archive a finished conversation. System messages are dropped; the title
/// is the first user message cut to 60 characters.
pub fn archive_chat_session(store: &dyn HistoryStore, session_id: &str, messages: &[ChatMessage]) {
    let kept: Vec<ChatMessage> = messages
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .cloned()
        .collect();
    let title = kept
        .iter()
        .find(|m| m.role == ChatRole::User)
        .map(|m| m.content.chars().take(CHAT_TITLE_CHARS).collect())
        .unwrap_or_else(|| "Session".to_string());
    let now = chrono::Utc::now().timestamp_millis();
    upsert_chat_session(
        store,
        ChatSessionHistoryEntry {
            id: session_id.to_string(),
            created_at: now,
            updated_at: now,
            messages: kept,
            title: Some(title),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use studyhive_schema::{Level, Locale};

    fn quiz(id: &str) -> Quiz {
        Quiz {
            id: id.into(),
            topic: "Fractions".into(),
            level: Level::Beginner,
            locale: Locale::En,
            created_at: 1,
            questions: vec![],
        }
    }

    fn msg(role: ChatRole, content: &str) -> ChatMessage {
        ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            created_at: 1,
        }
    }

    #[test]
    fn corrupt_data_loads_as_empty() {
        let store = MemoryHistoryStore::default();
        store.save_raw(QUIZ_HISTORY_KEY, "{not json");
        assert!(load_quiz_history(&store).is_empty());
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHistoryStore::new(dir.path());
        assert!(load_quiz_history(&store).is_empty());
    }

    #[test]
    fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHistoryStore::new(dir.path().join("data"));
        push_quiz_history(&store, &quiz("a"));
        push_quiz_history(&store, &quiz("b"));
        let list = load_quiz_history(&store);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, "b");
    }

    #[test]
    fn quiz_history_is_bounded() {
        let store = MemoryHistoryStore::default();
        for i in 0..55 {
            push_quiz_history(&store, &quiz(&i.to_string()));
        }
        let list = load_quiz_history(&store);
        assert_eq!(list.len(), MAX_QUIZ_HISTORY);
        assert_eq!(list[0].id, "54");
    }

    #[test]
    fn chat_archive_drops_system_and_derives_title() {
        let store = MemoryHistoryStore::default();
        let long = "a".repeat(80);
        let messages = vec![
            msg(ChatRole::System, "Respond in hi."),
            msg(ChatRole::User, &long),
            msg(ChatRole::Assistant, "reply"),
        ];
        archive_chat_session(&store, "s1", &messages);
        let list = load_chat_history(&store);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].messages.len(), 2);
        assert!(list[0]
            .messages
            .iter()
            .all(|m| m.role != ChatRole::System));
        assert_eq!(list[0].title.as_ref().unwrap().chars().count(), 60);
    }

    #[test]
    fn chat_sessions_bounded_and_sorted_by_recency() {
        let store = MemoryHistoryStore::default();
        for i in 0..12 {
            upsert_chat_session(
                &store,
                ChatSessionHistoryEntry {
                    id: format!("s{i}"),
                    created_at: i,
                    updated_at: i,
                    messages: vec![],
                    title: None,
                },
            );
        }
        let list = load_chat_history(&store);
        assert_eq!(list.len(), MAX_CHAT_SESSIONS);
        assert_eq!(list[0].id, "s11");
        assert_eq!(list.last().unwrap().id, "s2");
    }

    #[test]
    fn upsert_replaces_existing_session() {
        let store = MemoryHistoryStore::default();
        let entry = ChatSessionHistoryEntry {
            id: "s1".into(),
            created_at: 1,
            updated_at: 1,
            messages: vec![],
            title: Some("old".into()),
        };
        upsert_chat_session(&store, entry.clone());
        upsert_chat_session(
            &store,
            ChatSessionHistoryEntry {
                updated_at: 2,
                title: Some("new".into()),
                ..entry
            },
        );
        let list = load_chat_history(&store);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title.as_deref(), Some("new"));
    }

    #[test]
    fn qa_history_keeps_failed_attempts() {
        let store = MemoryHistoryStore::default();
        let entry = QaHistoryEntry {
            id: "h1".into(),
            timestamp: 1,
            request: studyhive_schema::AskQuestionRequest {
                question: "Why is the sky blue?".into(),
                level: Level::Beginner,
                locale: Locale::En,
            },
            response: None,
        };
        push_qa_history(&store, &entry);
        let list = load_qa_history(&store);
        assert_eq!(list.len(), 1);
        assert!(list[0].response.is_none());
    }
}
