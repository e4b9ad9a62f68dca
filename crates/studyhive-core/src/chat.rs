//! Brainstorming chat controller.
//!
//! Owns the conversation message list and drives one streamed exchange at a
//! time. The response arrives as newline-delimited JSON over a byte stream
//! whose read boundaries fall anywhere, so lines are buffered and parsed
//! only when complete; malformed lines are skipped, not fatal. A send can be
//! aborted at any point, after which no further chunks touch the message
//! list and the loading/streaming flags clear.

use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use futures_core::Stream;
use studyhive_schema::{ChatMessage, ChatRequest, ChatRole, ChatStreamChunk};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::events::EventSink;
use crate::history::{archive_chat_session, HistoryStore};

/// Most recent messages sent with one chat request.
const MAX_REQUEST_MESSAGES: usize = 32;

/// Incremental NDJSON decoder. Bytes go in, whole parsed lines come out;
/// a partial trailing line waits in the buffer for the next read.
#[derive(Default)]
pub struct NdjsonDecoder {
    buffer: String,
}

impl NdjsonDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<ChatStreamChunk> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut chunks = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<ChatStreamChunk>(line) {
                Ok(chunk) => chunks.push(chunk),
                Err(e) => tracing::debug!("skipping malformed stream line: {e}"),
            }
        }
        chunks
    }

    /// Parse whatever is left after the stream ends.
    pub fn finish(&mut self) -> Option<ChatStreamChunk> {
        let line = std::mem::take(&mut self.buffer);
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        serde_json::from_str(line).ok()
    }
}

fn new_message(role: ChatRole, content: impl Into<String>) -> ChatMessage {
    ChatMessage {
        id: uuid::Uuid::new_v4().to_string(),
        role,
        content: content.into(),
        created_at: chrono::Utc::now().timestamp_millis(),
    }
}

pub struct ChatSession {
    messages: Vec<ChatMessage>,
    session_id: String,
    loading: bool,
    streaming: bool,
    error: Option<String>,
    last_transcript_language: Option<String>,
    cancel: CancellationToken,
    events: Arc<dyn EventSink>,
    history: Arc<dyn HistoryStore>,
}

impl ChatSession {
    pub fn new(events: Arc<dyn EventSink>, history: Arc<dyn HistoryStore>) -> Self {
        Self {
            messages: Vec::new(),
            session_id: uuid::Uuid::new_v4().to_string(),
            loading: false,
            streaming: false,
            error: None,
            last_transcript_language: None,
            cancel: CancellationToken::new(),
            events,
            history,
        }
    }

    /// Append the user's message and build the wire request for this turn.
    ///
    /// Returns `None` for blank input. The request holds the 32 most recent
    /// non-system messages plus, when the last transcript was not English, a
    /// trailing language directive.
    pub fn begin_send(&mut self, text: &str) -> Option<ChatRequest> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        self.error = None;
        self.messages.push(new_message(ChatRole::User, text));

        let mut outgoing: Vec<ChatMessage> = self
            .messages
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .cloned()
            .collect();
        if outgoing.len() > MAX_REQUEST_MESSAGES {
            outgoing.drain(..outgoing.len() - MAX_REQUEST_MESSAGES);
        }
        if let Some(lang) = self
            .last_transcript_language
            .as_deref()
            .filter(|l| *l != "en")
        {
            outgoing.push(new_message(ChatRole::System, format!("Respond in {lang}.")));
        }

        self.loading = true;
        self.streaming = true;
        self.cancel = CancellationToken::new();
        Some(ChatRequest {
            messages: outgoing,
            session_id: self.session_id.clone(),
        })
    }

    /// Consume the NDJSON response body, growing the assistant message in
    /// arrival order. Stops on the terminal chunk, stream end, or abort.
    pub async fn apply_stream<S>(&mut self, body: S) -> Result<()>
    where
        S: Stream<Item = Result<Bytes>> + Unpin,
    {
        let assistant_id = {
            let msg = new_message(ChatRole::Assistant, "");
            let id = msg.id.clone();
            self.messages.push(msg);
            id
        };

        let cancel = self.cancel.clone();
        let mut body = body;
        let mut decoder = NdjsonDecoder::default();

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    self.finish_turn();
                    return Ok(());
                }
                next = body.next() => next,
            };

            let Some(read) = next else {
                break;
            };
            let bytes = match read {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.error = Some(e.to_string());
                    break;
                }
            };
            for chunk in decoder.push(&bytes) {
                if self.apply_chunk(&assistant_id, chunk) {
                    self.finish_turn();
                    return Ok(());
                }
            }
        }

        if let Some(chunk) = decoder.finish() {
            self.apply_chunk(&assistant_id, chunk);
        }
        self.finish_turn();
        Ok(())
    }

    /// Returns true when the terminal chunk arrived.
    fn apply_chunk(&mut self, assistant_id: &str, chunk: ChatStreamChunk) -> bool {
        if !chunk.content.is_empty() {
            if let Some(msg) = self.messages.iter_mut().find(|m| m.id == assistant_id) {
                msg.content.push_str(&chunk.content);
            }
        }
        if let Some(error) = chunk.error {
            self.error = Some(error);
        }
        chunk.done.unwrap_or(false)
    }

    fn finish_turn(&mut self) {
        self.loading = false;
        self.streaming = false;
    }

    /// Abort the in-flight send, if any.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Handle for aborting from another task.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Archive the conversation into local history and start a fresh
    /// session.
    pub fn clear(&mut self) {
        if !self.messages.is_empty() {
            archive_chat_session(self.history.as_ref(), &self.session_id, &self.messages);
            self.events.record(
                "clear",
                serde_json::json!({ "sessionId": self.session_id }),
            );
        }
        self.messages.clear();
        self.session_id = uuid::Uuid::new_v4().to_string();
        self.error = None;
    }

    /// Re-send the most recent user message.
    pub fn regenerate(&mut self) -> Option<ChatRequest> {
        let last_user = self
            .messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)?
            .content
            .clone();
        self.begin_send(&last_user)
    }

    /// Remember the language of the last voice transcript; non-English
    /// languages nudge the model to reply in kind.
    pub fn note_transcript_language(&mut self, language: &str) {
        self.last_transcript_language = Some(language.to_lowercase());
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEventSink;
    use crate::history::{load_chat_history, MemoryHistoryStore};
    use std::time::Duration;

    fn session() -> ChatSession {
        ChatSession::new(
            Arc::new(RecordingEventSink::default()),
            Arc::new(MemoryHistoryStore::default()),
        )
    }

    fn body(parts: Vec<&str>) -> impl Stream<Item = Result<Bytes>> + Unpin {
        tokio_stream::iter(
            parts
                .into_iter()
                .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn decoder_handles_split_lines() {
        let mut decoder = NdjsonDecoder::default();
        let first = decoder.push(b"{\"content\":\"hel");
        assert!(first.is_empty());
        let second = decoder.push(b"lo\"}\n{\"content\":\"world\"}\n");
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].content, "hello");
        assert_eq!(second[1].content, "world");
    }

    #[test]
    fn decoder_skips_malformed_lines() {
        let mut decoder = NdjsonDecoder::default();
        let chunks = decoder.push(b"garbage\n{\"content\":\"ok\"}\n{broken\n");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "ok");
    }

    #[test]
    fn decoder_finish_parses_unterminated_line() {
        let mut decoder = NdjsonDecoder::default();
        assert!(decoder.push(b"{\"content\":\"\",\"done\":true}").is_empty());
        let last = decoder.finish().unwrap();
        assert_eq!(last.done, Some(true));
    }

    #[test]
    fn begin_send_ignores_blank_and_windows_messages() {
        let mut s = session();
        assert!(s.begin_send("   ").is_none());

        for i in 0..40 {
            s.messages.push(new_message(ChatRole::User, format!("m{i}")));
        }
        let req = s.begin_send("latest").unwrap();
        assert_eq!(req.messages.len(), 32);
        assert_eq!(req.messages.last().unwrap().content, "latest");
        assert!(s.is_loading() && s.is_streaming());
    }

    #[test]
    fn begin_send_appends_language_directive() {
        let mut s = session();
        s.note_transcript_language("HI");
        let req = s.begin_send("hello").unwrap();
        let last = req.messages.last().unwrap();
        assert_eq!(last.role, ChatRole::System);
        assert_eq!(last.content, "Respond in hi.");

        s.note_transcript_language("en");
        let req = s.begin_send("again").unwrap();
        assert!(req.messages.iter().all(|m| m.role != ChatRole::System));
    }

    #[tokio::test]
    async fn apply_stream_grows_assistant_message_in_order() {
        let mut s = session();
        s.begin_send("hi").unwrap();
        s.apply_stream(body(vec![
            "{\"content\":\"Bra\"}\n{\"content\":\"instorm\"}\n",
            "{\"content\":\"ing!\"}\n",
            "{\"content\":\"\",\"done\":true}\n",
        ]))
        .await
        .unwrap();

        let assistant = s.messages().last().unwrap();
        assert_eq!(assistant.role, ChatRole::Assistant);
        assert_eq!(assistant.content, "Brainstorming!");
        assert!(!s.is_loading());
        assert!(!s.is_streaming());
        assert!(s.error().is_none());
    }

    #[tokio::test]
    async fn apply_stream_surfaces_error_chunk() {
        let mut s = session();
        s.begin_send("hi").unwrap();
        s.apply_stream(body(vec![
            "{\"content\":\"\",\"done\":true,\"error\":\"Model error\"}\n",
        ]))
        .await
        .unwrap();
        assert_eq!(s.error(), Some("Model error"));
        assert!(!s.is_streaming());
    }

    #[tokio::test(start_paused = true)]
    async fn abort_stops_applying_chunks() {
        let mut s = session();
        s.begin_send("hi").unwrap();
        let cancel = s.cancel_handle();

        let slow = Box::pin(async_stream::stream! {
            yield Ok(Bytes::from_static(b"{\"content\":\"first\"}\n"));
            tokio::time::sleep(Duration::from_secs(60)).await;
            yield Ok(Bytes::from_static(b"{\"content\":\"never\"}\n"));
        });

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });

        s.apply_stream(slow).await.unwrap();
        let assistant = s.messages().last().unwrap();
        assert_eq!(assistant.content, "first");
        assert!(!s.is_loading());
        assert!(!s.is_streaming());
    }

    #[tokio::test]
    async fn clear_archives_and_rotates_session() {
        let history = Arc::new(MemoryHistoryStore::default());
        let events = Arc::new(RecordingEventSink::default());
        let mut s = ChatSession::new(events.clone(), history.clone());
        s.begin_send("What rhymes with ocean?").unwrap();
        s.apply_stream(body(vec![
            "{\"content\":\"motion\"}\n{\"content\":\"\",\"done\":true}\n",
        ]))
        .await
        .unwrap();

        let old_id = s.session_id().to_string();
        s.clear();

        assert!(s.messages().is_empty());
        assert_ne!(s.session_id(), old_id);
        let archived = load_chat_history(history.as_ref());
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].id, old_id);
        assert_eq!(archived[0].messages.len(), 2);
        assert!(events.types().contains(&"clear".to_string()));
    }

    #[tokio::test]
    async fn clear_on_empty_session_archives_nothing() {
        let history = Arc::new(MemoryHistoryStore::default());
        let mut s = ChatSession::new(
            Arc::new(RecordingEventSink::default()),
            history.clone(),
        );
        s.clear();
        assert!(load_chat_history(history.as_ref()).is_empty());
    }

    #[test]
    fn regenerate_resends_last_user_message() {
        let mut s = session();
        s.begin_send("first question").unwrap();
        s.finish_turn();
        let req = s.regenerate().unwrap();
        assert_eq!(req.messages.last().unwrap().content, "first question");
        // The resent copy is appended to the conversation as well.
        assert_eq!(
            s.messages()
                .iter()
                .filter(|m| m.content == "first question")
                .count(),
            2
        );
    }
}
