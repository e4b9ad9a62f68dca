//! Rolling context for the brainstorming chat.
//!
//! Bounds the prompt sent to the model regardless of conversation length:
//! short histories pass through untouched, long ones keep a recent tail and
//! compress everything older into a single system note. Older turns are never
//! dropped silently, only compressed.

use studyhive_provider::LlmMessage;

pub const SYSTEM_BRAINSTORM_PROMPT: &str = "You are a collaborative study buddy for brainstorming and discussion. Keep replies clear, focused, and helpful. Maintain context from previous messages. Ask a brief clarifying question only when ambiguity blocks progress. No code unless asked. No external links unless explicitly requested. Text only.";

/// Most messages the uncompressed tail may hold.
const MAX_TAIL_MESSAGES: usize = 16;
/// Upper bound on cumulative tail characters, a crude proxy for ~8k tokens.
const MAX_TAIL_CHARS: usize = 8000;
/// Per-message cap inside the compressed transcript.
const SUMMARY_LINE_CHARS: usize = 280;

const SUMMARY_HEADER: &str = "Context summary (earlier turns, compressed):";

/// Build the message list submitted to the model for one chat turn.
///
/// `history` is the conversation in order, user and assistant roles only;
/// the system prompt is injected here, never stored.
pub fn build_rolling_context(history: &[LlmMessage]) -> Vec<LlmMessage> {
    let total_chars: usize = history.iter().map(|m| m.content.chars().count()).sum();
    if history.len() <= MAX_TAIL_MESSAGES && total_chars < MAX_TAIL_CHARS {
        let mut out = Vec::with_capacity(history.len() + 1);
        out.push(LlmMessage::system(SYSTEM_BRAINSTORM_PROMPT));
        out.extend(history.iter().cloned());
        return out;
    }

    // Greedy backward scan: include messages into the tail while both bounds
    // hold, stopping at the first message that would violate either.
    let mut tail_start = history.len();
    let mut tail_chars = 0usize;
    for (i, msg) in history.iter().enumerate().rev() {
        let len = msg.content.chars().count();
        if history.len() - tail_start < MAX_TAIL_MESSAGES && tail_chars + len < MAX_TAIL_CHARS {
            tail_start = i;
            tail_chars += len;
        } else {
            break;
        }
    }

    let (older, tail) = history.split_at(tail_start);
    let summary = older
        .iter()
        .map(|m| {
            let prefix = if m.role == "user" { "U" } else { "A" };
            format!("{prefix}: {}", truncate(&m.content, SUMMARY_LINE_CHARS))
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut out = Vec::with_capacity(tail.len() + 2);
    out.push(LlmMessage::system(SYSTEM_BRAINSTORM_PROMPT));
    out.push(LlmMessage::system(format!("{SUMMARY_HEADER}\n{summary}")));
    out.extend(tail.iter().cloned());
    out
}

fn truncate(s: &str, n: usize) -> String {
    if s.chars().count() > n {
        let cut: String = s.chars().take(n - 1).collect();
        format!("{cut}…")
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msgs(n: usize, len: usize) -> Vec<LlmMessage> {
        (0..n)
            .map(|i| {
                let content = "x".repeat(len);
                if i % 2 == 0 {
                    LlmMessage::user(content)
                } else {
                    LlmMessage::assistant(content)
                }
            })
            .collect()
    }

    #[test]
    fn short_history_passes_through() {
        let history = msgs(5, 10);
        let out = build_rolling_context(&history);
        assert_eq!(out.len(), 6);
        assert_eq!(out[0].role, "system");
        assert_eq!(out[0].content, SYSTEM_BRAINSTORM_PROMPT);
        assert_eq!(&out[1..], &history[..]);
    }

    #[test]
    fn long_history_gets_single_summary_and_bounded_tail() {
        let history = msgs(30, 1000);
        let out = build_rolling_context(&history);

        let system_count = out.iter().filter(|m| m.role == "system").count();
        assert_eq!(system_count, 2);
        assert!(out[1].content.starts_with(SUMMARY_HEADER));

        let tail = &out[2..];
        assert!(tail.len() <= 16);
        let tail_chars: usize = tail.iter().map(|m| m.content.chars().count()).sum();
        assert!(tail_chars < 8000);

        // 7 x 1000 chars fit under 8000; the 8th would not
        assert_eq!(tail.len(), 7);
        assert_eq!(out.len(), 2 + 7);
    }

    #[test]
    fn message_count_bound_triggers_summary() {
        // 17 tiny messages: char bound holds but the count bound does not
        let history = msgs(17, 5);
        let out = build_rolling_context(&history);
        assert!(out[1].content.starts_with(SUMMARY_HEADER));
        assert_eq!(out.len(), 2 + 16);
    }

    #[test]
    fn summary_lines_are_truncated_and_prefixed() {
        let mut history = msgs(16, 10);
        history.insert(0, LlmMessage::user("y".repeat(500)));
        let out = build_rolling_context(&history);

        let summary = &out[1].content;
        let line = summary.lines().nth(1).unwrap();
        assert!(line.starts_with("U: "));
        assert!(line.ends_with('…'));
        assert_eq!(line.chars().count(), 3 + 280);
    }

    #[test]
    fn tail_preserves_most_recent_messages_in_order() {
        let history: Vec<LlmMessage> = (0..20)
            .map(|i| LlmMessage::user(format!("message {i} {}", "p".repeat(600))))
            .collect();
        let out = build_rolling_context(&history);
        let tail = &out[2..];
        let last = &tail[tail.len() - 1];
        assert!(last.content.starts_with("message 19"));
        // Order within the tail matches history order
        let indices: Vec<usize> = tail
            .iter()
            .map(|m| {
                m.content
                    .split_whitespace()
                    .nth(1)
                    .unwrap()
                    .parse()
                    .unwrap()
            })
            .collect();
        let mut sorted = indices.clone();
        sorted.sort_unstable();
        assert_eq!(indices, sorted);
    }
}
