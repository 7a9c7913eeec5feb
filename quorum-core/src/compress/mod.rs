//! Context compaction (spec §4.5 prompt assembly, supplemented by Design
//! Notes): a bounded-window fallback applied only when a phase transcript
//! would not fit the model's [`crate::model_spec::ModelSpec::context_limit`].

mod config;

pub use config::CompactionConfig;

use crate::domain::Message;

/// Rough token estimate: four characters per token, the same heuristic the
/// compaction hook uses to decide whether a transcript needs trimming before
/// an accurate tokenizer count is available.
fn estimate_tokens(text: &str) -> u32 {
    (text.len() as u32 / 4).max(1)
}

fn message_tokens(msg: &Message) -> u32 {
    estimate_tokens(&msg.content) + 4
}

/// Bounds `transcript` against `context_limit`, reserving `reserve_tokens`
/// for the model's reply. Below the limit the transcript passes through
/// unchanged. Over the limit: keeps the most recent `compact_keep_recent`
/// messages verbatim and collapses everything older into a single synthetic
/// `system` summary message, so the agent executor always hands the gateway
/// a prompt it fits in `context_limit` (§4.5 step 1 "assemble messages").
pub fn compact_transcript(transcript: &[Message], context_limit: u32, config: &CompactionConfig) -> Vec<Message> {
    let reserve = config.reserve_tokens.min(context_limit);
    let budget = context_limit.saturating_sub(reserve);

    let total: u32 = transcript.iter().map(message_tokens).sum();
    if total <= budget {
        return transcript.to_vec();
    }

    let keep_from = transcript.len().saturating_sub(config.compact_keep_recent);
    let (older, recent) = transcript.split_at(keep_from);

    if older.is_empty() {
        return recent.to_vec();
    }

    let dropped_tokens: u32 = older.iter().map(message_tokens).sum();
    let summary = Message::broadcast(
        older[0].run_id.clone(),
        older[0].phase_id.clone(),
        "system",
        crate::domain::MessageKind::System,
        format!(
            "[context compacted: {} earlier messages (~{} tokens) omitted]",
            older.len(),
            dropped_tokens
        ),
    );

    let mut out = Vec::with_capacity(recent.len() + 1);
    out.push(summary);
    out.extend_from_slice(recent);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageKind;

    fn msg(content: &str) -> Message {
        Message::broadcast("r1", "p1", "alpha", MessageKind::Inform, content)
    }

    #[test]
    fn transcript_under_budget_passes_through() {
        let transcript = vec![msg("hi"), msg("there")];
        let out = compact_transcript(&transcript, 128_000, &CompactionConfig::default());
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn oversized_transcript_is_collapsed_to_summary_plus_recent() {
        let big = "x".repeat(10_000);
        let transcript: Vec<Message> = (0..50).map(|_| msg(&big)).collect();
        let config = CompactionConfig { compact_keep_recent: 5, ..CompactionConfig::default() };
        let out = compact_transcript(&transcript, 2_000, &config);
        assert_eq!(out.len(), 6);
        assert!(out[0].content.contains("context compacted"));
    }

    #[test]
    fn keep_recent_covering_whole_transcript_skips_summary() {
        let transcript = vec![msg("a"), msg("b")];
        let config = CompactionConfig { compact_keep_recent: 10, ..CompactionConfig::default() };
        let out = compact_transcript(&transcript, 1, &config);
        assert_eq!(out.len(), 2);
        assert!(!out[0].content.contains("compacted"));
    }
}
