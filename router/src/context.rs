//! Context injection: the memory-context block assembled before every LLM
//! call and injected as the system-prompt suffix.

use assistant_core::memory::{EpisodicFilter, MemoryStore, WorkingType};
use chrono::{Duration as ChronoDuration, Utc};

const RECENT_EPISODIC_LIMIT: usize = 5;
const RECENT_EPISODIC_WINDOW_DAYS: i64 = 7;
const MIN_PREFERENCE_CONFIDENCE: f32 = 0.5;
const MIN_RULE_CONFIDENCE: f32 = 0.5;

/// Assembles the ordered memory-context block for one request. Empty
/// sections are omitted entirely; the whole block is cacheable at the
/// transport layer since it only changes between requests, not within one.
#[must_use]
pub fn build_context_block(memory: &MemoryStore, user_id: &str, session_id: &str) -> String {
    let mut sections = Vec::new();

    let working: Vec<String> = [WorkingType::CurrentProject, WorkingType::CurrentTask, WorkingType::LastAction]
        .into_iter()
        .filter_map(|wt| memory.get_working(session_id, wt).map(|e| format!("- {wt:?}: {}", e.value)))
        .collect();
    if !working.is_empty() {
        sections.push(format!("Current context:\n{}", working.join("\n")));
    }

    let mut preferences = memory.get_preferences(user_id, MIN_PREFERENCE_CONFIDENCE);
    preferences.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
    if !preferences.is_empty() {
        let lines: Vec<String> = preferences
            .iter()
            .map(|p| format!("- {} = {} (confidence {:.2})", p.key, p.value, p.confidence))
            .collect();
        sections.push(format!("Known preferences:\n{}", lines.join("\n")));
    }

    let mut applicable_rules = memory.list_rules(user_id, MIN_RULE_CONFIDENCE);
    applicable_rules.sort_by(|a, b| b.times_used.cmp(&a.times_used));
    if !applicable_rules.is_empty() {
        let lines: Vec<String> = applicable_rules
            .iter()
            .map(|r| format!("- when \"{}\" then {} (used {} times)", r.trigger, r.action_tag, r.times_used))
            .collect();
        sections.push(format!("Learned rules:\n{}", lines.join("\n")));
    }

    let since = Utc::now() - ChronoDuration::days(RECENT_EPISODIC_WINDOW_DAYS);
    let recent = memory.list_episodic(
        user_id,
        EpisodicFilter {
            time_range: Some((since, Utc::now())),
            action_type: None,
            limit: RECENT_EPISODIC_LIMIT,
        },
    );
    if !recent.is_empty() {
        let lines: Vec<String> = recent.iter().map(|e| format!("- {}: {}", e.action_type, e.description)).collect();
        sections.push(format!("Recent activity:\n{}", lines.join("\n")));
    }

    if let Some(handoff) = memory.peek_pending(session_id, "user") {
        sections.push(format!(
            "Pending disambiguation ({}): {}",
            handoff.handoff_type, handoff.payload
        ));
    }

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistant_core::config::Config;
    use assistant_core::testing::fake_embedder;
    use assistant_core::types::PreferenceSource;
    use std::collections::HashMap;

    #[test]
    fn empty_store_yields_empty_block() {
        let memory = MemoryStore::new(fake_embedder(), Config::default());
        assert_eq!(build_context_block(&memory, "u1", "s1"), "");
    }

    #[test]
    fn working_memory_and_preferences_are_included() {
        let memory = MemoryStore::new(fake_embedder(), Config::default());
        memory.set_working("s1", WorkingType::CurrentTask, "Write docs".to_string(), HashMap::new());
        memory.upsert_preference("u1", "tone", "terse".to_string(), PreferenceSource::Explicit, 0.9);

        let block = build_context_block(&memory, "u1", "s1");
        assert!(block.contains("Write docs"));
        assert!(block.contains("tone = terse"));
    }

    #[test]
    fn low_confidence_preference_is_excluded() {
        let memory = MemoryStore::new(fake_embedder(), Config::default());
        memory.upsert_preference("u1", "tone", "terse".to_string(), PreferenceSource::Inferred, 0.2);
        let block = build_context_block(&memory, "u1", "s1");
        assert!(!block.contains("tone"));
    }
}
