//! Tier 1: `PatternMatcher` — a prioritized ordered regex cascade.
//!
//! Pure and deterministic: no I/O, never touches the LLM or an external
//! service. Scans rules in a mandatory priority order and returns the first
//! match; never raises, returns `None` on no match.

use regex::Regex;
use std::sync::OnceLock;

use crate::command::{Command, Filters, SearchMode, TaskPriority, TaskStatus, Temporal};

/// One compiled rule: a regex plus which priority tier it belongs to. The
/// tier number exists purely for tests that assert ordering; matching
/// itself is governed by `RULES`' declaration order.
struct Rule {
    tier: u8,
    regex: &'static Regex,
    build: fn(&regex::Captures<'_>) -> Command,
}

macro_rules! static_regex {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pat).expect("valid pattern regex"))
        }
    };
}

// Tier 1: action verbs, checked first so "I finished X" never falls through
// to a status filter just because it contains "finished".
static_regex!(
    re_complete,
    r"(?i)^\s*(?:i\s+(?:just\s+)?)?(?:finished|completed|complete|mark(?:ed)?)\s+(?:the\s+)?(.+?)(?:\s+as\s+(?:done|complete))?\s*[\.!]?\s*$"
);
static_regex!(
    re_start,
    r"(?i)^\s*(?:i\s+(?:just\s+)?)?(?:start(?:ed|ing)?|begin|began|beginning)\s+(?:on\s+|the\s+)?(.+?)\s*[\.!]?\s*$"
);

// Tier 2: temporal filters.
static_regex!(re_today, r"(?i)\b(today)\b");
static_regex!(re_this_week, r"(?i)\b(this\s+week)\b");
static_regex!(re_yesterday, r"(?i)\b(yesterday)\b");

// Tier 3: explicit project-detail lookup.
static_regex!(
    re_show_project,
    r#"(?i)\bshow\s+(?:me\s+)?(?:the\s+)?(.+?)\s+project\b"#
);

// Tier 4: compound filter (assignee + status).
static_regex!(
    re_compound,
    r"(?i)\bassigned\s+to\s+(\w+).*?\b(todo|in[\s_-]?progress|done)\b"
);

// Tier 5: single-attribute filters.
static_regex!(re_status_word, r"(?i)\b(todo|in[\s_-]?progress|done)\b");
static_regex!(re_priority_word, r"(?i)\b(low|medium|high)\s+priority\b");

// Tier 6: list-all projects.
static_regex!(re_list_projects, r"(?i)\b(?:list|show|all)\s+projects\b");

// Tier 7: general status ("what's in progress" reads as status already
// above; general status covers a bare "tasks"/"my tasks" utterance).
static_regex!(re_general_tasks, r"(?i)\b(?:my\s+)?tasks\b");

// Tier 8: open search fallback.
static_regex!(re_search, r"(?i)\b(?:search|find|look\s+for)\b\s+(?:for\s+)?(.+)$");

fn normalize_status(s: &str) -> TaskStatus {
    match s.to_lowercase().replace(['-', ' '], "_").as_str() {
        "todo" => TaskStatus::Todo,
        "done" => TaskStatus::Done,
        _ => TaskStatus::InProgress,
    }
}

fn build_complete(caps: &regex::Captures<'_>) -> Command {
    Command::CompleteTask {
        reference: caps[1].trim().to_string(),
    }
}
fn build_start(caps: &regex::Captures<'_>) -> Command {
    Command::StartTask {
        reference: caps[1].trim().to_string(),
    }
}
fn build_today(_: &regex::Captures<'_>) -> Command {
    Command::Tasks {
        filters: Filters {
            temporal: Some(Temporal::Today),
            ..Default::default()
        },
    }
}
fn build_this_week(_: &regex::Captures<'_>) -> Command {
    Command::Tasks {
        filters: Filters {
            temporal: Some(Temporal::ThisWeek),
            ..Default::default()
        },
    }
}
fn build_yesterday(_: &regex::Captures<'_>) -> Command {
    Command::Tasks {
        filters: Filters {
            temporal: Some(Temporal::Yesterday),
            ..Default::default()
        },
    }
}
fn build_show_project(caps: &regex::Captures<'_>) -> Command {
    Command::Projects {
        filters: Filters {
            project: Some(caps[1].trim().to_string()),
            ..Default::default()
        },
    }
}
fn build_compound(caps: &regex::Captures<'_>) -> Command {
    Command::Tasks {
        filters: Filters {
            assignee: Some(caps[1].to_string()),
            status: Some(normalize_status(&caps[2])),
            ..Default::default()
        },
    }
}
fn build_status(caps: &regex::Captures<'_>) -> Command {
    Command::Tasks {
        filters: Filters {
            status: Some(normalize_status(&caps[1])),
            ..Default::default()
        },
    }
}
fn build_priority(caps: &regex::Captures<'_>) -> Command {
    let priority = match caps[1].to_lowercase().as_str() {
        "low" => TaskPriority::Low,
        "high" => TaskPriority::High,
        _ => TaskPriority::Medium,
    };
    Command::Tasks {
        filters: Filters {
            priority: Some(priority),
            ..Default::default()
        },
    }
}
fn build_list_projects(_: &regex::Captures<'_>) -> Command {
    Command::Projects {
        filters: Filters::default(),
    }
}
fn build_general_tasks(_: &regex::Captures<'_>) -> Command {
    Command::Tasks {
        filters: Filters::default(),
    }
}
fn build_search(caps: &regex::Captures<'_>) -> Command {
    Command::Search {
        query: caps[1].trim().to_string(),
        mode: SearchMode::Hybrid,
    }
}

fn rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            Rule { tier: 1, regex: re_complete(), build: build_complete },
            Rule { tier: 1, regex: re_start(), build: build_start },
            Rule { tier: 2, regex: re_today(), build: build_today },
            Rule { tier: 2, regex: re_this_week(), build: build_this_week },
            Rule { tier: 2, regex: re_yesterday(), build: build_yesterday },
            Rule { tier: 3, regex: re_show_project(), build: build_show_project },
            Rule { tier: 4, regex: re_compound(), build: build_compound },
            Rule { tier: 5, regex: re_status_word(), build: build_status },
            Rule { tier: 5, regex: re_priority_word(), build: build_priority },
            Rule { tier: 6, regex: re_list_projects(), build: build_list_projects },
            Rule { tier: 7, regex: re_general_tasks(), build: build_general_tasks },
            Rule { tier: 8, regex: re_search(), build: build_search },
        ]
    })
}

/// Tier 1 of the router cascade. Pure function; no I/O; deterministic.
pub struct PatternMatcher;

impl PatternMatcher {
    /// Scans the ordered rule list and returns the first match's command, or
    /// `None` if nothing matched (in which case the router falls through to
    /// Tier 2).
    #[must_use]
    pub fn match_text(text: &str) -> Option<Command> {
        for rule in rules() {
            if let Some(caps) = rule.regex.captures(text) {
                return Some((rule.build)(&caps));
            }
        }
        None
    }

    /// Exposed for tests asserting the mandatory priority ordering: the
    /// tier number of whichever rule matched, if any.
    #[must_use]
    #[cfg(test)]
    fn matched_tier(text: &str) -> Option<u8> {
        for rule in rules() {
            if rule.regex.is_match(text) {
                return Some(rule.tier);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_verb_beats_status_word_in_same_utterance() {
        // "I finished the debugging doc" contains no literal status word,
        // but "finished the bug that was in progress" does, and action
        // verbs must still win per the mandatory priority order.
        let text = "I finished the bug that was in progress";
        assert_eq!(PatternMatcher::matched_tier(text), Some(1));
        let cmd = PatternMatcher::match_text(text).unwrap();
        assert_eq!(
            cmd,
            Command::CompleteTask {
                reference: "bug that was in progress".to_string()
            }
        );
    }

    #[test]
    fn scenario_pattern_fast_path_whats_in_progress() {
        let cmd = PatternMatcher::match_text("What's in progress?").unwrap();
        assert_eq!(
            cmd,
            Command::Tasks {
                filters: Filters {
                    status: Some(TaskStatus::InProgress),
                    ..Default::default()
                }
            }
        );
    }

    #[test]
    fn scenario_action_takes_priority_over_status() {
        let cmd = PatternMatcher::match_text("I finished the debugging doc").unwrap();
        assert_eq!(
            cmd,
            Command::CompleteTask {
                reference: "debugging doc".to_string()
            }
        );
    }

    #[test]
    fn temporal_filter_matches_before_general_tasks() {
        let cmd = PatternMatcher::match_text("What tasks are due today?").unwrap();
        assert_eq!(
            cmd,
            Command::Tasks {
                filters: Filters {
                    temporal: Some(Temporal::Today),
                    ..Default::default()
                }
            }
        );
    }

    #[test]
    fn show_project_lookup() {
        let cmd = PatternMatcher::match_text("show me the Atlas project").unwrap();
        assert_eq!(
            cmd,
            Command::Projects {
                filters: Filters {
                    project: Some("Atlas".to_string()),
                    ..Default::default()
                }
            }
        );
    }

    #[test]
    fn no_match_returns_none() {
        assert_eq!(PatternMatcher::match_text("how's the weather"), None);
    }

    #[test]
    fn pattern_output_round_trips_through_command_parser() {
        let utterances = [
            "What's in progress?",
            "I finished the debugging doc",
            "show me the Atlas project",
            "list projects",
        ];
        for u in utterances {
            let cmd = PatternMatcher::match_text(u).expect("should match");
            let wire = cmd.to_wire_string();
            let reparsed = crate::command::CommandParser::parse(&wire)
                .unwrap_or_else(|e| panic!("wire '{wire}' failed to reparse: {e}"));
            assert_eq!(cmd, reparsed);
        }
    }

    proptest::proptest! {
        /// For arbitrary task/project titles dropped into the utterance
        /// templates each rule is meant to catch, the emitted command is one
        /// `CommandParser` can also round-trip.
        #[test]
        fn arbitrary_titles_round_trip_through_command_parser(title in "[a-zA-Z][a-zA-Z ]{1,24}") {
            let title = title.trim().to_string();
            proptest::prop_assume!(!title.is_empty());
            let templates = [
                format!("I finished {title}"),
                format!("started {title}"),
                format!("show me the {title} project"),
                format!("search for {title}"),
            ];
            for utterance in templates {
                let Some(cmd) = PatternMatcher::match_text(&utterance) else {
                    continue;
                };
                let wire = cmd.to_wire_string();
                let reparsed = crate::command::CommandParser::parse(&wire)
                    .unwrap_or_else(|e| panic!("wire '{wire}' (from '{utterance}') failed to reparse: {e}"));
                proptest::prop_assert_eq!(cmd, reparsed);
            }
        }
    }
}
