//! The typed command IR shared by `PatternMatcher` (Tier 1) and
//! `CommandParser` (Tier 2), plus the explicit-command tokenizer/validator.
//!
//! Pattern matching and command parsing never touch the LLM or an external
//! service — everything in this module is pure, synchronous CPU work.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    fn wire(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(Self::Todo),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    fn wire(self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Temporal {
    Today,
    ThisWeek,
    Yesterday,
}

impl Temporal {
    fn wire(self) -> &'static str {
        match self {
            Temporal::Today => "today",
            Temporal::ThisWeek => "this_week",
            Temporal::Yesterday => "yesterday",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Hybrid,
    Vector,
    Text,
}

/// Filters accepted by the `tasks`/`projects` verbs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub project: Option<String>,
    pub assignee: Option<String>,
    pub temporal: Option<Temporal>,
}

impl Filters {
    fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.priority.is_none()
            && self.project.is_none()
            && self.assignee.is_none()
            && self.temporal.is_none()
    }

    fn to_kwargs(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(t) = self.temporal {
            out.push(format!("when:{}", t.wire()));
        }
        if let Some(s) = self.status {
            out.push(format!("status:{}", s.wire()));
        }
        if let Some(p) = self.priority {
            out.push(format!("priority:{}", p.wire()));
        }
        if let Some(p) = &self.project {
            out.push(format!("project:{}", quote_if_needed(p)));
        }
        if let Some(a) = &self.assignee {
            out.push(format!("assignee:{}", quote_if_needed(a)));
        }
        out
    }
}

/// Wraps a filter value in quotes when it contains whitespace, so a
/// multi-word project/assignee name survives the tokenizer as one token
/// (matching how `AddNote`/`CreateTask` already quote their free-form text).
fn quote_if_needed(value: &str) -> String {
    if value.contains(char::is_whitespace) {
        format!("\"{value}\"")
    } else {
        value.to_string()
    }
}

/// Strips a single pair of surrounding quotes, if present.
fn strip_quotes(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}

/// The closed set of commands either router tier can produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Tasks { filters: Filters },
    Completed,
    Projects { filters: Filters },
    Search { query: String, mode: SearchMode },
    CompleteTask { reference: String },
    StartTask { reference: String },
    StopTask { reference: String },
    AddNote { reference: String, text: String },
    CreateTask { title: String },
    Help { verb: Option<String> },
}

impl Command {
    /// Renders the canonical explicit-command wire string for this command.
    /// Every command `PatternMatcher` can produce must also be a string
    /// `CommandParser` accepts and reparses into the identical value.
    #[must_use]
    pub fn to_wire_string(&self) -> String {
        match self {
            Command::Tasks { filters } => {
                if filters.is_empty() {
                    "/tasks".to_string()
                } else {
                    format!("/tasks {}", filters.to_kwargs().join(" "))
                }
            }
            Command::Completed => "/completed".to_string(),
            Command::Projects { filters } => {
                if filters.is_empty() {
                    "/projects".to_string()
                } else {
                    format!("/projects {}", filters.to_kwargs().join(" "))
                }
            }
            Command::Search { query, mode } => match mode {
                SearchMode::Hybrid => format!("/search {query}"),
                SearchMode::Vector => format!("/search:vector {query}"),
                SearchMode::Text => format!("/search:text {query}"),
            },
            Command::CompleteTask { reference } => format!("/do complete {reference}"),
            Command::StartTask { reference } => format!("/do start {reference}"),
            Command::StopTask { reference } => format!("/do stop {reference}"),
            Command::AddNote { reference, text } => format!("/do note {reference} \"{text}\""),
            Command::CreateTask { title } => format!("/do create \"{title}\""),
            Command::Help { verb: Some(v) } => format!("/help {v}"),
            Command::Help { verb: None } => "/help".to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire_string())
    }
}

/// Command-syntax violation. Rendered to the user verbatim, beginning with
/// `Invalid command:`.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("Invalid command: {0}")]
pub struct ParseError(pub String);

const KNOWN_STATUS_VALUES: &[&str] = &["todo", "in_progress", "done"];
const KNOWN_PRIORITY_VALUES: &[&str] = &["low", "medium", "high"];

/// Tier-2: tokenizes an explicit `/verb key:value... free text` command and
/// validates it against a closed vocabulary. No side effects.
pub struct CommandParser;

impl CommandParser {
    /// `true` iff `text` should be routed to this tier at all (starts with
    /// `/`). The router checks this before calling `parse`.
    #[must_use]
    pub fn is_command(text: &str) -> bool {
        text.trim_start().starts_with('/')
    }

    /// Parses one explicit command. Never panics; always returns either a
    /// valid `Command` or a `ParseError` whose message the caller can show
    /// verbatim.
    pub fn parse(text: &str) -> Result<Command, ParseError> {
        let trimmed = text.trim();
        let body = trimmed
            .strip_prefix('/')
            .ok_or_else(|| ParseError("command must start with '/'".to_string()))?;
        let mut tokens = tokenize(body);
        if tokens.is_empty() {
            return Err(ParseError("empty command".to_string()));
        }
        let verb = tokens.remove(0);

        match verb.as_str() {
            "tasks" => Ok(Command::Tasks {
                filters: parse_filters(&tokens)?,
            }),
            "completed" => Ok(Command::Completed),
            "projects" => Ok(Command::Projects {
                filters: parse_filters(&tokens)?,
            }),
            "search" => Ok(Command::Search {
                query: rest_as_text(&tokens),
                mode: SearchMode::Hybrid,
            }),
            "search:vector" => Ok(Command::Search {
                query: rest_as_text(&tokens),
                mode: SearchMode::Vector,
            }),
            "search:text" => Ok(Command::Search {
                query: rest_as_text(&tokens),
                mode: SearchMode::Text,
            }),
            "do" => parse_do(&tokens),
            "help" => Ok(Command::Help {
                verb: tokens.first().cloned(),
            }),
            other => Err(ParseError(format!("unknown verb '{other}'"))),
        }
    }
}

fn parse_do(tokens: &[String]) -> Result<Command, ParseError> {
    let Some(sub) = tokens.first() else {
        return Err(ParseError("'do' requires a sub-verb".to_string()));
    };
    let rest = &tokens[1..];
    match sub.as_str() {
        "complete" => Ok(Command::CompleteTask {
            reference: require_reference(rest)?,
        }),
        "start" => Ok(Command::StartTask {
            reference: require_reference(rest)?,
        }),
        "stop" => Ok(Command::StopTask {
            reference: require_reference(rest)?,
        }),
        "note" => {
            let reference = rest
                .first()
                .cloned()
                .ok_or_else(|| ParseError("'do note' requires a task reference".to_string()))?;
            let text = rest_as_quoted_text(&rest[1..])?;
            Ok(Command::AddNote { reference, text })
        }
        "create" => {
            let title = rest_as_quoted_text(rest)?;
            Ok(Command::CreateTask { title })
        }
        other => Err(ParseError(format!("unknown 'do' sub-verb '{other}'"))),
    }
}

fn require_reference(tokens: &[String]) -> Result<String, ParseError> {
    if tokens.is_empty() {
        return Err(ParseError("missing task reference".to_string()));
    }
    Ok(tokens.join(" "))
}

fn rest_as_text(tokens: &[String]) -> String {
    tokens.join(" ")
}

fn rest_as_quoted_text(tokens: &[String]) -> Result<String, ParseError> {
    let joined = tokens.join(" ");
    let trimmed = joined.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        Ok(trimmed[1..trimmed.len() - 1].to_string())
    } else if trimmed.is_empty() {
        Err(ParseError("expected a quoted string".to_string()))
    } else {
        // Tolerate unquoted text too: the pattern matcher never emits
        // quotes, so its wire round-trip would otherwise fail parsing.
        Ok(trimmed.to_string())
    }
}

fn parse_filters(tokens: &[String]) -> Result<Filters, ParseError> {
    let mut filters = Filters::default();
    for tok in tokens {
        let Some((key, value)) = tok.split_once(':') else {
            return Err(ParseError(format!("expected key:value, got '{tok}'")));
        };
        match key {
            "status" => {
                filters.status = Some(TaskStatus::parse(value).ok_or_else(|| {
                    ParseError(format!(
                        "invalid status '{value}', expected one of {KNOWN_STATUS_VALUES:?}"
                    ))
                })?);
            }
            "priority" => {
                filters.priority = Some(TaskPriority::parse(value).ok_or_else(|| {
                    ParseError(format!(
                        "invalid priority '{value}', expected one of {KNOWN_PRIORITY_VALUES:?}"
                    ))
                })?);
            }
            "project" => filters.project = Some(strip_quotes(value)),
            "assignee" => filters.assignee = Some(strip_quotes(value)),
            "when" => {
                filters.temporal = Some(match value {
                    "today" => Temporal::Today,
                    "this_week" => Temporal::ThisWeek,
                    "yesterday" => Temporal::Yesterday,
                    other => return Err(ParseError(format!("invalid temporal filter '{other}'"))),
                });
            }
            other => return Err(ParseError(format!("unknown filter key '{other}'"))),
        }
    }
    Ok(filters)
}

/// Whitespace tokenizer that keeps `"quoted text"` as one token.
fn tokenize(body: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = body.chars().peekable();
    let mut current = String::new();
    let mut in_quotes = false;
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_tasks_command() {
        let cmd = CommandParser::parse("/tasks status:in_progress").unwrap();
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
    fn rejects_unknown_verb() {
        let err = CommandParser::parse("/frobnicate").unwrap_err();
        assert!(err.0.contains("unknown verb"));
    }

    #[test]
    fn rejects_unknown_status_value() {
        let err = CommandParser::parse("/tasks status:bogus").unwrap_err();
        assert!(err.0.contains("invalid status"));
    }

    #[test]
    fn round_trips_do_complete() {
        let cmd = Command::CompleteTask {
            reference: "debugging-doc".to_string(),
        };
        let wire = cmd.to_wire_string();
        let reparsed = CommandParser::parse(&wire).unwrap();
        assert_eq!(cmd, reparsed);
    }

    #[test]
    fn round_trips_filtered_tasks() {
        let cmd = Command::Tasks {
            filters: Filters {
                status: Some(TaskStatus::Done),
                priority: Some(TaskPriority::High),
                ..Default::default()
            },
        };
        let wire = cmd.to_wire_string();
        let reparsed = CommandParser::parse(&wire).unwrap();
        assert_eq!(cmd, reparsed);
    }

    #[test]
    fn round_trips_multi_word_project_filter() {
        let cmd = Command::Projects {
            filters: Filters {
                project: Some("Big Data".to_string()),
                ..Default::default()
            },
        };
        let wire = cmd.to_wire_string();
        assert_eq!(wire, "/projects project:\"Big Data\"");
        let reparsed = CommandParser::parse(&wire).unwrap();
        assert_eq!(cmd, reparsed);
    }

    #[test]
    fn create_command_round_trips_through_quotes() {
        let cmd = Command::CreateTask {
            title: "Ship the release notes".to_string(),
        };
        let wire = cmd.to_wire_string();
        assert_eq!(wire, "/do create \"Ship the release notes\"");
        let reparsed = CommandParser::parse(&wire).unwrap();
        assert_eq!(cmd, reparsed);
    }
}
