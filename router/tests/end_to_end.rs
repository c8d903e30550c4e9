//! End-to-end scenarios against the full `Router` cascade, wired with the
//! in-memory test doubles for every opaque external service. One test per
//! seed scenario named in the router's property-test suite: pattern fast
//! path, action-over-status priority, knowledge-cache hit, discovery reuse,
//! the GTM multi-step workflow, and concurrent handoff consumption.

use std::sync::Arc;
use std::thread;

use assistant_core::clients::LlmCompletion;
use assistant_core::config::Config;
use assistant_core::memory::{MemoryStore, TemplatePhase, WorkflowTemplate};
use assistant_core::testing::{fake_embedder, FakeLlmClient};
use assistant_router::discovery::{DiscoveryAgent, ExternalToolTransport, SessionManager};
use assistant_router::metrics::{Metrics, TierHit};
use assistant_router::planner::MultiStepPlanner;
use assistant_router::summarizer::EpisodicSummarizer;
use assistant_router::testing::{FakeEntityStore, FakeRetrievalService};
use assistant_router::tools::ToolExecutor;
use assistant_router::{LlmAgentLoop, Router};
use async_trait::async_trait;
use serde_json::{json, Value};

const GTM_TRIGGER: &str = "create_gtm_project";

/// Assembles a full `Router` over fresh in-memory stores, mirroring
/// `assistant-cli`'s `build_router` wiring.
struct Harness {
    router: Router,
    memory: Arc<MemoryStore>,
    entities: Arc<FakeEntityStore>,
    llm: Arc<FakeLlmClient>,
    sessions: Arc<SessionManager>,
}

fn build_harness(config: Config) -> Harness {
    let memory = Arc::new(MemoryStore::new(fake_embedder(), config.clone()));
    let entities = Arc::new(FakeEntityStore::new());
    let retrieval = Arc::new(FakeRetrievalService::new());
    let llm = Arc::new(FakeLlmClient::new());
    let summarizer = Arc::new(EpisodicSummarizer::new(Arc::clone(&memory), Arc::clone(&llm)));
    let executor = Arc::new(ToolExecutor::new(
        Arc::clone(&memory),
        Arc::clone(&entities),
        Arc::clone(&retrieval),
        fake_embedder(),
        config.clone(),
        summarizer,
    ));
    let sessions = Arc::new(SessionManager::new());
    let discovery = if config.discovery.enabled {
        Some(Arc::new(DiscoveryAgent::new(Arc::clone(&memory), Arc::clone(&llm), Arc::clone(&sessions), config.clone())))
    } else {
        None
    };
    let agent_loop = LlmAgentLoop::new(Arc::clone(&llm), Arc::clone(&executor), config.clone());
    let planner = MultiStepPlanner::new(Arc::clone(&llm), Arc::clone(&executor), Arc::clone(&memory), discovery.clone());
    let metrics = Arc::new(Metrics::new());
    let router = Router::new(executor, agent_loop, planner, discovery, Arc::clone(&memory), metrics, config);
    Harness { router, memory, entities, llm, sessions }
}

/// A scripted external tool server: returns one canned value per `call_tool`
/// regardless of arguments, and an empty tool list (the reuse path never
/// calls `list_tools`, only fresh discovery does).
struct ScriptedTransport {
    response: Value,
}

#[async_trait]
impl ExternalToolTransport for ScriptedTransport {
    async fn initialize(&self) -> assistant_core::error::Result<()> {
        Ok(())
    }
    async fn list_tools(&self) -> assistant_core::error::Result<Vec<assistant_router::discovery::ExternalToolSpec>> {
        Ok(Vec::new())
    }
    async fn call_tool(&self, _name: &str, _arguments: Value, _timeout: std::time::Duration) -> assistant_core::error::Result<Value> {
        Ok(self.response.clone())
    }
    async fn shutdown(&self) -> assistant_core::error::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------- scenario 1

#[tokio::test]
async fn scenario_pattern_fast_path_no_llm_call() {
    let harness = build_harness(Config::default());
    harness.entities.seed("tasks", json!({"title": "Ship the release notes", "status": "in_progress"}));
    harness.entities.seed("tasks", json!({"title": "Archive old board", "status": "done"}));

    let response = harness.router.handle("What's in progress?", "u1", "s1").await.unwrap();

    assert_eq!(response.tier, TierHit::PatternMatcher);
    assert!(response.text.contains("Ship the release notes"));
    assert!(!response.text.contains("Archive old board"));
    assert_eq!(harness.llm.call_count(), 0, "tier 1 must never invoke the LLM");
}

// ---------------------------------------------------------------- scenario 2

#[tokio::test]
async fn scenario_action_verb_takes_priority_over_status_word() {
    let harness = build_harness(Config::default());
    harness
        .entities
        .seed("tasks", json!({"title": "the debugging doc", "status": "in_progress"}));

    let response = harness.router.handle("I finished the debugging doc", "u1", "s1").await.unwrap();

    assert_eq!(response.tier, TierHit::PatternMatcher);
    assert!(response.text.contains("\"status\":\"done\""), "got: {}", response.text);
    assert!(response.text.contains("debugging doc"));

    let events = harness.memory.list_episodic("u1", assistant_core::memory::EpisodicFilter::default());
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action_type, "task_completed");
    assert_eq!(harness.llm.call_count(), 0, "tier 1 must never invoke the LLM");
}

// ---------------------------------------------------------------- scenario 3

#[tokio::test]
async fn scenario_cache_hit_skips_external_call() {
    let mut config = Config::default();
    config.discovery.enabled = true;
    let harness = build_harness(config);

    let query = "What do we know about AI agent developments?";
    harness
        .memory
        .cache_knowledge("u1", query, "full research body".to_string(), Some("concise summary".to_string()), "web-research", 7)
        .await
        .unwrap();

    let response = harness.router.handle(query, "u1", "s1").await.unwrap();

    assert_eq!(response.tier, TierHit::Discovery);
    assert_eq!(response.text, "concise summary");

    // The cache entry's `times_accessed` only increments on a threshold
    // crossing read; it was 0 before this call.
    let hits = harness.memory.search_knowledge("u1", query, 0.0, 1).await.unwrap();
    assert!(hits[0].entry.times_accessed >= 1);
}

// ---------------------------------------------------------------- scenario 4

#[tokio::test]
async fn scenario_discovery_reuse_executes_recorded_solution() {
    let mut config = Config::default();
    config.discovery.enabled = true;
    let harness = build_harness(config);

    let request = "Show me recent AI developments";
    let solution = assistant_core::memory::DiscoverySolution {
        server: "web-research".to_string(),
        tool: "search".to_string(),
        arguments: json!({"q": "AI news"}),
    };
    harness.memory.log_discovery("u1", request, solution, true, 150).await.unwrap();
    // Simulate one prior reuse so the precondition matches the scenario:
    // times_used=1 before this request.
    harness.memory.find_similar_discovery("u1", request, 0.0, true).await.unwrap();

    harness.sessions.register(
        "web-research",
        Arc::new(ScriptedTransport { response: json!({"headline": "Agents raise a new round"}) }),
    );

    let response = harness.router.handle(request, "u1", "s1").await.unwrap();

    assert_eq!(response.tier, TierHit::Discovery);
    assert!(response.text.contains("Agents raise a new round"));

    let record = harness.memory.find_similar_discovery("u1", request, 0.0, true).await.unwrap().unwrap();
    // Two prior increments (the setup call, the router's own reuse lookup)
    // plus this verification call's own increment.
    assert_eq!(record.times_used, 3);
}

// ---------------------------------------------------------------- scenario 5

#[tokio::test]
async fn scenario_gtm_multi_step_workflow_creates_project_and_tasks() {
    let harness = build_harness(Config::default());
    harness.memory.upsert_template(
        "u1",
        GTM_TRIGGER,
        WorkflowTemplate {
            phases: vec![
                TemplatePhase { name: "Research".to_string(), task_titles: vec!["Competitor scan".to_string(), "Market sizing".to_string()] },
                TemplatePhase { name: "Strategy".to_string(), task_titles: vec!["Positioning doc".to_string()] },
                TemplatePhase { name: "Execution".to_string(), task_titles: vec!["Launch checklist".to_string()] },
            ],
        },
    );
    harness.llm.push(LlmCompletion {
        text: Some(
            r#"{"steps": [
                {"intent": "research", "description": "research the gaming market"},
                {"intent": "create_project", "description": "Launch GTM project for gaming"},
                {"intent": "generate_tasks", "description": "generate tasks from template"}
            ]}"#
                .to_string(),
        ),
        tool_calls: Vec::new(),
        usage: Default::default(),
        finish_reason: Some(assistant_core::clients::FinishReason::Stop),
    });

    let response = harness
        .router
        .handle("Research the gaming market and create a GTM project with tasks", "u1", "s1")
        .await
        .unwrap();

    assert!(!response.truncated);
    assert!(response.text.contains("Completed all steps"));

    let projects = harness.entities.all("projects");
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0]["name"].as_str().unwrap(), "Launch GTM project for gaming");

    let tasks = harness.entities.all("tasks");
    assert_eq!(tasks.len(), 4);
    let titles: Vec<&str> = tasks.iter().map(|t| t["title"].as_str().unwrap()).collect();
    assert!(titles.contains(&"[Research] Competitor scan"));
    assert!(titles.contains(&"[Research] Market sizing"));
    assert!(titles.contains(&"[Strategy] Positioning doc"));
    assert!(titles.contains(&"[Execution] Launch checklist"));

    let template = harness.memory.get_rule_for_trigger("u1", GTM_TRIGGER).expect("template exists");
    // One increment from resolving the template during the create_project
    // step, one more from this assertion's own lookup.
    assert_eq!(template.times_used, 2);
}

// ---------------------------------------------------------------- scenario 6

#[tokio::test]
async fn scenario_concurrent_handoff_consumption_has_exactly_one_winner() {
    let harness = build_harness(Config::default());
    harness
        .memory
        .create_handoff("s1", "agentA", "agentB", "disambiguation", json!({"choice": "task-1"}));

    let memory = Arc::clone(&harness.memory);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let memory = Arc::clone(&memory);
            thread::spawn(move || memory.consume_pending("s1", "agentB"))
        })
        .collect();

    let winners = handles.into_iter().map(|h| h.join().unwrap()).filter(Option::is_some).count();
    assert_eq!(winners, 1);
}
