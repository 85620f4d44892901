//! Multi-specialist coordination: orchestrated plans, sequential context
//! forwarding, parallel merging, synthesis, and cloud fallback surfacing.

mod support;

use std::sync::Arc;

use maestro_domain::event::kind;
use maestro_domain::task::Task;
use maestro_providers::{FallbackChatClient, FallbackPolicy};
use support::*;

fn plan_response(
    assignments: serde_json::Value,
    mode: &str,
    synthesis_required: bool,
) -> maestro_providers::ChatResponse {
    tool_response(
        "create_plan",
        serde_json::json!({
            "assignments": assignments,
            "mode": mode,
            "synthesis_required": synthesis_required,
            "reasoning": "test plan",
        }),
    )
}

#[tokio::test]
async fn sequential_task_force_forwards_context_and_synthesises() {
    let orchestrator = ScriptedChatClient::new(vec![plan_response(
        serde_json::json!([
            {"specialist_id": "research", "brief": "survey the options"},
            {"specialist_id": "engineering", "brief": "implement the winner"},
        ]),
        "sequential",
        true,
    )]);
    let research = ScriptedChatClient::new(vec![
        tool_response(
            "write_file",
            serde_json::json!({"path": "research/scope.md", "content": "options"}),
        ),
        tool_response(
            "finish_task",
            serde_json::json!({
                "executive_summary": "option B wins",
                "key_findings": ["B is fastest"],
            }),
        ),
    ]);
    let engineering = ScriptedChatClient::new(vec![
        tool_response("list_files", serde_json::json!({})),
        tool_response(
            "finish_task",
            serde_json::json!({"summary": "implemented B", "tests_verified": true}),
        ),
    ]);
    let synthesis = ScriptedChatClient::new(vec![tool_response(
        "synthesise_results",
        serde_json::json!({
            "summary": "surveyed and implemented option B",
            "key_findings": ["B is fastest", "implemented"],
        }),
    )]);

    let client = RoutedChatClient::new(vec![
        (ORCHESTRATOR_ROUTE, orchestrator),
        (RESEARCH_ROUTE, research),
        (ENGINEERING_ROUTE, engineering.clone()),
        (SYNTHESIS_ROUTE, synthesis),
    ]);
    let fx = fixture(client);

    let result = fx
        .executor
        .execute_task(&Task::new("survey then implement"))
        .await
        .unwrap();

    // Synthesis replaced the last pack payload.
    assert_eq!(result.payload["action"], "final");
    assert_eq!(result.payload["summary"], "surveyed and implemented option B");
    assert_eq!(result.specialist_ids, vec!["research", "engineering"]);
    assert_eq!(result.specialist_id, "research");

    let events = fx.repository.read_run_events(&result.run_id).unwrap();
    assert_eq!(count_events(&events, kind::ORCHESTRATION_PLAN), 1);
    assert_eq!(count_events(&events, kind::PACK_START), 2);
    assert_eq!(count_events(&events, kind::SYNTHESIS_COMPLETE), 1);
    assert_eq!(count_events(&events, kind::RUN_COMPLETE), 1);

    // Engineering saw the research payload and its own brief.
    let first_eng_request = engineering.requests.lock()[0].clone();
    let user = first_eng_request.messages[1].content.as_deref().unwrap();
    assert!(user.contains("Context from 'research' specialist (prior task-force member):"));
    assert!(user.contains("option B wins"));
    assert!(user.contains("Your specific assignment:\nimplement the winner"));

    // Step keys carry the specialist prefix in task-force mode.
    assert!(events
        .iter()
        .any(|e| e.step.as_deref() == Some("research_step_0")));
    assert!(events
        .iter()
        .any(|e| e.step.as_deref() == Some("engineering_step_0")));
}

#[tokio::test]
async fn parallel_task_force_merges_pack_results() {
    let orchestrator = ScriptedChatClient::new(vec![plan_response(
        serde_json::json!([
            {"specialist_id": "research", "brief": "collect background"},
            {"specialist_id": "engineering", "brief": "spike a prototype"},
        ]),
        "parallel",
        false, // forced true for multi-specialist plans
    )]);
    let research = ScriptedChatClient::new(vec![
        tool_response("list_files", serde_json::json!({})),
        tool_response(
            "finish_task",
            serde_json::json!({"executive_summary": "background ready", "key_findings": []}),
        ),
    ]);
    let engineering = ScriptedChatClient::new(vec![
        tool_response("list_files", serde_json::json!({})),
        tool_response(
            "finish_task",
            serde_json::json!({"summary": "prototype built", "tests_verified": true}),
        ),
    ]);
    // No synthesis script: the synthesis call fails as a transport error and
    // the merged parallel payload is kept.
    let client = RoutedChatClient::new(vec![
        (ORCHESTRATOR_ROUTE, orchestrator),
        (RESEARCH_ROUTE, research),
        (ENGINEERING_ROUTE, engineering),
    ]);
    let fx = fixture(client);

    let result = fx
        .executor
        .execute_task(&Task::new("independent subtasks"))
        .await
        .unwrap();

    let events = fx.repository.read_run_events(&result.run_id).unwrap();
    assert_eq!(count_events(&events, kind::TASK_FORCE_PARALLEL), 1);
    assert_eq!(count_events(&events, kind::PACK_START), 2);

    // No pack events precede its pack_start.
    let research_start = events
        .iter()
        .position(|e| {
            e.kind == kind::PACK_START && e.payload["specialist_id"] == "research"
        })
        .unwrap();
    let first_research_step = events
        .iter()
        .position(|e| {
            e.step
                .as_deref()
                .map(|s| s.starts_with("research_"))
                .unwrap_or(false)
        })
        .unwrap();
    assert!(research_start < first_research_step);

    let pack_results = result.payload["pack_results"].as_object().unwrap();
    assert!(pack_results.contains_key("research"));
    assert!(pack_results.contains_key("engineering"));
    assert_eq!(pack_results["engineering"]["summary"], "prototype built");

    let summary = result.payload["summary"].as_str().unwrap();
    assert!(summary.contains("research: background ready"));
    assert!(summary.contains("engineering: prototype built"));
    assert!(summary.contains(" | "));
}

#[tokio::test]
async fn orchestrator_failure_falls_back_to_keyword_routing() {
    // Orchestrator and router scripts are absent: both LLM routing stages
    // fail and keyword routing picks the engineering pack.
    let engineering = ScriptedChatClient::new(vec![
        tool_response("list_files", serde_json::json!({})),
        tool_response(
            "finish_task",
            serde_json::json!({"summary": "built", "tests_verified": true}),
        ),
    ]);
    let client = RoutedChatClient::new(vec![(ENGINEERING_ROUTE, engineering)]);
    let fx = fixture(client);

    let result = fx
        .executor
        .execute_task(&Task::new("implement a fizzbuzz program and test it"))
        .await
        .unwrap();

    let events = fx.repository.read_run_events(&result.run_id).unwrap();
    let recruitment = find_event(&events, kind::RECRUITMENT).unwrap();
    assert_eq!(recruitment.payload["routing_method"], "keyword_routing");
    assert_eq!(recruitment.payload["specialist_id"], "engineering");
    // No orchestration_plan event for fallback routing.
    assert_eq!(count_events(&events, kind::ORCHESTRATION_PLAN), 0);
}

#[tokio::test]
async fn orchestrator_unknown_assignments_are_filtered() {
    let orchestrator = ScriptedChatClient::new(vec![plan_response(
        serde_json::json!([
            {"specialist_id": "engineering", "brief": "do it"},
            {"specialist_id": "astrologer", "brief": "consult the stars"},
        ]),
        "sequential",
        false,
    )]);
    let engineering = ScriptedChatClient::new(vec![
        tool_response("list_files", serde_json::json!({})),
        tool_response(
            "finish_task",
            serde_json::json!({"summary": "done", "tests_verified": true}),
        ),
    ]);
    let client = RoutedChatClient::new(vec![
        (ORCHESTRATOR_ROUTE, orchestrator),
        (ENGINEERING_ROUTE, engineering),
    ]);
    let fx = fixture(client);

    let result = fx
        .executor
        .execute_task(&Task::new("build the thing"))
        .await
        .unwrap();

    assert_eq!(result.specialist_ids, vec!["engineering"]);
    let events = fx.repository.read_run_events(&result.run_id).unwrap();
    // Single remaining specialist: no pack_start, no synthesis.
    assert_eq!(count_events(&events, kind::PACK_START), 0);
    assert_eq!(count_events(&events, kind::SYNTHESIS_COMPLETE), 0);
}

#[tokio::test]
async fn single_specialist_plan_is_coerced_to_sequential() {
    // The orchestrator claims "parallel" for a lone specialist; the plan
    // invariant forces sequential at construction time, so both `plan`
    // inspection and the runlog event report what will actually run.
    let orchestrator = ScriptedChatClient::new(vec![
        plan_response(
            serde_json::json!([{"specialist_id": "engineering", "brief": "just build it"}]),
            "parallel",
            false,
        ),
        plan_response(
            serde_json::json!([{"specialist_id": "engineering", "brief": "just build it"}]),
            "parallel",
            false,
        ),
    ]);
    let engineering = ScriptedChatClient::new(vec![
        tool_response("list_files", serde_json::json!({})),
        tool_response(
            "finish_task",
            serde_json::json!({"summary": "built", "tests_verified": true}),
        ),
    ]);
    let client = RoutedChatClient::new(vec![
        (ORCHESTRATOR_ROUTE, orchestrator),
        (ENGINEERING_ROUTE, engineering),
    ]);
    let fx = fixture(client);

    let plan = fx.executor.plan_task("build the thing").await.unwrap();
    assert_eq!(plan.assignments.len(), 1);
    assert_eq!(plan.mode, maestro_domain::plan::TaskForceMode::Sequential);

    let result = fx
        .executor
        .execute_task(&Task::new("build the thing"))
        .await
        .unwrap();

    let events = fx.repository.read_run_events(&result.run_id).unwrap();
    assert_eq!(count_events(&events, kind::TASK_FORCE_PARALLEL), 0);
    let plan_event = find_event(&events, kind::ORCHESTRATION_PLAN).unwrap();
    assert_eq!(plan_event.payload["mode"], "sequential");
    let complete = find_event(&events, kind::RUN_COMPLETE).unwrap();
    assert_eq!(complete.payload["task_force_mode"], "sequential");
}

#[tokio::test]
async fn cloud_fallback_events_surface_in_the_run_log() {
    let local = ScriptedChatClient::new(vec![
        text_response("let me think about this"),
        text_response("still thinking"),
    ]);
    let cloud = ScriptedChatClient::new(vec![
        tool_response("list_files", serde_json::json!({})),
        tool_response(
            "finish_task",
            serde_json::json!({"summary": "cloud finished it", "tests_verified": true}),
        ),
    ]);
    let fallback: Arc<dyn maestro_providers::ChatClient> = Arc::new(FallbackChatClient::new(
        local,
        cloud,
        "gpt-4o-cloud",
        FallbackPolicy::new("no_tool_calls"),
    ));
    let fx = fixture(fallback);

    let mut task = Task::new("work");
    task.specialist_id = Some("engineering".into());
    let result = fx.executor.execute_task(&task).await.unwrap();

    assert_eq!(result.payload["summary"], "cloud finished it");

    let events = fx.repository.read_run_events(&result.run_id).unwrap();
    assert_eq!(count_events(&events, kind::CLOUD_FALLBACK), 2);
    for event in events.iter().filter(|e| e.kind == kind::CLOUD_FALLBACK) {
        assert_eq!(event.payload["cloud_model"], "gpt-4o-cloud");
        assert_eq!(event.payload["reason"], "no_tool_calls");
        assert!(event.step.is_some());
    }
    // No corrective re-prompts: the loop only ever saw tool calls.
    assert_eq!(count_events(&events, kind::CORRECTIVE_REPROMPT), 0);
}
