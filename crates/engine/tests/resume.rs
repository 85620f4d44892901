//! Checkpoint/resume: an interrupted task force continues from the first
//! uncompleted specialist with the prior payload as context.

mod support;

use std::collections::HashMap;

use maestro_domain::event::kind;
use maestro_domain::plan::{OrchestrationPlan, SpecialistBrief, TaskForceMode};
use maestro_runs::checkpoint::{save_checkpoint, RunCheckpoint};
use support::*;

/// Write a checkpoint for a run where `research` already finished and
/// `engineering` has not.
fn interrupted_checkpoint(fx: &Fixture) -> (maestro_domain::task::RunId, std::path::PathBuf) {
    let (run_id, run_dir, workspace_path) = fx.repository.create_run().unwrap();

    let research_payload = serde_json::json!({
        "action": "final",
        "executive_summary": "option B wins",
        "key_findings": ["B is fastest"],
    });
    let checkpoint = RunCheckpoint {
        run_id: run_id.as_str().to_string(),
        run_dir: run_dir.clone(),
        workspace_path,
        task_prompt: "survey then implement".into(),
        network_allowed: false,
        specialist_ids: vec!["research".into(), "engineering".into()],
        completed_specialists: vec!["research".into()],
        payloads: HashMap::from([("research".to_string(), research_payload)]),
        task_force_mode: TaskForceMode::Sequential,
        model_key: "quality".into(),
        routing_method: "orchestrator".into(),
        required_capabilities: vec!["code_execution".into()],
        orchestration_plan: Some(OrchestrationPlan {
            assignments: vec![
                SpecialistBrief {
                    specialist_id: "research".into(),
                    brief: "survey the options".into(),
                },
                SpecialistBrief {
                    specialist_id: "engineering".into(),
                    brief: "implement the winner".into(),
                },
            ],
            mode: TaskForceMode::Sequential,
            synthesis_required: false,
            reasoning: String::new(),
            routing_method: "orchestrator".into(),
            required_capabilities: vec!["code_execution".into()],
        }),
        created_at: 1.0,
        updated_at: 2.0,
    };
    save_checkpoint(&run_dir, &checkpoint).unwrap();
    (run_id, run_dir)
}

#[tokio::test]
async fn resume_runs_only_remaining_specialists() {
    let engineering = ScriptedChatClient::new(vec![
        tool_response("list_files", serde_json::json!({})),
        tool_response(
            "finish_task",
            serde_json::json!({"summary": "implemented after resume", "tests_verified": true}),
        ),
    ]);
    let client = RoutedChatClient::new(vec![(ENGINEERING_ROUTE, engineering.clone())]);
    let fx = fixture(client);
    let (run_id, run_dir) = interrupted_checkpoint(&fx);

    let result = fx.executor.resume_run(run_id.as_str()).await.unwrap();

    assert_eq!(result.run_id, run_id);
    assert_eq!(result.payload["summary"], "implemented after resume");
    assert_eq!(result.specialist_ids, vec!["research", "engineering"]);

    // Only engineering consumed script turns.
    assert_eq!(engineering.remaining(), 0);
    assert_eq!(engineering.requests.lock().len(), 2);

    // Engineering's first user message carried the research context.
    let first_request = engineering.requests.lock()[0].clone();
    let user = first_request.messages[1].content.as_deref().unwrap();
    assert!(user.starts_with("Task:\nsurvey then implement"));
    assert!(user.contains("Context from 'research' specialist (prior task-force member):"));
    assert!(user.contains("option B wins"));
    assert!(user.contains("Your specific assignment:\nimplement the winner"));

    // Checkpoint removed; run_complete marks the resume.
    assert!(!run_dir.join("checkpoint.json").exists());
    let events = fx.repository.read_run_events(&run_id).unwrap();
    let complete = find_event(&events, kind::RUN_COMPLETE).unwrap();
    assert_eq!(complete.payload["resumed"], true);

    let pack_start = find_event(&events, kind::PACK_START).unwrap();
    assert_eq!(pack_start.payload["specialist_id"], "engineering");
    assert_eq!(pack_start.payload["resumed"], true);
}

#[tokio::test]
async fn resume_keeps_the_original_network_permission() {
    // Interrupted run where the sandboxed (network_allowed=false) research
    // specialist is still outstanding: resuming must rebuild it without
    // network tools, not silently widen the sandbox.
    let research = ScriptedChatClient::new(vec![
        tool_response(
            "write_file",
            serde_json::json!({"path": "research/notes.md", "content": "offline notes"}),
        ),
        tool_response(
            "finish_task",
            serde_json::json!({"executive_summary": "done offline", "key_findings": []}),
        ),
    ]);
    let client = RoutedChatClient::new(vec![(RESEARCH_ROUTE, research.clone())]);
    let fx = fixture(client);

    let (run_id, run_dir) = interrupted_checkpoint(&fx);
    // Flip the outstanding specialist: engineering completed, research not.
    let mut cp = maestro_runs::checkpoint::load_checkpoint(&run_dir).unwrap();
    cp.completed_specialists = vec!["engineering".into()];
    cp.payloads = HashMap::from([(
        "engineering".to_string(),
        serde_json::json!({"action": "final", "summary": "already built"}),
    )]);
    save_checkpoint(&run_dir, &cp).unwrap();

    let result = fx.executor.resume_run(run_id.as_str()).await.unwrap();
    assert_eq!(result.payload["executive_summary"], "done offline");

    // The rebuilt research pack offered no network tools.
    let first_request = research.requests.lock()[0].clone();
    let tool_names: Vec<&str> = first_request.tools.iter().map(|d| d.name.as_str()).collect();
    assert!(!tool_names.contains(&"web_search"));
    assert!(!tool_names.contains(&"fetch_url"));
    assert!(tool_names.contains(&"write_file"));
}

#[tokio::test]
async fn resume_without_checkpoint_is_refused() {
    let client = ScriptedChatClient::new(vec![]);
    let fx = fixture(client);

    let err = fx.executor.resume_run("no-such-run").await.unwrap_err();
    assert!(matches!(err, maestro_domain::error::Error::Checkpoint(_)));
}

#[tokio::test]
async fn resume_of_completed_run_is_refused() {
    let client = ScriptedChatClient::new(vec![]);
    let fx = fixture(client);
    let (run_id, run_dir) = interrupted_checkpoint(&fx);

    // Mark everything complete.
    let mut cp = maestro_runs::checkpoint::load_checkpoint(&run_dir).unwrap();
    cp.completed_specialists = cp.specialist_ids.clone();
    save_checkpoint(&run_dir, &cp).unwrap();

    let err = fx.executor.resume_run(run_id.as_str()).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("already complete"));
}

#[tokio::test]
async fn resume_with_synthesis_combines_old_and_new_payloads() {
    let engineering = ScriptedChatClient::new(vec![
        tool_response("list_files", serde_json::json!({})),
        tool_response(
            "finish_task",
            serde_json::json!({"summary": "implemented", "tests_verified": true}),
        ),
    ]);
    let synthesis = ScriptedChatClient::new(vec![tool_response(
        "synthesise_results",
        serde_json::json!({"summary": "combined outcome", "key_findings": []}),
    )]);
    let client = RoutedChatClient::new(vec![
        (ENGINEERING_ROUTE, engineering),
        (SYNTHESIS_ROUTE, synthesis.clone()),
    ]);
    let fx = fixture(client);
    let (run_id, run_dir) = interrupted_checkpoint(&fx);

    // Flag synthesis on the stored plan.
    let mut cp = maestro_runs::checkpoint::load_checkpoint(&run_dir).unwrap();
    cp.orchestration_plan.as_mut().unwrap().synthesis_required = true;
    save_checkpoint(&run_dir, &cp).unwrap();

    let result = fx.executor.resume_run(run_id.as_str()).await.unwrap();
    assert_eq!(result.payload["summary"], "combined outcome");

    // The synthesis prompt saw both specialists' payloads.
    let synth_request = synthesis.requests.lock()[0].clone();
    let user = synth_request.messages[1].content.as_deref().unwrap();
    assert!(user.contains("**research**:"));
    assert!(user.contains("**engineering**:"));

    let events = fx.repository.read_run_events(&run_id).unwrap();
    assert_eq!(count_events(&events, kind::SYNTHESIS_COMPLETE), 1);
}
