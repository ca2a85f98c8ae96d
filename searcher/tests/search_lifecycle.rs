//! End-to-end behavior of `search` and `deep_search` with scripted agents.

use serde_json::json;

use searcher::deep_search::Termination;
use searcher::error::{ToolFailure, codes};
use searcher::search::{Searcher, response_json};
use searcher::test_support::{CallKind, Reply, ScriptedAgent, TestWorkspace};

fn searcher(
    workspace: &TestWorkspace,
    main: Vec<Reply>,
    corrections: Vec<Reply>,
) -> Searcher<ScriptedAgent> {
    Searcher::new(ScriptedAgent::new(main, corrections), &workspace.config())
}

#[tokio::test]
async fn fenced_block_beats_stray_braces() {
    let workspace = TestWorkspace::new().expect("workspace");
    let raw = "Earlier draft: {\"success\": true, \"report\": \"stray\"}\n\n\
               ```json\n{\"success\": true, \"report\": \"fenced\"}\n```\n";
    let searcher = searcher(&workspace, vec![Reply::text(raw)], Vec::new());

    let report = searcher.search("q").await.expect("report");
    assert_eq!(report.report, "fenced");
    assert!(!report.metadata.corrected);
}

#[tokio::test]
async fn success_without_report_goes_to_correction() {
    let workspace = TestWorkspace::new().expect("workspace");
    let searcher = searcher(
        &workspace,
        vec![Reply::payload(json!({"success": true}))],
        vec![Reply::report("repaired", &["https://a.example"])],
    );

    let report = searcher.search("q").await.expect("report");
    assert_eq!(report.report, "repaired");
    assert!(report.metadata.corrected);
    assert_eq!(report.metadata.attempts, 1);
    assert_eq!(searcher.agent().count(CallKind::Main), 1);
    assert_eq!(searcher.agent().count(CallKind::Correction), 1);
}

#[tokio::test]
async fn failure_without_report_passes_validation() {
    let workspace = TestWorkspace::new().expect("workspace");
    let searcher = searcher(
        &workspace,
        vec![Reply::payload(json!({"success": false}))],
        Vec::new(),
    );

    let failure = searcher.search("q").await.expect_err("agent failure");
    assert_eq!(failure.code, codes::AGENT_REPORTED_FAILURE);
    assert_eq!(searcher.agent().count(CallKind::Correction), 0);
}

#[tokio::test]
async fn retry_budget_bounds_main_and_correction_calls() {
    let workspace = TestWorkspace::new().expect("workspace");
    let searcher = searcher(
        &workspace,
        (0..3).map(|_| Reply::text("I found nothing useful.")).collect(),
        (0..3).map(|_| Reply::text("Still nothing.")).collect(),
    );

    let failure = searcher.search("q").await.expect_err("exhausted");
    assert_eq!(failure.code, codes::RETRIES_EXHAUSTED);
    assert_eq!(searcher.agent().count(CallKind::Main), 3);
    assert_eq!(searcher.agent().count(CallKind::Correction), 3);

    let body = response_json(&Err::<(), _>(failure)).expect("json");
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"]["code"], json!(codes::RETRIES_EXHAUSTED));
}

#[tokio::test]
async fn artifacts_never_outlive_a_search() {
    let workspace = TestWorkspace::new().expect("workspace");
    let searcher = searcher(
        &workspace,
        vec![Reply::text("nope"), Reply::text("nope again")],
        vec![Reply::timeout(), Reply::report("ok", &[])],
    );

    searcher.search("q").await.expect("report");
    let corrections: Vec<_> = searcher
        .agent()
        .calls()
        .into_iter()
        .filter(|call| call.kind == CallKind::Correction)
        .collect();
    assert_eq!(corrections.len(), 2);
    assert!(corrections.iter().all(|call| call.artifact_existed));
    assert_ne!(corrections[0].artifact_path, corrections[1].artifact_path);
    assert!(workspace.artifacts().is_empty());
}

#[tokio::test]
async fn missing_agent_fails_fast() {
    let workspace = TestWorkspace::new().expect("workspace");
    let searcher = searcher(&workspace, vec![Reply::not_found()], Vec::new());

    let failure = searcher.search("q").await.expect_err("not found");
    assert_eq!(failure.code, codes::AGENT_NOT_FOUND);
    assert_eq!(searcher.agent().calls().len(), 1);
}

#[tokio::test]
async fn deep_search_stops_when_verified() {
    let workspace = TestWorkspace::new().expect("workspace");
    let searcher = searcher(
        &workspace,
        vec![
            Reply::round("draft", false, &["https://a.example"]),
            Reply::round("verified", true, &["https://b.example"]),
        ],
        Vec::new(),
    );

    let result = searcher.deep_search("topic", Some(5)).await.expect("report");
    assert!(result.verified);
    assert_eq!(result.metadata.total_iterations, 2);
    assert_eq!(result.metadata.termination, Termination::Verified);
    assert_eq!(searcher.agent().count(CallKind::Main), 2);
}

#[tokio::test]
async fn deep_search_exhausts_round_budget() {
    let workspace = TestWorkspace::new().expect("workspace");
    let searcher = searcher(
        &workspace,
        (1..=3)
            .map(|n| Reply::round(&format!("draft {n}"), false, &[]))
            .collect(),
        Vec::new(),
    );

    let result = searcher.deep_search("topic", Some(3)).await.expect("report");
    assert!(!result.verified);
    assert_eq!(result.report, "draft 3");
    assert_eq!(result.metadata.total_iterations, 3);
    assert_eq!(result.metadata.termination, Termination::Exhausted);
    let rounds: Vec<u32> = result.metadata.rounds.iter().map(|r| r.round).collect();
    assert_eq!(rounds, vec![1, 2, 3]);
}

#[tokio::test]
async fn deep_search_survives_failed_verification_round() {
    let workspace = TestWorkspace::new().expect("workspace");
    let mut main = vec![Reply::round("round one", false, &["https://a.example"])];
    main.extend((0..3).map(|_| Reply::timeout()));
    let searcher = searcher(&workspace, main, Vec::new());

    let result = searcher.deep_search("topic", Some(5)).await.expect("report");
    assert!(!result.verified);
    assert_eq!(result.report, "round one");
    assert_eq!(result.metadata.total_iterations, 1);
    assert!(result.metadata.note.is_some());

    let body = response_json(&Ok::<_, ToolFailure>(result)).expect("json");
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["metadata"]["termination"], json!("round_failed"));
}

#[tokio::test]
async fn deep_search_deduplicates_sources() {
    let workspace = TestWorkspace::new().expect("workspace");
    let searcher = searcher(
        &workspace,
        vec![
            Reply::round("one", false, &["https://a.example", "https://b.example"]),
            Reply::round("two", false, &["https://b.example", "https://c.example"]),
            Reply::round("three", true, &["https://a.example"]),
        ],
        Vec::new(),
    );

    let result = searcher.deep_search("topic", Some(5)).await.expect("report");
    assert_eq!(
        result.metadata.all_sources,
        vec!["https://a.example", "https://b.example", "https://c.example"]
    );
    assert_eq!(result.metadata.rounds[1].sources.len(), 2);
}

#[tokio::test]
async fn deep_search_uses_configured_default_rounds() {
    let workspace = TestWorkspace::new().expect("workspace");
    let mut config = workspace.config();
    config.deep_search.default_max_rounds = 2;
    let searcher = Searcher::new(
        ScriptedAgent::new(
            vec![
                Reply::round("one", false, &[]),
                Reply::round("two", false, &[]),
            ],
            Vec::new(),
        ),
        &config,
    );

    let result = searcher.deep_search("topic", None).await.expect("report");
    assert_eq!(result.metadata.max_iterations, 2);
    assert_eq!(result.metadata.total_iterations, 2);
}
