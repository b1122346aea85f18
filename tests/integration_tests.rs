//! End-to-end scenarios driving the Workflow Orchestrator, the Executor
//! Step Loop, the Persistence Core, the Command Safety Gate, and the
//! `orch` binary together, with stub Planner/Executor/HostAdapter
//! collaborators standing in for the out-of-scope real LLM provider.

use assert_cmd::Command as AssertCommand;
use async_trait::async_trait;
use predicates::prelude::*;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use synforge::cancellation::CancellationToken;
use synforge::codeintel::{HeuristicCodeIntelligence, IntelligenceCache};
use synforge::config::Config;
use synforge::executor::ExecutorStepLoop;
use synforge::frontend::Aggregator;
use synforge::host::NullHost;
use synforge::llm::{Executor, LlmError, Planner, ProjectContext, VerificationRequest, VerificationResponse};
use synforge::orchestrator::WorkflowOrchestrator;
use synforge::safety::CommandSafetyGate;
use synforge::state::model::{ProjectState, WorkLogEntry};
use synforge::state::persistence::{AutoConfirm, Store};
use synforge::vault::InMemoryVault;
use tempfile::tempdir;

/// An Executor that replays a fixed script of raw next-action responses,
/// one per call, looping the final entry once exhausted.
struct ScriptedExecutor {
    steps: Mutex<Vec<String>>,
    cursor: Mutex<usize>,
}

impl ScriptedExecutor {
    fn new(steps: Vec<String>) -> Self {
        Self {
            steps: Mutex::new(steps),
            cursor: Mutex::new(0),
        }
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn next_action(&self, _prompt: &str) -> Result<String, LlmError> {
        let steps = self.steps.lock().unwrap();
        let mut cursor = self.cursor.lock().unwrap();
        let idx = (*cursor).min(steps.len() - 1);
        *cursor += 1;
        Ok(steps[idx].clone())
    }
}

/// A Planner that always breaks the request into one feature and always
/// reports the remediation attempt as complete with no issues.
struct AlwaysCompletePlanner;

#[async_trait]
impl Planner for AlwaysCompletePlanner {
    async fn breakdown(&self, request: &str, _context: &ProjectContext) -> Result<Vec<String>, LlmError> {
        Ok(vec![request.to_string()])
    }

    async fn verify(&self, _request: &VerificationRequest) -> Result<VerificationResponse, LlmError> {
        Ok(VerificationResponse {
            completion_percentage: 100,
            issues: Vec::new(),
        })
    }

    async fn remediation_instruction(&self, _request: &VerificationRequest) -> Result<String, LlmError> {
        Ok("keep going".to_string())
    }

    async fn checkpoint(&self, _work_log_summary: &str, reason: &str) -> Result<String, LlmError> {
        Ok(format!("acknowledged: {reason}"))
    }

    async fn summarize_history(&self, _previous_summary: Option<&str>, _new_entries: &[WorkLogEntry]) -> Result<String, LlmError> {
        Ok("history summarized".to_string())
    }
}

fn write_file_action(path: &str, content: &str) -> String {
    serde_json::json!({
        "thought": "write the file",
        "action": "write_file",
        "parameters": {"file_path": path, "content": content}
    })
    .to_string()
}

fn patch_file_action(path: &str, patch: &str) -> String {
    serde_json::json!({
        "thought": "patch the file",
        "action": "patch_file",
        "parameters": {"file_path": path, "patch": patch}
    })
    .to_string()
}

fn finish_feature_action() -> String {
    serde_json::json!({"thought": "done", "action": "finish_feature", "parameters": {}}).to_string()
}

fn step_loop(root: PathBuf, executor: Arc<dyn Executor>) -> ExecutorStepLoop {
    ExecutorStepLoop::new(
        executor,
        Arc::new(AlwaysCompletePlanner),
        Arc::new(CommandSafetyGate::new(root.clone())),
        Arc::new(InMemoryVault::new()),
        Arc::new(NullHost),
        Arc::new(IntelligenceCache::new(HeuristicCodeIntelligence)),
        Arc::new(Aggregator::default_stack()),
        root,
        15,
        25_000,
        5,
        CancellationToken::new(),
    )
}

/// Scenario 1: a trivial feature request writes one file and finishes
/// cleanly through the full Workflow Orchestrator.
#[tokio::test]
async fn happy_path_trivial_feature_merges_and_writes_file() {
    let dir = tempdir().unwrap();
    let executor: Arc<dyn Executor> = Arc::new(ScriptedExecutor::new(vec![
        write_file_action("app.py", "print('hello')"),
        finish_feature_action(),
    ]));
    let mut orchestrator = WorkflowOrchestrator::new(
        Config::default(),
        dir.path(),
        Arc::new(AlwaysCompletePlanner),
        executor,
        Store::new(),
        Arc::new(NullHost),
        Arc::new(InMemoryVault::new()),
        Arc::new(IntelligenceCache::new(HeuristicCodeIntelligence)),
        Arc::new(Aggregator::default_stack()),
    );

    let mut state = orchestrator.load_or_adopt().await.unwrap();
    orchestrator.run(&mut state, "print a greeting", None).await.unwrap();

    assert_eq!(state.features.len(), 1);
    assert_eq!(format!("{:?}", state.features[0].status), "Merged");
    assert!(dir.path().join("app.py").exists());
}

/// Scenario 2: three consecutive `patch_file` failures on the same target
/// (the file was never loaded as full_content, so every patch is rejected)
/// both record the escalation note and trip the consecutive-failure
/// circuit breaker at the same threshold.
#[tokio::test]
async fn repeated_patch_failure_escalates_and_trips_breaker() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("app.py"), "x = 1\n").unwrap();

    let executor: Arc<dyn Executor> = Arc::new(ScriptedExecutor::new(vec![
        patch_file_action("app.py", "--- a\n+++ b\n@@ -1 +1 @@\n-x = 1\n+x = 2\n"),
        patch_file_action("app.py", "--- a\n+++ b\n@@ -1 +1 @@\n-x = 1\n+x = 2\n"),
        patch_file_action("app.py", "--- a\n+++ b\n@@ -1 +1 @@\n-x = 1\n+x = 2\n"),
    ]));
    let mut loop_ = step_loop(dir.path().to_path_buf(), executor);
    let mut state = ProjectState::new(dir.path().to_path_buf());

    let (_modified, _work_log, outcome) = loop_.run_feature(&mut state, "patch app.py").await;

    assert!(matches!(outcome, synforge::executor::StepLoopOutcome::CircuitBreakerTripped(_)));
    assert!(state
        .historical_notes
        .iter()
        .any(|note| note.contains("switch to get_full_file_content")));
}

/// Scenario 3: an A-B-A action-signature pattern (write a.py, write b.py,
/// write a.py again) trips the oscillation breaker on the third step.
#[tokio::test]
async fn oscillating_writes_trip_the_breaker() {
    let dir = tempdir().unwrap();
    let executor: Arc<dyn Executor> = Arc::new(ScriptedExecutor::new(vec![
        write_file_action("a.py", "x = 1"),
        write_file_action("b.py", "y = 2"),
        write_file_action("a.py", "x = 3"),
    ]));
    let mut loop_ = step_loop(dir.path().to_path_buf(), executor);
    let mut state = ProjectState::new(dir.path().to_path_buf());

    let (_modified, _work_log, outcome) = loop_.run_feature(&mut state, "toggle two files").await;

    assert!(matches!(
        outcome,
        synforge::executor::StepLoopOutcome::CircuitBreakerTripped(
            synforge::executor::circuit_breaker::BreakerTrip::Oscillation(_)
        )
    ));
}

/// Scenario 4: a corrupted primary state file with no usable backup falls
/// back to a fresh, freshly-adopted state rather than propagating the
/// integrity error to the caller.
#[tokio::test]
async fn corrupt_state_with_no_backup_falls_back_to_fresh_state() {
    let dir = tempdir().unwrap();
    let orchestrator = WorkflowOrchestrator::new(
        Config::default(),
        dir.path(),
        Arc::new(AlwaysCompletePlanner),
        Arc::new(ScriptedExecutor::new(vec![finish_feature_action()])) as Arc<dyn Executor>,
        Store::new(),
        Arc::new(NullHost),
        Arc::new(InMemoryVault::new()),
        Arc::new(IntelligenceCache::new(HeuristicCodeIntelligence)),
        Arc::new(Aggregator::default_stack()),
    );

    let marker = dir.path().join(".synforge");
    std::fs::create_dir_all(&marker).unwrap();
    std::fs::write(marker.join("project_state.json"), "{not even json").unwrap();

    let state = orchestrator.load_or_adopt().await.unwrap();
    assert!(state.features.is_empty());
    assert_eq!(state.root_path, dir.path());
}

/// Scenario 5: the persistence core refuses to overwrite a non-empty
/// on-disk state with an empty one, leaving the file untouched.
#[test]
fn empty_over_nonempty_state_is_refused() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("project_state.json");
    let store = Store::new();

    let mut populated = ProjectState::new(dir.path().to_path_buf());
    populated.features.push(synforge::state::model::Feature::new("f1", "first feature"));
    store.save(&path, &populated).unwrap();

    let empty = ProjectState::new(dir.path().to_path_buf());
    let err = store.save(&path, &empty).unwrap_err();
    assert!(matches!(err, synforge::errors::PersistError::EmptyStateGuard));

    let reloaded = store.load(&path, &AutoConfirm).unwrap();
    assert_eq!(reloaded.features.len(), 1);
}

/// Scenario 6: the Command Safety Gate rejects a directory-escaping
/// interpreter invocation, a shell-redirect attempt, and an absolute-path
/// write outside the sandboxed project root.
#[test]
fn command_sandbox_rejects_escapes_and_redirects() {
    let dir = tempdir().unwrap();
    let gate = CommandSafetyGate::new(dir.path());

    assert!(gate.validate("python ../evil.py").is_err());
    assert!(gate.validate("run_tests > out.txt").is_err());
    assert!(gate.validate("mkdir /tmp/x").is_err());
}

/// `orch status` on a project with no persisted state prints guidance
/// instead of erroring.
#[test]
fn cli_status_on_fresh_project_prints_guidance() {
    let dir = tempdir().unwrap();
    let mut cmd = AssertCommand::cargo_bin("synforge").unwrap();
    cmd.args(["--project-dir", dir.path().to_str().unwrap(), "status"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("No project state found"));
}

/// `orch config show` prints the compiled-in defaults when no config file
/// is present.
#[test]
fn cli_config_show_prints_defaults() {
    let dir = tempdir().unwrap();
    let mut cmd = AssertCommand::cargo_bin("synforge").unwrap();
    cmd.args(["--project-dir", dir.path().to_str().unwrap(), "config", "show"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("max_steps                 = 15"));
}

/// `orch reset --force` on a project with persisted state soft-deletes it
/// to the trash directory rather than erroring or unlinking directly.
#[test]
fn cli_reset_force_soft_deletes_state() {
    let dir = tempdir().unwrap();
    let marker = dir.path().join(".synforge");
    std::fs::create_dir_all(&marker).unwrap();
    let store = Store::new();
    let mut state = ProjectState::new(dir.path().to_path_buf());
    state.features.push(synforge::state::model::Feature::new("f1", "first feature"));
    store.save(&marker.join("project_state.json"), &state).unwrap();

    let mut cmd = AssertCommand::cargo_bin("synforge").unwrap();
    cmd.args(["--project-dir", dir.path().to_str().unwrap(), "reset", "--force"]);
    cmd.assert().success();
    assert!(!marker.join("project_state.json").exists());
    assert!(marker.join("trash").exists());
}
