//! Provider-agnostic Planner/Executor traits (spec §6, §9: "the
//! orchestrator itself is model-agnostic"). LLM transport, auth, and the
//! provider registry are out of scope (spec §1) — these traits are the
//! entire contract the rest of the crate depends on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::state::model::WorkLogEntry;

#[derive(Debug, Error, Clone)]
pub enum LlmError {
    /// Auth, rate-limit, network — bounded-retry with backoff at the call
    /// site, surfaced to the user as "update credentials / retry / cancel".
    #[error("transient LLM failure: {0}")]
    Transient(String),

    /// Malformed or inconsistent output after retries — becomes the
    /// "issue" the Planner must address on the next attempt.
    #[error("persistent LLM failure: {0}")]
    Persistent(String),
}

/// Snapshot of project context handed to the Planner for the breakdown
/// phase (spec §4.1).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectContext {
    pub framework: Option<String>,
    pub registered_apps: BTreeSet<String>,
    pub defined_models: BTreeMap<String, BTreeSet<String>>,
    pub file_tree_summary: String,
}

/// What's sent to the Planner at the end of a remediation attempt
/// (spec §4.1 step 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub feature_description: String,
    pub cumulative_work_log: Vec<WorkLogEntry>,
    pub code_map: serde_json::Value,
    pub frontend_issues: Vec<String>,
}

/// `{completion_percentage, issues}` (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResponse {
    pub completion_percentage: u8,
    pub issues: Vec<String>,
}

impl VerificationResponse {
    pub fn is_complete(&self) -> bool {
        self.completion_percentage >= 100
    }
}

/// The decomposition + review role.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Submit the sanitized request with project context; returns a
    /// numbered list of feature descriptions (spec §4.1 breakdown phase).
    async fn breakdown(
        &self,
        request: &str,
        context: &ProjectContext,
    ) -> Result<Vec<String>, LlmError>;

    /// Verify a remediation attempt and report completion + issues.
    async fn verify(&self, request: &VerificationRequest) -> Result<VerificationResponse, LlmError>;

    /// Produce a remediation instruction string keyed on reported issues
    /// (spec §4.1 step 8).
    async fn remediation_instruction(
        &self,
        request: &VerificationRequest,
    ) -> Result<String, LlmError>;

    /// Respond to a `planner_checkpoint` action with guidance text.
    async fn checkpoint(&self, work_log_summary: &str, reason: &str) -> Result<String, LlmError>;

    /// Compress the detailed work history into one paragraph
    /// (spec §4.4 "History compression").
    async fn summarize_history(
        &self,
        previous_summary: Option<&str>,
        new_entries: &[WorkLogEntry],
    ) -> Result<String, LlmError>;
}

/// The single-next-action role.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Ask for exactly one `ActionRequest`, as raw text (markdown-fenced or
    /// bare JSON); parsing happens in `executor::parsing`.
    async fn next_action(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Deterministic placeholder Planner/Executor, wired in by the CLI by
/// default. A real provider (spec §1: "LLM transport/authentication" is out
/// of scope) plugs into `Planner`/`Executor` the same way; until one is
/// configured, `breakdown` treats the whole request as one feature and
/// `next_action` always asks to finish it immediately, so `orch run` is
/// exercisable end-to-end without a live model.
pub struct PassthroughPlanner;

#[async_trait]
impl Planner for PassthroughPlanner {
    async fn breakdown(&self, request: &str, _context: &ProjectContext) -> Result<Vec<String>, LlmError> {
        let trimmed = request.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![trimmed.to_string()])
    }

    async fn verify(&self, _request: &VerificationRequest) -> Result<VerificationResponse, LlmError> {
        Ok(VerificationResponse {
            completion_percentage: 100,
            issues: Vec::new(),
        })
    }

    async fn remediation_instruction(&self, request: &VerificationRequest) -> Result<String, LlmError> {
        Ok(format!("address: {}", request.issues_joined()))
    }

    async fn checkpoint(&self, _work_log_summary: &str, reason: &str) -> Result<String, LlmError> {
        Ok(format!("acknowledged: {reason}"))
    }

    async fn summarize_history(
        &self,
        previous_summary: Option<&str>,
        new_entries: &[WorkLogEntry],
    ) -> Result<String, LlmError> {
        Ok(format!(
            "{} ({} further steps)",
            previous_summary.unwrap_or("feature work in progress"),
            new_entries.len()
        ))
    }
}

pub struct PassthroughExecutor;

#[async_trait]
impl Executor for PassthroughExecutor {
    async fn next_action(&self, _prompt: &str) -> Result<String, LlmError> {
        Ok(serde_json::json!({
            "thought": "no LLM provider configured; finishing the feature as-is",
            "action": "finish_feature",
            "parameters": {}
        })
        .to_string())
    }
}

impl VerificationRequest {
    fn issues_joined(&self) -> String {
        if self.issues_empty() {
            "(no reported issues)".to_string()
        } else {
            self.frontend_issues.join("; ")
        }
    }

    fn issues_empty(&self) -> bool {
        self.frontend_issues.is_empty()
    }
}

impl From<LlmError> for crate::errors::ErrorKind {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Transient(msg) => crate::errors::ErrorKind::LlmTransient(msg),
            LlmError::Persistent(msg) => crate::errors::ErrorKind::LlmPersistent(msg),
        }
    }
}
