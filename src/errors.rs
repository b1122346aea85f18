//! Typed error hierarchy for the orchestrator.
//!
//! Subsystem errors are closed enums (`PersistError`, `GateError`,
//! `ActionError`), composed into the top-level `ErrorKind` taxonomy via
//! `From` impls. `ErrorKind` is the shape the orchestrator's propagation
//! policy (spec §7) actually dispatches on.

use thiserror::Error;

/// Errors from the Persistence Core (`state::persistence`).
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to read state file at {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write state file at {path}: {source}")]
    Write {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse state JSON: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("integrity hash mismatch: expected {expected}, computed {computed}")]
    IntegrityMismatch { expected: String, computed: String },

    #[error("refusing to overwrite non-empty state with an empty one")]
    EmptyStateGuard,

    #[error("no usable backup found for {path}")]
    NoUsableBackup { path: std::path::PathBuf },

    #[error("lock poisoned for {path}")]
    LockPoisoned { path: std::path::PathBuf },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the Command Safety Gate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("command matched a blocklisted pattern: {pattern}")]
    Blocklisted { pattern: String },

    #[error("command contains a shell metacharacter outside quoting: '{0}'")]
    ShellMetacharacter(char),

    #[error("command '{0}' is not in the whitelist")]
    NotWhitelisted(String),

    #[error("argument validation failed: {0}")]
    ValidatorRejected(String),

    #[error("path argument '{0}' escapes the project root")]
    PathEscapesRoot(String),

    #[error("path argument '{0}' is absolute, which is not permitted")]
    AbsolutePath(String),

    #[error("user declined to confirm the command")]
    ConfirmationDeclined,

    #[error("empty command")]
    Empty,
}

/// Errors surfaced by a single Action dispatch attempt.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("validation rejected: {0}")]
    Rejected(String),

    #[error("command blocked: {reason}")]
    CommandBlocked {
        reason: GateError,
        safe_alternative: Option<String>,
    },

    #[error("content security scan rejected the body: {0}")]
    ContentSecurity(String),

    #[error("patch failed (strict and fuzzy): {0}")]
    PatchFailed(String),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The top-level error taxonomy from spec §7. Every failure that crosses a
/// component boundary is funneled through one of these eight kinds so the
/// orchestrator's propagation policy can dispatch on `kind()` alone.
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("interrupted by cooperative cancellation")]
    UserInterrupted,

    #[error("transient LLM failure: {0}")]
    LlmTransient(String),

    #[error("persistent LLM failure after retries: {0}")]
    LlmPersistent(String),

    #[error("action rejected: {0}")]
    ActionRejected(String),

    #[error("command blocked: {0}")]
    CommandBlocked(String),

    #[error("circuit breaker triggered: {0}")]
    CircuitBreakerTriggered(String),

    #[error("persisted state is corrupt: {0}")]
    StateCorrupt(String),

    #[error("empty-state guard refused the save")]
    EmptyStateGuard,
}

impl From<GateError> for ErrorKind {
    fn from(e: GateError) -> Self {
        ErrorKind::CommandBlocked(e.to_string())
    }
}

impl From<ActionError> for ErrorKind {
    fn from(e: ActionError) -> Self {
        match e {
            ActionError::Rejected(msg) => ErrorKind::ActionRejected(msg),
            ActionError::CommandBlocked { reason, .. } => ErrorKind::CommandBlocked(reason.to_string()),
            ActionError::ContentSecurity(msg) => ErrorKind::ActionRejected(msg),
            ActionError::PatchFailed(msg) => ErrorKind::ActionRejected(msg),
            ActionError::Persist(PersistError::EmptyStateGuard) => ErrorKind::EmptyStateGuard,
            ActionError::Persist(e) => ErrorKind::StateCorrupt(e.to_string()),
            ActionError::Io(e) => ErrorKind::ActionRejected(e.to_string()),
            ActionError::Other(e) => ErrorKind::ActionRejected(e.to_string()),
        }
    }
}

impl From<PersistError> for ErrorKind {
    fn from(e: PersistError) -> Self {
        match e {
            PersistError::EmptyStateGuard => ErrorKind::EmptyStateGuard,
            other => ErrorKind::StateCorrupt(other.to_string()),
        }
    }
}

/// One structured progress entry surfaced to the user on failure (spec §7).
/// Detailed diagnostics never reach this struct's `reason` field verbatim
/// for `StateCorrupt`/internal errors beyond a short summary; full detail
/// goes to `tracing`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FailureReport {
    pub feature_id: String,
    pub kind: String,
    pub reason: String,
}

impl FailureReport {
    pub fn new(feature_id: impl Into<String>, kind: &ErrorKind) -> Self {
        Self {
            feature_id: feature_id.into(),
            kind: kind_label(kind).to_string(),
            reason: short_reason(kind),
        }
    }
}

fn kind_label(kind: &ErrorKind) -> &'static str {
    match kind {
        ErrorKind::UserInterrupted => "UserInterrupted",
        ErrorKind::LlmTransient(_) => "LLMTransient",
        ErrorKind::LlmPersistent(_) => "LLMPersistent",
        ErrorKind::ActionRejected(_) => "ActionRejected",
        ErrorKind::CommandBlocked(_) => "CommandBlocked",
        ErrorKind::CircuitBreakerTriggered(_) => "CircuitBreakerTriggered",
        ErrorKind::StateCorrupt(_) => "StateCorrupt",
        ErrorKind::EmptyStateGuard => "EmptyStateGuard",
    }
}

fn short_reason(kind: &ErrorKind) -> String {
    const MAX: usize = 160;
    let full = kind.to_string();
    if full.len() > MAX {
        format!("{}...", &full[..MAX])
    } else {
        full
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_error_converts_to_command_blocked() {
        let gate = GateError::NotWhitelisted("rm".into());
        let kind: ErrorKind = gate.into();
        assert!(matches!(kind, ErrorKind::CommandBlocked(_)));
    }

    #[test]
    fn persist_error_empty_guard_maps_to_dedicated_kind() {
        let kind: ErrorKind = PersistError::EmptyStateGuard.into();
        assert!(matches!(kind, ErrorKind::EmptyStateGuard));
    }

    #[test]
    fn action_error_command_blocked_preserves_gate_reason() {
        let action = ActionError::CommandBlocked {
            reason: GateError::AbsolutePath("/tmp/x".into()),
            safe_alternative: None,
        };
        let kind: ErrorKind = action.into();
        match kind {
            ErrorKind::CommandBlocked(msg) => assert!(msg.contains("/tmp/x")),
            _ => panic!("expected CommandBlocked"),
        }
    }

    #[test]
    fn failure_report_truncates_long_reasons() {
        let kind = ErrorKind::StateCorrupt("x".repeat(500));
        let report = FailureReport::new("feat-1", &kind);
        assert!(report.reason.len() <= 165);
        assert_eq!(report.kind, "StateCorrupt");
    }
}
