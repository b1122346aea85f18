//! `HostAdapter`: the single capability trait standing in for every
//! "callable UI callback with dynamic arity" the teacher binary spreads
//! across `dialoguer` prompts (confirmation, free text, selection). Spec §9
//! calls for exactly this shape: one method per question kind, typed
//! request/response records, no dynamic-arity callables.

use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct ConfirmRequest {
    pub message: String,
    /// Present when the gate has a safer rewritten form to offer instead.
    pub safe_alternative: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmResponse {
    Yes,
    No,
}

#[derive(Debug, Clone)]
pub struct InputRequest {
    pub prompt: String,
    pub sensitive: bool,
}

#[derive(Debug, Clone)]
pub struct InputResponse {
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct FilePickerRequest {
    pub prompt: String,
    pub root: std::path::PathBuf,
}

#[derive(Debug, Clone)]
pub struct FilePickerResponse {
    pub path: std::path::PathBuf,
}

/// The orchestrator pauses and asks the host application a typed question
/// through this trait; it never calls back into arbitrary UI code (spec §9
/// design note: "callable UI callbacks with dynamic arity").
#[async_trait]
pub trait HostAdapter: Send + Sync {
    async fn confirm(&self, request: ConfirmRequest) -> ConfirmResponse;
    async fn request_input(&self, request: InputRequest) -> InputResponse;
    async fn pick_file(&self, request: FilePickerRequest) -> Option<FilePickerResponse>;

    /// Deliver one structured failure entry (spec §7 "User-visible failure
    /// behavior"). Default implementation does nothing; CLI hosts override
    /// it to print a line.
    fn report_failure(&self, _report: &crate::errors::FailureReport) {}
}

/// Non-interactive host used by tests and unattended runs: always declines
/// confirmation (the safe default for anything gated) and never has input
/// to offer. Mirrors the teacher's `--yes` auto-approve shortcut in spirit,
/// but defaults to the conservative choice rather than auto-approving.
pub struct NullHost;

#[async_trait]
impl HostAdapter for NullHost {
    async fn confirm(&self, _request: ConfirmRequest) -> ConfirmResponse {
        ConfirmResponse::No
    }

    async fn request_input(&self, _request: InputRequest) -> InputResponse {
        InputResponse {
            value: String::new(),
        }
    }

    async fn pick_file(&self, _request: FilePickerRequest) -> Option<FilePickerResponse> {
        None
    }
}
