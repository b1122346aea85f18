//! Action dispatch: the nine-action state machine (spec §4.3).

use super::content_security;
use super::patch;
use super::snapshot::Snapshot;
use crate::codeintel;
use crate::errors::{ActionError, GateError};
use crate::frontend::{Aggregator, FileKind, StructuredFile};
use crate::host::{ConfirmRequest, HostAdapter, InputRequest};
use crate::llm::Planner;
use crate::safety::CommandSafetyGate;
use crate::cancellation::CancellationToken;
use crate::state::model::{ActionKind, ActionRequest, ContentAvailability, ProjectState, WorkLogEntry};
use crate::vault::CredentialVault;
use std::collections::BTreeSet;
use std::path::Path;

/// Files above this size are refused for `get_full_file_content` (spec
/// §4.3 "read with size check") — large generated/vendored files aren't
/// useful in an LLM prompt regardless of context-budget admission.
const MAX_FULL_FILE_BYTES: u64 = 256 * 1024;
const LINE_NUMBER_CUTOFF: usize = 500;

pub enum ActionOutcome {
    Continue,
    Terminate,
    /// `abort` was requested; the step loop raises instead of continuing.
    Abort(String),
}

pub struct DispatchResult {
    pub outcome: ActionOutcome,
    /// Non-fatal text to feed back to the Executor as the next step's
    /// correction, even on a successful dispatch (rollback reason,
    /// checkpoint guidance, unresolved frontend issues, sanitized user
    /// input).
    pub correction: Option<String>,
}

impl DispatchResult {
    fn continuing() -> Self {
        Self {
            outcome: ActionOutcome::Continue,
            correction: None,
        }
    }

    fn continuing_with(correction: impl Into<String>) -> Self {
        Self {
            outcome: ActionOutcome::Continue,
            correction: Some(correction.into()),
        }
    }
}

pub struct DispatchContext<'a> {
    pub project_root: &'a Path,
    pub state: &'a mut ProjectState,
    pub modified_files: &'a mut BTreeSet<String>,
    pub work_log: &'a [WorkLogEntry],
    pub gate: &'a CommandSafetyGate,
    pub vault: &'a dyn CredentialVault,
    pub host: &'a dyn HostAdapter,
    pub planner: &'a dyn Planner,
    pub cancel: &'a CancellationToken,
    pub snapshot: &'a Snapshot,
    pub aggregator: &'a Aggregator,
}

/// Extract a human-readable primary target for circuit-breaker
/// signatures and work-log entries (spec §4.2 step 8).
pub fn primary_target(action: &ActionRequest) -> String {
    let p = &action.parameters;
    p.get("file_path")
        .or_else(|| p.get("command"))
        .or_else(|| p.get("prompt"))
        .or_else(|| p.get("reason"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn string_param(params: &serde_json::Value, key: &str) -> Result<String, ActionError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| ActionError::Rejected(format!("missing required parameter '{key}'")))
}

pub async fn dispatch(action: &ActionRequest, ctx: &mut DispatchContext<'_>) -> Result<DispatchResult, ActionError> {
    match action.action {
        ActionKind::WriteFile => write_file(action, ctx).await,
        ActionKind::PatchFile => patch_file(action, ctx).await,
        ActionKind::GetFullFileContent => get_full_file_content(action, ctx).await,
        ActionKind::RunCommand => run_command(action, ctx).await,
        ActionKind::RequestUserInput => request_user_input(action, ctx).await,
        ActionKind::PlannerCheckpoint => planner_checkpoint(action, ctx).await,
        ActionKind::Rollback => rollback(action, ctx).await,
        ActionKind::FinishFeature => finish_feature(ctx).await,
        ActionKind::Abort => abort(action),
    }
}

fn resolve_safe_path(ctx: &DispatchContext<'_>, relative: &str) -> Result<std::path::PathBuf, ActionError> {
    crate::safety::sandbox::resolve_within_root(ctx.project_root, ctx.project_root, relative)
        .map_err(|e| ActionError::Rejected(e.to_string()))
}

async fn write_file(action: &ActionRequest, ctx: &mut DispatchContext<'_>) -> Result<DispatchResult, ActionError> {
    let file_path = string_param(&action.parameters, "file_path")?;
    let content = string_param(&action.parameters, "content")?;

    let full_path = resolve_safe_path(ctx, &file_path)?;
    let substituted = crate::executor::placeholders::substitute(&content, &mut ctx.state.placeholders, ctx.vault, ctx.host).await;

    let role = codeintel::classify_role(&file_path);
    content_security::scan(&substituted, role).map_err(ActionError::ContentSecurity)?;

    if let Some(parent) = full_path.parent() {
        crate::util::create_dir_all(parent).await?;
    }
    crate::util::write(&full_path, substituted).await?;

    ctx.modified_files.insert(file_path.clone());
    ctx.state.upgrade_availability(&file_path, ContentAvailability::FullContent);
    Ok(DispatchResult::continuing())
}

async fn patch_file(action: &ActionRequest, ctx: &mut DispatchContext<'_>) -> Result<DispatchResult, ActionError> {
    let file_path = string_param(&action.parameters, "file_path")?;
    let diff_text = string_param(&action.parameters, "patch")?;

    if ctx.state.availability_of(&file_path) != ContentAvailability::FullContent {
        return Err(ActionError::Rejected(format!(
            "'{file_path}' is not loaded as full_content — call get_full_file_content first"
        )));
    }

    let full_path = resolve_safe_path(ctx, &file_path)?;
    let original = crate::util::read_to_string(&full_path).await?;

    let role = codeintel::classify_role(&file_path);
    content_security::scan(&diff_text, role).map_err(ActionError::ContentSecurity)?;

    let diff = patch::parse(&diff_text).map_err(ActionError::PatchFailed)?;
    let patched = match patch::apply_strict(&original, &diff) {
        Ok(patched) => patched,
        Err(strict_err) => patch::apply_fuzzy(&original, &diff)
            .map_err(|fuzzy_err| ActionError::PatchFailed(format!("strict: {strict_err}; fuzzy: {fuzzy_err}")))?,
    };

    crate::util::write(&full_path, patched).await?;
    ctx.modified_files.insert(file_path.clone());
    Ok(DispatchResult::continuing())
}

async fn get_full_file_content(action: &ActionRequest, ctx: &mut DispatchContext<'_>) -> Result<DispatchResult, ActionError> {
    let file_path = string_param(&action.parameters, "file_path")?;
    let full_path = resolve_safe_path(ctx, &file_path)?;

    let len = crate::util::file_len(&full_path).await?;
    if len > MAX_FULL_FILE_BYTES {
        return Err(ActionError::Rejected(format!(
            "'{file_path}' is {len} bytes, over the {MAX_FULL_FILE_BYTES}-byte limit for full content",
        )));
    }

    let content = crate::util::read_to_string(&full_path).await?;
    let line_count = content.lines().count();
    let rendered = if line_count <= LINE_NUMBER_CUTOFF {
        content
            .lines()
            .enumerate()
            .map(|(i, line)| format!("{:>5} | {}", i + 1, line))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        content
    };

    ctx.state.upgrade_availability(&file_path, ContentAvailability::FullContent);
    ctx.modified_files.insert(file_path);
    Ok(DispatchResult::continuing_with(rendered))
}

async fn run_command(action: &ActionRequest, ctx: &mut DispatchContext<'_>) -> Result<DispatchResult, ActionError> {
    let command = string_param(&action.parameters, "command")?;
    let args: Vec<String> = action
        .parameters
        .get("args")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let full_command = if args.is_empty() {
        command
    } else {
        format!("{command} {}", args.join(" "))
    };

    let validated = ctx
        .gate
        .validate(&full_command)
        .map_err(|reason| ActionError::CommandBlocked { reason, safe_alternative: None })?;

    if validated.needs_confirmation {
        let response = ctx
            .host
            .confirm(ConfirmRequest {
                message: format!("Run '{full_command}'?"),
                safe_alternative: None,
            })
            .await;
        if response == crate::host::ConfirmResponse::No {
            return Err(ActionError::CommandBlocked {
                reason: GateError::ConfirmationDeclined,
                safe_alternative: None,
            });
        }
    }

    let before: BTreeSet<String> = snapshot_file_list(ctx.project_root);
    let outcome = ctx.gate.execute(&validated, ctx.cancel).await?;
    let after = snapshot_file_list(ctx.project_root);

    for created in after.difference(&before) {
        ctx.modified_files.insert(created.clone());
    }

    Ok(DispatchResult::continuing_with(format!(
        "exit {}\nstdout:\n{}\nstderr:\n{}",
        outcome.exit_code, outcome.stdout, outcome.stderr
    )))
}

fn snapshot_file_list(root: &Path) -> BTreeSet<String> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.path().strip_prefix(root).ok().map(|p| p.to_string_lossy().into_owned()))
        .collect()
}

async fn request_user_input(action: &ActionRequest, ctx: &mut DispatchContext<'_>) -> Result<DispatchResult, ActionError> {
    let prompt = string_param(&action.parameters, "prompt")?;
    let response = ctx
        .host
        .request_input(InputRequest {
            prompt,
            sensitive: false,
        })
        .await;
    let sanitized = response.value.replace(['\r', '\0'], "");
    Ok(DispatchResult::continuing_with(format!("user responded: {sanitized}")))
}

async fn planner_checkpoint(action: &ActionRequest, ctx: &mut DispatchContext<'_>) -> Result<DispatchResult, ActionError> {
    let reason = string_param(&action.parameters, "reason")?;
    let summary = ctx
        .work_log
        .iter()
        .map(|entry| format!("{}: {} -> {}", entry.action_kind, entry.target, entry.outcome))
        .collect::<Vec<_>>()
        .join("\n");

    let guidance = ctx
        .planner
        .checkpoint(&summary, &reason)
        .await
        .map_err(|e| ActionError::Other(anyhow::anyhow!(e)))?;
    Ok(DispatchResult::continuing_with(guidance))
}

async fn rollback(action: &ActionRequest, ctx: &mut DispatchContext<'_>) -> Result<DispatchResult, ActionError> {
    let reason = string_param(&action.parameters, "reason")?;
    ctx.snapshot.restore()?;
    Ok(DispatchResult::continuing_with(format!("rolled back: {reason}")))
}

async fn finish_feature(ctx: &mut DispatchContext<'_>) -> Result<DispatchResult, ActionError> {
    let files = load_structured_files(ctx.project_root, ctx.modified_files);
    let blocking = ctx.aggregator.blocking_issues(&files);

    if blocking.is_empty() {
        return Ok(DispatchResult {
            outcome: ActionOutcome::Terminate,
            correction: None,
        });
    }

    let issues_text = blocking
        .iter()
        .map(|issue| format!("[{:?}] {}: {}", issue.severity, issue.file, issue.message))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(DispatchResult::continuing_with(format!(
        "finish_feature blocked by frontend validation:\n{issues_text}"
    )))
}

fn load_structured_files(root: &Path, paths: &BTreeSet<String>) -> Vec<StructuredFile> {
    paths
        .iter()
        .filter_map(|path| {
            let content = std::fs::read_to_string(root.join(path)).ok()?;
            let kind = match Path::new(path).extension().and_then(|e| e.to_str()) {
                Some("html" | "htm") => FileKind::Html,
                Some("css") => FileKind::Css,
                Some("js" | "jsx" | "ts" | "tsx") => FileKind::Js,
                _ => FileKind::Other,
            };
            Some(StructuredFile {
                path: path.clone(),
                kind,
                content,
            })
        })
        .collect()
}

fn abort(action: &ActionRequest) -> Result<DispatchResult, ActionError> {
    let reason = action
        .parameters
        .get("reason")
        .and_then(|v| v.as_str())
        .unwrap_or("no reason given")
        .to_string();
    Ok(DispatchResult {
        outcome: ActionOutcome::Abort(reason),
        correction: None,
    })
}
