//! The Executor Step Loop (spec §4.2): the per-step procedure that drives
//! a single feature attempt through the Executor LLM, action dispatch,
//! circuit breakers, and state bookkeeping.

pub mod actions;
pub mod circuit_breaker;
pub mod content_security;
pub mod parsing;
pub mod patch;
pub mod placeholders;
pub mod snapshot;

use crate::cancellation::CancellationToken;
use crate::codeintel::IntelligenceCache;
use crate::context::{ContextManager, Fragment, FragmentKind, HistoryCompressor};
use crate::frontend::Aggregator;
use crate::host::HostAdapter;
use crate::llm::{Executor, Planner};
use crate::safety::CommandSafetyGate;
use crate::state::model::{ActionKind, ContentAvailability, ProjectState, WorkLogEntry};
use crate::vault::CredentialVault;
use actions::{dispatch, primary_target, ActionOutcome, DispatchContext};
use circuit_breaker::{ActionSignature, BreakerTrip, CircuitBreakers};
use snapshot::Snapshot;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

/// How a feature attempt's Executor Step Loop ended (spec §4.2 termination
/// conditions).
#[derive(Debug)]
pub enum StepLoopOutcome {
    Finished,
    StepBudgetExhausted,
    Aborted(String),
    CircuitBreakerTripped(BreakerTrip),
}

pub struct ExecutorStepLoop {
    pub executor_llm: Arc<dyn Executor>,
    pub planner: Arc<dyn Planner>,
    pub gate: Arc<CommandSafetyGate>,
    pub vault: Arc<dyn CredentialVault>,
    pub host: Arc<dyn HostAdapter>,
    pub codeintel: Arc<IntelligenceCache>,
    pub context_manager: ContextManager,
    pub history_compressor: HistoryCompressor,
    pub frontend: Arc<Aggregator>,
    pub project_root: PathBuf,
    pub max_steps: u32,
    pub cancel: CancellationToken,
}

impl ExecutorStepLoop {
    /// Every collaborator is shared (`Arc`) so a `WorkflowOrchestrator` can
    /// build a fresh step loop per feature attempt without re-wiring the
    /// same LLM clients, credential vault, host, command gate, or
    /// code-intelligence cache each time.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        executor_llm: Arc<dyn Executor>,
        planner: Arc<dyn Planner>,
        gate: Arc<CommandSafetyGate>,
        vault: Arc<dyn CredentialVault>,
        host: Arc<dyn HostAdapter>,
        codeintel: Arc<IntelligenceCache>,
        frontend: Arc<Aggregator>,
        project_root: PathBuf,
        max_steps: u32,
        max_context_size: usize,
        history_summary_threshold: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            executor_llm,
            planner,
            gate,
            vault,
            host,
            codeintel,
            context_manager: ContextManager::new(max_context_size),
            history_compressor: HistoryCompressor::new(history_summary_threshold),
            frontend,
            project_root,
            max_steps,
            cancel,
        }
    }

    /// Run one feature attempt to completion, a step-budget exhaustion, an
    /// abort, or a circuit-breaker trip. Returns the files touched, the
    /// (possibly compressed) work log, and how the attempt ended.
    pub async fn run_feature(
        &mut self,
        state: &mut ProjectState,
        feature_description: &str,
    ) -> (BTreeSet<String>, Vec<WorkLogEntry>, StepLoopOutcome) {
        let mut modified_files = BTreeSet::new();
        let mut work_log: Vec<WorkLogEntry> = Vec::new();
        let mut breakers = CircuitBreakers::new();
        let mut history_summary: Option<String> = None;

        for _step in 0..self.max_steps {
            if self.cancel.is_cancelled() {
                return (modified_files, work_log, StepLoopOutcome::Aborted("cancelled".to_string()));
            }

            let prompt = self.assemble_prompt(state, feature_description, &work_log, history_summary.as_deref());

            let raw = match self.executor_llm.next_action(&prompt).await {
                Ok(raw) => raw,
                Err(e) => {
                    work_log.push(WorkLogEntry::new("executor_call", "-", "llm_error").with_error(e.to_string()));
                    continue;
                }
            };

            let action = match parsing::parse_action_request(&raw) {
                Ok(action) => action,
                Err(correction) => {
                    work_log.push(WorkLogEntry::new("parse_error", "-", "rejected").with_error(correction));
                    continue;
                }
            };

            let target = primary_target(&action);
            let action_kind_label = action_kind_str(action.action);

            let mut snapshot = Snapshot::new();
            if let Some(file_path) = action.parameters.get("file_path").and_then(|v| v.as_str()) {
                let _ = snapshot.capture(&self.project_root, file_path);
            }

            let dispatch_outcome = {
                let mut ctx = DispatchContext {
                    project_root: &self.project_root,
                    state,
                    modified_files: &mut modified_files,
                    work_log: &work_log,
                    gate: self.gate.as_ref(),
                    vault: self.vault.as_ref(),
                    host: self.host.as_ref(),
                    planner: self.planner.as_ref(),
                    cancel: &self.cancel,
                    snapshot: &snapshot,
                    aggregator: self.frontend.as_ref(),
                };
                dispatch(&action, &mut ctx).await
            };

            let mut entry = WorkLogEntry::new(
                action_kind_label.clone(),
                target.clone(),
                if dispatch_outcome.is_ok() { "ok" } else { "error" },
            );
            if let Err(e) = &dispatch_outcome {
                entry = entry.with_error(e.to_string());
            }
            work_log.push(entry);

            match dispatch_outcome {
                Ok(result) => {
                    if matches!(action.action, ActionKind::Rollback) {
                        if let Err(trip) = breakers.record_rollback() {
                            return (modified_files, work_log, StepLoopOutcome::CircuitBreakerTripped(trip));
                        }
                    }
                    if matches!(action.action, ActionKind::PatchFile) {
                        breakers.reset_patch_failure();
                    }

                    let signature = ActionSignature {
                        action_kind: action_kind_label,
                        primary_target: target,
                    };
                    if let Err(trip) = breakers.record(signature, false) {
                        return (modified_files, work_log, StepLoopOutcome::CircuitBreakerTripped(trip));
                    }

                    self.post_write_reanalysis(state, &modified_files).await;

                    if let Some(correction) = &result.correction {
                        state.historical_notes.push(correction.clone());
                    }

                    match result.outcome {
                        ActionOutcome::Terminate => {
                            return (modified_files, work_log, StepLoopOutcome::Finished);
                        }
                        ActionOutcome::Abort(reason) => {
                            return (modified_files, work_log, StepLoopOutcome::Aborted(reason));
                        }
                        ActionOutcome::Continue => {}
                    }
                }
                Err(e) => {
                    if matches!(action.action, ActionKind::PatchFile) && breakers.record_patch_failure(&target) {
                        state.historical_notes.push(format!(
                            "patch_file failed {} times on {target}; switch to get_full_file_content + write_file",
                            circuit_breaker::PATCH_ESCALATION_THRESHOLD
                        ));
                        breakers.reset_patch_failure();
                    }

                    let signature = ActionSignature {
                        action_kind: action_kind_label,
                        primary_target: target,
                    };
                    if let Err(trip) = breakers.record(signature, true) {
                        return (modified_files, work_log, StepLoopOutcome::CircuitBreakerTripped(trip));
                    }

                    state.historical_notes.push(format!("action failed: {e}"));
                }
            }

            if self.history_compressor.should_compress(work_log.len()) {
                if let Ok(summary) = self
                    .history_compressor
                    .compress(self.planner.as_ref(), history_summary.as_deref(), &work_log)
                    .await
                {
                    history_summary = Some(summary);
                    work_log.clear();
                }
            }
        }

        (modified_files, work_log, StepLoopOutcome::StepBudgetExhausted)
    }

    /// Spec §4.2 step 7's full state-update: refresh `file_hashes` for
    /// every touched file, then for files loaded at `full_content`
    /// re-analyze and re-derive registered apps / defined models from
    /// settings- or model-shaped files.
    async fn post_write_reanalysis(&self, state: &mut ProjectState, modified_files: &BTreeSet<String>) {
        for path in modified_files {
            let full = self.project_root.join(path);
            let content = match std::fs::read_to_string(&full) {
                Ok(content) => content,
                Err(_) => continue,
            };
            state.file_hashes.insert(path.clone(), crate::codeintel::content_hash(&content));

            if state.availability_of(path) != ContentAvailability::FullContent {
                continue;
            }
            let info = self.codeintel.get_or_analyze(path, &content).await;
            apply_structure_derivation(state, path, &info);
            state.structure_map.insert(path.clone(), info);
        }
    }

    fn assemble_prompt(
        &self,
        state: &ProjectState,
        feature_description: &str,
        work_log: &[WorkLogEntry],
        history_summary: Option<&str>,
    ) -> String {
        let framework_rules = state.framework.as_deref().unwrap_or("no framework detected");
        let structure_summary = format!(
            "registered apps: {:?}\nmodels: {:?}",
            state.registered_apps, state.app_models
        );
        let availability_note = format!("content availability: {:?}", state.content_availability);

        let mut fragments = vec![Fragment::new(
            Fragment::SCORE_PROJECT_FACTS,
            "feature_description",
            feature_description,
            FragmentKind::Code,
        )];

        if let Some(summary) = history_summary {
            fragments.push(Fragment::new(
                Fragment::SCORE_HISTORY_SUMMARY,
                "history_summary",
                summary,
                FragmentKind::History,
            ));
        }

        for (i, entry) in work_log.iter().rev().enumerate() {
            fragments.push(Fragment::new(
                Fragment::work_log_score(i as u32),
                format!("work_log[{i}]"),
                format!("{}: {} -> {}", entry.action_kind, entry.target, entry.outcome),
                FragmentKind::History,
            ));
        }

        let known_files: Vec<String> = state.structure_map.keys().cloned().collect();
        for path in crate::context::smart_auto_fetch_candidates(feature_description, &known_files) {
            if let Some(info) = state.structure_map.get(path) {
                fragments.push(Fragment::new(
                    Fragment::SCORE_LAST_MODIFIED_SUMMARY,
                    format!("auto_fetch[{path}]"),
                    format!("{path}: {}", info.summary),
                    FragmentKind::Code,
                ));
            }
        }

        self.context_manager
            .assemble(framework_rules, &structure_summary, &availability_note, fragments)
            .text
    }
}

/// Re-derive `registered_apps` / `app_models` from a settings- or
/// model-shaped file's structured summary (spec §4.2 step 7). The
/// summary's shape beyond `role` is codeintel's to define (spec §1 treats
/// code intelligence as a black box); this crate only knows to look for an
/// `"apps"` array on `Settings` files and a `"models"` array on
/// `FrameworkModel` files, keyed under the file's parent directory name.
fn apply_structure_derivation(
    state: &mut ProjectState,
    path: &str,
    info: &crate::state::model::FileStructureInfo,
) {
    use crate::state::model::FileRole;
    match info.role {
        FileRole::Settings => {
            if let Some(apps) = info.summary.get("apps").and_then(|v| v.as_array()) {
                state.registered_apps = apps
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(String::from)
                    .collect();
            }
        }
        FileRole::FrameworkModel => {
            if let Some(models) = info.summary.get("models").and_then(|v| v.as_array()) {
                let names: BTreeSet<String> = models
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(String::from)
                    .collect();
                if !names.is_empty() {
                    state.app_models.insert(app_name_for(path), names);
                }
            }
        }
        _ => {}
    }
}

fn app_name_for(path: &str) -> String {
    std::path::Path::new(path)
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

fn action_kind_str(kind: ActionKind) -> String {
    serde_json::to_value(kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{kind:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codeintel::HeuristicCodeIntelligence;
    use crate::llm::{PassthroughExecutor, PassthroughPlanner};
    use crate::state::model::{FileRole, FileStructureInfo};
    use crate::vault::InMemoryVault;

    fn step_loop(root: PathBuf) -> ExecutorStepLoop {
        ExecutorStepLoop::new(
            Arc::new(PassthroughExecutor),
            Arc::new(PassthroughPlanner),
            Arc::new(CommandSafetyGate::new(root.clone())),
            Arc::new(InMemoryVault::new()),
            Arc::new(crate::host::NullHost),
            Arc::new(IntelligenceCache::new(HeuristicCodeIntelligence)),
            Arc::new(Aggregator::default_stack()),
            root,
            15,
            25_000,
            5,
            CancellationToken::new(),
        )
    }

    #[test]
    fn assemble_prompt_pulls_in_smart_auto_fetch_candidate() {
        let loop_ = step_loop(PathBuf::from("/tmp/does-not-matter"));
        let mut state = ProjectState::new(PathBuf::from("/tmp/does-not-matter"));
        state.structure_map.insert(
            "project/settings.py".to_string(),
            FileStructureInfo {
                role: FileRole::Settings,
                summary: serde_json::json!({"apps": ["blog"]}),
            },
        );
        state.structure_map.insert(
            "project/views.py".to_string(),
            FileStructureInfo {
                role: FileRole::Generic,
                summary: serde_json::json!({}),
            },
        );

        let prompt = loop_.assemble_prompt(&state, "update the settings for debug mode", &[], None);
        assert!(prompt.contains("project/settings.py"));
        assert!(!prompt.contains("project/views.py"));
    }

    #[test]
    fn assemble_prompt_omits_auto_fetch_when_no_keyword_match() {
        let loop_ = step_loop(PathBuf::from("/tmp/does-not-matter"));
        let mut state = ProjectState::new(PathBuf::from("/tmp/does-not-matter"));
        state.structure_map.insert(
            "project/settings.py".to_string(),
            FileStructureInfo {
                role: FileRole::Settings,
                summary: serde_json::json!({"apps": ["blog"]}),
            },
        );

        let prompt = loop_.assemble_prompt(&state, "add a login button", &[], None);
        assert!(!prompt.contains("auto_fetch"));
    }

    #[test]
    fn structure_derivation_populates_registered_apps_and_models() {
        let mut state = ProjectState::new(PathBuf::from("/tmp/does-not-matter"));
        let settings_info = FileStructureInfo {
            role: FileRole::Settings,
            summary: serde_json::json!({"apps": ["blog", "accounts"]}),
        };
        apply_structure_derivation(&mut state, "project/settings.py", &settings_info);
        assert_eq!(
            state.registered_apps,
            ["blog".to_string(), "accounts".to_string()]
                .into_iter()
                .collect::<std::collections::BTreeSet<String>>()
        );

        let model_info = FileStructureInfo {
            role: FileRole::FrameworkModel,
            summary: serde_json::json!({"models": ["Post", "Comment"]}),
        };
        apply_structure_derivation(&mut state, "blog/models.py", &model_info);
        assert!(state.app_models["blog"].contains("Post"));
    }
}
