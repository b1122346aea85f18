//! The Workflow Orchestrator (spec §4.1): the outer loop that breaks a
//! user request into Features, schedules them in dependency order, runs
//! the Planner/Executor dialog per feature through the Executor Step Loop,
//! and administers up to `MAX_REMEDIATION_ATTEMPTS` remediation retries
//! before giving up on a feature.

pub mod adoption;

use crate::cancellation::CancellationToken;
use crate::codeintel::IntelligenceCache;
use crate::config::{Config, ProjectPaths};
use crate::errors::{ErrorKind, FailureReport};
use crate::executor::{ExecutorStepLoop, StepLoopOutcome};
use crate::frontend::{Aggregator, FileKind, StructuredFile};
use crate::host::HostAdapter;
use crate::llm::{Executor, Planner, ProjectContext, VerificationRequest};
use crate::safety::CommandSafetyGate;
use crate::state::model::{Feature, FeatureStatus, ProjectState, WorkLogEntry};
use crate::state::persistence::{AutoConfirm, Store};
use crate::vault::CredentialVault;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Spec §4.1 "Remediation loop (per feature)".
pub const MAX_REMEDIATION_ATTEMPTS: u32 = 3;

/// One structured entry surfaced per feature failure (spec §7 "User-visible
/// failure behavior"; SPEC_FULL.md §4.1 "Progress callback"). A trait
/// rather than a direct call to `HostAdapter::report_failure` so a
/// non-interactive caller (a log sink, a test harness) can observe
/// failures without implementing the rest of the host surface.
pub trait ProgressSink: Send + Sync {
    fn report(&self, report: &FailureReport);
}

/// Forwards to a `HostAdapter`'s `report_failure`, so a terminal host wired
/// up for confirmations and input prompts doubles as the default progress
/// sink without a second implementation.
pub struct HostProgressSink(pub Arc<dyn HostAdapter>);

impl ProgressSink for HostProgressSink {
    fn report(&self, report: &FailureReport) {
        self.0.report_failure(report);
    }
}

/// Owns every collaborator the remediation loop needs and hands a fresh,
/// freshly-wired `ExecutorStepLoop` to each feature attempt (spec §4.1
/// step 1, "Instantiate an Executor for the feature"). Collaborators are
/// `Arc`-shared rather than recreated per attempt: the Planner/Executor
/// LLM clients, credential vault, host, command gate, and code-intelligence
/// cache are all meant to persist state (the gate's tracked `cd`, the
/// cache's entries) across the whole run, not just one feature.
pub struct WorkflowOrchestrator {
    config: Config,
    paths: ProjectPaths,
    planner: Arc<dyn Planner>,
    executor_llm: Arc<dyn Executor>,
    store: Store,
    host: Arc<dyn HostAdapter>,
    vault: Arc<dyn CredentialVault>,
    codeintel: Arc<IntelligenceCache>,
    frontend: Arc<Aggregator>,
    gate: Arc<CommandSafetyGate>,
    cancel: CancellationToken,
}

impl WorkflowOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        project_root: impl Into<PathBuf>,
        planner: Arc<dyn Planner>,
        executor_llm: Arc<dyn Executor>,
        store: Store,
        host: Arc<dyn HostAdapter>,
        vault: Arc<dyn CredentialVault>,
        codeintel: Arc<IntelligenceCache>,
        frontend: Arc<Aggregator>,
    ) -> Self {
        let project_root = project_root.into();
        let gate = Arc::new(CommandSafetyGate::new(project_root.clone()));
        Self {
            paths: ProjectPaths::new(project_root),
            config,
            planner,
            executor_llm,
            store,
            host,
            vault,
            codeintel,
            frontend,
            gate,
            cancel: CancellationToken::new(),
        }
    }

    /// A clone of the cooperative cancellation flag, for a caller (e.g. a
    /// CLI's Ctrl-C handler) to trip from outside the run loop.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Load this project's persisted state, recovering from backups on
    /// corruption and falling back to external-project adoption when
    /// nothing usable is on disk but recognizable framework code is (spec
    /// §4.1 "State corruption handling").
    pub async fn load_or_adopt(&self) -> anyhow::Result<ProjectState> {
        self.paths.ensure_directories()?;

        if !self.paths.state_file.exists() {
            return self.fresh_adopted_state().await;
        }

        match self.store.load(&self.paths.state_file, &AutoConfirm) {
            Ok(mut state) => {
                if state.is_empty() {
                    self.adopt_if_recognizable(&mut state).await;
                    self.store.save(&self.paths.state_file, &state)?;
                }
                Ok(state)
            }
            Err(_) => self.fresh_adopted_state().await,
        }
    }

    async fn fresh_adopted_state(&self) -> anyhow::Result<ProjectState> {
        let mut state = ProjectState::new(self.paths.root.clone());
        self.adopt_if_recognizable(&mut state).await;
        self.store.save(&self.paths.state_file, &state)?;
        Ok(state)
    }

    async fn adopt_if_recognizable(&self, state: &mut ProjectState) {
        if let Some(framework) = adoption::detect_framework(&self.paths.root) {
            state.framework = Some(framework);
            adoption::scan_into(&self.paths.root, &self.codeintel, state).await;
        }
    }

    /// Run the full workflow for one natural-language `request` against
    /// `state`: breakdown into Features, then repeatedly select and drive
    /// the next continuable Feature to a terminal status until none
    /// remain (spec §4.1 breakdown + selection phases).
    pub async fn run(
        &mut self,
        state: &mut ProjectState,
        request: &str,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> anyhow::Result<()> {
        let run_id = uuid::Uuid::new_v4();
        tracing::info!(%run_id, "starting workflow run");
        self.breakdown(state, request).await?;
        self.store.save(&self.paths.state_file, state)?;

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(%run_id, "run cancelled");
                return Ok(());
            }
            let Some(feature_id) = self.select_next_feature(state) else {
                tracing::info!(%run_id, "no continuable feature remains, run complete");
                return Ok(());
            };
            tracing::info!(%run_id, feature_id = %feature_id, "selected feature");
            state.current_feature_id = Some(feature_id.clone());
            self.store.save(&self.paths.state_file, state)?;

            if let Err(kind) = self.run_remediation_loop(state, &feature_id).await {
                tracing::warn!(%run_id, feature_id = %feature_id, "feature failed: {kind}");
                let report = FailureReport::new(feature_id.clone(), &kind);
                self.host.report_failure(&report);
                if let Some(sink) = &progress {
                    sink.report(&report);
                }
                if matches!(kind, ErrorKind::UserInterrupted) {
                    return Ok(());
                }
            }

            state.current_feature_id = None;
            self.store.save(&self.paths.state_file, state)?;
        }
    }

    async fn breakdown(&self, state: &mut ProjectState, request: &str) -> anyhow::Result<()> {
        let context = ProjectContext {
            framework: state.framework.clone(),
            registered_apps: state.registered_apps.clone(),
            defined_models: state.app_models.clone(),
            file_tree_summary: state.structure_map.keys().cloned().collect::<Vec<_>>().join("\n"),
        };
        let descriptions = self.planner.breakdown(request, &context).await?;
        tracing::info!("breakdown produced {} feature(s)", descriptions.len());
        let start = state.features.len();
        for (i, description) in descriptions.into_iter().enumerate() {
            let id = format!("feature-{}-{}", start + i + 1, slugify(&description));
            state.features.push(Feature::new(id, description));
        }
        Ok(())
    }

    /// Spec §4.1 selection phase.
    fn select_next_feature(&self, state: &ProjectState) -> Option<String> {
        if let Some(id) = &state.current_feature_id {
            if state
                .features
                .iter()
                .find(|f| &f.id == id)
                .is_some_and(|f| f.status.is_continuable())
            {
                return Some(id.clone());
            }
        }
        state
            .features
            .iter()
            .find(|f| f.status.is_continuable() && f.dependencies_satisfied(&state.features))
            .map(|f| f.id.clone())
    }

    /// Spec §4.1 "Remediation loop (per feature)", steps 1–9.
    async fn run_remediation_loop(&mut self, state: &mut ProjectState, feature_id: &str) -> Result<(), ErrorKind> {
        let description = state
            .feature_mut(feature_id)
            .expect("selected feature exists")
            .description
            .clone();
        let mut instruction = description.clone();
        let mut cumulative_modified: BTreeSet<String> = BTreeSet::new();
        let mut cumulative_work_log: Vec<WorkLogEntry> = Vec::new();

        for attempt in 1..=MAX_REMEDIATION_ATTEMPTS {
            tracing::debug!(feature_id, attempt, "starting remediation attempt");
            state.feature_mut(feature_id).unwrap().remediation_attempts = attempt;

            let mut step_loop = ExecutorStepLoop::new(
                self.executor_llm.clone(),
                self.planner.clone(),
                self.gate.clone(),
                self.vault.clone(),
                self.host.clone(),
                self.codeintel.clone(),
                self.frontend.clone(),
                self.paths.root.clone(),
                self.config.max_steps,
                self.config.max_context_size,
                self.config.history_summary_threshold,
                self.cancel.clone(),
            );

            let (modified_files, work_log, outcome) = step_loop.run_feature(state, &instruction).await;
            cumulative_modified.extend(modified_files);
            cumulative_work_log.extend(work_log);
            self.store.save(&self.paths.state_file, state)?;

            match outcome {
                StepLoopOutcome::Aborted(reason) => {
                    let estimate = self.error_recovery_estimate(&cumulative_modified);
                    state.historical_notes.push(format!(
                        "feature {feature_id} aborted on attempt {attempt} ({reason}); \
                         estimated {estimate}% complete from files surviving on disk"
                    ));
                    self.fail_feature(state, feature_id)?;
                    return Err(ErrorKind::ActionRejected(reason));
                }
                StepLoopOutcome::CircuitBreakerTripped(trip) => {
                    self.fail_feature(state, feature_id)?;
                    return Err(ErrorKind::CircuitBreakerTriggered(trip.to_string()));
                }
                StepLoopOutcome::StepBudgetExhausted | StepLoopOutcome::Finished => {}
            }

            let files = load_structured_files(&self.paths.root, &cumulative_modified);
            let issues = self.frontend.blocking_issues(&files);
            let frontend_issues: Vec<String> = issues
                .iter()
                .map(|i| format!("[{:?}] {}: {}", i.severity, i.file, i.message))
                .collect();

            let code_map = serde_json::to_value(&state.structure_map).unwrap_or(serde_json::Value::Null);
            let verification_request = VerificationRequest {
                feature_description: description.clone(),
                cumulative_work_log: cumulative_work_log.clone(),
                code_map,
                frontend_issues: frontend_issues.clone(),
            };
            let verification = self.planner.verify(&verification_request).await?;

            if verification.is_complete() && frontend_issues.is_empty() {
                tracing::info!(feature_id, attempt, "feature merged");
                state.feature_mut(feature_id).unwrap().transition(FeatureStatus::Merged).ok();
                self.store.save(&self.paths.state_file, state)?;
                return Ok(());
            }

            if attempt == MAX_REMEDIATION_ATTEMPTS {
                break;
            }

            instruction = self.planner.remediation_instruction(&verification_request).await?;
            state
                .feature_mut(feature_id)
                .unwrap()
                .transition(FeatureStatus::FeatureTestingFailed)
                .ok();
            self.store.save(&self.paths.state_file, state)?;
        }

        self.fail_feature(state, feature_id)?;
        Err(ErrorKind::ActionRejected(format!(
            "feature {feature_id} exhausted {MAX_REMEDIATION_ATTEMPTS} remediation attempts"
        )))
    }

    fn fail_feature(&self, state: &mut ProjectState, feature_id: &str) -> Result<(), ErrorKind> {
        state
            .feature_mut(feature_id)
            .unwrap()
            .transition(FeatureStatus::ImplementationFailed)
            .ok();
        self.store.save(&self.paths.state_file, state)?;
        Ok(())
    }

    /// Spec §4.1 "Error-recovery during the loop": `min(90, round(100 *
    /// existing/expected))`, where `existing` counts cumulative modified
    /// files that actually exist on disk right now.
    fn error_recovery_estimate(&self, cumulative_modified: &BTreeSet<String>) -> u8 {
        let expected = cumulative_modified.len().max(1);
        let existing = cumulative_modified
            .iter()
            .filter(|p| self.paths.root.join(p).exists())
            .count();
        let pct = (100.0 * existing as f64 / expected as f64).round() as u32;
        pct.min(90) as u8
    }
}

fn load_structured_files(root: &Path, paths: &BTreeSet<String>) -> Vec<StructuredFile> {
    paths
        .iter()
        .filter_map(|p| {
            let content = std::fs::read_to_string(root.join(p)).ok()?;
            let kind = match Path::new(p).extension().and_then(|e| e.to_str()) {
                Some("html") | Some("htm") => FileKind::Html,
                Some("css") => FileKind::Css,
                Some("js") | Some("jsx") | Some("ts") | Some("tsx") => FileKind::Js,
                _ => FileKind::Other,
            };
            Some(StructuredFile { path: p.clone(), kind, content })
        })
        .collect()
}

fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .take(5)
        .collect::<Vec<_>>()
        .join("-")
}
