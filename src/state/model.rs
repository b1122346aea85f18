//! The persisted data model (spec §3): `ProjectState`, `Feature` and its
//! status graph, work-log entries, and the wire shapes exchanged with the
//! Executor (`ActionRequest`) and the code-intelligence bridge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Current on-disk schema version. Bump whenever `ProjectState`'s shape
/// changes in a way `state::persistence::migrate` must bridge.
pub const SCHEMA_VERSION: u32 = 1;

/// Per-file availability tag (spec §3). Monotonic within a step: it only
/// ever moves `NotAvailable -> SummaryOnly -> FullContent`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentAvailability {
    NotAvailable,
    SummaryOnly,
    FullContent,
}

impl ContentAvailability {
    /// Upgrade towards `target`, never downgrading. Returns the resulting
    /// (possibly unchanged) availability.
    pub fn upgrade_to(self, target: ContentAvailability) -> ContentAvailability {
        self.max(target)
    }
}

impl Default for ContentAvailability {
    fn default() -> Self {
        ContentAvailability::NotAvailable
    }
}

/// Structured description produced by the code-intelligence collaborator.
/// The shape of `summary` is opaque to this crate (spec §1 treats code
/// intelligence as a black box); `role` is the classifier tag this system
/// does rely on for context prioritization and content-security scanning.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileStructureInfo {
    pub role: FileRole,
    pub summary: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    FrameworkModel,
    View,
    Template,
    Settings,
    #[default]
    Generic,
}

/// A single feature's lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    Identified,
    Planned,
    Implementing,
    TasksImplemented,
    FeatureTesting,
    FeatureTestingPassed,
    Reviewing,
    Merged,
    PlanningFailed,
    ImplementationFailed,
    FeatureTestingFailed,
    Cancelled,
}

impl FeatureStatus {
    /// Terminal statuses never move (spec §3 invariant). `FeatureTestingFailed`
    /// textually matches the `*_failed` terminal pattern but the selection
    /// phase (spec §4.1) explicitly lists it as continuable/retryable, so it
    /// is deliberately excluded here — see SPEC_FULL.md §9 open question 1's
    /// sibling resolution in DESIGN.md.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FeatureStatus::Merged
                | FeatureStatus::PlanningFailed
                | FeatureStatus::ImplementationFailed
                | FeatureStatus::Cancelled
        )
    }

    /// Continuable statuses per spec §4.1 selection phase.
    pub fn is_continuable(self) -> bool {
        matches!(
            self,
            FeatureStatus::Identified
                | FeatureStatus::Planned
                | FeatureStatus::Implementing
                | FeatureStatus::TasksImplemented
                | FeatureStatus::FeatureTesting
                | FeatureStatus::FeatureTestingFailed
                | FeatureStatus::Reviewing
        )
    }
}

/// A single step in the append-only audit trail for the current feature
/// attempt (spec §3 WorkLogEntry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkLogEntry {
    pub action_kind: String,
    pub target: String,
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl WorkLogEntry {
    pub fn new(action_kind: impl Into<String>, target: impl Into<String>, outcome: impl Into<String>) -> Self {
        Self {
            action_kind: action_kind.into(),
            target: target.into(),
            outcome: outcome.into(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// One task tracked within a feature's implementation plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub description: String,
    pub done: bool,
}

/// A unit of user-requested work (spec §3 Feature).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    pub description: String,
    pub status: FeatureStatus,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub remediation_attempts: u32,
}

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("feature {id} is in terminal status {from:?} and cannot move to {to:?}")]
    Terminal {
        id: String,
        from: FeatureStatus,
        to: FeatureStatus,
    },
}

use thiserror::Error;

impl Feature {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            status: FeatureStatus::Identified,
            tasks: Vec::new(),
            dependencies: Vec::new(),
            remediation_attempts: 0,
        }
    }

    /// Move to a new status, enforcing the terminal-status invariant
    /// (spec §3: "terminal statuses never move").
    pub fn transition(&mut self, to: FeatureStatus) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal {
                id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn dependencies_satisfied(&self, features: &[Feature]) -> bool {
        self.dependencies.iter().all(|dep_id| {
            features
                .iter()
                .any(|f| &f.id == dep_id && f.status == FeatureStatus::Merged)
        })
    }
}

/// `{thought, action, parameters}` returned by the Executor LLM (spec §3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub thought: String,
    pub action: ActionKind,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// The closed set of nine actions (spec §4.3), decoded once at the parsing
/// boundary so dispatch can match exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    WriteFile,
    PatchFile,
    GetFullFileContent,
    RunCommand,
    RequestUserInput,
    PlannerCheckpoint,
    Rollback,
    FinishFeature,
    Abort,
}

/// The persisted, schema-versioned project state (spec §3 ProjectState).
///
/// `memory_integrity_hash` is declared first for readability, but the
/// on-disk placement invariant from spec §6 ("`project_state.json` —
/// primary state with `memory_integrity_hash` as its first field") is
/// actually enforced by `state::persistence::Store`, which builds the
/// canonical sorted-key form for hashing and then splices the hash field
/// to the front of the literal bytes it writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectState {
    pub memory_integrity_hash: String,
    pub schema_version: u32,
    pub root_path: std::path::PathBuf,
    pub framework: Option<String>,
    pub features: Vec<Feature>,
    #[serde(default)]
    pub current_feature_id: Option<String>,
    pub file_hashes: BTreeMap<String, String>,
    pub app_models: BTreeMap<String, BTreeSet<String>>,
    pub registered_apps: BTreeSet<String>,
    pub placeholders: BTreeMap<String, String>,
    #[serde(default)]
    pub historical_notes: Vec<String>,
    #[serde(default)]
    pub structure_map: BTreeMap<String, FileStructureInfo>,
    #[serde(default)]
    pub content_availability: BTreeMap<String, ContentAvailability>,
}

impl ProjectState {
    pub fn new(root_path: std::path::PathBuf) -> Self {
        Self {
            memory_integrity_hash: String::new(),
            schema_version: SCHEMA_VERSION,
            root_path,
            framework: None,
            features: Vec::new(),
            current_feature_id: None,
            file_hashes: BTreeMap::new(),
            app_models: BTreeMap::new(),
            registered_apps: BTreeSet::new(),
            placeholders: BTreeMap::new(),
            historical_notes: Vec::new(),
            structure_map: BTreeMap::new(),
            content_availability: BTreeMap::new(),
        }
    }

    /// The "empty state" predicate used by external-project adoption
    /// (spec §4.1) and the empty-over-nonempty save guard (spec §4.8).
    pub fn is_empty(&self) -> bool {
        self.features.is_empty() && self.registered_apps.is_empty() && self.app_models.is_empty()
    }

    pub fn feature_mut(&mut self, id: &str) -> Option<&mut Feature> {
        self.features.iter_mut().find(|f| f.id == id)
    }

    pub fn availability_of(&self, path: &str) -> ContentAvailability {
        self.content_availability
            .get(path)
            .copied()
            .unwrap_or_default()
    }

    pub fn upgrade_availability(&mut self, path: &str, target: ContentAvailability) {
        let current = self.availability_of(path);
        self.content_availability
            .insert(path.to_string(), current.upgrade_to(target));
    }
}
