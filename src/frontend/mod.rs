//! The Frontend Validation Orchestrator (spec §4.7): aggregates issues
//! from black-box static validators (spec §1: "static validators for
//! HTML/CSS/JS ... treated as black-box issue lists") into one prioritized
//! list that gates `finish_feature`.

pub mod aggregate;
pub mod validators;

pub use aggregate::Aggregator;
pub use validators::{CrossFileValidator, FileValidator, SemanticAnalyzer, StubAccessibilityAnalyzer, StubCrossFileValidator, StubFileValidator, StubPerformanceAnalyzer};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub file: String,
    pub message: String,
    /// Standard taxonomy criterion id for accessibility findings, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criterion: Option<String>,
}

impl Issue {
    pub fn new(severity: Severity, file: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            file: file.into(),
            message: message.into(),
            criterion: None,
        }
    }

    pub fn blocks_finish(&self) -> bool {
        matches!(self.severity, Severity::Critical | Severity::High)
    }
}

/// A file in the project's structure map, as the aggregator sees it.
#[derive(Debug, Clone)]
pub struct StructuredFile {
    pub path: String,
    pub kind: FileKind,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Html,
    Css,
    Js,
    Other,
}
