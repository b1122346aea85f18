//! Aggregation: sweep + cross-file + semantic, sorted by severity
//! (spec §4.7 steps 1–4), with the finish-blocking rule (step 5).

use super::{CrossFileValidator, FileValidator, Issue, SemanticAnalyzer, StructuredFile};

pub struct Aggregator {
    file_validators: Vec<Box<dyn FileValidator>>,
    cross_file_validators: Vec<Box<dyn CrossFileValidator>>,
    semantic_analyzers: Vec<Box<dyn SemanticAnalyzer>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            file_validators: Vec::new(),
            cross_file_validators: Vec::new(),
            semantic_analyzers: Vec::new(),
        }
    }

    pub fn with_file_validator(mut self, v: Box<dyn FileValidator>) -> Self {
        self.file_validators.push(v);
        self
    }

    pub fn with_cross_file_validator(mut self, v: Box<dyn CrossFileValidator>) -> Self {
        self.cross_file_validators.push(v);
        self
    }

    pub fn with_semantic_analyzer(mut self, a: Box<dyn SemanticAnalyzer>) -> Self {
        self.semantic_analyzers.push(a);
        self
    }

    pub fn default_stack() -> Self {
        Self::new()
            .with_file_validator(Box::new(super::validators::StubFileValidator))
            .with_cross_file_validator(Box::new(super::validators::StubCrossFileValidator))
            .with_semantic_analyzer(Box::new(super::validators::StubAccessibilityAnalyzer))
            .with_semantic_analyzer(Box::new(super::validators::StubPerformanceAnalyzer))
    }

    /// Run the full pipeline and return issues sorted
    /// `critical < high < medium < low < info` (spec §4.7 step 4 — i.e.
    /// most severe first).
    pub fn run(&self, files: &[StructuredFile]) -> Vec<Issue> {
        let mut issues = Vec::new();

        for file in files {
            for validator in &self.file_validators {
                if validator.applies_to(file.kind) {
                    issues.extend(validator.validate(file));
                }
            }
        }

        for validator in &self.cross_file_validators {
            issues.extend(validator.validate(files));
        }

        for analyzer in &self.semantic_analyzers {
            issues.extend(analyzer.analyze(files));
        }

        issues.sort_by(|a, b| b.severity.cmp(&a.severity));
        issues
    }

    pub fn blocking_issues(&self, files: &[StructuredFile]) -> Vec<Issue> {
        self.run(files).into_iter().filter(|i| i.blocks_finish()).collect()
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::default_stack()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{FileKind, Severity};

    fn file(path: &str, kind: FileKind, content: &str) -> StructuredFile {
        StructuredFile {
            path: path.to_string(),
            kind,
            content: content.to_string(),
        }
    }

    #[test]
    fn issues_sorted_critical_first() {
        let aggregator = Aggregator::default_stack();
        let files = vec![
            file("a.html", FileKind::Html, "<img src=\"x.png\"><script src=\"a.js\"></script>"),
            file("a.js", FileKind::Js, "eval('bad')"),
        ];
        let issues = aggregator.run(&files);
        for pair in issues.windows(2) {
            assert!(pair[0].severity >= pair[1].severity);
        }
    }

    #[test]
    fn blocking_issues_excludes_medium_and_below() {
        let aggregator = Aggregator::default_stack();
        let files = vec![file(
            "a.html",
            FileKind::Html,
            "<script src=\"a.js\"></script>",
        )];
        // StubPerformanceAnalyzer emits Medium, which must not block.
        assert!(aggregator.blocking_issues(&files).is_empty());
    }

    #[test]
    fn blocking_issues_includes_high_and_critical() {
        let aggregator = Aggregator::default_stack();
        let files = vec![file("a.js", FileKind::Js, "eval('bad')")];
        let blocking = aggregator.blocking_issues(&files);
        assert_eq!(blocking.len(), 1);
        assert_eq!(blocking[0].severity, Severity::High);
    }

    #[test]
    fn severity_ordering_is_total() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Info);
    }
}
