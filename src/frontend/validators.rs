//! Validator trait contracts. Spec §1 treats the actual HTML/CSS/JS parsers
//! and semantic analyzers as external, black-box collaborators; the `Stub*`
//! implementations here exist only to exercise `Aggregator`'s sweep,
//! cross-file matching, and severity-sort behavior in tests.

use super::{FileKind, Issue, Severity, StructuredFile};

/// Per-file parser-emitted issues (spec §4.7 step 1).
pub trait FileValidator: Send + Sync {
    fn applies_to(&self, kind: FileKind) -> bool;
    fn validate(&self, file: &StructuredFile) -> Vec<Issue>;
}

/// Cross-file consistency checks (spec §4.7 step 2): JS selector ↔ HTML
/// element, JS API-URL string ↔ route name.
pub trait CrossFileValidator: Send + Sync {
    fn validate(&self, files: &[StructuredFile]) -> Vec<Issue>;
}

/// Semantic analyzers (spec §4.7 step 3): accessibility, performance.
pub trait SemanticAnalyzer: Send + Sync {
    fn analyze(&self, files: &[StructuredFile]) -> Vec<Issue>;
}

/// Flags obvious unescaped-output markers and missing `alt` attributes —
/// intentionally shallow; a real HTML/JS validator lives outside this
/// crate's scope.
pub struct StubFileValidator;

impl FileValidator for StubFileValidator {
    fn applies_to(&self, kind: FileKind) -> bool {
        matches!(kind, FileKind::Html | FileKind::Js)
    }

    fn validate(&self, file: &StructuredFile) -> Vec<Issue> {
        let mut issues = Vec::new();
        match file.kind {
            FileKind::Html => {
                if file.content.contains("<img") && !file.content.contains("alt=") {
                    issues.push(Issue::new(
                        Severity::Medium,
                        &file.path,
                        "<img> tag missing alt attribute",
                    ));
                }
            }
            FileKind::Js => {
                if file.content.contains("eval(") {
                    issues.push(Issue::new(
                        Severity::High,
                        &file.path,
                        "use of eval() is disallowed",
                    ));
                }
            }
            _ => {}
        }
        issues
    }
}

/// Flags a `document.querySelector` target that names an id/class absent
/// from any HTML file in the set (spec §4.7 step 2, JS-selector match).
pub struct StubCrossFileValidator;

impl CrossFileValidator for StubCrossFileValidator {
    fn validate(&self, files: &[StructuredFile]) -> Vec<Issue> {
        let mut issues = Vec::new();
        let html_content: String = files
            .iter()
            .filter(|f| f.kind == FileKind::Html)
            .map(|f| f.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let selector_re =
            regex::Regex::new(r#"querySelector\(\s*['"]#([A-Za-z0-9_-]+)['"]\s*\)"#).unwrap();

        for file in files.iter().filter(|f| f.kind == FileKind::Js) {
            for cap in selector_re.captures_iter(&file.content) {
                let id = &cap[1];
                let needle = format!("id=\"{id}\"");
                let needle_single = format!("id='{id}'");
                if !html_content.contains(&needle) && !html_content.contains(&needle_single) {
                    issues.push(Issue::new(
                        Severity::High,
                        &file.path,
                        format!("selector '#{id}' has no matching HTML element"),
                    ));
                }
            }
        }
        issues
    }
}

/// Maps missing-alt findings onto a WCAG-shaped criterion id (spec §4.7
/// step 3: "accessibility (maps issues to a standard criterion taxonomy)").
pub struct StubAccessibilityAnalyzer;

impl SemanticAnalyzer for StubAccessibilityAnalyzer {
    fn analyze(&self, files: &[StructuredFile]) -> Vec<Issue> {
        files
            .iter()
            .filter(|f| f.kind == FileKind::Html && f.content.contains("<img") && !f.content.contains("alt="))
            .map(|f| {
                let mut issue = Issue::new(
                    Severity::High,
                    &f.path,
                    "image missing text alternative",
                );
                issue.criterion = Some("WCAG-1.1.1".to_string());
                issue
            })
            .collect()
    }
}

/// Flags render-blocking `<script>` tags in `<head>` without `defer`/`async`
/// (spec §4.7 step 3: "performance ... render-blocking scripts").
pub struct StubPerformanceAnalyzer;

impl SemanticAnalyzer for StubPerformanceAnalyzer {
    fn analyze(&self, files: &[StructuredFile]) -> Vec<Issue> {
        let script_re = regex::Regex::new(r#"<script\s+src="#).unwrap();
        files
            .iter()
            .filter(|f| f.kind == FileKind::Html)
            .flat_map(|f| {
                script_re
                    .find_iter(&f.content)
                    .filter(|m| {
                        let tail = &f.content[m.start()..];
                        let tag_end = tail.find('>').unwrap_or(tail.len());
                        let tag = &tail[..tag_end];
                        !tag.contains("defer") && !tag.contains("async")
                    })
                    .map(|_| {
                        Issue::new(
                            Severity::Medium,
                            &f.path,
                            "render-blocking script without defer/async",
                        )
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}
