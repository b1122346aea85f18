//! The Context Manager (spec §4.4): priority-ordered fragment admission
//! under a hard character budget, plus history compression and the
//! smart auto-fetch heuristic.

pub mod compression;
pub mod fragment;

pub use compression::HistoryCompressor;
pub use fragment::{Fragment, FragmentKind};

/// File basenames that, when keyword-matched against a feature
/// description, are worth pre-admitting a summary for one step early
/// (SPEC_FULL.md §4.4 "Smart auto-fetch"). Deterministic and
/// non-authoritative: it never marks a file `full_content` itself.
const AUTO_FETCH_BASENAMES: &[&str] = &[
    "settings", "config", ".env", "urls", "package.json", "cargo.toml", "pyproject.toml",
];

pub fn smart_auto_fetch_candidates<'a>(feature_description: &str, project_files: &'a [String]) -> Vec<&'a str> {
    let lower_description = feature_description.to_lowercase();
    project_files
        .iter()
        .filter(|path| {
            let basename = std::path::Path::new(path.as_str())
                .file_stem()
                .map(|s| s.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            AUTO_FETCH_BASENAMES
                .iter()
                .any(|candidate| basename == *candidate && lower_description.contains(candidate))
        })
        .map(|s| s.as_str())
        .collect()
}

#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub text: String,
    pub dropped: Vec<String>,
    pub truncated: bool,
}

pub struct ContextManager {
    max_context_size: usize,
}

impl ContextManager {
    pub fn new(max_context_size: usize) -> Self {
        Self { max_context_size }
    }

    /// `framework_rules` and `structure_summary` are cached and always
    /// admitted first regardless of score; everything else competes for
    /// remaining space in score order (spec §4.4 "Assembly").
    pub fn assemble(
        &self,
        framework_rules: &str,
        structure_summary: &str,
        availability_note: &str,
        mut fragments: Vec<Fragment>,
    ) -> AssembledContext {
        let mut buf = String::new();
        buf.push_str(framework_rules);
        buf.push('\n');
        buf.push_str(structure_summary);
        buf.push('\n');

        fragments.sort_by(|a, b| b.score.cmp(&a.score));

        let mut dropped = Vec::new();
        for fragment in &fragments {
            let remaining = self.max_context_size.saturating_sub(buf.len());
            if fragment.text.len() + 1 > remaining {
                dropped.push(fragment.label.clone());
                continue;
            }
            buf.push_str(&fragment.text);
            buf.push('\n');
        }

        buf.push_str(availability_note);

        let truncated = buf.len() > self.max_context_size;
        if truncated {
            const MARKER: &str = "\n...[truncated]";
            let cut = self.max_context_size.saturating_sub(MARKER.len());
            buf.truncate(floor_char_boundary(&buf, cut));
            buf.push_str(MARKER);
        }

        AssembledContext {
            text: buf,
            dropped,
            truncated,
        }
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}
