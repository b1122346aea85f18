//! External project adoption (spec §4.1): when a project directory already
//! has framework code but an empty `ProjectState`, scan it once so the
//! Workflow Orchestrator starts with a populated structure map instead of
//! treating real code as if it didn't exist.

use crate::codeintel::IntelligenceCache;
use crate::state::model::ProjectState;
use futures::future;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Skip these directory names outright — vendored dependencies and build
/// output never carry feature-relevant structure, and walking into them is
/// exactly the unbounded scan spec §4.1 says to avoid ("skip vendored code
/// aggressively to keep scan time bounded").
const SKIP_DIRS: [&str; 8] = [
    "node_modules",
    "venv",
    ".venv",
    "vendor",
    ".git",
    "target",
    "dist",
    "__pycache__",
];

/// Files above this size are summarized by code intelligence, never
/// adopted wholesale — mirrors `executor::actions`' full-file-read cap.
const ADOPTION_SIZE_THRESHOLD_BYTES: u64 = 256 * 1024;

/// Bootstrap files recognizable as "this directory is a framework project"
/// (spec §4.1: "the root contains recognizable framework artifacts").
const FRAMEWORK_MARKERS: [(&str, &str); 4] = [
    ("manage.py", "django"),
    ("Cargo.toml", "cargo"),
    ("package.json", "node"),
    ("go.mod", "go"),
];

/// Returns the first recognized framework tag found at `root`'s top level,
/// or `None` if nothing recognizable is present.
pub fn detect_framework(root: &Path) -> Option<String> {
    FRAMEWORK_MARKERS
        .iter()
        .find(|(marker, _)| root.join(marker).exists())
        .map(|(_, tag)| tag.to_string())
}

fn is_skipped(entry: &walkdir::DirEntry) -> bool {
    entry
        .path()
        .components()
        .any(|c| SKIP_DIRS.contains(&c.as_os_str().to_string_lossy().as_ref()))
}

fn is_minified(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(".min.js") || n.ends_with(".min.css"))
        .unwrap_or(false)
}

/// `.orchignore` at the project root holds one glob pattern per line
/// (blank lines and `#`-prefixed comments ignored), evaluated relative to
/// `root` — an escape hatch for vendored code this scan's built-in
/// `SKIP_DIRS` list doesn't anticipate.
fn load_ignore_globs(root: &Path) -> Vec<glob::Pattern> {
    let Ok(content) = std::fs::read_to_string(root.join(".orchignore")) else {
        return Vec::new();
    };
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| glob::Pattern::new(l).ok())
        .collect()
}

fn is_ignored(relative: &Path, ignores: &[glob::Pattern]) -> bool {
    let rel_str = relative.to_string_lossy();
    ignores.iter().any(|p| p.matches(&rel_str))
}

/// Enumerate source files under `root` (excluding vendored directories,
/// minified assets, oversized files, and `.orchignore` matches), parse
/// each through code intelligence, and populate `state.structure_map`.
/// Does not persist — the caller (`WorkflowOrchestrator`) owns when to
/// save.
pub async fn scan_into(root: &Path, codeintel: &IntelligenceCache, state: &mut ProjectState) {
    let ignores = load_ignore_globs(root);
    let walker = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_skipped(e));

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} adopting project: {msg}")
            .unwrap(),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));

    let mut candidates = Vec::new();
    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if is_minified(path) {
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        if is_ignored(relative, &ignores) {
            continue;
        }
        let Ok(metadata) = entry.metadata() else { continue };
        if metadata.len() > ADOPTION_SIZE_THRESHOLD_BYTES {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };
        let rel_str = relative.to_string_lossy().into_owned();
        spinner.set_message(rel_str.clone());
        candidates.push((rel_str, content));
    }

    // Heuristic structure analysis is CPU-bound, not I/O-bound, but each
    // file is independent — run the whole batch concurrently rather than
    // awaiting one analysis at a time.
    let analyses = future::join_all(
        candidates
            .iter()
            .map(|(rel_str, content)| async move { (rel_str.clone(), codeintel.get_or_analyze(rel_str, content).await) }),
    )
    .await;

    for ((rel_str, content), (_, info)) in candidates.iter().zip(analyses) {
        state.file_hashes.insert(rel_str.clone(), crate::codeintel::content_hash(content));
        state.structure_map.insert(rel_str.clone(), info);
    }

    spinner.finish_and_clear();
    tracing::debug!(adopted = candidates.len(), "project adoption scan complete");
}
