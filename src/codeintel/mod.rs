//! Bridge to the out-of-scope AST-parsing code-intelligence service
//! (spec §1: "treated as a pure function from file content to a
//! structured summary"), plus the path-keyed cache spec §5 requires
//! ("Code-intelligence cache: keyed by file path, value `(content_hash,
//! parsed_info)`; concurrent reads safe, writes under a lock").

use crate::state::model::FileStructureInfo;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[async_trait]
pub trait CodeIntelligence: Send + Sync {
    /// Parse file content into a structured summary. Pure per spec §1: the
    /// same `(path, content)` pair always yields the same summary.
    async fn analyze(&self, path: &str, content: &str) -> FileStructureInfo;
}

/// A classifier-only code-intelligence stand-in sufficient to exercise
/// caching, structure-map updates, and role-based content-security
/// scanning in tests. A real implementation is an external collaborator
/// per spec §1.
pub struct HeuristicCodeIntelligence;

#[async_trait]
impl CodeIntelligence for HeuristicCodeIntelligence {
    async fn analyze(&self, path: &str, content: &str) -> FileStructureInfo {
        use crate::state::model::FileRole;
        let role = classify_role(path);
        FileStructureInfo {
            role,
            summary: serde_json::json!({
                "path": path,
                "lines": content.lines().count(),
                "bytes": content.len(),
            }),
        }
    }
}

/// Path-based role heuristic, exposed for callers (e.g. the content-security
/// scan) that need a role classification before a full `analyze()` call.
pub fn classify_role(path: &str) -> crate::state::model::FileRole {
    use crate::state::model::FileRole;
    let lower = path.to_lowercase();
    if lower.ends_with("models.py") || lower.contains("/models/") {
        FileRole::FrameworkModel
    } else if lower.ends_with("settings.py") || lower.contains("config") {
        FileRole::Settings
    } else if lower.ends_with(".html") || lower.contains("templates/") {
        FileRole::Template
    } else if lower.contains("/views") || lower.ends_with("views.py") {
        FileRole::View
    } else {
        FileRole::Generic
    }
}

/// SHA-256 hex digest, shared by the cache key and `state.file_hashes`
/// (spec §4.2 step 7's "update file-hash map" uses the same notion of
/// content identity as this cache's invalidation check).
pub fn content_hash(content: &str) -> String {
    use sha2::{Digest, Sha256};
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

struct CacheEntry {
    content_hash: String,
    info: FileStructureInfo,
}

/// Concurrent-read, locked-write cache keyed by file path. Holds its
/// inner analyzer as a trait object so the executor doesn't need to
/// thread a generic parameter through every struct that touches it.
pub struct IntelligenceCache {
    inner: Box<dyn CodeIntelligence>,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl IntelligenceCache {
    pub fn new(inner: impl CodeIntelligence + 'static) -> Self {
        Self {
            inner: Box::new(inner),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached summary if `content`'s hash matches what's cached
    /// for `path`; otherwise analyze, cache, and return the fresh summary.
    pub async fn get_or_analyze(&self, path: &str, content: &str) -> FileStructureInfo {
        let hash = content_hash(content);
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = entries.get(path) {
                if entry.content_hash == hash {
                    return entry.info.clone();
                }
            }
        }

        let info = self.inner.analyze(path, content).await;
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            path.to_string(),
            CacheEntry {
                content_hash: hash,
                info: info.clone(),
            },
        );
        info
    }
}
