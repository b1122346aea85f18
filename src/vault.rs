//! `CredentialVault`: the out-of-scope OS-native credential store (spec §1),
//! modeled as a trait so placeholder substitution (spec §4.3) can route
//! sensitive values through it without this crate owning any secrets
//! storage itself.

use async_trait::async_trait;

#[async_trait]
pub trait CredentialVault: Send + Sync {
    async fn get(&self, name: &str) -> Option<String>;
    async fn set(&self, name: &str, value: &str);
}

/// In-memory vault for tests and non-interactive runs. Never use this for
/// real secrets — it has no backing store beyond process memory.
#[derive(Default)]
pub struct InMemoryVault {
    values: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialVault for InMemoryVault {
    async fn get(&self, name: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    async fn set(&self, name: &str, value: &str) {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), value.to_string());
    }
}

/// Sensitive placeholder names are those containing one of these markers
/// (spec §4.3 "Classify NAME as sensitive if it contains any of {KEY,
/// SECRET, TOKEN, PASSWORD}").
const SENSITIVE_MARKERS: [&str; 4] = ["KEY", "SECRET", "TOKEN", "PASSWORD"];

pub fn is_sensitive_placeholder(name: &str) -> bool {
    let upper = name.to_uppercase();
    SENSITIVE_MARKERS.iter().any(|m| upper.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_sensitive_names() {
        assert!(is_sensitive_placeholder("API_KEY"));
        assert!(is_sensitive_placeholder("db_password"));
        assert!(is_sensitive_placeholder("AUTH_TOKEN"));
        assert!(is_sensitive_placeholder("client_secret"));
    }

    #[test]
    fn classifies_non_sensitive_names() {
        assert!(!is_sensitive_placeholder("PROJECT_NAME"));
        assert!(!is_sensitive_placeholder("app_label"));
    }

    #[tokio::test]
    async fn in_memory_vault_round_trips() {
        let vault = InMemoryVault::new();
        vault.set("API_KEY", "s3cr3t").await;
        assert_eq!(vault.get("API_KEY").await, Some("s3cr3t".to_string()));
        assert_eq!(vault.get("MISSING").await, None);
    }
}
