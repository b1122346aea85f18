//! Placeholder substitution (spec §4.3): `{{ NAME }}` tokens are resolved
//! from the credential vault (sensitive names) or the ProjectState
//! placeholders map (everything else), prompting the user for anything
//! missing.

use crate::host::{HostAdapter, InputRequest};
use crate::vault::{is_sensitive_placeholder, CredentialVault};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").unwrap());

/// Substitute every `{{ NAME }}` token in `text`, mutating `placeholders`
/// (non-sensitive) and the vault (sensitive) as new values are collected
/// via `host.request_input`.
pub async fn substitute(
    text: &str,
    placeholders: &mut BTreeMap<String, String>,
    vault: &dyn CredentialVault,
    host: &dyn HostAdapter,
) -> String {
    let names: Vec<String> = PLACEHOLDER
        .captures_iter(text)
        .map(|cap| cap[1].to_string())
        .collect();

    let mut resolved = BTreeMap::new();
    for name in names {
        if resolved.contains_key(&name) {
            continue;
        }
        let value = resolve_one(&name, placeholders, vault, host).await;
        resolved.insert(name, value);
    }

    let mut out = text.to_string();
    for (name, value) in &resolved {
        let token_space = format!("{{{{ {name} }}}}");
        let token_tight = format!("{{{{{name}}}}}");
        out = out.replace(&token_space, value).replace(&token_tight, value);
    }
    out
}

async fn resolve_one(
    name: &str,
    placeholders: &mut BTreeMap<String, String>,
    vault: &dyn CredentialVault,
    host: &dyn HostAdapter,
) -> String {
    if is_sensitive_placeholder(name) {
        if let Some(value) = vault.get(name).await {
            return value;
        }
        let response = host
            .request_input(InputRequest {
                prompt: format!("Enter a value for secret placeholder {{{{ {name} }}}}"),
                sensitive: true,
            })
            .await;
        vault.set(name, &response.value).await;
        response.value
    } else {
        if let Some(value) = placeholders.get(name) {
            return value.clone();
        }
        let response = host
            .request_input(InputRequest {
                prompt: format!("Enter a value for placeholder {{{{ {name} }}}}"),
                sensitive: false,
            })
            .await;
        placeholders.insert(name.to_string(), response.value.clone());
        response.value
    }
}
