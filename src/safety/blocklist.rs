//! Blocklist: patterns rejected outright, or rewritten to a safe
//! alternative and re-validated (spec §4.6 step 1: "destructive pattern
//! match; a small number carry a safe rewrite instead of a hard reject").

use crate::errors::GateError;
use regex::Regex;

pub struct BlocklistRule {
    pattern: Regex,
    reason: String,
    safe_alternative: Option<String>,
}

impl BlocklistRule {
    pub fn reject(pattern: &str, reason: impl Into<String>) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("static blocklist pattern"),
            reason: reason.into(),
            safe_alternative: None,
        }
    }

    pub fn rewrite(pattern: &str, reason: impl Into<String>, safe_alternative: impl Into<String>) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("static blocklist pattern"),
            reason: reason.into(),
            safe_alternative: Some(safe_alternative.into()),
        }
    }
}

pub struct Blocklist {
    rules: Vec<BlocklistRule>,
}

impl Blocklist {
    pub fn add(&mut self, rule: BlocklistRule) {
        self.rules.push(rule);
    }

    /// `Ok(None)` means nothing matched. `Ok(Some(rewritten))` means a
    /// rewrite rule matched and the command should be re-validated from
    /// scratch. `Err` means a hard-reject rule matched.
    pub fn check(&self, command: &str) -> Result<Option<String>, GateError> {
        for rule in &self.rules {
            if rule.pattern.is_match(command) {
                return match &rule.safe_alternative {
                    Some(template) => Ok(Some(rule.pattern.replace(command, template.as_str()).into_owned())),
                    None => Err(GateError::Blocklisted {
                        pattern: rule.reason.clone(),
                    }),
                };
            }
        }
        Ok(None)
    }
}

impl Default for Blocklist {
    fn default() -> Self {
        Self {
            rules: vec![
                BlocklistRule::reject(r"rm\s+-rf\s+/(?:\s|$)", "recursive delete of filesystem root"),
                BlocklistRule::reject(r"rm\s+-rf\s+[~*]", "recursive delete of home or glob expansion"),
                BlocklistRule::reject(r":\(\)\{.*\};:", "fork bomb"),
                BlocklistRule::reject(r"\bdd\s+if=", "raw device write"),
                BlocklistRule::reject(r"\bmkfs\b", "filesystem format"),
                BlocklistRule::reject(r"\bchmod\s+-R\s+777\b", "world-writable recursive permission change"),
                BlocklistRule::reject(r"\bcurl\b.*\|\s*(sh|bash)\b", "pipe remote script into a shell"),
                BlocklistRule::reject(r"\bwget\b.*\|\s*(sh|bash)\b", "pipe remote script into a shell"),
                BlocklistRule::reject(r"\bsudo\b", "privilege escalation"),
                BlocklistRule::rewrite(
                    r"^pip\s+install\b",
                    "unpinned global pip install",
                    "pip install --no-input",
                ),
            ],
        }
    }
}
