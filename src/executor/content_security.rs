//! Content-security scan applied to `write_file`/`patch_file` bodies
//! (spec §4.3): dynamic code evaluation, hardcoded secrets, raw-SQL
//! escape hatches in model files, unescaped template output.

use crate::state::model::FileRole;
use regex::Regex;
use std::sync::LazyLock;

static EVAL_CALL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\beval\s*\(").unwrap());
static EXEC_CALL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bexec\s*\(").unwrap());
static SECRET_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(api[_-]?key|secret|password|token)\s*[:=]\s*["'][A-Za-z0-9+/=_-]{16,}["']"#).unwrap()
});
static RAW_SQL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\.raw\s*\(|\bexecute\s*\(\s*f?["']"#).unwrap());
static UNESCAPED_OUTPUT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{\{.*?\}\}\}|\|safe\b").unwrap());

/// Reject `body` if it trips one of the four patterns. The message names
/// the specific offending construct so the Executor LLM can self-correct
/// (spec §4.3: "rejection message must be specific enough").
pub fn scan(body: &str, role: FileRole) -> Result<(), String> {
    if EVAL_CALL.is_match(body) {
        return Err("body calls eval(...), which is disallowed — use an explicit code path instead".to_string());
    }
    if EXEC_CALL.is_match(body) {
        return Err("body calls exec(...), which is disallowed — use an explicit code path instead".to_string());
    }
    if let Some(m) = SECRET_ASSIGNMENT.find(body) {
        return Err(format!(
            "body hardcodes what looks like a secret ('{}') — use a placeholder token instead",
            &body[m.start()..m.end().min(m.start() + 40)]
        ));
    }
    if role == FileRole::FrameworkModel && RAW_SQL.is_match(body) {
        return Err("model file uses a raw-SQL escape hatch — use the ORM's parameterized query API".to_string());
    }
    if role == FileRole::Template && UNESCAPED_OUTPUT.is_match(body) {
        return Err("template disables output escaping — remove the unescaped-output marker".to_string());
    }
    Ok(())
}
