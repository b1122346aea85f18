//! Small shared helpers used across subsystems.

use std::path::{Path, PathBuf};

fn join_error_to_io(e: tokio::task::JoinError) -> std::io::Error {
    std::io::Error::other(format!("blocking file task panicked: {e}"))
}

/// Run a filesystem read/write on a blocking-pool thread (spec §5:
/// "Blocking I/O ... filesystem ops ... runs on worker threads off the
/// primary task") rather than inline in the async executor/persistence
/// hot path.
pub async fn read_to_string(path: &Path) -> std::io::Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || std::fs::read_to_string(path))
        .await
        .map_err(join_error_to_io)?
}

pub async fn write(path: &Path, contents: impl Into<Vec<u8>>) -> std::io::Result<()> {
    let path = path.to_path_buf();
    let contents = contents.into();
    tokio::task::spawn_blocking(move || std::fs::write(path, contents))
        .await
        .map_err(join_error_to_io)?
}

pub async fn create_dir_all(path: &Path) -> std::io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || std::fs::create_dir_all(path))
        .await
        .map_err(join_error_to_io)?
}

pub async fn file_len(path: &Path) -> std::io::Result<u64> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || std::fs::metadata(path).map(|m| m.len()))
        .await
        .map_err(join_error_to_io)?
}

/// Extract a JSON object from text that may contain other content, by
/// brace-counting to find the outermost balanced `{ ... }` span.
///
/// This is the last-resort stage of the robust ActionRequest/Planner
/// response parser (see `executor::parsing`): after markdown-fence
/// stripping fails to yield valid JSON directly, this locates the first
/// balanced object anywhere in the remaining text.
pub fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    let mut end = start;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = start + i + 1;
                    break;
                }
            }
            _ => {}
        }
    }

    if depth == 0 && end > start {
        Some(text[start..end].to_string())
    } else {
        None
    }
}

/// Strip a single markdown fenced code block (```` ```json ... ``` ````
/// or a bare ```` ``` ... ``` ````) down to its inner content, if present.
pub fn strip_markdown_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest
            .strip_prefix("json")
            .or_else(|| rest.strip_prefix("JSON"))
            .unwrap_or(rest);
        let rest = rest.strip_prefix('\n').unwrap_or(rest);
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim();
        }
        return rest.trim();
    }
    trimmed
}

/// Repair the most common malformations LLM output exhibits in otherwise
/// near-valid JSON: trailing commas before `}`/`]`, and a BOM prefix.
pub fn repair_common_json_malformations(text: &str) -> String {
    let text = text.trim_start_matches('\u{feff}');
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                i += 1;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_object_simple() {
        let text = r#"{"key": "value"}"#;
        assert_eq!(extract_json_object(text), Some(text.to_string()));
    }

    #[test]
    fn extract_json_object_with_prefix_and_suffix() {
        let text = r#"Here you go: {"key": "value"} thanks"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"key": "value"}"#.to_string())
        );
    }

    #[test]
    fn extract_json_object_nested() {
        let text = r#"{"outer": {"inner": "value"}}"#;
        assert_eq!(extract_json_object(text), Some(text.to_string()));
    }

    #[test]
    fn extract_json_object_ignores_braces_in_strings() {
        let text = r#"{"a": "} not the end {"}"#;
        assert_eq!(extract_json_object(text), Some(text.to_string()));
    }

    #[test]
    fn extract_json_object_unclosed_returns_none() {
        assert_eq!(extract_json_object(r#"{"key": "value""#), None);
    }

    #[test]
    fn extract_json_object_no_json_returns_none() {
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn strip_markdown_fence_with_json_tag() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_markdown_fence(text), "{\"a\": 1}");
    }

    #[test]
    fn strip_markdown_fence_bare() {
        let text = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_markdown_fence(text), "{\"a\": 1}");
    }

    #[test]
    fn strip_markdown_fence_passthrough_without_fence() {
        assert_eq!(strip_markdown_fence("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn repair_trailing_comma_in_object() {
        let repaired = repair_common_json_malformations(r#"{"a": 1, "b": 2,}"#);
        assert_eq!(repaired, r#"{"a": 1, "b": 2}"#);
        assert!(serde_json::from_str::<serde_json::Value>(&repaired).is_ok());
    }

    #[test]
    fn repair_trailing_comma_in_array() {
        let repaired = repair_common_json_malformations(r#"{"a": [1, 2,]}"#);
        assert!(serde_json::from_str::<serde_json::Value>(&repaired).is_ok());
    }

    #[tokio::test]
    async fn write_then_read_round_trips_on_the_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("file.txt");
        create_dir_all(path.parent().unwrap()).await.unwrap();
        write(&path, "hello").await.unwrap();
        assert_eq!(read_to_string(&path).await.unwrap(), "hello");
        assert_eq!(file_len(&path).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn read_to_string_missing_file_returns_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_to_string(&dir.path().join("missing.txt")).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
