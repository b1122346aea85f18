//! Unified-diff application for `patch_file` (spec §4.3): strict match
//! first, then a fuzzy fallback. No external diff-library dependency
//! exists anywhere in the teacher stack or the rest of the pack for
//! patch *application* (only `similar`-style diff *computation* crates
//! show up elsewhere), so this hand-rolls a minimal unified-diff parser
//! and a line-similarity fuzzy matcher, scoped to what `patch_file`
//! actually needs.

/// Threshold pinned down in SPEC_FULL.md §9 open question: a fuzzy
/// candidate window must average at least 85% Levenshtein line-similarity
/// against the hunk's pre-image to be accepted.
pub const FUZZY_THRESHOLD: f64 = 0.85;

#[derive(Debug, Clone)]
pub struct Hunk {
    /// 1-indexed starting line in the original file, from the `@@ -N,..`
    /// header; used only to seed the strict search window.
    pub old_start: usize,
    /// Context + removed lines, in order — what must be present for a
    /// strict match.
    pub old_lines: Vec<String>,
    /// Context + added lines, in order — what replaces `old_lines`.
    pub new_lines: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UnifiedDiff {
    pub hunks: Vec<Hunk>,
}

/// Parse a unified diff body (the part after any `---`/`+++` file
/// headers) into hunks. Unrecognized lines outside a hunk are ignored.
pub fn parse(diff_text: &str) -> Result<UnifiedDiff, String> {
    let mut hunks = Vec::new();
    let mut lines = diff_text.lines().peekable();

    while let Some(line) = lines.next() {
        if !line.starts_with("@@") {
            continue;
        }
        let old_start = parse_hunk_header(line)?;
        let mut old_lines = Vec::new();
        let mut new_lines = Vec::new();

        while let Some(&next) = lines.peek() {
            if next.starts_with("@@") || next.starts_with("---") || next.starts_with("+++") {
                break;
            }
            let body = lines.next().unwrap();
            if let Some(rest) = body.strip_prefix('-') {
                old_lines.push(rest.to_string());
            } else if let Some(rest) = body.strip_prefix('+') {
                new_lines.push(rest.to_string());
            } else if let Some(rest) = body.strip_prefix(' ') {
                old_lines.push(rest.to_string());
                new_lines.push(rest.to_string());
            } else if body.is_empty() {
                old_lines.push(String::new());
                new_lines.push(String::new());
            }
        }

        hunks.push(Hunk {
            old_start,
            old_lines,
            new_lines,
        });
    }

    if hunks.is_empty() {
        return Err("diff contains no applicable hunks".to_string());
    }
    Ok(UnifiedDiff { hunks })
}

fn parse_hunk_header(line: &str) -> Result<usize, String> {
    let after_minus = line.split("@@").nth(1).ok_or_else(|| "malformed hunk header".to_string())?;
    let old_part = after_minus.trim().split_whitespace().next().ok_or_else(|| "malformed hunk header".to_string())?;
    let start = old_part.trim_start_matches('-').split(',').next().unwrap_or("1");
    start.parse::<usize>().map_err(|_| "malformed hunk header line number".to_string())
}

/// Apply every hunk with an exact, contiguous line match. Fails the whole
/// patch (no partial application) if any hunk can't be found exactly.
pub fn apply_strict(content: &str, diff: &UnifiedDiff) -> Result<String, String> {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    for hunk in &diff.hunks {
        let start = find_exact_match(&lines, &hunk.old_lines, hunk.old_start)
            .ok_or_else(|| format!("hunk near line {} did not match exactly", hunk.old_start))?;
        lines.splice(start..start + hunk.old_lines.len(), hunk.new_lines.clone());
    }
    Ok(join_lines(&lines, content))
}

/// Apply every hunk by locating the best-scoring window of the right
/// length via average per-line Levenshtein similarity, accepting only if
/// it clears `FUZZY_THRESHOLD`.
pub fn apply_fuzzy(content: &str, diff: &UnifiedDiff) -> Result<String, String> {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    for hunk in &diff.hunks {
        if hunk.old_lines.is_empty() {
            return Err("hunk has no pre-image to match against".to_string());
        }
        let (start, score) = best_fuzzy_window(&lines, &hunk.old_lines)
            .ok_or_else(|| format!("hunk near line {} found no candidate window", hunk.old_start))?;
        if score < FUZZY_THRESHOLD {
            return Err(format!(
                "hunk near line {} best match scored {:.0}%, below the {:.0}% threshold",
                hunk.old_start,
                score * 100.0,
                FUZZY_THRESHOLD * 100.0
            ));
        }
        lines.splice(start..start + hunk.old_lines.len(), hunk.new_lines.clone());
    }
    Ok(join_lines(&lines, content))
}

fn join_lines(lines: &[String], original: &str) -> String {
    let joined = lines.join("\n");
    if original.ends_with('\n') {
        format!("{joined}\n")
    } else {
        joined
    }
}

fn find_exact_match(lines: &[String], old_lines: &[String], hint_start: usize) -> Option<usize> {
    if old_lines.is_empty() || old_lines.len() > lines.len() {
        return None;
    }
    let hint_index = hint_start.saturating_sub(1);
    let mut candidates: Vec<usize> = (0..=lines.len() - old_lines.len()).collect();
    candidates.sort_by_key(|&i| (i as i64 - hint_index as i64).unsigned_abs());

    candidates
        .into_iter()
        .find(|&i| lines[i..i + old_lines.len()] == old_lines[..])
}

fn best_fuzzy_window(lines: &[String], old_lines: &[String]) -> Option<(usize, f64)> {
    if old_lines.is_empty() || old_lines.len() > lines.len() {
        return None;
    }
    (0..=lines.len() - old_lines.len())
        .map(|start| {
            let window = &lines[start..start + old_lines.len()];
            let score = window
                .iter()
                .zip(old_lines.iter())
                .map(|(a, b)| line_similarity(a, b))
                .sum::<f64>()
                / old_lines.len() as f64;
            (start, score)
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

/// `1 - levenshtein_distance / max(len_a, len_b)`, in `[0, 1]`.
fn line_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.iter().enumerate() {
        let mut prev_diag = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let temp = row[j + 1];
            row[j + 1] = if ca == cb {
                prev_diag
            } else {
                1 + prev_diag.min(row[j]).min(row[j + 1])
            };
            prev_diag = temp;
        }
    }
    row[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_DIFF: &str = "@@ -1,3 +1,3 @@\n def greet():\n-    print(\"hi\")\n+    print(\"hello\")\n     return None\n";

    #[test]
    fn strict_apply_replaces_matched_line() {
        let content = "def greet():\n    print(\"hi\")\n    return None\n";
        let diff = parse(SAMPLE_DIFF).unwrap();
        let patched = apply_strict(content, &diff).unwrap();
        assert!(patched.contains("print(\"hello\")"));
        assert!(!patched.contains("print(\"hi\")"));
    }

    #[test]
    fn strict_apply_fails_when_context_does_not_match() {
        let content = "def greet():\n    print(\"nope\")\n    return None\n";
        let diff = parse(SAMPLE_DIFF).unwrap();
        assert!(apply_strict(content, &diff).is_err());
    }

    #[test]
    fn fuzzy_apply_tolerates_small_drift() {
        // whitespace-shifted context line the strict matcher would reject
        let content = "def greet():\n   print(\"hi\")\n    return None\n";
        let diff = parse(SAMPLE_DIFF).unwrap();
        assert!(apply_strict(content, &diff).is_err());
        let patched = apply_fuzzy(content, &diff).unwrap();
        assert!(patched.contains("print(\"hello\")"));
    }

    #[test]
    fn fuzzy_apply_rejects_when_below_threshold() {
        let content = "totally different content\nthat shares nothing\nwith the hunk at all\n";
        let diff = parse(SAMPLE_DIFF).unwrap();
        assert!(apply_fuzzy(content, &diff).is_err());
    }

    #[test]
    fn levenshtein_identical_strings_is_zero() {
        assert_eq!(levenshtein("abc", "abc"), 0);
    }

    #[test]
    fn levenshtein_distance_is_symmetric() {
        assert_eq!(levenshtein("kitten", "sitting"), levenshtein("sitting", "kitten"));
    }

    #[test]
    fn parse_rejects_diff_with_no_hunks() {
        assert!(parse("not a diff").is_err());
    }
}
