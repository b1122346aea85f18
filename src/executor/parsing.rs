//! Robust `ActionRequest` parsing (spec §4.2 step 4): accept markdown-fenced
//! JSON, repair common malformations, and only then attempt a strict parse.
//! Grounded on `util::extract_json_object`'s brace-balanced scan.

use crate::state::model::ActionRequest;
use crate::util::{extract_json_object, repair_common_json_malformations, strip_markdown_fence};

/// On failure, the returned message is meant to be fed back to the
/// Executor LLM as the next step's correction (spec §4.2 step 4).
pub fn parse_action_request(raw: &str) -> Result<ActionRequest, String> {
    let stripped = strip_markdown_fence(raw.trim());
    let candidate = extract_json_object(stripped).unwrap_or_else(|| stripped.to_string());
    let repaired = repair_common_json_malformations(&candidate);

    serde_json::from_str::<ActionRequest>(&repaired)
        .map_err(|e| format!("could not parse ActionRequest JSON: {e}"))
}
