//! Cleanup of raw model output before it is stored as a step output.
//!
//! Step outputs are markdown shown to a user and substituted into later
//! prompts, so reasoning blocks and a fence wrapping the whole answer are
//! removed. Anything else is kept verbatim.

/// Extract `<think>...</think>` blocks from a response (DeepSeek R1 style).
///
/// Returns `(thinking_content, cleaned_text)` where `cleaned_text` has the
/// thinking block removed and is trimmed.
pub fn extract_thinking(text: &str) -> (Option<String>, String) {
    let think_start = "<think>";
    let think_end = "</think>";

    if let Some(start_idx) = text.find(think_start) {
        if let Some(end_idx) = text[start_idx..].find(think_end).map(|i| i + start_idx) {
            let thinking = text[start_idx + think_start.len()..end_idx].trim();
            let mut cleaned = String::with_capacity(text.len());
            cleaned.push_str(&text[..start_idx]);
            cleaned.push_str(&text[end_idx + think_end.len()..]);
            let thinking = (!thinking.is_empty()).then(|| thinking.to_string());
            return (thinking, cleaned.trim().to_string());
        }
    }

    (None, text.to_string())
}

/// Remove a code fence that wraps the entire answer.
///
/// Recognizes `` ```markdown ``, `` ```md `` and plain `` ``` ``. Fences inside
/// the answer (code samples) are left alone.
pub fn strip_outer_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    let Some((lang, inner)) = body.split_once('\n') else {
        return trimmed;
    };
    let lang = lang.trim();
    if !matches!(lang, "" | "markdown" | "md") || inner.contains("```") {
        return trimmed;
    }
    inner.trim()
}

/// Split a raw response into `(thinking, text)` with the text cleaned.
pub fn clean_response(raw: &str) -> (Option<String>, String) {
    let (thinking, text) = extract_thinking(raw);
    (thinking, strip_outer_fence(&text).to_string())
}
