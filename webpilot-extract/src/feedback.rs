//! Feedback messages that tell a model why its previous answer was rejected.

use std::fmt::Write as _;

use serde_json::Value;

use crate::error::{ParsingError, ParsingErrorKind};

const MAX_ECHOED_CHARS: usize = 500;

/// Build the message sent back after a schema-invalid answer.
///
/// The message carries the attempt counter, one bullet per validation
/// error, the echoed answer (clipped) and the schema the answer must match.
///
/// # Examples
///
/// ```
/// use webpilot_extract::feedback::build_validation_feedback;
/// use serde_json::json;
///
/// let schema = json!({"type": "object", "properties": {"url": {"type": "string"}}});
/// let errors = vec!["At path '/url': 3 is not of type \"string\"".to_string()];
///
/// let feedback = build_validation_feedback(&schema, "{\"url\": 3}", &errors, 1, 3);
/// assert!(feedback.starts_with("Attempt 1/3"));
/// assert!(feedback.contains("/url"));
/// ```
#[must_use]
pub fn build_validation_feedback(
    schema: &Value,
    submission: &str,
    errors: &[String],
    attempt: usize,
    max_attempts: usize,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Attempt {attempt}/{max_attempts}: the JSON you returned does not match the schema."
    );
    let _ = writeln!(out, "\nProblems found:");
    for error in errors {
        let _ = writeln!(out, "- {error}");
    }
    let _ = write!(out, "\nYou answered:\n{}\n", clip(submission));
    append_schema(&mut out, schema);
    out.push_str("\nReturn corrected JSON only.");
    out
}

/// Build the message sent back after an answer that was not usable JSON.
///
/// # Examples
///
/// ```
/// use webpilot_extract::feedback::build_parse_error_feedback;
/// use serde_json::json;
///
/// let feedback = build_parse_error_feedback("not json", "expected value", 2, 3, &json!({}));
/// assert!(feedback.starts_with("Attempt 2/3"));
/// assert!(feedback.contains("Could not parse"));
/// ```
#[must_use]
pub fn build_parse_error_feedback(
    raw_text: &str,
    cause: &str,
    attempt: usize,
    max_attempts: usize,
    schema: &Value,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Attempt {attempt}/{max_attempts}: Could not parse a JSON object from your answer ({cause})."
    );
    let _ = write!(out, "\nYou answered:\n{}\n", clip(raw_text));
    append_schema(&mut out, schema);
    out.push_str("\nWrap a single JSON object in a ```json fence.");
    out
}

/// Picks the right feedback builder for a [`ParsingError`].
#[must_use]
pub fn feedback_for_error(
    error: &ParsingError,
    schema: &Value,
    attempt: usize,
    max_attempts: usize,
) -> String {
    match error.kind() {
        ParsingErrorKind::Validation | ParsingErrorKind::Deserialize => build_validation_feedback(
            schema,
            error.content(),
            error.validation_errors(),
            attempt,
            max_attempts,
        ),
        ParsingErrorKind::InvalidJson => {
            let cause = error
                .validation_errors()
                .first()
                .map_or("invalid JSON", String::as_str);
            build_parse_error_feedback(error.content(), cause, attempt, max_attempts, schema)
        }
        _ => {
            let cause = error.agent_message().unwrap_or("unexpected response format");
            build_parse_error_feedback(error.content(), cause, attempt, max_attempts, schema)
        }
    }
}

fn append_schema(out: &mut String, schema: &Value) {
    let rendered = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    let _ = write!(out, "\nRequired JSON schema:\n{rendered}\n");
}

/// Char-safe clip of echoed model output.
fn clip(text: &str) -> String {
    match text.char_indices().nth(MAX_ECHOED_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validation_feedback_lists_every_error() {
        let schema = json!({"type": "object", "required": ["url", "title"]});
        let errors = vec![
            "\"url\" is a required property".to_string(),
            "\"title\" is a required property".to_string(),
        ];

        let feedback = build_validation_feedback(&schema, "{}", &errors, 2, 3);

        assert!(feedback.starts_with("Attempt 2/3"));
        assert!(feedback.contains("- \"url\" is a required property"));
        assert!(feedback.contains("- \"title\" is a required property"));
        assert!(feedback.contains("Required JSON schema:"));
        assert!(feedback.contains("\"required\""));
    }

    #[test]
    fn test_clip_is_char_safe() {
        let clipped = clip(&"é".repeat(1000));
        assert!(clipped.ends_with("..."));
        assert_eq!(clipped.chars().count(), MAX_ECHOED_CHARS + 3);
        assert_eq!(clip("short"), "short");
    }

    #[test]
    fn test_feedback_for_error_dispatches_on_kind() {
        let schema = json!({"type": "object"});
        let validation = ParsingError::validation("{}", vec!["missing 'url'".to_string()]);
        assert!(feedback_for_error(&validation, &schema, 1, 2).contains("missing 'url'"));

        let not_json = ParsingError::not_json_object("hello");
        let feedback = feedback_for_error(&not_json, &schema, 1, 2);
        assert!(feedback.contains("Could not parse"));
        assert!(feedback.contains("hello"));
    }
}
