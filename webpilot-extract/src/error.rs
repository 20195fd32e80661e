//! Parsing errors raised while peeling tags off model output or validating payloads.

use thiserror::Error;

/// The stage of extraction or validation that rejected the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParsingErrorKind {
    /// The outer tag never opened, or strict mode required it to close.
    MissingOuterTag,
    /// The next-outer-tag rescue found the tag but could not split on it.
    NextOuterTagContract,
    /// A tentative match still contained tag-like markup.
    ResidualMarkup,
    /// No fenced block labelled with the inner tag was found.
    MissingInnerTag,
    /// The extracted text is neither a fenced JSON block nor a bare object.
    NotJsonObject,
    /// The extracted text is not syntactically valid JSON.
    InvalidJson,
    /// The JSON does not satisfy the target schema.
    Validation,
    /// The JSON satisfied the schema but could not be deserialized.
    Deserialize,
}

/// Error produced when model output cannot be turned into the expected content.
///
/// Always local to text processing. The offending content is kept so callers
/// can log it or feed it back to the model.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ParsingError {
    kind: ParsingErrorKind,
    message: String,
    content: String,
    validation_errors: Vec<String>,
}

impl ParsingError {
    fn new(kind: ParsingErrorKind, message: String, content: &str) -> Self {
        Self {
            kind,
            message,
            content: content.to_string(),
            validation_errors: Vec::new(),
        }
    }

    /// No `<tag>` content could be recovered from `text`.
    #[must_use]
    pub fn missing_outer_tag(tag: &str, text: &str) -> Self {
        Self::new(
            ParsingErrorKind::MissingOuterTag,
            format!("No content found within <{tag}> tags in the response: {text}"),
            text,
        )
    }

    /// The `<next_tag>` rescue split did not yield a leading segment.
    #[must_use]
    pub fn next_outer_tag_contract(tag: &str, fragment: &str) -> Self {
        Self::new(
            ParsingErrorKind::NextOuterTagContract,
            format!("Unexpected error <{tag}> should be present in the response: {fragment}"),
            fragment,
        )
    }

    /// The tentative `<tag>` match still holds markup, so it cannot be trusted.
    #[must_use]
    pub fn residual_markup(tag: &str, text: &str) -> Self {
        Self::new(
            ParsingErrorKind::ResidualMarkup,
            format!("No content found within <{tag}> tags in the response: {text}"),
            text,
        )
    }

    /// No fenced block labelled `tag` was found.
    #[must_use]
    pub fn missing_inner_tag(tag: &str, text: &str) -> Self {
        Self::new(
            ParsingErrorKind::MissingInnerTag,
            format!("No content found within ```{tag}``` blocks in the response: {text}"),
            text,
        )
    }

    /// The content is neither a fenced JSON block nor a bare JSON object.
    #[must_use]
    pub fn not_json_object(content: &str) -> Self {
        Self::new(
            ParsingErrorKind::NotJsonObject,
            format!(
                "Invalid LLM response. JSON code blocks or JSON object expected, got: {content}"
            ),
            content,
        )
    }

    /// The content is not valid JSON at all.
    #[must_use]
    pub fn invalid_json(content: &str, cause: &serde_json::Error) -> Self {
        let mut err = Self::new(
            ParsingErrorKind::InvalidJson,
            format!("Error parsing LLM response: \n\n{content}\n\n"),
            content,
        );
        err.validation_errors.push(format!("JSON parse error: {cause}"));
        err
    }

    /// The JSON failed schema validation with the given messages.
    #[must_use]
    pub fn validation(content: &str, errors: Vec<String>) -> Self {
        let mut err = Self::new(
            ParsingErrorKind::Validation,
            format!("Error parsing LLM response: \n\n{content}\n\n"),
            content,
        );
        err.validation_errors = errors;
        err
    }

    /// The JSON could not be deserialized into the target type.
    #[must_use]
    pub fn deserialize(content: &str, cause: &serde_json::Error) -> Self {
        let mut err = Self::new(
            ParsingErrorKind::Deserialize,
            format!("Error parsing LLM response: \n\n{content}\n\n"),
            content,
        );
        err.validation_errors
            .push(format!("Deserialization to target type failed: {cause}"));
        err
    }

    /// Which stage failed.
    #[must_use]
    pub const fn kind(&self) -> ParsingErrorKind {
        self.kind
    }

    /// The text that could not be parsed.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Individual validation or parse messages, empty for tag failures.
    #[must_use]
    pub fn validation_errors(&self) -> &[String] {
        &self.validation_errors
    }

    /// Diagnostic message for developers, including the offending content.
    #[must_use]
    pub fn dev_message(&self) -> &str {
        &self.message
    }

    /// Message safe to show to an end user.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        "The language model returned a response that could not be understood."
    }

    /// Hint addressed to an agent that may retry the request.
    #[must_use]
    pub const fn agent_message(&self) -> Option<&'static str> {
        match self.kind {
            ParsingErrorKind::MissingOuterTag
            | ParsingErrorKind::NextOuterTagContract
            | ParsingErrorKind::ResidualMarkup => {
                Some("Wrap your answer in the requested tags and do not nest other tags inside.")
            }
            ParsingErrorKind::MissingInnerTag | ParsingErrorKind::NotJsonObject => {
                Some("Answer with a single JSON object inside a ```json code block.")
            }
            ParsingErrorKind::InvalidJson
            | ParsingErrorKind::Validation
            | ParsingErrorKind::Deserialize => {
                Some("Your JSON did not match the expected schema. Fix the errors and answer again.")
            }
        }
    }
}
