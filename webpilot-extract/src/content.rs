//! Tag-peeling extraction of structured content from free-form model output.
//!
//! Model output is unreliable: tags go missing, get duplicated, or are buried in
//! prose. [`StructuredContent`] describes which tags to look for and how
//! tolerant to be at each stage, and [`StructuredContent::extract`] walks an
//! explicit state machine:
//!
//! ```text
//! OuterSearch -> FallbackSplit -> NextTagRescue -> ResidualGuard -> InnerFence -> Done
//!      |                                                              ^
//!      +------------------- (well-formed span found) -----------------+
//! ```

use crate::error::ParsingError;

/// Describes how to extract structured content from a model response.
///
/// Built once with the `with_*` setters and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredContent {
    outer_tag: Option<String>,
    inner_tag: Option<String>,
    next_outer_tag: Option<String>,
    fail_if_final_tag: bool,
    fail_if_inner_tag: bool,
    fail_if_next_outer_tag: bool,
}

impl Default for StructuredContent {
    fn default() -> Self {
        Self {
            outer_tag: None,
            inner_tag: None,
            next_outer_tag: None,
            fail_if_final_tag: true,
            fail_if_inner_tag: true,
            fail_if_next_outer_tag: true,
        }
    }
}

/// Progress through [`StructuredContent::extract`]. Content slices borrow the input.
#[derive(Debug)]
enum Stage<'a> {
    OuterSearch,
    FallbackSplit(&'a str),
    NextTagRescue(&'a str),
    ResidualGuard(&'a str),
    InnerFence(&'a str),
    Done(&'a str),
}

impl StructuredContent {
    /// Creates a configuration with no tags and every stage strict.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect the content wrapped in `<tag>...</tag>`.
    #[must_use]
    pub fn with_outer_tag(mut self, tag: impl Into<String>) -> Self {
        self.outer_tag = Some(tag.into());
        self
    }

    /// Expect the payload in a fenced block labelled `tag` (e.g. `json`).
    #[must_use]
    pub fn with_inner_tag(mut self, tag: impl Into<String>) -> Self {
        self.inner_tag = Some(tag.into());
        self
    }

    /// Tag of the section expected after the outer one, used to recover
    /// content when the outer tag never closes.
    #[must_use]
    pub fn with_next_outer_tag(mut self, tag: impl Into<String>) -> Self {
        self.next_outer_tag = Some(tag.into());
        self
    }

    /// Fail when the outer tag is not properly closed.
    #[must_use]
    pub const fn fail_if_final_tag(mut self, fail: bool) -> Self {
        self.fail_if_final_tag = fail;
        self
    }

    /// Fail when no fenced inner block is found.
    #[must_use]
    pub const fn fail_if_inner_tag(mut self, fail: bool) -> Self {
        self.fail_if_inner_tag = fail;
        self
    }

    /// When `false`, allow the next-outer-tag rescue.
    #[must_use]
    pub const fn fail_if_next_outer_tag(mut self, fail: bool) -> Self {
        self.fail_if_next_outer_tag = fail;
        self
    }

    /// The configured outer tag.
    #[must_use]
    pub fn outer_tag(&self) -> Option<&str> {
        self.outer_tag.as_deref()
    }

    /// The configured inner fence tag.
    #[must_use]
    pub fn inner_tag(&self) -> Option<&str> {
        self.inner_tag.as_deref()
    }

    /// The configured next outer tag.
    #[must_use]
    pub fn next_outer_tag(&self) -> Option<&str> {
        self.next_outer_tag.as_deref()
    }

    /// Extracts content from `text` according to this configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ParsingError`] when a strict stage finds no content, when the
    /// outer-tag fallback leaves tag-like markup behind, or when the next-tag
    /// rescue cannot split the tentative match.
    pub fn extract(&self, text: &str) -> Result<String, ParsingError> {
        let mut stage = Stage::OuterSearch;
        loop {
            stage = match stage {
                Stage::OuterSearch => self.outer_search(text),
                Stage::FallbackSplit(tag) => self.fallback_split(tag, text)?,
                Stage::NextTagRescue(tentative) => self.next_tag_rescue(tentative)?,
                Stage::ResidualGuard(candidate) => self.residual_guard(candidate, text)?,
                Stage::InnerFence(content) => self.inner_fence(content, text)?,
                Stage::Done(content) => return Ok(content.to_string()),
            };
        }
    }

    fn outer_search<'a>(&'a self, text: &'a str) -> Stage<'a> {
        let Some(tag) = self.outer_tag.as_deref() else {
            return Stage::InnerFence(text);
        };
        match find_tagged_span(text, tag) {
            Some(inner) => Stage::InnerFence(inner.trim()),
            None => {
                tracing::debug!(tag, "no closed outer tag span, falling back to split");
                Stage::FallbackSplit(tag)
            }
        }
    }

    fn fallback_split<'a>(&self, tag: &str, text: &'a str) -> Result<Stage<'a>, ParsingError> {
        if self.fail_if_final_tag {
            return Err(ParsingError::missing_outer_tag(tag, text));
        }
        let open = opening(tag);
        let Some((_, rest)) = text.split_once(&open) else {
            return Err(ParsingError::missing_outer_tag(tag, text));
        };
        // Only the segment up to the next opening tag counts.
        let tentative = rest.split_once(&open).map_or(rest, |(head, _)| head);
        Ok(Stage::NextTagRescue(tentative))
    }

    fn next_tag_rescue<'a>(&self, tentative: &'a str) -> Result<Stage<'a>, ParsingError> {
        let next = match self.next_outer_tag.as_deref() {
            Some(next) if !self.fail_if_next_outer_tag => next,
            _ => return Ok(Stage::ResidualGuard(tentative)),
        };
        let open_next = opening(next);
        if !tentative.contains(&open_next) {
            return Ok(Stage::ResidualGuard(tentative));
        }
        match tentative.split_once(&open_next) {
            Some((before, _)) => {
                tracing::debug!(next, "recovered content before next outer tag");
                Ok(Stage::ResidualGuard(before.trim()))
            }
            None => Err(ParsingError::next_outer_tag_contract(
                self.outer_tag.as_deref().unwrap_or_default(),
                tentative,
            )),
        }
    }

    fn residual_guard<'a>(&self, candidate: &'a str, text: &str) -> Result<Stage<'a>, ParsingError> {
        if contains_markup(candidate) {
            return Err(ParsingError::residual_markup(
                self.outer_tag.as_deref().unwrap_or_default(),
                text,
            ));
        }
        Ok(Stage::InnerFence(candidate))
    }

    fn inner_fence<'a>(&self, content: &'a str, text: &str) -> Result<Stage<'a>, ParsingError> {
        let Some(tag) = self.inner_tag.as_deref() else {
            return Ok(Stage::Done(content));
        };
        match find_fenced_block(content, tag) {
            Some(body) => Ok(Stage::Done(body.trim())),
            None if self.fail_if_inner_tag => Err(ParsingError::missing_inner_tag(tag, text)),
            None => Ok(Stage::Done(content)),
        }
    }
}

fn opening(tag: &str) -> String {
    format!("<{tag}>")
}

/// Returns the text between the first `<tag>` and the first `</tag>` after it.
fn find_tagged_span<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = opening(tag);
    let close = format!("</{tag}>");
    let start = text.find(&open)? + open.len();
    let len = text[start..].find(&close)?;
    Some(&text[start..start + len])
}

/// Returns the body of the first ```` ```tag ... ``` ```` block.
fn find_fenced_block<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let fence = format!("```{tag}");
    let start = text.find(&fence)? + fence.len();
    let len = text[start..].find("```")?;
    Some(&text[start..start + len])
}

/// True if some `<` is followed, anywhere later, by a `>`.
fn contains_markup(text: &str) -> bool {
    text.find('<').is_some_and(|i| text[i..].contains('>'))
}
