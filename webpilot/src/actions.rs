//! Special browser actions.
//!
//! Special actions are page-independent browser commands with fixed ids
//! (`S1` to `S8`). Page-specific actions (`B1`, `I1`, `L1`, ...) are resolved
//! elsewhere; this module only recognises and validates the special ones and
//! describes them for prompts. Executing them is the job of a
//! [`BrowserController`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::Error as WebpilotError;

/// Errors raised while resolving a special action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// The id is not a special action.
    #[error("{id} not found")]
    NotFound {
        /// Rejected id.
        id: String,
    },

    /// The parameters do not fit the action.
    #[error("Action with id '{id}' is invalid: {reason}")]
    Invalid {
        /// Action id.
        id: BrowserActionId,
        /// What is wrong with the parameters.
        reason: String,
    },
}

/// Ids of the special actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BrowserActionId {
    /// `S1`: navigate to a URL.
    #[serde(rename = "S1")]
    Goto,
    /// `S2`: turn the current page into markdown.
    #[serde(rename = "S2")]
    Scrape,
    /// `S3`: capture the current page.
    #[serde(rename = "S3")]
    Screenshot,
    /// `S4`: history back.
    #[serde(rename = "S4")]
    GoBack,
    /// `S5`: history forward.
    #[serde(rename = "S5")]
    GoForward,
    /// `S6`: reload the page.
    #[serde(rename = "S6")]
    Reload,
    /// `S7`: pause.
    #[serde(rename = "S7")]
    Wait,
    /// `S8`: end the session with an answer.
    #[serde(rename = "S8")]
    Completion,
}

impl BrowserActionId {
    /// Every special action, in id order.
    pub const ALL: [Self; 8] = [
        Self::Goto,
        Self::Scrape,
        Self::Screenshot,
        Self::GoBack,
        Self::GoForward,
        Self::Reload,
        Self::Wait,
        Self::Completion,
    ];

    /// Wire id, e.g. `S1`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Goto => "S1",
            Self::Scrape => "S2",
            Self::Screenshot => "S3",
            Self::GoBack => "S4",
            Self::GoForward => "S5",
            Self::Reload => "S6",
            Self::Wait => "S7",
            Self::Completion => "S8",
        }
    }

    /// One-line description used in prompts.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Goto => "Goto to a URL (in current tab)",
            Self::Scrape => "Scrape data from the current page",
            Self::Screenshot => "Take a screenshot of the current page",
            Self::GoBack => "Go back to the previous page (in current tab)",
            Self::GoForward => "Go forward to the next page (in current tab)",
            Self::Reload => "Reload the current page",
            Self::Wait => "Wait for a specific amount of time (in ms)",
            Self::Completion => "Complete the task by returning the answer and terminate the browser session",
        }
    }

    /// Catalog section the action is listed under.
    #[must_use]
    pub const fn category(self) -> &'static str {
        match self {
            Self::Goto | Self::GoBack | Self::GoForward | Self::Reload => {
                "Special Browser Actions"
            }
            Self::Scrape | Self::Screenshot => "Data Extraction Actions",
            Self::Wait | Self::Completion => "Session Actions",
        }
    }

    /// Parameters as `(name, type)`; optional ones end with `?`.
    #[must_use]
    pub const fn params(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Goto => &[("url", "string")],
            Self::Scrape => &[("instructions?", "string")],
            Self::Wait => &[("value", "int")],
            Self::Completion => &[("success", "bool"), ("answer", "string")],
            Self::Screenshot | Self::GoBack | Self::GoForward | Self::Reload => &[],
        }
    }
}

impl fmt::Display for BrowserActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrowserActionId {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| ActionError::NotFound { id: s.to_string() })
    }
}

/// Whether `id` names a special action.
#[must_use]
pub fn is_special(id: &str) -> bool {
    id.parse::<BrowserActionId>().is_ok()
}

/// A validated special action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SpecialAction {
    /// Navigate to `url`.
    Goto {
        /// Target URL.
        url: String,
    },
    /// Scrape the current page.
    Scrape {
        /// Optional extraction instructions.
        instructions: Option<String>,
    },
    /// Capture the current page.
    Screenshot,
    /// History back.
    GoBack,
    /// History forward.
    GoForward,
    /// Reload the page.
    Reload,
    /// Pause for `time_ms` milliseconds.
    Wait {
        /// Pause length.
        time_ms: u64,
    },
    /// End the session.
    Completion {
        /// Whether the task succeeded.
        success: bool,
        /// Final answer.
        answer: String,
    },
}

impl SpecialAction {
    /// Resolves `id` and validates `params` against it.
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use webpilot::actions::SpecialAction;
    ///
    /// let params = HashMap::from([("url".to_string(), "https://github.com".to_string())]);
    /// let action = SpecialAction::parse("S1", &params).unwrap();
    /// assert_eq!(action, SpecialAction::Goto { url: "https://github.com".to_string() });
    ///
    /// let err = SpecialAction::parse("S1", &HashMap::new()).unwrap_err();
    /// assert!(err.to_string().starts_with("Action with id 'S1' is invalid"));
    /// ```
    pub fn parse(id: &str, params: &HashMap<String, String>) -> Result<Self, ActionError> {
        let id = id.parse::<BrowserActionId>()?;
        let required = |name: &str| {
            params
                .get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ActionError::Invalid {
                    id,
                    reason: format!("missing parameter '{name}'"),
                })
        };

        let action = match id {
            BrowserActionId::Goto => Self::Goto {
                url: required("url")?.to_string(),
            },
            BrowserActionId::Scrape => Self::Scrape {
                instructions: params
                    .get("instructions")
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty()),
            },
            BrowserActionId::Screenshot => Self::Screenshot,
            BrowserActionId::GoBack => Self::GoBack,
            BrowserActionId::GoForward => Self::GoForward,
            BrowserActionId::Reload => Self::Reload,
            BrowserActionId::Wait => {
                let value = required("value")?;
                let time_ms = value.parse().map_err(|_| ActionError::Invalid {
                    id,
                    reason: format!("'value' must be a number of milliseconds, got '{value}'"),
                })?;
                Self::Wait { time_ms }
            }
            BrowserActionId::Completion => {
                let success = required("success")?;
                let success = match success.to_ascii_lowercase().as_str() {
                    "true" => true,
                    "false" => false,
                    _ => {
                        return Err(ActionError::Invalid {
                            id,
                            reason: format!("'success' must be true or false, got '{success}'"),
                        })
                    }
                };
                Self::Completion {
                    success,
                    answer: required("answer")?.to_string(),
                }
            }
        };
        Ok(action)
    }

    /// Id of this action.
    #[must_use]
    pub const fn id(&self) -> BrowserActionId {
        match self {
            Self::Goto { .. } => BrowserActionId::Goto,
            Self::Scrape { .. } => BrowserActionId::Scrape,
            Self::Screenshot => BrowserActionId::Screenshot,
            Self::GoBack => BrowserActionId::GoBack,
            Self::GoForward => BrowserActionId::GoForward,
            Self::Reload => BrowserActionId::Reload,
            Self::Wait { .. } => BrowserActionId::Wait,
            Self::Completion { .. } => BrowserActionId::Completion,
        }
    }
}

/// Renders the special action catalog as markdown, grouped by category.
///
/// ```text
/// # Special Browser Actions
/// * S1: Goto to a URL (in current tab) (url: string)
/// ...
/// ```
#[must_use]
pub fn markdown() -> String {
    let mut sections: Vec<(&str, Vec<String>)> = Vec::new();
    for id in BrowserActionId::ALL {
        let mut line = format!("* {id}: {}", id.description());
        if !id.params().is_empty() {
            let params: Vec<String> = id
                .params()
                .iter()
                .map(|(name, ty)| format!("{name}: {ty}"))
                .collect();
            line.push_str(&format!(" ({})", params.join(", ")));
        }
        match sections.iter_mut().find(|(c, _)| *c == id.category()) {
            Some((_, lines)) => lines.push(line),
            None => sections.push((id.category(), vec![line])),
        }
    }

    sections
        .into_iter()
        .map(|(category, lines)| format!("\n# {category}\n{}", lines.join("\n")))
        .collect()
}

/// Counts executed actions against a session step budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepBudget {
    max_steps: usize,
    used: usize,
}

impl StepBudget {
    /// A fresh budget of `max_steps` actions.
    #[must_use]
    pub const fn new(max_steps: usize) -> Self {
        Self { max_steps, used: 0 }
    }

    /// Records one action and returns its 1-based step number.
    pub fn consume(&mut self) -> Result<usize, WebpilotError> {
        if self.used >= self.max_steps {
            return Err(WebpilotError::MaxStepsReached {
                max_steps: self.max_steps,
            });
        }
        self.used += 1;
        Ok(self.used)
    }

    /// Actions left before the budget is exhausted.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.max_steps.saturating_sub(self.used)
    }

    /// Starts over, as for a new session.
    pub fn reset(&mut self) {
        self.used = 0;
    }
}

/// A browser able to execute special actions.
///
/// Implemented by the embedding application; this crate ships no browser.
#[async_trait]
pub trait BrowserController: Send + Sync {
    /// Error raised by the browser.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Executes `action` on the current tab.
    async fn execute(&self, action: &SpecialAction) -> Result<(), Self::Error>;

    /// Text content of the current page, as fed to the scraper.
    async fn page_text(&self) -> Result<String, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_all_ids_are_special() {
        assert_eq!(BrowserActionId::ALL.len(), 8);
        for id in BrowserActionId::ALL {
            assert!(is_special(id.as_str()));
            assert_eq!(id.as_str().parse::<BrowserActionId>().unwrap(), id);
        }
        for id in ["B1", "I1", "L1", "s1", "S9"] {
            assert!(!is_special(id), "{id}");
        }
    }

    #[test]
    fn test_unknown_id() {
        let err = SpecialAction::parse("X1", &HashMap::new()).unwrap_err();
        assert_eq!(err.to_string(), "X1 not found");
    }

    #[test]
    fn test_goto_requires_url() {
        let err = SpecialAction::parse("S1", &HashMap::new()).unwrap_err();
        assert!(err.to_string().starts_with("Action with id 'S1' is invalid"));
    }

    #[test]
    fn test_wait_requires_numeric_value() {
        let err = SpecialAction::parse("S7", &HashMap::new()).unwrap_err();
        assert!(err.to_string().starts_with("Action with id 'S7' is invalid"));

        let err = SpecialAction::parse("S7", &params(&[("value", "soon")])).unwrap_err();
        assert!(matches!(err, ActionError::Invalid { id: BrowserActionId::Wait, .. }));

        let action = SpecialAction::parse("S7", &params(&[("value", "1")])).unwrap();
        assert_eq!(action, SpecialAction::Wait { time_ms: 1 });
    }

    #[test]
    fn test_completion_params() {
        let action = SpecialAction::parse(
            "S8",
            &params(&[("success", "true"), ("answer", "Hello World")]),
        )
        .unwrap();
        assert_eq!(
            action,
            SpecialAction::Completion {
                success: true,
                answer: "Hello World".to_string()
            }
        );
        assert_eq!(action.id(), BrowserActionId::Completion);

        let err = SpecialAction::parse("S8", &params(&[("success", "yes"), ("answer", "x")]))
            .unwrap_err();
        assert!(matches!(err, ActionError::Invalid { .. }));
    }

    #[test]
    fn test_scrape_instructions_are_optional() {
        assert_eq!(
            SpecialAction::parse("S2", &HashMap::new()).unwrap(),
            SpecialAction::Scrape { instructions: None }
        );
    }

    #[test]
    fn test_markdown_groups_by_category() {
        let md = markdown();
        assert!(md.starts_with("\n# Special Browser Actions\n* S1: Goto to a URL (in current tab) (url: string)"));
        assert_eq!(md.matches("\n# ").count(), 3);
        for id in BrowserActionId::ALL {
            assert!(md.contains(&format!("* {id}: ")));
        }
    }

    #[test]
    fn test_step_budget() {
        let mut budget = StepBudget::new(2);
        assert_eq!(budget.consume().unwrap(), 1);
        assert_eq!(budget.consume().unwrap(), 2);
        assert_eq!(budget.remaining(), 0);
        assert!(matches!(
            budget.consume(),
            Err(WebpilotError::MaxStepsReached { max_steps: 2 })
        ));
        budget.reset();
        assert_eq!(budget.remaining(), 2);
    }

    #[test]
    fn test_action_id_serde_uses_wire_ids() {
        let json = serde_json::to_string(&BrowserActionId::GoBack).unwrap();
        assert_eq!(json, "\"S4\"");
    }
}
