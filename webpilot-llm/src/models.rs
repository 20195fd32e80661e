use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Model used when neither the request nor the engine names one.
pub const DEFAULT_MODEL: &str = "groq/llama-3.3-70b-versatile";

/// Well-known `provider/model` presets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmModel {
    /// Llama 3.3 70B on Groq.
    #[default]
    Groq,
    /// GPT-4o on OpenAI.
    OpenAi,
    /// Llama 3.3 70B on Cerebras.
    Cerebras,
    /// Gemini 2.0 Flash.
    Gemini,
}

impl LlmModel {
    const ALL: [Self; 4] = [Self::Groq, Self::OpenAi, Self::Cerebras, Self::Gemini];

    /// Full `provider/model` identifier.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Groq => DEFAULT_MODEL,
            Self::OpenAi => "openai/gpt-4o",
            Self::Cerebras => "cerebras/llama-3.3-70b",
            Self::Gemini => "gemini/gemini-2.0-flash",
        }
    }

    /// Provider prefix of [`LlmModel::id`].
    #[must_use]
    pub fn provider(self) -> &'static str {
        self.id().split_once('/').map_or(self.id(), |(provider, _)| provider)
    }
}

impl fmt::Display for LlmModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for LlmModel {
    type Err = String;

    /// Accepts a provider name (`openai`) or a full model id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.provider() == needle || m.id() == needle)
            .ok_or_else(|| format!("unknown model preset: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preset_is_default_model() {
        assert_eq!(LlmModel::default().id(), DEFAULT_MODEL);
        assert_eq!(LlmModel::Groq.provider(), "groq");
    }

    #[test]
    fn test_parse_by_provider_or_id() {
        assert_eq!("OpenAI".parse::<LlmModel>().unwrap(), LlmModel::OpenAi);
        assert_eq!(
            "cerebras/llama-3.3-70b".parse::<LlmModel>().unwrap(),
            LlmModel::Cerebras
        );
        assert!("mistral".parse::<LlmModel>().is_err());
    }
}
