use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// AI answer platforms a query can be dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "platform", rename_all = "lowercase")]
pub enum Platform {
    #[serde(rename = "chatgpt")]
    ChatGpt,
    #[serde(rename = "perplexity")]
    Perplexity,
    #[serde(rename = "gemini")]
    Gemini,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::ChatGpt, Platform::Perplexity, Platform::Gemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::ChatGpt => "chatgpt",
            Platform::Perplexity => "perplexity",
            Platform::Gemini => "gemini",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chatgpt" | "openai" => Ok(Platform::ChatGpt),
            "perplexity" => Ok(Platform::Perplexity),
            "gemini" | "google" => Ok(Platform::Gemini),
            other => Err(anyhow::anyhow!("unknown platform: {}", other)),
        }
    }
}
