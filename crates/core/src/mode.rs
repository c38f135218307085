//! Request modes.

use serde::{Deserialize, Serialize};

/// The conversational mode a request runs under.
///
/// The mode changes retrieval behavior (trivial-query skipping) and the
/// model-routing decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    /// Plain conversation over memory and uploaded documents.
    #[default]
    Standard,
    /// Conversation with access to the curated knowledge vault.
    Vault,
    /// Business-plan validation; complex requests escalate to the high tier.
    BusinessValidation,
}

impl ChatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Vault => "vault",
            Self::BusinessValidation => "business_validation",
        }
    }
}

impl std::fmt::Display for ChatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "vault" => Ok(Self::Vault),
            "business_validation" | "business-validation" => Ok(Self::BusinessValidation),
            other => Err(format!("unknown chat mode: {other}")),
        }
    }
}
