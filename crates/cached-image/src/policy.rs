//! What happens when refreshes overlap

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How overlapping refreshes are resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshPolicy {
    /// Every fetch result is applied when it arrives, even a stale one
    #[default]
    LastWriteWins,
    /// Fetches for the same key run one at a time across all slots
    SerializePerKey,
    /// A new load on a slot cancels that slot's in-flight fetch and drops
    /// any result it would still deliver
    SupersedePrevious,
}

impl RefreshPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshPolicy::LastWriteWins => "last-write-wins",
            RefreshPolicy::SerializePerKey => "serialize-per-key",
            RefreshPolicy::SupersedePrevious => "supersede-previous",
        }
    }
}

impl fmt::Display for RefreshPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefreshPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "last-write-wins" => Ok(RefreshPolicy::LastWriteWins),
            "serialize-per-key" => Ok(RefreshPolicy::SerializePerKey),
            "supersede-previous" => Ok(RefreshPolicy::SupersedePrevious),
            other => Err(format!("unknown refresh policy: {}", other)),
        }
    }
}
