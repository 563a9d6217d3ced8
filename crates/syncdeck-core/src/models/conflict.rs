//! Conflict model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A path whose alpha and beta contents diverged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Path relative to the session root
    pub path: String,
    /// Local side
    pub alpha_digest: Option<String>,
    /// Remote side
    pub beta_digest: Option<String>,
}

/// Session endpoint picked as the winner of a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Local endpoint
    #[serde(alias = "local")]
    Alpha,
    /// Remote endpoint
    #[serde(alias = "remote")]
    Beta,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Alpha => "alpha",
            Self::Beta => "beta",
        })
    }
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alpha" | "local" => Ok(Self::Alpha),
            "beta" | "remote" => Ok(Self::Beta),
            other => Err(Error::InvalidInput(format!(
                "winner must be 'alpha' (local) or 'beta' (remote), got '{other}'"
            ))),
        }
    }
}

/// Transient instruction to resolve one session's conflicts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionDecision {
    pub session_name: String,
    pub winner: Side,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_accepts_local_and_remote_aliases() {
        assert_eq!("local".parse::<Side>().unwrap(), Side::Alpha);
        assert_eq!("REMOTE".parse::<Side>().unwrap(), Side::Beta);
        let side: Side = serde_json::from_str("\"remote\"").unwrap();
        assert_eq!(side, Side::Beta);
        assert!("both".parse::<Side>().is_err());
    }
}
