//! Outcome taxonomy attached to every adapter call and every field provenance entry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Result classification for a single source attempt.
///
/// Outcomes are data, never field values: a field that could not be resolved
/// stays empty and carries its outcome in provenance instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Outcome {
    /// Fetch succeeded and at least one requested field was extracted
    Success,
    /// Fetch succeeded but no strategy produced a candidate
    NotFound,
    /// Source refused or fingerprinted the request
    Blocked,
    /// Source signaled throttling
    RateLimited,
    /// Timeout or connection failure
    NetworkError,
    /// A candidate was found but failed sanity validation
    ValidationRejected,
    /// Required input column missing or unusable (aborts the run)
    ConfigurationError,
}

impl Outcome {
    pub const ALL: [Outcome; 7] = [
        Outcome::Success,
        Outcome::NotFound,
        Outcome::Blocked,
        Outcome::RateLimited,
        Outcome::NetworkError,
        Outcome::ValidationRejected,
        Outcome::ConfigurationError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "Success",
            Outcome::NotFound => "NotFound",
            Outcome::Blocked => "Blocked",
            Outcome::RateLimited => "RateLimited",
            Outcome::NetworkError => "NetworkError",
            Outcome::ValidationRejected => "ValidationRejected",
            Outcome::ConfigurationError => "ConfigurationError",
        }
    }

    /// Outcomes that widen the delay window and count toward the circuit breaker
    pub fn is_hostile(&self) -> bool {
        matches!(self, Outcome::Blocked | Outcome::RateLimited)
    }

    /// Outcomes that abort the whole run rather than one entity
    pub fn is_fatal(&self) -> bool {
        matches!(self, Outcome::ConfigurationError)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Outcome::ALL
            .iter()
            .copied()
            .find(|o| o.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown outcome '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostile_outcomes() {
        assert!(Outcome::Blocked.is_hostile());
        assert!(Outcome::RateLimited.is_hostile());
        assert!(!Outcome::NetworkError.is_hostile());
        assert!(!Outcome::NotFound.is_hostile());
        assert!(!Outcome::Success.is_hostile());
    }

    #[test]
    fn test_only_configuration_error_is_fatal() {
        let fatal: Vec<_> = Outcome::ALL.iter().filter(|o| o.is_fatal()).collect();
        assert_eq!(fatal, vec![&Outcome::ConfigurationError]);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("blocked".parse::<Outcome>().unwrap(), Outcome::Blocked);
        assert_eq!(" ValidationRejected ".parse::<Outcome>().unwrap(), Outcome::ValidationRejected);
        assert!("Error".parse::<Outcome>().is_err());
    }
}
