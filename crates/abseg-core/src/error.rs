//! Error types for abseg
//!
//! Only experiment construction and configuration loading can fail.
//! Invalid override input is not an error: it is treated as absent.

use crate::segment::Segment;
use std::path::PathBuf;

/// Fatal experiment misconfiguration
///
/// Returned from constructors; the wiring layer decides to halt startup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    /// Cache group name missing or empty
    #[error("experiment has no cache group name")]
    MissingCacheGroup,

    /// A segment key is missing or empty
    #[error("experiment '{experiment}' has no segment key {position}")]
    MissingSegmentKey {
        /// Cache group of the experiment
        experiment: String,
        /// Which key is missing
        position: Segment,
    },

    /// Both segment keys are the same
    #[error("experiment '{experiment}' uses '{key}' for both segments")]
    DuplicateSegmentKeys {
        /// Cache group of the experiment
        experiment: String,
        /// The repeated key
        key: String,
    },

    /// Cache group already taken by a different experiment definition
    #[error("cache group '{experiment}' is defined by more than one experiment")]
    GroupConflict {
        /// Cache group of the experiment
        experiment: String,
    },

    /// Split weight outside `0.0..=1.0`
    #[error("experiment '{experiment}' has split weight {weight}, expected 0.0..=1.0")]
    InvalidWeight {
        /// Cache group of the experiment
        experiment: String,
        /// Offending weight
        weight: f64,
    },
}

/// Errors while loading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error reading the file
    #[error("io error reading {path}: {source}")]
    Io {
        /// File that could not be read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Malformed TOML
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// An experiment failed to construct
    #[error("experiment configuration error: {0}")]
    Experiment(#[from] ConfigurationError),
}

impl ConfigError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_display() {
        let err = ConfigurationError::MissingSegmentKey {
            experiment: "checkout-button".to_string(),
            position: Segment::B,
        };
        assert_eq!(
            err.to_string(),
            "experiment 'checkout-button' has no segment key B"
        );
    }

    #[test]
    fn error_conversions() {
        let err: ConfigError = ConfigurationError::MissingCacheGroup.into();
        assert!(matches!(err, ConfigError::Experiment(_)));
    }
}
