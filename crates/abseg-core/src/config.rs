//! Registry configuration
//!
//! Experiments, persisted options, and membership store tuning, loaded from TOML:
//!
//! ```toml
//! [membership]
//! max_capacity = 100000
//! ttl_secs = 2592000
//!
//! [options]
//! "ab-select-group-checkout-button" = "variant"
//!
//! [[experiment]]
//! cache_group = "checkout-button"
//! segments = ["control", "variant"]
//! strategy = { kind = "visitor-hash", weight_a = 0.5 }
//! ```

use crate::error::{ConfigError, ConfigurationError};
use crate::experiment::Experiment;
use crate::segment::CacheGroup;
use crate::service::{InMemorySegmentation, DEFAULT_MAX_CAPACITY};
use crate::strategy::{
    Alternating, AssignmentStrategy, RandomSplit, VisitorHash, DEFAULT_WEIGHT_A,
};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Registry configuration loaded from TOML file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// In-memory membership store tuning
    #[serde(default)]
    pub membership: MembershipConfig,

    /// Persisted options, e.g. `ab-select-group-<cache group>`
    #[serde(default)]
    pub options: HashMap<String, String>,

    /// Experiment definitions
    #[serde(default, rename = "experiment")]
    pub experiments: Vec<ExperimentConfig>,
}

impl RegistryConfig {
    /// Read and parse a configuration file
    ///
    /// # Errors
    /// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`]
    /// if it is not valid configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::io_error(path, e))?;
        content.parse()
    }

    /// Construct every experiment, stopping at the first misconfiguration
    ///
    /// # Errors
    /// The first [`ConfigurationError`], including
    /// [`ConfigurationError::GroupConflict`] when two entries share a cache group.
    pub fn validate(&self) -> Result<Vec<Experiment>, ConfigurationError> {
        let mut seen = HashSet::new();
        self.experiments
            .iter()
            .map(|definition| {
                let experiment = definition.build()?;
                if !seen.insert(experiment.cache_group().clone()) {
                    return Err(ConfigurationError::GroupConflict {
                        experiment: experiment.cache_group().to_string(),
                    });
                }
                Ok(experiment)
            })
            .collect()
    }
}

impl FromStr for RegistryConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}

/// Membership store tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MembershipConfig {
    /// Maximum memberships kept
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,

    /// Membership lifetime in seconds (default: no expiry)
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

fn default_max_capacity() -> u64 {
    DEFAULT_MAX_CAPACITY
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            max_capacity: DEFAULT_MAX_CAPACITY,
            ttl_secs: None,
        }
    }
}

impl MembershipConfig {
    /// Build the in-memory segmentation service
    #[must_use]
    pub fn build(&self) -> InMemorySegmentation {
        match self.ttl_secs {
            Some(secs) => {
                InMemorySegmentation::with_ttl(self.max_capacity, Duration::from_secs(secs))
            }
            None => InMemorySegmentation::with_capacity(self.max_capacity),
        }
    }
}

/// One experiment definition
///
/// Fields are plain strings so that empty values surface as
/// [`ConfigurationError`] when built, not as parse errors.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    /// Cache group name
    #[serde(default)]
    pub cache_group: String,

    /// Segment keys A and B
    pub segments: [String; 2],

    /// Fallback strategy
    #[serde(default)]
    pub strategy: StrategyConfig,
}

impl ExperimentConfig {
    /// Validate and construct the experiment
    ///
    /// # Errors
    /// [`ConfigurationError`] for an empty group or key, equal keys, or a
    /// weight outside `0.0..=1.0`.
    pub fn build(&self) -> Result<Experiment, ConfigurationError> {
        CacheGroup::new(self.cache_group.as_str())?;
        let strategy = self.strategy.build(&self.cache_group)?;
        let [a, b] = &self.segments;
        Experiment::with_strategy(self.cache_group.clone(), a.clone(), b.clone(), strategy)
    }
}

/// Built-in fallback strategies
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StrategyConfig {
    /// Random draw per decision
    Random {
        /// Share of visitors sent to A
        #[serde(default = "default_weight")]
        weight_a: f64,
    },
    /// Hash of cache group and visitor id
    VisitorHash {
        /// Share of visitors sent to A
        #[serde(default = "default_weight")]
        weight_a: f64,
    },
    /// A, B, A, B, ...
    Alternating,
}

fn default_weight() -> f64 {
    DEFAULT_WEIGHT_A
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::Random {
            weight_a: DEFAULT_WEIGHT_A,
        }
    }
}

impl StrategyConfig {
    /// Construct the strategy for experiment `group`
    ///
    /// # Errors
    /// [`ConfigurationError::InvalidWeight`] if a weight is outside `0.0..=1.0`.
    pub fn build(&self, group: &str) -> Result<Arc<dyn AssignmentStrategy>, ConfigurationError> {
        let check = |weight_a: f64| {
            if (0.0..=1.0).contains(&weight_a) {
                Ok(weight_a)
            } else {
                Err(ConfigurationError::InvalidWeight {
                    experiment: group.to_string(),
                    weight: weight_a,
                })
            }
        };

        let strategy: Arc<dyn AssignmentStrategy> = match *self {
            Self::Random { weight_a } => Arc::new(RandomSplit::with_weight(check(weight_a)?)),
            Self::VisitorHash { weight_a } => Arc::new(VisitorHash::with_weight(check(weight_a)?)),
            Self::Alternating => Arc::new(Alternating::new()),
        };
        Ok(strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
        [membership]
        max_capacity = 500
        ttl_secs = 60

        [options]
        "ab-select-group-checkout-button" = "variant"

        [[experiment]]
        cache_group = "checkout-button"
        segments = ["control", "variant"]
        strategy = { kind = "visitor-hash", weight_a = 0.25 }

        [[experiment]]
        cache_group = "headline"
        segments = ["A", "B"]
    "#;

    #[test]
    fn parse_sample() {
        let config: RegistryConfig = SAMPLE.parse().unwrap();

        assert_eq!(config.membership.max_capacity, 500);
        assert_eq!(config.membership.ttl_secs, Some(60));
        assert_eq!(
            config.options.get("ab-select-group-checkout-button").map(String::as_str),
            Some("variant")
        );
        assert_eq!(config.experiments.len(), 2);
        assert_eq!(
            config.experiments[0].strategy,
            StrategyConfig::VisitorHash { weight_a: 0.25 }
        );
        assert_eq!(config.experiments[1].strategy, StrategyConfig::default());
    }

    #[test]
    fn validate_builds_experiments() {
        let config: RegistryConfig = SAMPLE.parse().unwrap();
        let experiments = config.validate().unwrap();
        assert_eq!(experiments[0].strategy().name(), "visitor-hash");
        assert_eq!(experiments[1].strategy().name(), "random");
    }

    #[test]
    fn empty_config_is_valid() {
        let config: RegistryConfig = "".parse().unwrap();
        assert!(config.experiments.is_empty());
        assert_eq!(config.membership.max_capacity, DEFAULT_MAX_CAPACITY);
    }

    #[test]
    fn empty_segment_is_configuration_error() {
        let config: RegistryConfig = r#"
            [[experiment]]
            cache_group = "exp"
            segments = ["A", ""]
        "#
        .parse()
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingSegmentKey { .. })
        ));
    }

    #[test]
    fn missing_group_is_configuration_error() {
        let config: RegistryConfig = r#"
            [[experiment]]
            segments = ["A", "B"]
        "#
        .parse()
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingCacheGroup)
        ));
    }

    #[test]
    fn duplicate_cache_group_rejected() {
        let config: RegistryConfig = r#"
            [[experiment]]
            cache_group = "exp"
            segments = ["A", "B"]

            [[experiment]]
            cache_group = "exp"
            segments = ["control", "variant"]
            strategy = { kind = "alternating" }
        "#
        .parse()
        .unwrap();

        let err = config.validate().unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::GroupConflict {
                experiment: "exp".to_string()
            }
        );
    }

    #[test]
    fn out_of_range_weight_rejected() {
        let err = StrategyConfig::Random { weight_a: 1.5 }.build("exp").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidWeight { .. }));
        assert!(StrategyConfig::VisitorHash { weight_a: f64::NAN }
            .build("exp")
            .is_err());
    }

    #[test]
    fn unknown_field_rejected() {
        let parsed = "[membership]\ncapacity = 5\n".parse::<RegistryConfig>();
        assert!(matches!(parsed, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn unknown_strategy_rejected() {
        let parsed = r#"
            [[experiment]]
            cache_group = "exp"
            segments = ["A", "B"]
            strategy = { kind = "round-robin" }
        "#
        .parse::<RegistryConfig>();
        assert!(parsed.is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abseg.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = RegistryConfig::load(&path).unwrap();
        assert_eq!(config.experiments.len(), 2);

        let missing = RegistryConfig::load(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
