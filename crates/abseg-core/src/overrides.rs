//! Override resolution
//!
//! A segment can be forced for the current visitor by the request parameter
//! `group-<cache group>`, or site-wide by the persisted option
//! `ab-select-group-<cache group>`. The request parameter wins.
//! Values that are not exactly one of the experiment's keys are ignored.

use crate::experiment::Experiment;
use crate::options::OptionStore;
use crate::request::QueryParams;
use crate::segment::SegmentKey;

/// Where a forced segment came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideSource {
    /// `group-<cache group>` request parameter
    Request,
    /// `ab-select-group-<cache group>` option
    Persisted,
}

/// A valid override for an experiment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOverride {
    /// Forced segment key
    pub segment: SegmentKey,
    /// Precedence level that supplied it
    pub source: OverrideSource,
}

/// Checks request and persisted overrides, in that order
#[derive(Debug, Clone, Copy, Default)]
pub struct OverrideResolver;

impl OverrideResolver {
    /// Create resolver
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Forced segment for `experiment`, or `None`
    #[must_use]
    pub fn resolve(
        &self,
        experiment: &Experiment,
        params: &QueryParams,
        options: &dyn OptionStore,
    ) -> Option<ResolvedOverride> {
        let group = experiment.cache_group();

        let param = group.override_param();
        if let Some(value) = params.sanitized(&param) {
            if let Some(segment) = Self::valid_key(experiment, &value) {
                return Some(ResolvedOverride {
                    segment,
                    source: OverrideSource::Request,
                });
            }
            tracing::trace!(group = %group, value = %value, "ignoring invalid request override");
        }

        let option = group.override_option();
        if let Some(value) = options.get_option(&option) {
            if let Some(segment) = Self::valid_key(experiment, &value) {
                return Some(ResolvedOverride {
                    segment,
                    source: OverrideSource::Persisted,
                });
            }
            if !value.is_empty() {
                tracing::trace!(group = %group, value = %value, "ignoring invalid persisted override");
            }
        }

        None
    }

    fn valid_key(experiment: &Experiment, value: &str) -> Option<SegmentKey> {
        experiment
            .segments()
            .position(value)
            .map(|segment| experiment.key(segment).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::MemoryOptions;
    use crate::strategy::RandomSplit;

    fn experiment() -> Experiment {
        Experiment::new("exp", "A", "B", RandomSplit::new()).unwrap()
    }

    #[test]
    fn no_override() {
        let resolved =
            OverrideResolver::new().resolve(&experiment(), &QueryParams::new(), &MemoryOptions::new());
        assert_eq!(resolved, None);
    }

    #[test]
    fn request_override_wins() {
        let params = QueryParams::new().with("group-exp", "A");
        let options = MemoryOptions::new();
        options.set_option("ab-select-group-exp", "B");

        let resolved = OverrideResolver::new()
            .resolve(&experiment(), &params, &options)
            .unwrap();
        assert_eq!(resolved.segment, "A");
        assert_eq!(resolved.source, OverrideSource::Request);
    }

    #[test]
    fn invalid_request_override_falls_through() {
        let params = QueryParams::new().with("group-exp", "C");
        let options = MemoryOptions::new();
        options.set_option("ab-select-group-exp", "B");

        let resolved = OverrideResolver::new()
            .resolve(&experiment(), &params, &options)
            .unwrap();
        assert_eq!(resolved.segment, "B");
        assert_eq!(resolved.source, OverrideSource::Persisted);
    }

    #[test]
    fn request_override_is_sanitized() {
        let params = QueryParams::new().with("group-exp", " <em>B</em>\n");
        let resolved = OverrideResolver::new()
            .resolve(&experiment(), &params, &MemoryOptions::new())
            .unwrap();
        assert_eq!(resolved.segment, "B");
    }

    #[test]
    fn comparison_is_exact() {
        let params = QueryParams::new().with("group-exp", "a");
        let options = MemoryOptions::new();
        options.set_option("ab-select-group-exp", "b");
        assert_eq!(
            OverrideResolver::new().resolve(&experiment(), &params, &options),
            None
        );
    }

    #[test]
    fn foreign_experiment_override_ignored() {
        let params = QueryParams::new().with("group-other", "A");
        let options = MemoryOptions::new();
        options.set_option("ab-select-group-other", "B");
        assert_eq!(
            OverrideResolver::new().resolve(&experiment(), &params, &options),
            None
        );
    }

    #[test]
    fn empty_persisted_option_ignored() {
        let options = MemoryOptions::new();
        options.set_option("ab-select-group-exp", "");
        assert_eq!(
            OverrideResolver::new().resolve(&experiment(), &QueryParams::new(), &options),
            None
        );
    }
}
