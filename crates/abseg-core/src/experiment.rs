//! Experiment definitions
//!
//! An [`Experiment`] is a validated cache group, its two segment keys, and the
//! strategy that assigns visitors without an override or membership.
//! [`ExperimentType`] declares an experiment statically, one type per experiment.

use crate::error::ConfigurationError;
use crate::segment::{CacheGroup, Segment, SegmentKey, SegmentPair};
use crate::strategy::{AssignmentData, AssignmentStrategy};
use std::fmt;
use std::sync::Arc;

/// A configured two-segment experiment
///
/// Configuration is fixed at construction; both keys stay distinct and
/// non-empty for the lifetime of the value.
#[derive(Clone)]
pub struct Experiment {
    group: CacheGroup,
    segments: SegmentPair,
    strategy: Arc<dyn AssignmentStrategy>,
}

impl Experiment {
    /// Validate and build an experiment
    ///
    /// # Errors
    /// [`ConfigurationError`] if the group name or either key is empty, or the
    /// keys are equal.
    pub fn new(
        cache_group: impl Into<String>,
        segment_a: impl Into<String>,
        segment_b: impl Into<String>,
        strategy: impl AssignmentStrategy + 'static,
    ) -> Result<Self, ConfigurationError> {
        Self::with_strategy(cache_group, segment_a, segment_b, Arc::new(strategy))
    }

    /// Like [`Experiment::new`], with a shared strategy
    ///
    /// # Errors
    /// See [`Experiment::new`].
    pub fn with_strategy(
        cache_group: impl Into<String>,
        segment_a: impl Into<String>,
        segment_b: impl Into<String>,
        strategy: Arc<dyn AssignmentStrategy>,
    ) -> Result<Self, ConfigurationError> {
        let group = CacheGroup::new(cache_group)?;
        let segments = SegmentPair::new(group.as_str(), segment_a, segment_b)?;
        Ok(Self {
            group,
            segments,
            strategy,
        })
    }

    /// Cache group name
    #[inline]
    #[must_use]
    pub fn cache_group(&self) -> &CacheGroup {
        &self.group
    }

    /// Segment keys
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &SegmentPair {
        &self.segments
    }

    /// Key of `segment`
    #[inline]
    #[must_use]
    pub fn key(&self, segment: Segment) -> &SegmentKey {
        self.segments.key(segment)
    }

    /// Fallback strategy
    #[inline]
    #[must_use]
    pub fn strategy(&self) -> &dyn AssignmentStrategy {
        self.strategy.as_ref()
    }

    /// Run the fallback strategy and return the chosen key
    #[must_use]
    pub fn assign(&self, data: &AssignmentData) -> &SegmentKey {
        let segment = self.strategy.assign(&self.segments, data);
        self.segments.key(segment)
    }
}

impl fmt::Debug for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Experiment")
            .field("group", &self.group)
            .field("segments", &self.segments)
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

/// An experiment declared as a type
///
/// ```rust,ignore
/// struct CheckoutButton;
///
/// impl ExperimentType for CheckoutButton {
///     const CACHE_GROUP: &'static str = "checkout-button";
///     const SEGMENT_A: &'static str = "control";
///     const SEGMENT_B: &'static str = "variant";
///
///     fn strategy() -> Arc<dyn AssignmentStrategy> {
///         Arc::new(VisitorHash::new())
///     }
/// }
///
/// let experiment = registry.get_instance::<CheckoutButton>()?;
/// ```
pub trait ExperimentType: 'static {
    /// Cache group name
    const CACHE_GROUP: &'static str;

    /// Key of segment A
    const SEGMENT_A: &'static str;

    /// Key of segment B
    const SEGMENT_B: &'static str;

    /// Fallback assignment strategy
    fn strategy() -> Arc<dyn AssignmentStrategy>;

    /// Build the experiment from the declared constants
    ///
    /// # Errors
    /// [`ConfigurationError`] if any constant is empty or the keys are equal.
    fn build() -> Result<Experiment, ConfigurationError> {
        Experiment::with_strategy(
            Self::CACHE_GROUP,
            Self::SEGMENT_A,
            Self::SEGMENT_B,
            Self::strategy(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::VisitorId;
    use crate::strategy::{RandomSplit, VisitorHash};

    struct Banner;

    impl ExperimentType for Banner {
        const CACHE_GROUP: &'static str = "banner";
        const SEGMENT_A: &'static str = "A";
        const SEGMENT_B: &'static str = "B";

        fn strategy() -> Arc<dyn AssignmentStrategy> {
            Arc::new(RandomSplit::with_weight(0.0))
        }
    }

    struct Unnamed;

    impl ExperimentType for Unnamed {
        const CACHE_GROUP: &'static str = "";
        const SEGMENT_A: &'static str = "A";
        const SEGMENT_B: &'static str = "B";

        fn strategy() -> Arc<dyn AssignmentStrategy> {
            Arc::new(RandomSplit::new())
        }
    }

    #[test]
    fn new_validates() {
        assert!(Experiment::new("exp", "A", "B", RandomSplit::new()).is_ok());
        assert!(matches!(
            Experiment::new("", "A", "B", RandomSplit::new()),
            Err(ConfigurationError::MissingCacheGroup)
        ));
        assert!(matches!(
            Experiment::new("exp", "", "B", RandomSplit::new()),
            Err(ConfigurationError::MissingSegmentKey {
                position: Segment::A,
                ..
            })
        ));
    }

    #[test]
    fn assign_returns_key_from_pair() {
        let experiment = Experiment::new("exp", "control", "variant", VisitorHash::new()).unwrap();
        let data = AssignmentData::new(experiment.cache_group().clone(), VisitorId::new("v"));
        assert!(experiment.segments().contains(experiment.assign(&data).as_str()));
    }

    #[test]
    fn experiment_type_build() {
        let banner = Banner::build().unwrap();
        assert_eq!(banner.cache_group().as_str(), "banner");
        assert_eq!(banner.key(Segment::B), "B");
        assert_eq!(banner.strategy().name(), "random");
        assert!(Unnamed::build().is_err());
    }

    #[test]
    fn debug_names_strategy() {
        let experiment = Experiment::new("exp", "A", "B", VisitorHash::new()).unwrap();
        assert!(format!("{experiment:?}").contains("visitor-hash"));
    }
}
