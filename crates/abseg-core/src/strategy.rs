//! Assignment strategy trait and built-in strategies
//!
//! Provides the [`AssignmentStrategy`] trait, the fallback decision an
//! experiment makes for a visitor with no override and no recorded membership.

use crate::segment::{CacheGroup, Segment, SegmentPair, VisitorId};
use rand::Rng;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// Fallback segment assignment for an experiment
///
/// Called at most once per request per experiment, and only when neither an
/// override nor an existing membership applies. Returning a [`Segment`]
/// rather than a key keeps the decision inside the experiment's pair.
pub trait AssignmentStrategy: Send + Sync + std::fmt::Debug {
    /// Pick a segment for the visitor described by `data`
    fn assign(&self, pair: &SegmentPair, data: &AssignmentData) -> Segment;

    /// Strategy name (for logging/configuration)
    fn name(&self) -> &'static str;

    /// Optional one-time setup, run when the experiment is registered
    ///
    /// Runs while the registry holds the lock for `group`'s entry. It must not
    /// call back into the [`ExperimentRegistry`](crate::registry::ExperimentRegistry),
    /// or it deadlocks.
    fn setup(&self, _group: &CacheGroup) {}
}

/// Context handed to a strategy
#[derive(Debug, Clone)]
pub struct AssignmentData {
    /// Cache group being decided
    pub group: CacheGroup,

    /// Visitor being assigned
    pub visitor: VisitorId,

    /// Free-form request attributes
    pub attributes: Map<String, Value>,
}

impl AssignmentData {
    /// Create data with no extra attributes
    #[inline]
    #[must_use]
    pub fn new(group: CacheGroup, visitor: VisitorId) -> Self {
        Self {
            group,
            visitor,
            attributes: Map::new(),
        }
    }

    /// Add an attribute
    #[inline]
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Default share of visitors sent to segment A
pub const DEFAULT_WEIGHT_A: f64 = 0.5;

/// Independent random draw per decision
#[derive(Debug, Clone, Copy)]
pub struct RandomSplit {
    weight_a: f64,
}

impl RandomSplit {
    /// Even 50/50 split
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_weight(DEFAULT_WEIGHT_A)
    }

    /// Send roughly `weight_a` of visitors to A
    #[inline]
    #[must_use]
    pub fn with_weight(weight_a: f64) -> Self {
        Self { weight_a }
    }
}

impl Default for RandomSplit {
    fn default() -> Self {
        Self::new()
    }
}

impl AssignmentStrategy for RandomSplit {
    fn assign(&self, _pair: &SegmentPair, _data: &AssignmentData) -> Segment {
        if rand::rng().random::<f64>() < self.weight_a {
            Segment::A
        } else {
            Segment::B
        }
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// Deterministic bucketing on a hash of group and visitor
///
/// The same visitor always lands in the same segment of a given group, so
/// racing first visits agree without coordination.
#[derive(Debug, Clone, Copy)]
pub struct VisitorHash {
    weight_a: f64,
}

impl VisitorHash {
    /// Even 50/50 split
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_weight(DEFAULT_WEIGHT_A)
    }

    /// Send `weight_a` of the visitor space to A
    #[inline]
    #[must_use]
    pub fn with_weight(weight_a: f64) -> Self {
        Self { weight_a }
    }

    /// Position of the visitor in `[0, 1)` for this group
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bucket(group: &CacheGroup, visitor: &VisitorId) -> f64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(group.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(visitor.as_str().as_bytes());
        let digest = hasher.finalize();

        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest.as_bytes()[..8]);
        // Top 53 bits fill an f64 mantissa exactly.
        (u64::from_le_bytes(prefix) >> 11) as f64 / (1u64 << 53) as f64
    }
}

impl Default for VisitorHash {
    fn default() -> Self {
        Self::new()
    }
}

impl AssignmentStrategy for VisitorHash {
    fn assign(&self, _pair: &SegmentPair, data: &AssignmentData) -> Segment {
        if Self::bucket(&data.group, &data.visitor) < self.weight_a {
            Segment::A
        } else {
            Segment::B
        }
    }

    fn name(&self) -> &'static str {
        "visitor-hash"
    }
}

/// Sequential rollout: A, B, A, B, ... across all decisions in the process
#[derive(Debug, Default)]
pub struct Alternating {
    next: AtomicU64,
}

impl Alternating {
    /// Start with segment A
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AssignmentStrategy for Alternating {
    fn assign(&self, _pair: &SegmentPair, _data: &AssignmentData) -> Segment {
        if self.next.fetch_add(1, Ordering::Relaxed) % 2 == 0 {
            Segment::A
        } else {
            Segment::B
        }
    }

    fn name(&self) -> &'static str {
        "alternating"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> SegmentPair {
        SegmentPair::new("exp", "control", "variant").unwrap()
    }

    fn data(visitor: &str) -> AssignmentData {
        AssignmentData::new(CacheGroup::new("exp").unwrap(), VisitorId::new(visitor))
    }

    #[test]
    fn random_split_extremes() {
        let all_a = RandomSplit::with_weight(1.0);
        let all_b = RandomSplit::with_weight(0.0);
        for _ in 0..100 {
            assert_eq!(all_a.assign(&pair(), &data("v")), Segment::A);
            assert_eq!(all_b.assign(&pair(), &data("v")), Segment::B);
        }
    }

    #[test]
    fn random_split_produces_both() {
        let split = RandomSplit::new();
        let hits_a = (0..1000)
            .filter(|_| split.assign(&pair(), &data("v")) == Segment::A)
            .count();
        assert!(hits_a > 0 && hits_a < 1000);
    }

    #[test]
    fn visitor_hash_is_deterministic() {
        let strategy = VisitorHash::new();
        let first = strategy.assign(&pair(), &data("visitor-42"));
        for _ in 0..10 {
            assert_eq!(strategy.assign(&pair(), &data("visitor-42")), first);
        }
    }

    #[test]
    fn visitor_hash_spreads_visitors() {
        let strategy = VisitorHash::new();
        let hits_a = (0..1000)
            .filter(|i| strategy.assign(&pair(), &data(&format!("visitor-{i}"))) == Segment::A)
            .count();
        assert!(hits_a > 350 && hits_a < 650, "hits_a = {hits_a}");
    }

    #[test]
    fn visitor_hash_bucket_in_range() {
        let group = CacheGroup::new("exp").unwrap();
        for i in 0..100 {
            let b = VisitorHash::bucket(&group, &VisitorId::new(format!("v{i}")));
            assert!((0.0..1.0).contains(&b));
        }
    }

    #[test]
    fn alternating_sequence() {
        let strategy = Alternating::new();
        let seq: Vec<_> = (0..4).map(|_| strategy.assign(&pair(), &data("v"))).collect();
        assert_eq!(seq, vec![Segment::A, Segment::B, Segment::A, Segment::B]);
    }

    #[test]
    fn assignment_data_attributes() {
        let d = data("v").with_attribute("country", "NZ");
        assert_eq!(d.attributes["country"], "NZ");
    }
}
