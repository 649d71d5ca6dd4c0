//! Testing utilities for abseg workspace
//!
//! Shared test helpers, fixtures, and a segmentation service that records writes.

#![allow(missing_docs)]

use abseg_core::{
    AssignmentData, AssignmentStrategy, CacheGroup, CacheSegmentation, Experiment,
    ExperimentRegistry, InMemorySegmentation, MemoryOptions, Segment, SegmentKey, SegmentPair,
    VisitorId,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A membership write seen by [`RecordingSegmentation`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Write {
    pub visitor: VisitorId,
    pub group: CacheGroup,
    pub segment: SegmentKey,
}

/// In-memory segmentation service that records every call
#[derive(Debug, Default)]
pub struct RecordingSegmentation {
    inner: InMemorySegmentation,
    writes: Mutex<Vec<Write>>,
    registrations: Mutex<Vec<CacheGroup>>,
}

impl RecordingSegmentation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    pub fn registrations(&self) -> Vec<CacheGroup> {
        self.registrations.lock().clone()
    }

    pub fn membership(&self, visitor: &str, group: &str) -> Option<SegmentKey> {
        let group = CacheGroup::new(group).ok()?;
        self.inner.membership(&VisitorId::new(visitor), &group)
    }

    /// Record `segment` without counting it as a write
    pub fn seed(&self, visitor: &str, group: &str, segment: &SegmentKey) {
        let group = CacheGroup::new(group).expect("seeded group name");
        self.inner.register_group(&group);
        self.inner
            .set_group_for_user(&VisitorId::new(visitor), &group, segment);
    }
}

impl CacheSegmentation for RecordingSegmentation {
    fn register_group(&self, group: &CacheGroup) {
        self.registrations.lock().push(group.clone());
        self.inner.register_group(group);
    }

    fn is_user_in_group(&self, visitor: &VisitorId, group: &CacheGroup) -> bool {
        self.inner.is_user_in_group(visitor, group)
    }

    fn is_user_in_group_segment(
        &self,
        visitor: &VisitorId,
        group: &CacheGroup,
        segment: &SegmentKey,
    ) -> bool {
        self.inner.is_user_in_group_segment(visitor, group, segment)
    }

    fn set_group_for_user(&self, visitor: &VisitorId, group: &CacheGroup, segment: &SegmentKey) {
        self.writes.lock().push(Write {
            visitor: visitor.clone(),
            group: group.clone(),
            segment: segment.clone(),
        });
        self.inner.set_group_for_user(visitor, group, segment);
    }
}

/// Strategy that always picks the same segment and counts its calls
#[derive(Debug)]
pub struct FixedStrategy {
    segment: Segment,
    calls: Arc<AtomicUsize>,
}

impl FixedStrategy {
    pub fn new(segment: Segment) -> Self {
        Self {
            segment,
            calls: Arc::default(),
        }
    }

    /// Shared call counter, readable after the strategy moves into an experiment
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl AssignmentStrategy for FixedStrategy {
    fn assign(&self, _pair: &SegmentPair, _data: &AssignmentData) -> Segment {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.segment
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Test fixture: registry over a recording service and writable options
pub struct Harness {
    pub service: Arc<RecordingSegmentation>,
    pub options: Arc<MemoryOptions>,
    pub registry: ExperimentRegistry,
}

impl Harness {
    pub fn new() -> Self {
        let service = Arc::new(RecordingSegmentation::new());
        let options = Arc::new(MemoryOptions::new());
        let registry = ExperimentRegistry::new(service.clone(), options.clone());
        Self {
            service,
            options,
            registry,
        }
    }

    /// Register `group` with keys `a`/`b`, assigning `fallback` when nothing else applies
    pub fn experiment(&self, group: &str, a: &str, b: &str, fallback: Segment) -> Arc<Experiment> {
        self.experiment_with(group, a, b, FixedStrategy::new(fallback))
    }

    pub fn experiment_with(
        &self,
        group: &str,
        a: &str,
        b: &str,
        strategy: impl AssignmentStrategy + 'static,
    ) -> Arc<Experiment> {
        let experiment = Experiment::new(group, a, b, strategy).expect("valid test experiment");
        self.registry.register(experiment)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn create_test_experiment(strategy: impl AssignmentStrategy + 'static) -> Experiment {
    Experiment::new("checkout-button", "control", "variant", strategy)
        .expect("valid test experiment")
}
