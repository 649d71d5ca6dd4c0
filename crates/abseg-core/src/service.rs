//! Cache segmentation service contract
//!
//! The service owns durable visitor membership per cache group and makes the
//! shared cache vary responses by it. [`InMemorySegmentation`] is a
//! process-local implementation backed by moka.

use crate::segment::{CacheGroup, SegmentKey, VisitorId};
use dashmap::DashSet;
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Capabilities the orchestrator needs from the cache segmentation service
#[cfg_attr(test, mockall::automock)]
pub trait CacheSegmentation: Send + Sync {
    /// Declare `group` eligible for variation; registering twice is a no-op
    fn register_group(&self, group: &CacheGroup);

    /// Whether `visitor` has any recorded membership for `group`
    fn is_user_in_group(&self, visitor: &VisitorId, group: &CacheGroup) -> bool;

    /// Whether `visitor`'s recorded membership for `group` equals `segment`
    fn is_user_in_group_segment(
        &self,
        visitor: &VisitorId,
        group: &CacheGroup,
        segment: &SegmentKey,
    ) -> bool;

    /// Persist `segment` as `visitor`'s membership, overwriting any previous one
    fn set_group_for_user(&self, visitor: &VisitorId, group: &CacheGroup, segment: &SegmentKey);
}

/// Default number of memberships kept by [`InMemorySegmentation`]
pub const DEFAULT_MAX_CAPACITY: u64 = 100_000;

type MembershipKey = (CacheGroup, VisitorId);

/// Process-local membership store
///
/// Entries may expire (`with_ttl`) or be evicted at capacity, after which the
/// visitor is unassigned again. Writes for unregistered groups are dropped.
#[derive(Debug, Clone)]
pub struct InMemorySegmentation {
    groups: Arc<DashSet<CacheGroup>>,
    memberships: Cache<MembershipKey, SegmentKey>,
}

impl InMemorySegmentation {
    /// Store with default capacity and no expiry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_CAPACITY)
    }

    /// Store holding at most `max_capacity` memberships
    #[must_use]
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self {
            groups: Arc::default(),
            memberships: Cache::new(max_capacity),
        }
    }

    /// Store whose memberships expire `ttl` after being written
    #[must_use]
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            groups: Arc::default(),
            memberships: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Whether `group` has been registered
    #[inline]
    #[must_use]
    pub fn is_registered(&self, group: &CacheGroup) -> bool {
        self.groups.contains(group)
    }

    /// Registered group names
    #[must_use]
    pub fn groups(&self) -> Vec<CacheGroup> {
        self.groups.iter().map(|g| g.key().clone()).collect()
    }

    /// Recorded segment for `visitor` in `group`
    #[must_use]
    pub fn membership(&self, visitor: &VisitorId, group: &CacheGroup) -> Option<SegmentKey> {
        self.memberships.get(&(group.clone(), visitor.clone()))
    }

}

impl Default for InMemorySegmentation {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheSegmentation for InMemorySegmentation {
    fn register_group(&self, group: &CacheGroup) {
        if self.groups.insert(group.clone()) {
            tracing::info!(group = %group, "registered cache group");
        }
    }

    fn is_user_in_group(&self, visitor: &VisitorId, group: &CacheGroup) -> bool {
        self.membership(visitor, group).is_some()
    }

    fn is_user_in_group_segment(
        &self,
        visitor: &VisitorId,
        group: &CacheGroup,
        segment: &SegmentKey,
    ) -> bool {
        self.membership(visitor, group).as_ref() == Some(segment)
    }

    fn set_group_for_user(&self, visitor: &VisitorId, group: &CacheGroup, segment: &SegmentKey) {
        if !self.is_registered(group) {
            tracing::warn!(group = %group, "ignoring membership write for unregistered group");
            return;
        }
        self.memberships
            .insert((group.clone(), visitor.clone()), segment.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentPair;
    use crate::Segment;

    fn setup() -> (InMemorySegmentation, CacheGroup, SegmentPair, VisitorId) {
        let service = InMemorySegmentation::new();
        let group = CacheGroup::new("exp").unwrap();
        service.register_group(&group);
        let pair = SegmentPair::new("exp", "A", "B").unwrap();
        (service, group, pair, VisitorId::new("visitor"))
    }

    #[test]
    fn register_is_idempotent() {
        let (service, group, _, _) = setup();
        service.register_group(&group);
        service.register_group(&group);
        assert_eq!(service.groups(), vec![group]);
    }

    #[test]
    fn unassigned_by_default() {
        let (service, group, pair, visitor) = setup();
        assert!(!service.is_user_in_group(&visitor, &group));
        assert!(!service.is_user_in_group_segment(&visitor, &group, pair.key(Segment::A)));
    }

    #[test]
    fn set_then_query_round_trip() {
        let (service, group, pair, visitor) = setup();
        service.set_group_for_user(&visitor, &group, pair.key(Segment::A));

        assert!(service.is_user_in_group(&visitor, &group));
        assert!(service.is_user_in_group_segment(&visitor, &group, pair.key(Segment::A)));
        assert!(!service.is_user_in_group_segment(&visitor, &group, pair.key(Segment::B)));
    }

    #[test]
    fn set_overwrites() {
        let (service, group, pair, visitor) = setup();
        service.set_group_for_user(&visitor, &group, pair.key(Segment::A));
        service.set_group_for_user(&visitor, &group, pair.key(Segment::B));
        assert_eq!(service.membership(&visitor, &group).as_ref(), Some(pair.key(Segment::B)));
    }

    #[test]
    fn memberships_are_per_visitor() {
        let (service, group, pair, visitor) = setup();
        service.set_group_for_user(&visitor, &group, pair.key(Segment::A));
        assert!(!service.is_user_in_group(&VisitorId::new("someone-else"), &group));
    }

    #[test]
    fn unregistered_group_write_ignored() {
        let (service, _, pair, visitor) = setup();
        let other = CacheGroup::new("other").unwrap();
        service.set_group_for_user(&visitor, &other, pair.key(Segment::A));
        assert!(!service.is_user_in_group(&visitor, &other));
    }

    #[test]
    fn ttl_expires_membership() {
        let service = InMemorySegmentation::with_ttl(10, Duration::from_millis(20));
        let group = CacheGroup::new("exp").unwrap();
        let pair = SegmentPair::new("exp", "A", "B").unwrap();
        let visitor = VisitorId::new("visitor");
        service.register_group(&group);

        service.set_group_for_user(&visitor, &group, pair.key(Segment::A));
        assert!(service.is_user_in_group(&visitor, &group));

        std::thread::sleep(Duration::from_millis(60));
        assert!(!service.is_user_in_group(&visitor, &group));
    }
}
