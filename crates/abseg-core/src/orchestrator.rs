//! Per-request segment assignment
//!
//! [`VaryCache::vary_cache`] resolves one experiment for the current visitor:
//!
//! ```text
//! override? ──yes──> set membership ──────────────┐
//!    │ no                                          │
//! recorded membership (A or B)? ──yes─────────────>├──> Resolved
//!    │ no                                          │
//! strategy decides ──> set membership ────────────┘
//! ```

use crate::experiment::Experiment;
use crate::options::OptionStore;
use crate::overrides::{OverrideResolver, OverrideSource};
use crate::request::RequestScope;
use crate::segment::SegmentKey;
use crate::service::CacheSegmentation;
use crate::strategy::AssignmentData;
use serde::Serialize;
use std::sync::Arc;

/// Which step settled the segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionSource {
    /// `group-<cache group>` request parameter
    RequestOverride,
    /// `ab-select-group-<cache group>` option
    PersistedOverride,
    /// Membership already recorded by the segmentation service
    ExistingMembership,
    /// Newly decided by the experiment's strategy
    Fallback,
    /// Resolved earlier in the same request
    AlreadyResolved,
}

impl ResolutionSource {
    /// Kebab-case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RequestOverride => "request-override",
            Self::PersistedOverride => "persisted-override",
            Self::ExistingMembership => "existing-membership",
            Self::Fallback => "fallback",
            Self::AlreadyResolved => "already-resolved",
        }
    }
}

impl From<OverrideSource> for ResolutionSource {
    fn from(source: OverrideSource) -> Self {
        match source {
            OverrideSource::Request => Self::RequestOverride,
            OverrideSource::Persisted => Self::PersistedOverride,
        }
    }
}

/// Outcome of [`VaryCache::vary_cache`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Resolved segment key
    pub segment: SegmentKey,
    /// Step that produced it
    pub source: ResolutionSource,
}

/// Assignment orchestrator
///
/// Keeps a visitor's segment stable by writing every new decision back to the
/// cache segmentation service.
///
/// There is no cross-request locking. Two concurrent first visits by the same
/// visitor can both miss membership, both run the strategy, and both write;
/// the last write wins. This only affects a visitor's first page views.
#[derive(Clone)]
pub struct VaryCache {
    service: Arc<dyn CacheSegmentation>,
    options: Arc<dyn OptionStore>,
    resolver: OverrideResolver,
}

impl VaryCache {
    /// Create orchestrator over a segmentation service and option store
    #[must_use]
    pub fn new(service: Arc<dyn CacheSegmentation>, options: Arc<dyn OptionStore>) -> Self {
        Self {
            service,
            options,
            resolver: OverrideResolver::new(),
        }
    }

    /// Segmentation service
    #[inline]
    #[must_use]
    pub fn service(&self) -> &dyn CacheSegmentation {
        self.service.as_ref()
    }

    /// Persisted option store
    #[inline]
    #[must_use]
    pub fn options(&self) -> &dyn OptionStore {
        self.options.as_ref()
    }

    /// Resolve `experiment` for the visitor of `scope`
    ///
    /// Idempotent within a request: once resolved, later calls return the same
    /// segment without touching the segmentation service.
    pub fn vary_cache(&self, experiment: &Experiment, scope: &mut RequestScope) -> Resolution {
        let group = experiment.cache_group();

        if let Some(segment) = scope.user_group(group) {
            return Resolution {
                segment: segment.clone(),
                source: ResolutionSource::AlreadyResolved,
            };
        }

        let resolution = self.resolve(experiment, scope);
        tracing::debug!(
            group = %group,
            visitor = %scope.visitor(),
            segment = %resolution.segment,
            source = ?resolution.source,
            "resolved segment"
        );

        scope.resolve(group.clone(), resolution.segment.clone());
        resolution
    }

    fn resolve(&self, experiment: &Experiment, scope: &RequestScope) -> Resolution {
        let group = experiment.cache_group();
        let visitor = scope.visitor();

        if let Some(forced) = self
            .resolver
            .resolve(experiment, scope.params(), self.options.as_ref())
        {
            self.service
                .set_group_for_user(visitor, group, &forced.segment);
            return Resolution {
                segment: forced.segment,
                source: forced.source.into(),
            };
        }

        if self.service.is_user_in_group(visitor, group) {
            let recorded = experiment
                .segments()
                .iter()
                .find(|(_, key)| self.service.is_user_in_group_segment(visitor, group, key));
            if let Some((_, key)) = recorded {
                return Resolution {
                    segment: key.clone(),
                    source: ResolutionSource::ExistingMembership,
                };
            }
            tracing::debug!(group = %group, visitor = %visitor, "recorded membership matches neither segment");
        }

        let data = AssignmentData {
            group: group.clone(),
            visitor: visitor.clone(),
            attributes: scope.attributes().clone(),
        };
        let segment = experiment.assign(&data).clone();
        self.service.set_group_for_user(visitor, group, &segment);

        Resolution {
            segment,
            source: ResolutionSource::Fallback,
        }
    }
}

impl std::fmt::Debug for VaryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaryCache").finish_non_exhaustive()
    }
}
