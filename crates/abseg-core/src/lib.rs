//! abseg Core
//!
//! Assigns each visitor to one of two segments per experiment and keeps the
//! assignment in sync with a cache segmentation service, so a shared HTTP
//! cache can serve a different variant per segment.
//!
//! # Core Concepts
//!
//! - [`Experiment`]: a cache group with two segment keys and a fallback strategy
//! - [`AssignmentStrategy`]: picks a segment for a visitor with no override or membership
//! - [`OverrideResolver`]: request parameter `group-<group>`, then option `ab-select-group-<group>`
//! - [`CacheSegmentation`]: the external membership store
//! - [`VaryCache`]: per-request resolution and write-back
//! - [`ExperimentRegistry`]: one shared instance per experiment
//!
//! # Example
//!
//! ```rust,ignore
//! use abseg_core::{ExperimentRegistry, RegistryConfig, RequestScope, QueryParams};
//!
//! let config = RegistryConfig::load("abseg.toml")?;
//! let registry = ExperimentRegistry::from_config(&config)?;
//!
//! // Per request
//! let mut scope = RequestScope::new("visitor-123")
//!     .with_params(QueryParams::new().with("group-checkout-button", "variant"));
//! registry.init_request(&mut scope);
//!
//! let experiment = registry.get("checkout-button").unwrap();
//! let segment = scope.user_group(experiment.cache_group());
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod experiment;
pub mod options;
pub mod orchestrator;
pub mod overrides;
pub mod registry;
pub mod request;
pub mod segment;
pub mod service;
pub mod strategy;

// Re-exports for convenience
pub use config::{ExperimentConfig, MembershipConfig, RegistryConfig, StrategyConfig};
pub use error::{ConfigError, ConfigurationError};
pub use experiment::{Experiment, ExperimentType};
pub use options::{MemoryOptions, OptionStore};
pub use orchestrator::{Resolution, ResolutionSource, VaryCache};
pub use overrides::{OverrideResolver, OverrideSource, ResolvedOverride};
pub use registry::ExperimentRegistry;
pub use request::{sanitize_text, QueryParams, RequestKind, RequestScope};
pub use segment::{CacheGroup, Segment, SegmentKey, SegmentPair, VisitorId};
pub use service::{CacheSegmentation, InMemorySegmentation};
pub use strategy::{Alternating, AssignmentData, AssignmentStrategy, RandomSplit, VisitorHash};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with abseg
    pub use crate::{
        AssignmentData, AssignmentStrategy, CacheSegmentation, Experiment, ExperimentRegistry,
        ExperimentType, QueryParams, RequestKind, RequestScope, Resolution, ResolutionSource,
        Segment, SegmentPair,
    };
}
