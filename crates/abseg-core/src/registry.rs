//! Experiment registry
//!
//! Provides [`ExperimentRegistry`], the catalogue of experiment instances.
//! Built once at startup and shared by reference with request handlers.

use crate::config::RegistryConfig;
use crate::error::ConfigurationError;
use crate::experiment::{Experiment, ExperimentType};
use crate::options::{MemoryOptions, OptionStore};
use crate::orchestrator::{Resolution, VaryCache};
use crate::request::RequestScope;
use crate::segment::CacheGroup;
use crate::service::CacheSegmentation;
use dashmap::DashMap;
use std::sync::Arc;

/// One shared instance per experiment, keyed by cache group
///
/// Each experiment is registered with the segmentation service and set up
/// exactly once, even when first requested concurrently.
#[derive(Debug)]
pub struct ExperimentRegistry {
    experiments: DashMap<CacheGroup, Arc<Experiment>>,
    vary: VaryCache,
}

impl ExperimentRegistry {
    /// Empty registry over a segmentation service and option store
    #[must_use]
    pub fn new(service: Arc<dyn CacheSegmentation>, options: Arc<dyn OptionStore>) -> Self {
        Self {
            experiments: DashMap::new(),
            vary: VaryCache::new(service, options),
        }
    }

    /// Registry holding every experiment in `config`
    ///
    /// Uses an [`InMemorySegmentation`](crate::service::InMemorySegmentation)
    /// sized by `config.membership` and the configured options.
    ///
    /// # Errors
    /// The first experiment that fails to construct.
    pub fn from_config(config: &RegistryConfig) -> Result<Self, ConfigurationError> {
        let service: Arc<dyn CacheSegmentation> = Arc::new(config.membership.build());
        Self::from_config_with(config, service)
    }

    /// Like [`ExperimentRegistry::from_config`], over an external service
    ///
    /// # Errors
    /// The first experiment that fails to construct, or
    /// [`ConfigurationError::GroupConflict`] if two entries share a cache group.
    /// Nothing is registered on error.
    pub fn from_config_with(
        config: &RegistryConfig,
        service: Arc<dyn CacheSegmentation>,
    ) -> Result<Self, ConfigurationError> {
        let experiments = config.validate()?;
        let options = Arc::new(MemoryOptions::from(config.options.clone()));
        let registry = Self::new(service, options);
        for experiment in experiments {
            registry.register(experiment);
        }
        Ok(registry)
    }

    /// Shared instance of experiment type `T`, constructed on first call
    ///
    /// `T` is validated on every call, so a misconfigured type never gets an
    /// instance, even one registered earlier under the same cache group.
    ///
    /// # Errors
    /// - [`ConfigurationError`] if `T` is misconfigured. Nothing is registered.
    /// - [`ConfigurationError::GroupConflict`] if the cache group already holds
    ///   an experiment with different segment keys.
    pub fn get_instance<T: ExperimentType>(&self) -> Result<Arc<Experiment>, ConfigurationError> {
        let experiment = T::build()?;
        let segments = experiment.segments().clone();

        let instance = self.register(experiment);
        if instance.segments() != &segments {
            return Err(ConfigurationError::GroupConflict {
                experiment: instance.cache_group().to_string(),
            });
        }
        Ok(instance)
    }

    /// Add an already validated experiment
    ///
    /// If its cache group is taken, the existing instance is returned and
    /// `experiment` is dropped.
    pub fn register(&self, experiment: Experiment) -> Arc<Experiment> {
        let group = experiment.cache_group().clone();
        if let Some(existing) = self.experiments.get(&group) {
            return Arc::clone(existing.value());
        }

        // Shard lock held: register_group and strategy setup must not call back
        // into the registry.
        let entry = self.experiments.entry(group).or_insert_with(|| {
            self.vary.service().register_group(experiment.cache_group());
            experiment.strategy().setup(experiment.cache_group());
            tracing::info!(
                group = %experiment.cache_group(),
                strategy = experiment.strategy().name(),
                "experiment registered"
            );
            Arc::new(experiment)
        });

        Arc::clone(entry.value())
    }

    /// Experiment registered under `group`
    #[must_use]
    pub fn get(&self, group: &str) -> Option<Arc<Experiment>> {
        let group = CacheGroup::new(group).ok()?;
        self.experiments
            .get(&group)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Registered experiments, ordered by cache group
    #[must_use]
    pub fn experiments(&self) -> Vec<Arc<Experiment>> {
        let mut all: Vec<_> = self
            .experiments
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        all.sort_by(|a, b| a.cache_group().cmp(b.cache_group()));
        all
    }

    /// Number of registered experiments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    /// Whether no experiment is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }

    /// Assignment orchestrator shared by all experiments
    #[inline]
    #[must_use]
    pub fn orchestrator(&self) -> &VaryCache {
        &self.vary
    }

    /// Resolve one experiment for the visitor of `scope`
    pub fn vary_cache(&self, experiment: &Experiment, scope: &mut RequestScope) -> Resolution {
        self.vary.vary_cache(experiment, scope)
    }

    /// Request-lifecycle hook, run once the environment is initialized and
    /// before output begins
    ///
    /// Resolves every registered experiment for front-end page views; other
    /// request kinds are left unresolved.
    pub fn init_request(&self, scope: &mut RequestScope) -> Vec<(CacheGroup, Resolution)> {
        if !scope.kind().is_front_end() {
            tracing::trace!(kind = scope.kind().as_str(), "skipping segment assignment");
            return Vec::new();
        }

        self.experiments()
            .into_iter()
            .map(|experiment| {
                let resolution = self.vary.vary_cache(&experiment, scope);
                (experiment.cache_group().clone(), resolution)
            })
            .collect()
    }
}
