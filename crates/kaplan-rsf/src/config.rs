//! Configuration builder for survival forest training.

use std::sync::Arc;

use crate::bootstrap::BootstrapMode;
use crate::concordance::{HarrellConcordance, SurvivalMetric};
use crate::error::RsfError;
use crate::forest::SurvivalForest;
use crate::grower::TreeGrower;
use crate::jobs::NJobs;
use crate::tree::{LogRankGrower, SurvivalTree};

/// Configuration for survival forest training.
///
/// Construct via [`ForestConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter       | Default                |
/// |-----------------|------------------------|
/// | `min_leaf`      | 3                      |
/// | `unique_deaths` | 3                      |
/// | `n_jobs`        | `NJobs::Single`        |
/// | `random_state`  | `None` (OS entropy)    |
/// | `bootstrap`     | `WithReplacement`      |
/// | `oob_metric`    | `HarrellConcordance`   |
#[derive(Debug, Clone)]
pub struct ForestConfig {
    pub(crate) n_estimators: usize,
    pub(crate) min_leaf: usize,
    pub(crate) unique_deaths: usize,
    pub(crate) n_jobs: NJobs,
    pub(crate) random_state: Option<u64>,
    pub(crate) bootstrap: BootstrapMode,
    pub(crate) oob_metric: Option<Arc<dyn SurvivalMetric>>,
}

impl ForestConfig {
    /// Create a new config growing `n_estimators` trees.
    ///
    /// # Errors
    ///
    /// Returns [`RsfError::InvalidEstimatorCount`] if `n_estimators` is zero.
    pub fn new(n_estimators: usize) -> Result<Self, RsfError> {
        if n_estimators == 0 {
            return Err(RsfError::InvalidEstimatorCount { n_estimators });
        }
        Ok(Self::with_defaults(n_estimators))
    }

    fn with_defaults(n_estimators: usize) -> Self {
        Self {
            n_estimators,
            min_leaf: 3,
            unique_deaths: 3,
            n_jobs: NJobs::default(),
            random_state: None,
            bootstrap: BootstrapMode::default(),
            oob_metric: Some(Arc::new(HarrellConcordance)),
        }
    }

    // --- Setters ---

    /// Set the minimum number of rows on each side of a split.
    #[must_use]
    pub fn with_min_leaf(mut self, min_leaf: usize) -> Self {
        self.min_leaf = min_leaf;
        self
    }

    /// Set the minimum number of distinct event times on each side of a split.
    #[must_use]
    pub fn with_unique_deaths(mut self, unique_deaths: usize) -> Self {
        self.unique_deaths = unique_deaths;
        self
    }

    /// Set the tree-building parallelism.
    #[must_use]
    pub fn with_n_jobs(mut self, n_jobs: NJobs) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Seed the forest. `None` draws tree seeds from OS entropy.
    #[must_use]
    pub fn with_random_state(mut self, random_state: Option<u64>) -> Self {
        self.random_state = random_state;
        self
    }

    /// Set the bootstrap mode.
    #[must_use]
    pub fn with_bootstrap(mut self, bootstrap: BootstrapMode) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Score OOB predictions with `metric`.
    #[must_use]
    pub fn with_oob_metric(mut self, metric: Arc<dyn SurvivalMetric>) -> Self {
        self.oob_metric = Some(metric);
        self
    }

    /// Skip OOB scoring. The per-sample OOB ensemble is still computed.
    #[must_use]
    pub fn without_oob_score(mut self) -> Self {
        self.oob_metric = None;
        self
    }

    // --- Getters ---

    /// Return the number of trees requested.
    #[must_use]
    pub fn n_estimators(&self) -> usize {
        self.n_estimators
    }

    /// Return the minimum rows per split side.
    #[must_use]
    pub fn min_leaf(&self) -> usize {
        self.min_leaf
    }

    /// Return the minimum distinct event times per split side.
    #[must_use]
    pub fn unique_deaths(&self) -> usize {
        self.unique_deaths
    }

    /// Return the requested parallelism.
    #[must_use]
    pub fn n_jobs(&self) -> NJobs {
        self.n_jobs
    }

    /// Return the forest seed, if any.
    #[must_use]
    pub fn random_state(&self) -> Option<u64> {
        self.random_state
    }

    /// Return the bootstrap mode.
    #[must_use]
    pub fn bootstrap(&self) -> BootstrapMode {
        self.bootstrap
    }

    /// Return the OOB metric, if scoring is enabled.
    #[must_use]
    pub fn oob_metric(&self) -> Option<&dyn SurvivalMetric> {
        self.oob_metric.as_deref()
    }

    /// Train a survival forest with the default [`LogRankGrower`].
    ///
    /// `features[sample_idx][feature_idx]`: row-major layout.
    /// `labels[sample_idx]`: `[time, event]` with event exactly `0.0` or `1.0`.
    ///
    /// # Errors
    ///
    /// | Variant                               | When                                          |
    /// |---------------------------------------|-----------------------------------------------|
    /// | [`RsfError::InvalidMinLeaf`]          | `min_leaf` is zero                            |
    /// | [`RsfError::InvalidUniqueDeaths`]     | `unique_deaths` is zero                       |
    /// | [`RsfError::EmptyDataset`]            | `features` is empty                           |
    /// | [`RsfError::ZeroFeatures`]            | rows have zero feature columns                |
    /// | [`RsfError::FeatureCountMismatch`]    | rows have inconsistent lengths                |
    /// | [`RsfError::NonFiniteValue`]          | any feature is NaN or infinite                |
    /// | [`RsfError::InvalidLabelFormat`]      | a label row is not `[finite time, 0 or 1]`    |
    /// | [`RsfError::LabelCountMismatch`]      | label and feature row counts differ           |
    /// | [`RsfError::ThreadPool`]              | the worker pool could not be created          |
    /// | [`RsfError::ResourceExhausted`]       | the timeline or a tree build is too large     |
    pub fn fit(
        &self,
        features: &[Vec<f64>],
        labels: &[Vec<f64>],
    ) -> Result<SurvivalForest<SurvivalTree>, RsfError> {
        self.fit_with(&LogRankGrower::default(), features, labels)
    }

    /// Train a survival forest using `grower` for every ensemble member.
    ///
    /// # Errors
    ///
    /// Same as [`ForestConfig::fit`].
    pub fn fit_with<G: TreeGrower>(
        &self,
        grower: &G,
        features: &[Vec<f64>],
        labels: &[Vec<f64>],
    ) -> Result<SurvivalForest<G::Tree>, RsfError> {
        crate::forest::train(self, grower, features, labels)
    }
}

impl Default for ForestConfig {
    /// 100 trees with the defaults listed on [`ForestConfig`].
    fn default() -> Self {
        Self::with_defaults(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_estimators_rejected() {
        let err = ForestConfig::new(0).unwrap_err();
        assert!(matches!(err, RsfError::InvalidEstimatorCount { n_estimators: 0 }));
    }

    #[test]
    fn defaults() {
        let config = ForestConfig::default();
        assert_eq!(config.n_estimators(), 100);
        assert_eq!(config.min_leaf(), 3);
        assert_eq!(config.unique_deaths(), 3);
        assert_eq!(config.n_jobs(), NJobs::Single);
        assert_eq!(config.random_state(), None);
        assert_eq!(config.bootstrap(), BootstrapMode::WithReplacement);
        assert_eq!(config.oob_metric().map(|m| m.name()), Some("harrell_c"));
    }

    #[test]
    fn builder_chain() {
        let config = ForestConfig::new(7)
            .unwrap()
            .with_min_leaf(5)
            .with_unique_deaths(2)
            .with_n_jobs(NJobs::Fixed(4))
            .with_random_state(Some(42))
            .with_bootstrap(BootstrapMode::Identity)
            .without_oob_score();
        assert_eq!(config.n_estimators(), 7);
        assert_eq!(config.min_leaf(), 5);
        assert_eq!(config.unique_deaths(), 2);
        assert_eq!(config.n_jobs(), NJobs::Fixed(4));
        assert_eq!(config.random_state(), Some(42));
        assert_eq!(config.bootstrap(), BootstrapMode::Identity);
        assert!(config.oob_metric().is_none());
    }
}
