//! Survival forest training with parallel tree construction.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, info, instrument, warn};

use crate::bootstrap::{BootstrapSet, draw_bootstrap_samples, tree_seeds};
use crate::config::ForestConfig;
use crate::error::RsfError;
use crate::fuzzy::{FuzzyAggregate, fuzzy_ensemble_chf};
use crate::grower::{GrowRequest, HazardTree, TreeGrower};
use crate::jobs::run_with_jobs;
use crate::labels::SurvivalLabels;
use crate::oob::{OobReport, compute_oob_ensembles, score_oob};
use crate::result::TrainingMetadata;
use crate::timeline::Timeline;
use crate::tree::SurvivalTree;

/// RNG stream of a tree seed used to choose its feature subset.
const FEATURE_STREAM: u64 = 1;

/// A fitted random survival forest.
///
/// `trees[i]` was grown on `bootstraps[i]`; the two vectors always have the
/// same length.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SurvivalForest<T = SurvivalTree> {
    pub(crate) trees: Vec<T>,
    pub(crate) bootstraps: Vec<BootstrapSet>,
    pub(crate) timeline: Timeline,
    pub(crate) n_features: usize,
    pub(crate) oob: Option<OobReport>,
    pub(crate) fuzzy: Option<FuzzyAggregate>,
    pub(crate) metadata: TrainingMetadata,
}

impl<T> SurvivalForest<T> {
    /// Return the accepted trees.
    #[must_use]
    pub fn trees(&self) -> &[T] {
        &self.trees
    }

    /// Return the bootstrap set of each accepted tree, in tree order.
    #[must_use]
    pub fn bootstraps(&self) -> &[BootstrapSet] {
        &self.bootstraps
    }

    /// Return the shared time axis of every CHF.
    #[must_use]
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Return the number of features this forest was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the number of trees in the ensemble.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Return training metadata.
    #[must_use]
    pub fn metadata(&self) -> &TrainingMetadata {
        &self.metadata
    }

    /// Return the OOB evaluation.
    ///
    /// # Errors
    ///
    /// Returns [`RsfError::NoValidModel`] when no tree was accepted.
    pub fn oob_report(&self) -> Result<&OobReport, RsfError> {
        self.oob.as_ref().ok_or(RsfError::NoValidModel)
    }

    /// Return the OOB score; `Ok(None)` when scoring was disabled or undefined.
    ///
    /// # Errors
    ///
    /// Returns [`RsfError::NoValidModel`] when no tree was accepted.
    pub fn oob_score(&self) -> Result<Option<f64>, RsfError> {
        Ok(self.oob_report()?.score)
    }

    /// Return the fuzzy ensemble aggregate over the training rows.
    ///
    /// # Errors
    ///
    /// Returns [`RsfError::NoValidModel`] when no tree was accepted.
    pub fn fuzzy_aggregate(&self) -> Result<&FuzzyAggregate, RsfError> {
        self.fuzzy.as_ref().ok_or(RsfError::NoValidModel)
    }
}

/// Number of features offered to each tree: `round(sqrt(n_features))`, at least 1.
pub(crate) fn feature_subset_size(n_features: usize) -> usize {
    ((n_features as f64).sqrt().round() as usize).clamp(1, n_features.max(1))
}

/// Pick `size` distinct features with a dedicated stream of the tree seed.
fn feature_subset(n_features: usize, size: usize, seed: u64) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(FEATURE_STREAM);
    let mut features: Vec<usize> = (0..n_features).collect();
    features.shuffle(&mut rng);
    features.truncate(size);
    features.sort_unstable();
    features
}

fn validate_features(features: &[Vec<f64>]) -> Result<usize, RsfError> {
    if features.is_empty() {
        return Err(RsfError::EmptyDataset);
    }
    let n_features = features[0].len();
    if n_features == 0 {
        return Err(RsfError::ZeroFeatures);
    }
    for (sample_index, row) in features.iter().enumerate() {
        if row.len() != n_features {
            return Err(RsfError::FeatureCountMismatch {
                expected: n_features,
                got: row.len(),
                sample_index,
            });
        }
        for (feature_index, &val) in row.iter().enumerate() {
            if !val.is_finite() {
                return Err(RsfError::NonFiniteValue {
                    sample_index,
                    feature_index,
                });
            }
        }
    }
    Ok(n_features)
}

/// Trees and bootstraps that survived the validity filter, plus the
/// evaluations computed from them.
struct Ensemble<T> {
    trees: Vec<T>,
    bootstraps: Vec<BootstrapSet>,
    n_rejected: usize,
    oob: Option<OobReport>,
    fuzzy: Option<FuzzyAggregate>,
}

/// Train the survival forest ensemble.
#[instrument(skip_all, fields(n_estimators = config.n_estimators, n_samples = features.len()))]
pub(crate) fn train<G: TreeGrower>(
    config: &ForestConfig,
    grower: &G,
    features: &[Vec<f64>],
    labels: &[Vec<f64>],
) -> Result<SurvivalForest<G::Tree>, RsfError> {
    // --- Validate config ---
    if config.min_leaf == 0 {
        return Err(RsfError::InvalidMinLeaf {
            min_leaf: config.min_leaf,
        });
    }
    if config.unique_deaths == 0 {
        return Err(RsfError::InvalidUniqueDeaths {
            unique_deaths: config.unique_deaths,
        });
    }

    // --- Validate inputs ---
    let n_features = validate_features(features)?;
    let n_samples = features.len();
    let labels = SurvivalLabels::from_table(labels)?;
    if labels.len() != n_samples {
        return Err(RsfError::LabelCountMismatch {
            labels: labels.len(),
            samples: n_samples,
        });
    }

    let timeline = Timeline::from_labels(&labels)?;
    let n_jobs = config.n_jobs.resolve();
    let subset_size = feature_subset_size(n_features);

    info!(
        n_estimators = config.n_estimators,
        n_samples,
        n_features,
        feature_subset_size = subset_size,
        n_jobs,
        timeline_len = timeline.len(),
        "training random survival forest"
    );

    let seeds = tree_seeds(config.random_state, config.n_estimators);
    let bootstraps = draw_bootstrap_samples(n_samples, &seeds, config.bootstrap);

    let ensemble = run_with_jobs(n_jobs, || {
        build_ensemble(
            config,
            grower,
            features,
            &labels,
            &timeline,
            &seeds,
            bootstraps,
            subset_size,
        )
    })??;

    let metadata = TrainingMetadata {
        n_estimators: config.n_estimators,
        n_accepted: ensemble.trees.len(),
        n_rejected: ensemble.n_rejected,
        n_samples,
        n_features,
        feature_subset_size: subset_size,
        n_jobs,
        random_state: config.random_state,
    };

    info!(
        n_accepted = metadata.n_accepted,
        n_rejected = metadata.n_rejected,
        oob_score = ensemble.oob.as_ref().and_then(|r| r.score),
        "random survival forest training complete"
    );

    Ok(SurvivalForest {
        trees: ensemble.trees,
        bootstraps: ensemble.bootstraps,
        timeline,
        n_features,
        oob: ensemble.oob,
        fuzzy: ensemble.fuzzy,
        metadata,
    })
}

/// Grow every tree in parallel, keep the valid ones, then evaluate.
#[allow(clippy::too_many_arguments)]
fn build_ensemble<G: TreeGrower>(
    config: &ForestConfig,
    grower: &G,
    features: &[Vec<f64>],
    labels: &SurvivalLabels,
    timeline: &Timeline,
    seeds: &[u64],
    bootstraps: Vec<BootstrapSet>,
    subset_size: usize,
) -> Result<Ensemble<G::Tree>, RsfError> {
    let n_features = features[0].len();

    let grown: Vec<Result<G::Tree, RsfError>> = seeds
        .par_iter()
        .zip(bootstraps.par_iter())
        .map(|(&seed, bootstrap)| {
            let subset = feature_subset(n_features, subset_size, seed);
            let request = GrowRequest {
                features,
                labels,
                rows: bootstrap.indices(),
                feature_subset: &subset,
                n_features,
                min_leaf: config.min_leaf,
                unique_deaths: config.unique_deaths,
                seed,
                timeline,
            };
            grower.grow(&request)
        })
        .collect();

    // Single writer: trees and bootstraps are paired up in seed order.
    let mut trees = Vec::with_capacity(grown.len());
    let mut kept = Vec::with_capacity(grown.len());
    let mut n_rejected = 0usize;
    for (tree_index, (result, bootstrap)) in grown.into_iter().zip(bootstraps).enumerate() {
        match result {
            Ok(tree) if tree.prediction_possible() => {
                trees.push(tree);
                kept.push(bootstrap);
            }
            Ok(_) => {
                n_rejected += 1;
                debug!(tree_index, "tree cannot predict, discarded");
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                n_rejected += 1;
                warn!(tree_index, error = %e, "tree build failed, discarded");
            }
        }
    }

    debug!(n_accepted = trees.len(), n_rejected, "tree building complete");

    if trees.is_empty() {
        warn!("no tree can predict; OOB and fuzzy evaluations skipped");
        return Ok(Ensemble {
            trees,
            bootstraps: kept,
            n_rejected,
            oob: None,
            fuzzy: None,
        });
    }

    let ensemble = compute_oob_ensembles(&trees, &kept, features)?;
    let metric = config.oob_metric();
    let oob = OobReport {
        score: metric.and_then(|m| score_oob(&ensemble, labels, m)),
        metric: metric.map(|m| m.name().to_string()),
        ensemble,
    };
    let fuzzy = fuzzy_ensemble_chf(&trees, labels, metric)?;

    Ok(Ensemble {
        trees,
        bootstraps: kept,
        n_rejected,
        oob: Some(oob),
        fuzzy: Some(fuzzy),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::thread::{self, ThreadId};

    use super::*;
    use crate::bootstrap::BootstrapMode;
    use crate::jobs::NJobs;
    use crate::testing::{StubGrower, StubTree};

    fn dataset(n: usize) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
        let features = (0..n).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let labels = (0..n)
            .map(|i| vec![1.0 + i as f64, if i % 2 == 0 { 1.0 } else { 0.0 }])
            .collect();
        (features, labels)
    }

    fn always_valid(_: &GrowRequest<'_>) -> Result<bool, RsfError> {
        Ok(true)
    }

    fn never_valid(_: &GrowRequest<'_>) -> Result<bool, RsfError> {
        Ok(false)
    }

    fn odd_seeds_fail(request: &GrowRequest<'_>) -> Result<bool, RsfError> {
        if request.seed % 2 == 1 {
            Err(RsfError::InvalidLabelFormat {
                row: 0,
                reason: "stub failure".to_string(),
            })
        } else {
            Ok(true)
        }
    }

    fn exhausted(_: &GrowRequest<'_>) -> Result<bool, RsfError> {
        Err(RsfError::ResourceExhausted {
            reason: "stub".to_string(),
        })
    }

    fn fit(
        config: &ForestConfig,
        verdict: fn(&GrowRequest<'_>) -> Result<bool, RsfError>,
    ) -> Result<SurvivalForest<StubTree>, RsfError> {
        let (features, labels) = dataset(20);
        config.fit_with(&StubGrower { verdict }, &features, &labels)
    }

    #[test]
    fn subset_size_is_rounded_square_root() {
        assert_eq!(feature_subset_size(1), 1);
        assert_eq!(feature_subset_size(5), 2);
        assert_eq!(feature_subset_size(7), 3);
        assert_eq!(feature_subset_size(100), 10);
    }

    #[test]
    fn feature_subset_is_distinct_and_sorted() {
        let subset = feature_subset(20, 5, 3);
        assert_eq!(subset.len(), 5);
        assert!(subset.windows(2).all(|w| w[0] < w[1]));
        assert!(subset.iter().all(|&f| f < 20));
        assert_eq!(subset, feature_subset(20, 5, 3));
    }

    #[test]
    fn trees_and_bootstraps_stay_paired() {
        let config = ForestConfig::new(8).unwrap().with_random_state(Some(5));
        let forest = fit(&config, always_valid).unwrap();
        assert_eq!(forest.n_trees(), 8);
        assert_eq!(forest.trees().len(), forest.bootstraps().len());
        for (tree, bootstrap) in forest.trees().iter().zip(forest.bootstraps()) {
            assert_eq!(tree.rows, bootstrap.indices());
        }
    }

    #[test]
    fn failed_builds_are_dropped_with_their_bootstraps() {
        let config = ForestConfig::new(16).unwrap().with_random_state(Some(1));
        let forest = fit(&config, odd_seeds_fail).unwrap();
        let seeds = tree_seeds(Some(1), 16);
        let expected = seeds.iter().filter(|&&s| s % 2 == 0).count();
        assert_eq!(forest.n_trees(), expected);
        assert_eq!(forest.bootstraps().len(), expected);
        assert_eq!(forest.metadata().n_rejected, 16 - expected);
        for (tree, bootstrap) in forest.trees().iter().zip(forest.bootstraps()) {
            assert_eq!(tree.rows, bootstrap.indices());
        }
    }

    #[test]
    fn resource_exhaustion_aborts_the_fit() {
        let config = ForestConfig::new(3).unwrap().with_random_state(Some(1));
        let err = fit(&config, exhausted).unwrap_err();
        assert!(matches!(err, RsfError::ResourceExhausted { .. }));
    }

    #[test]
    fn unbounded_time_span_aborts_before_growing() {
        let (features, mut labels) = dataset(20);
        labels[3] = vec![1e18, 1.0];
        let config = ForestConfig::new(3).unwrap().with_random_state(Some(1));
        let err = config
            .fit_with(&StubGrower { verdict: always_valid }, &features, &labels)
            .unwrap_err();
        assert!(matches!(err, RsfError::ResourceExhausted { .. }));
    }

    #[test]
    fn zero_valid_trees_is_a_fitted_but_empty_model() {
        let config = ForestConfig::new(4).unwrap().with_random_state(Some(1));
        let forest = fit(&config, never_valid).unwrap();
        assert_eq!(forest.n_trees(), 0);
        assert!(forest.bootstraps().is_empty());
        assert!(matches!(forest.oob_report(), Err(RsfError::NoValidModel)));
        assert!(matches!(forest.fuzzy_aggregate(), Err(RsfError::NoValidModel)));
        assert!(matches!(
            forest.predict_chf(&[0.0, 0.0]),
            Err(RsfError::NoValidModel)
        ));
    }

    #[test]
    fn identity_bootstrap_leaves_nothing_out_of_bag() {
        let config = ForestConfig::new(3)
            .unwrap()
            .with_random_state(Some(2))
            .with_bootstrap(BootstrapMode::Identity);
        let forest = fit(&config, always_valid).unwrap();
        let report = forest.oob_report().unwrap();
        assert_eq!(report.ensemble.n_defined(), 0);
        assert!(report.ensemble.values().iter().all(|&v| v == 0.0));
        assert_eq!(report.score, None);
    }

    static SINGLE_JOB_THREADS: Mutex<Vec<ThreadId>> = Mutex::new(Vec::new());

    fn record_single_job_thread(_: &GrowRequest<'_>) -> Result<bool, RsfError> {
        let mut seen = SINGLE_JOB_THREADS.lock().unwrap();
        seen.push(thread::current().id());
        assert_eq!(rayon::current_num_threads(), 1);
        Ok(true)
    }

    #[test]
    fn single_job_grows_every_tree_on_one_thread() {
        let config = ForestConfig::new(16)
            .unwrap()
            .with_random_state(Some(3))
            .with_n_jobs(NJobs::Single);
        let forest = fit(&config, record_single_job_thread).unwrap();
        assert_eq!(forest.metadata().n_jobs, 1);

        let seen = SINGLE_JOB_THREADS.lock().unwrap();
        assert_eq!(seen.len(), 16);
        assert!(seen.iter().all(|id| *id == seen[0]), "threads used: {seen:?}");
    }

    #[test]
    fn parallel_and_sequential_builds_match() {
        let base = ForestConfig::new(12).unwrap().with_random_state(Some(9));
        let sequential = fit(&base.clone().with_n_jobs(NJobs::Single), always_valid).unwrap();
        let parallel = fit(&base.with_n_jobs(NJobs::Fixed(4)), always_valid).unwrap();
        assert_eq!(sequential.bootstraps(), parallel.bootstraps());
        assert_eq!(
            sequential.oob_report().unwrap(),
            parallel.oob_report().unwrap()
        );
    }

    #[test]
    fn config_errors_surface_before_training() {
        let config = ForestConfig::new(2).unwrap().with_min_leaf(0);
        assert!(matches!(
            fit(&config, always_valid),
            Err(RsfError::InvalidMinLeaf { min_leaf: 0 })
        ));
        let config = ForestConfig::new(2).unwrap().with_unique_deaths(0);
        assert!(matches!(
            fit(&config, always_valid),
            Err(RsfError::InvalidUniqueDeaths { unique_deaths: 0 })
        ));
    }

    #[test]
    fn label_errors() {
        let config = ForestConfig::new(2).unwrap();
        let grower = StubGrower { verdict: always_valid };
        let (features, mut labels) = dataset(6);
        labels[2][1] = 0.5;
        assert!(matches!(
            config.fit_with(&grower, &features, &labels),
            Err(RsfError::InvalidLabelFormat { row: 2, .. })
        ));
        let (features, labels) = dataset(6);
        assert!(matches!(
            config.fit_with(&grower, &features, &labels[..4]),
            Err(RsfError::LabelCountMismatch { labels: 4, samples: 6 })
        ));
    }

    #[test]
    fn feature_errors() {
        let config = ForestConfig::new(2).unwrap();
        let grower = StubGrower { verdict: always_valid };
        let labels = vec![vec![1.0, 1.0]];
        assert!(matches!(
            config.fit_with(&grower, &[], &labels),
            Err(RsfError::EmptyDataset)
        ));
        assert!(matches!(
            config.fit_with(&grower, &[vec![]], &labels),
            Err(RsfError::ZeroFeatures)
        ));
        assert!(matches!(
            config.fit_with(&grower, &[vec![f64::NAN]], &labels),
            Err(RsfError::NonFiniteValue { sample_index: 0, feature_index: 0 })
        ));
    }
}
