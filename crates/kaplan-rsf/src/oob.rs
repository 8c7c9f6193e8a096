//! Out-of-bag (OOB) evaluation for the survival forest.

use std::collections::BTreeMap;

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, instrument};

use crate::bootstrap::BootstrapSet;
use crate::concordance::SurvivalMetric;
use crate::error::RsfError;
use crate::grower::HazardTree;
use crate::labels::SurvivalLabels;

/// Per-sample OOB fuzzy scores.
///
/// A sample that no tree left out of its bootstrap holds the zero sentinel
/// with `n_trees == 0`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OobEnsemble {
    values: Vec<f64>,
    n_trees: Vec<usize>,
}

impl OobEnsemble {
    /// OOB value of `sample`; 0 when undefined or out of range.
    #[must_use]
    pub fn value(&self, sample: usize) -> f64 {
        self.values.get(sample).copied().unwrap_or(0.0)
    }

    /// Number of trees that left `sample` out of their bootstrap.
    #[must_use]
    pub fn n_trees(&self, sample: usize) -> usize {
        self.n_trees.get(sample).copied().unwrap_or(0)
    }

    /// `true` when at least one tree contributed to `sample`.
    #[must_use]
    pub fn is_defined(&self, sample: usize) -> bool {
        self.n_trees(sample) > 0
    }

    /// All per-sample values, sentinel zeros included.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of samples with a defined OOB value.
    #[must_use]
    pub fn n_defined(&self) -> usize {
        self.n_trees.iter().filter(|&&n| n > 0).count()
    }

    /// Number of training samples covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` when the ensemble covers no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// OOB evaluation stored on a fitted forest.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OobReport {
    /// Per-sample OOB scores.
    pub ensemble: OobEnsemble,
    /// Name of the metric used, if scoring was enabled.
    pub metric: Option<String>,
    /// Metric value over the defined samples; `None` when disabled or undefined.
    pub score: Option<f64>,
}

/// Compute each training sample's OOB fuzzy score.
///
/// For sample `s`, every tree whose bootstrap excludes `s` contributes its
/// mean fuzzy contribution for `features[s]` (an empty contribution list
/// counts as 0). The value is the mean over contributing trees.
///
/// # Errors
///
/// Propagates tree prediction errors such as [`RsfError::PredictionFeatureMismatch`].
#[instrument(skip_all, fields(n_trees = trees.len(), n_samples = features.len()))]
pub fn compute_oob_ensembles<T: HazardTree>(
    trees: &[T],
    bootstraps: &[BootstrapSet],
    features: &[Vec<f64>],
) -> Result<OobEnsemble, RsfError> {
    let per_sample: Vec<(f64, usize)> = (0..features.len())
        .into_par_iter()
        .map(|s| -> Result<(f64, usize), RsfError> {
            let mut numerator = 0.0;
            let mut denominator = 0usize;
            for (tree, bootstrap) in trees.iter().zip(bootstraps) {
                if bootstrap.contains(s) {
                    continue;
                }
                numerator += tree.fuzzy_score(&features[s])?;
                denominator += 1;
            }
            let value = if denominator > 0 {
                numerator / denominator as f64
            } else {
                0.0
            };
            Ok((value, denominator))
        })
        .collect::<Result<_, _>>()?;

    let (values, n_trees): (Vec<f64>, Vec<usize>) = per_sample.into_iter().unzip();
    let ensemble = OobEnsemble { values, n_trees };
    debug!(n_defined = ensemble.n_defined(), "OOB ensemble computed");
    Ok(ensemble)
}

/// Crisp OOB CHF: for each sample with at least one OOB tree, the mean CHF
/// of those trees. Every tree CHF must have `timeline_len` points.
///
/// # Errors
///
/// Returns [`RsfError::ChfLengthMismatch`] for a misaligned tree CHF and
/// propagates tree prediction errors such as [`RsfError::PredictionFeatureMismatch`].
pub fn compute_oob_chf<T: HazardTree>(
    trees: &[T],
    bootstraps: &[BootstrapSet],
    features: &[Vec<f64>],
    timeline_len: usize,
) -> Result<BTreeMap<usize, Vec<f64>>, RsfError> {
    let per_sample: Vec<Option<Vec<f64>>> = (0..features.len())
        .into_par_iter()
        .map(|s| -> Result<Option<Vec<f64>>, RsfError> {
            let mut total: Option<Vec<f64>> = None;
            let mut count = 0usize;
            for (tree, bootstrap) in trees.iter().zip(bootstraps) {
                if bootstrap.contains(s) {
                    continue;
                }
                let chf = tree.predict_chf(&features[s])?;
                if chf.len() != timeline_len {
                    return Err(RsfError::ChfLengthMismatch {
                        expected: timeline_len,
                        got: chf.len(),
                    });
                }
                match total.as_mut() {
                    Some(acc) => acc.iter_mut().zip(&chf).for_each(|(a, v)| *a += v),
                    None => total = Some(chf),
                }
                count += 1;
            }
            Ok(total.map(|mut acc| {
                acc.iter_mut().for_each(|v| *v /= count as f64);
                acc
            }))
        })
        .collect::<Result<_, _>>()?;

    Ok(per_sample
        .into_iter()
        .enumerate()
        .filter_map(|(s, chf)| chf.map(|c| (s, c)))
        .collect())
}

/// Score the defined samples of `ensemble` with `metric` (OOB value as risk).
#[must_use]
pub fn score_oob(
    ensemble: &OobEnsemble,
    labels: &SurvivalLabels,
    metric: &dyn SurvivalMetric,
) -> Option<f64> {
    let defined: Vec<usize> = (0..ensemble.len())
        .filter(|&s| ensemble.is_defined(s))
        .collect();
    let times: Vec<f64> = defined.iter().filter_map(|&s| labels.get(s).map(|l| l.time)).collect();
    let events: Vec<bool> = defined.iter().filter_map(|&s| labels.get(s).map(|l| l.event)).collect();
    let risks: Vec<f64> = defined.iter().map(|&s| ensemble.value(s)).collect();
    metric.score(&times, &risks, &events)
}
