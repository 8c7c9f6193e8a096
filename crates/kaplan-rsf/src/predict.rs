//! Prediction methods for the survival forest ensemble.

use std::collections::BTreeMap;

use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::error::RsfError;
use crate::forest::SurvivalForest;
use crate::grower::HazardTree;
use crate::oob::compute_oob_chf;

impl<T: HazardTree> SurvivalForest<T> {
    fn check_predictable(&self, sample: &[f64]) -> Result<(), RsfError> {
        if self.trees.is_empty() {
            return Err(RsfError::NoValidModel);
        }
        if sample.len() != self.n_features {
            return Err(RsfError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }
        Ok(())
    }

    /// Ensemble cumulative hazard of one sample over [`SurvivalForest::timeline`].
    ///
    /// The elementwise mean of every accepted tree's CHF.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RsfError::NoValidModel`] | the forest has no accepted tree |
    /// | [`RsfError::PredictionFeatureMismatch`] | `sample.len() != n_features` |
    /// | [`RsfError::ChfLengthMismatch`] | a tree's CHF is not aligned with the timeline |
    pub fn predict_chf(&self, sample: &[f64]) -> Result<Vec<f64>, RsfError> {
        self.check_predictable(sample)?;

        let mut avg = vec![0.0f64; self.timeline.len()];
        for tree in &self.trees {
            let chf = tree.predict_chf(sample)?;
            if chf.len() != avg.len() {
                return Err(RsfError::ChfLengthMismatch {
                    expected: avg.len(),
                    got: chf.len(),
                });
            }
            for (acc, v) in avg.iter_mut().zip(&chf) {
                *acc += v;
            }
        }
        let n = self.trees.len() as f64;
        avg.iter_mut().for_each(|v| *v /= n);
        Ok(avg)
    }

    /// Ensemble CHFs for a batch of samples in parallel.
    ///
    /// # Errors
    ///
    /// Same as [`SurvivalForest::predict_chf`], for the first failing sample.
    pub fn predict(&self, samples: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, RsfError> {
        samples
            .into_par_iter()
            .map(|sample| self.predict_chf(sample))
            .collect()
    }

    /// Fuzzy risk score of one sample: the mean over trees of each tree's
    /// mean fuzzy contribution.
    ///
    /// # Errors
    ///
    /// Same as [`SurvivalForest::predict_chf`].
    pub fn predict_fuzzy(&self, sample: &[f64]) -> Result<f64, RsfError> {
        self.check_predictable(sample)?;
        let mut total = 0.0;
        for tree in &self.trees {
            total += tree.fuzzy_score(sample)?;
        }
        Ok(total / self.trees.len() as f64)
    }

    /// Fuzzy risk scores for a batch of samples in parallel.
    ///
    /// # Errors
    ///
    /// Same as [`SurvivalForest::predict_fuzzy`], for the first failing sample.
    pub fn predict_fuzzy_batch(&self, samples: &[Vec<f64>]) -> Result<Vec<f64>, RsfError> {
        samples
            .into_par_iter()
            .map(|sample| self.predict_fuzzy(sample))
            .collect()
    }

    /// Crisp OOB CHF of each training sample that has at least one OOB tree.
    ///
    /// `features` must be the training features, in training order.
    ///
    /// # Errors
    ///
    /// Returns [`RsfError::NoValidModel`] when no tree was accepted,
    /// [`RsfError::ChfLengthMismatch`] when a tree's CHF is not aligned with
    /// the timeline, or a prediction error from a tree.
    pub fn oob_chf(&self, features: &[Vec<f64>]) -> Result<BTreeMap<usize, Vec<f64>>, RsfError> {
        if self.trees.is_empty() {
            return Err(RsfError::NoValidModel);
        }
        compute_oob_chf(&self.trees, &self.bootstraps, features, self.timeline.len())
    }
}

#[cfg(test)]
mod tests {
    use crate::bootstrap::BootstrapSet;
    use crate::error::RsfError;
    use crate::forest::SurvivalForest;
    use crate::result::TrainingMetadata;
    use crate::testing::StubTree;
    use crate::timeline::Timeline;

    fn forest(trees: Vec<StubTree>) -> SurvivalForest<StubTree> {
        let n = trees.len();
        SurvivalForest {
            bootstraps: (0..n).map(|_| BootstrapSet::new(vec![0], 2)).collect(),
            trees,
            timeline: Timeline::from_range(0, 2).unwrap(),
            n_features: 1,
            oob: None,
            fuzzy: None,
            metadata: TrainingMetadata {
                n_estimators: n,
                n_accepted: n,
                n_rejected: 0,
                n_samples: 2,
                n_features: 1,
                feature_subset_size: 1,
                n_jobs: 1,
                random_state: None,
            },
        }
    }

    #[test]
    fn single_tree_chf_is_returned_unchanged() {
        let chf = vec![0.1, 0.35, 0.7];
        let f = forest(vec![StubTree::with_outputs(chf.clone(), vec![])]);
        assert_eq!(f.predict_chf(&[3.0]).unwrap(), chf);
    }

    #[test]
    fn chf_is_elementwise_mean() {
        let f = forest(vec![
            StubTree::with_outputs(vec![0.0, 1.0, 2.0], vec![]),
            StubTree::with_outputs(vec![1.0, 3.0, 4.0], vec![]),
        ]);
        assert_eq!(f.predict_chf(&[0.0]).unwrap(), vec![0.5, 2.0, 3.0]);
    }

    #[test]
    fn batch_matches_individual() {
        let f = forest(vec![
            StubTree::with_outputs(vec![0.0, 1.0, 2.0], vec![1.0]),
            StubTree::with_outputs(vec![1.0, 3.0, 4.0], vec![2.0, 4.0]),
        ]);
        let samples = vec![vec![0.0], vec![5.0], vec![-1.0]];
        let batch = f.predict(&samples).unwrap();
        for (sample, chf) in samples.iter().zip(&batch) {
            assert_eq!(&f.predict_chf(sample).unwrap(), chf);
        }
        let fuzzy = f.predict_fuzzy_batch(&samples).unwrap();
        assert_eq!(fuzzy, vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn fuzzy_without_contributions_is_zero() {
        let f = forest(vec![StubTree::with_outputs(vec![0.0; 3], vec![])]);
        assert_eq!(f.predict_fuzzy(&[1.0]).unwrap(), 0.0);
    }

    #[test]
    fn empty_forest_cannot_predict() {
        let f = forest(Vec::new());
        assert!(matches!(f.predict_chf(&[1.0]), Err(RsfError::NoValidModel)));
        assert!(matches!(f.predict_fuzzy(&[1.0]), Err(RsfError::NoValidModel)));
        assert!(matches!(f.oob_chf(&[vec![1.0]]), Err(RsfError::NoValidModel)));
    }

    #[test]
    fn wrong_width_is_rejected() {
        let f = forest(vec![StubTree::with_outputs(vec![0.0; 3], vec![])]);
        assert!(matches!(
            f.predict(&[vec![1.0, 2.0]]),
            Err(RsfError::PredictionFeatureMismatch { expected: 1, got: 2 })
        ));
    }

    #[test]
    fn oob_chf_skips_in_bag_samples() {
        let f = forest(vec![StubTree::with_outputs(vec![1.0, 2.0, 3.0], vec![])]);
        let oob = f.oob_chf(&[vec![0.0], vec![1.0]]).unwrap();
        assert_eq!(oob.len(), 1);
        assert_eq!(oob[&1], vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn tree_chf_must_match_timeline() {
        // The timeline has three points; the second tree returns two.
        let f = forest(vec![
            StubTree::with_outputs(vec![0.0, 1.0, 2.0], vec![]),
            StubTree::with_outputs(vec![0.5, 1.5], vec![]),
        ]);
        assert!(matches!(
            f.predict_chf(&[0.0]),
            Err(RsfError::ChfLengthMismatch { expected: 3, got: 2 })
        ));
        assert!(matches!(
            f.oob_chf(&[vec![0.0], vec![1.0]]),
            Err(RsfError::ChfLengthMismatch { expected: 3, got: 2 })
        ));

        let longer = forest(vec![StubTree::with_outputs(vec![0.0; 4], vec![])]);
        assert!(matches!(
            longer.predict(&[vec![0.0]]),
            Err(RsfError::ChfLengthMismatch { expected: 3, got: 4 })
        ));
    }
}
