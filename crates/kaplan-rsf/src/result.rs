//! Training metadata recorded on a fitted forest.

/// Metadata about the training run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TrainingMetadata {
    /// Number of trees requested.
    pub n_estimators: usize,
    /// Number of trees kept in the ensemble.
    pub n_accepted: usize,
    /// Number of trees discarded (build failure or unable to predict).
    pub n_rejected: usize,
    /// Number of training samples.
    pub n_samples: usize,
    /// Number of features per sample.
    pub n_features: usize,
    /// Features offered to each tree.
    pub feature_subset_size: usize,
    /// Worker count used for tree building.
    pub n_jobs: usize,
    /// Forest seed, when one was supplied.
    pub random_state: Option<u64>,
}
