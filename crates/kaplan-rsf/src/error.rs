use std::path::PathBuf;

/// Errors from survival forest operations.
#[derive(Debug, thiserror::Error)]
pub enum RsfError {
    /// Returned when n_estimators is zero.
    #[error("n_estimators must be at least 1, got {n_estimators}")]
    InvalidEstimatorCount {
        /// The invalid n_estimators value provided.
        n_estimators: usize,
    },

    /// Returned when min_leaf is zero.
    #[error("min_leaf must be at least 1, got {min_leaf}")]
    InvalidMinLeaf {
        /// The invalid min_leaf value provided.
        min_leaf: usize,
    },

    /// Returned when unique_deaths is zero.
    #[error("unique_deaths must be at least 1, got {unique_deaths}")]
    InvalidUniqueDeaths {
        /// The invalid unique_deaths value provided.
        unique_deaths: usize,
    },

    /// Returned when a raw n_jobs value is neither positive nor -1.
    #[error("n_jobs must be a positive count or -1, got {n_jobs}")]
    InvalidJobCount {
        /// The invalid n_jobs value provided.
        n_jobs: i64,
    },

    /// Returned when the training dataset has zero samples.
    #[error("training dataset has zero samples")]
    EmptyDataset,

    /// Returned when the training dataset has zero feature columns.
    #[error("training dataset has zero feature columns")]
    ZeroFeatures,

    /// Returned when a sample has a different number of features than expected.
    #[error("sample {sample_index} has {got} features, expected {expected}")]
    FeatureCountMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the sample.
        got: usize,
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when a sample has a different number of features at prediction time.
    #[error("prediction input has {got} features, expected {expected}")]
    PredictionFeatureMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the prediction input.
        got: usize,
    },

    /// Returned when a tree's cumulative hazard is not aligned with the forest timeline.
    #[error("tree CHF has {got} points, timeline has {expected}")]
    ChfLengthMismatch {
        /// Number of points on the forest timeline.
        expected: usize,
        /// Number of points in the tree's CHF.
        got: usize,
    },

    /// Returned when a training value is NaN or infinite.
    #[error("non-finite value at sample {sample_index}, feature {feature_index}")]
    NonFiniteValue {
        /// The zero-based index of the offending sample.
        sample_index: usize,
        /// The zero-based index of the offending feature column.
        feature_index: usize,
    },

    /// Returned when the label table is not a (time, event) table.
    #[error("invalid label format at row {row}: {reason}")]
    InvalidLabelFormat {
        /// Zero-based label row that failed validation.
        row: usize,
        /// Human-readable description of the violation.
        reason: String,
    },

    /// Returned when the number of label rows differs from the number of samples.
    #[error("got {labels} label rows for {samples} samples")]
    LabelCountMismatch {
        /// Number of label rows.
        labels: usize,
        /// Number of feature rows.
        samples: usize,
    },

    /// Returned when prediction or aggregation is requested but no tree was accepted.
    #[error("no valid model: the forest has no tree capable of prediction")]
    NoValidModel,

    /// Returned when a tree's fuzzy tables do not cover the training rows.
    #[error("fuzzy table of tree {tree_index} has {got} rows, expected {expected}")]
    FuzzyTableShape {
        /// Ordinal of the offending tree among the accepted trees.
        tree_index: usize,
        /// Expected row count (training samples).
        expected: usize,
        /// Row count found in the table.
        got: usize,
    },

    /// Returned when the timeline or a tree's working memory cannot be allocated.
    ///
    /// Unlike other build failures this aborts the whole fit.
    #[error("resource exhausted: {reason}")]
    ResourceExhausted {
        /// Description of the failed allocation.
        reason: String,
    },

    /// Returned when the worker pool cannot be created.
    #[error("failed to build worker pool with {n_jobs} threads")]
    ThreadPool {
        /// The requested worker count.
        n_jobs: usize,
        /// The underlying rayon error.
        source: rayon::ThreadPoolBuildError,
    },

    /// Returned when model serialization fails.
    #[error("failed to serialize model")]
    SerializeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when model deserialization fails.
    #[error("failed to deserialize model from {path}")]
    DeserializeModel {
        /// Path to the model file that could not be deserialized.
        path: PathBuf,
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when writing the model file fails.
    #[error("failed to write model to {path}")]
    WriteModel {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading the model file fails.
    #[error("failed to read model from {path}")]
    ReadModel {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when loading a model with an incompatible format version.
    #[error("incompatible model version in {path}: expected {expected}, found {found}")]
    IncompatibleModelVersion {
        /// The model format version this build expects.
        expected: u32,
        /// The model format version found in the file.
        found: u32,
        /// Path to the model file with the incompatible version.
        path: PathBuf,
    },
}

impl RsfError {
    /// Return `true` when a failure inside a single tree build must abort the fit.
    ///
    /// Every other build failure only marks that tree as unable to predict.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, RsfError::ResourceExhausted { .. })
    }
}
