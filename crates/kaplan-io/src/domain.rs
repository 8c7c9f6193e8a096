//! Domain types for kaplan-io.

use crate::IoError;

/// A sample identifier parsed from the first column of the input CSV.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SampleId(String);

impl SampleId {
    pub(crate) fn new(id: String) -> Self {
        Self(id)
    }

    /// Return the sample ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SampleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated experiment name for output file naming.
///
/// Must match `[a-zA-Z0-9_-]+`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentName(String);

impl ExperimentName {
    /// Parse and validate an experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidExperimentName`] if the name is empty or
    /// contains characters outside `[a-zA-Z0-9_-]`.
    pub fn new(name: String) -> Result<Self, IoError> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(IoError::InvalidExperimentName { name });
        }
        Ok(Self(name))
    }

    /// Return the experiment name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExperimentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Features and optional survival labels read from one CSV file.
///
/// Produced by [`SurvivalReader`](crate::SurvivalReader). Rows are stored in
/// parallel vectors: `sample_ids[i]` corresponds to `features[i]` and, when
/// present, `labels[i]`.
#[derive(Debug)]
pub struct SurvivalDataset {
    sample_ids: Vec<SampleId>,
    feature_names: Vec<String>,
    features: Vec<Vec<f64>>,
    labels: Option<Vec<Vec<f64>>>,
}

impl SurvivalDataset {
    pub(crate) fn new(
        sample_ids: Vec<SampleId>,
        feature_names: Vec<String>,
        features: Vec<Vec<f64>>,
        labels: Option<Vec<Vec<f64>>>,
    ) -> Self {
        Self { sample_ids, feature_names, features, labels }
    }

    /// Return the sample IDs in file order.
    #[must_use]
    pub fn sample_ids(&self) -> &[SampleId] {
        &self.sample_ids
    }

    /// Return the feature column names, in matrix column order.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Return the feature matrix (row-major).
    #[must_use]
    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    /// Return the label table, one `[time, event]` row per sample.
    ///
    /// `None` when the file carried no time/event columns.
    #[must_use]
    pub fn labels(&self) -> Option<&[Vec<f64>]> {
        self.labels.as_deref()
    }

    /// Return the number of samples.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Return the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }
}
