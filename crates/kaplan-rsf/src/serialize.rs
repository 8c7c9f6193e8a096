//! Model serialization and deserialization via bincode.

use std::path::Path;

use tracing::{debug, info, instrument};

use crate::error::RsfError;
use crate::forest::SurvivalForest;
use crate::tree::SurvivalTree;

/// Current binary format version.
const FORMAT_VERSION: u32 = 1;

/// Versioned envelope written by [`SurvivalForest::save`].
#[derive(serde::Serialize)]
struct ModelEnvelopeRef<'a> {
    format_version: u32,
    n_trees: usize,
    n_features: usize,
    timeline_len: usize,
    forest: &'a SurvivalForest<SurvivalTree>,
}

/// Owned counterpart of [`ModelEnvelopeRef`], read by [`SurvivalForest::load`].
#[derive(serde::Deserialize)]
struct ModelEnvelope {
    format_version: u32,
    n_trees: usize,
    n_features: usize,
    timeline_len: usize,
    forest: SurvivalForest<SurvivalTree>,
}

impl SurvivalForest<SurvivalTree> {
    /// Save the model to a binary file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RsfError::SerializeModel`] | bincode encoding failed |
    /// | [`RsfError::WriteModel`] | file write failed |
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RsfError> {
        let path = path.as_ref();

        let envelope = ModelEnvelopeRef {
            format_version: FORMAT_VERSION,
            n_trees: self.trees.len(),
            n_features: self.n_features,
            timeline_len: self.timeline.len(),
            forest: self,
        };

        let bytes =
            bincode::serialize(&envelope).map_err(|source| RsfError::SerializeModel { source })?;

        std::fs::write(path, &bytes).map_err(|source| RsfError::WriteModel {
            path: path.to_path_buf(),
            source,
        })?;

        info!(
            size_bytes = bytes.len(),
            n_trees = self.trees.len(),
            "model saved"
        );

        Ok(())
    }

    /// Load a model from a binary file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RsfError::ReadModel`] | file read failed |
    /// | [`RsfError::DeserializeModel`] | bincode decoding failed |
    /// | [`RsfError::IncompatibleModelVersion`] | format version mismatch |
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RsfError> {
        let path = path.as_ref();

        let bytes = std::fs::read(path).map_err(|source| RsfError::ReadModel {
            path: path.to_path_buf(),
            source,
        })?;

        let envelope: ModelEnvelope =
            bincode::deserialize(&bytes).map_err(|source| RsfError::DeserializeModel {
                path: path.to_path_buf(),
                source,
            })?;

        if envelope.format_version != FORMAT_VERSION {
            return Err(RsfError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found: envelope.format_version,
                path: path.to_path_buf(),
            });
        }

        debug!(
            n_trees = envelope.n_trees,
            n_features = envelope.n_features,
            timeline_len = envelope.timeline_len,
            "model loaded"
        );

        Ok(envelope.forest)
    }
}
