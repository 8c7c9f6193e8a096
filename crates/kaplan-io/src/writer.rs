//! JSON result writer for fit and prediction outputs.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::{ExperimentName, SampleId};

/// Summary of one training run, as recorded in `{experiment}_fit.json`.
///
/// Holds plain values so the writer has no dependency on `kaplan-rsf`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FitSummary {
    /// Number of training samples.
    pub n_samples: usize,
    /// Feature column names, in model order.
    pub feature_names: Vec<String>,
    /// Trees requested.
    pub n_estimators: usize,
    /// Trees kept in the ensemble.
    pub n_accepted: usize,
    /// Trees discarded during training.
    pub n_rejected: usize,
    /// Features offered to each tree.
    pub feature_subset_size: usize,
    /// Worker count used for tree building.
    pub n_jobs: usize,
    /// Forest seed, when one was supplied.
    pub random_state: Option<u64>,
    /// Number of points on the prediction timeline.
    pub timeline_len: usize,
    /// Name of the out-of-bag metric, if one was evaluated.
    pub oob_metric: Option<String>,
    /// Out-of-bag score, if defined.
    pub oob_score: Option<f64>,
    /// Samples with at least one out-of-bag tree.
    pub oob_defined: usize,
    /// Concordance of the fuzzy aggregate against the training labels.
    pub fuzzy_concordance: Option<f64>,
    /// Samples with a non-zero fuzzy aggregate.
    pub fuzzy_informative: usize,
}

/// Writes fit summaries and predictions to JSON files.
///
/// Creates the output directory on construction if it does not exist.
/// Output files are named `{experiment}_fit.json` and
/// `{experiment}_predict.json`.
pub struct ResultWriter {
    output_dir: PathBuf,
    experiment: ExperimentName,
}

impl ResultWriter {
    /// Create a new writer targeting the given directory and experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display(), experiment = %experiment))]
    pub fn new(output_dir: &Path, experiment: ExperimentName) -> Result<Self, IoError> {
        fs::create_dir_all(output_dir).map_err(|e| IoError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            experiment,
        })
    }

    fn artifact_path(&self, suffix: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{suffix}", self.experiment.as_str()))
    }

    fn write_json(path: &Path, artifact: &impl Serialize) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(artifact).map_err(|e| IoError::SerializeJson {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, json).map_err(|e| IoError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write a training summary to `{experiment}_fit.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all)]
    pub fn write_fit(&self, summary: &FitSummary) -> Result<PathBuf, IoError> {
        let path = self.artifact_path("fit.json");
        let artifact = FitArtifact {
            experiment: self.experiment.as_str(),
            summary,
        };
        Self::write_json(&path, &artifact)?;
        info!(path = %path.display(), "fit summary written");
        Ok(path)
    }

    /// Write per-sample predictions to `{experiment}_predict.json`.
    ///
    /// `chf[i]` and `fuzzy[i]` belong to `sample_ids[i]`; every CHF row is
    /// aligned with `timeline`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::PredictionLengthMismatch`] | the three per-sample slices differ in length |
    /// | [`IoError::WriteFile`] | the file cannot be written |
    #[instrument(skip_all, fields(n_samples = sample_ids.len()))]
    pub fn write_predictions(
        &self,
        sample_ids: &[SampleId],
        timeline: &[f64],
        chf: &[Vec<f64>],
        fuzzy: &[f64],
    ) -> Result<PathBuf, IoError> {
        if chf.len() != sample_ids.len() || fuzzy.len() != sample_ids.len() {
            return Err(IoError::PredictionLengthMismatch {
                n_ids: sample_ids.len(),
                n_chf: chf.len(),
                n_fuzzy: fuzzy.len(),
            });
        }

        let path = self.artifact_path("predict.json");
        let predictions: Vec<PredictionEntry<'_>> = sample_ids
            .iter()
            .zip(chf)
            .zip(fuzzy)
            .map(|((id, chf), &fuzzy_score)| PredictionEntry {
                sample_id: id.as_str(),
                fuzzy_score,
                chf,
            })
            .collect();

        let artifact = PredictArtifact {
            experiment: self.experiment.as_str(),
            n_samples: sample_ids.len(),
            timeline,
            predictions,
        };
        Self::write_json(&path, &artifact)?;

        info!(path = %path.display(), "predictions written");
        Ok(path)
    }

    /// Return the path where the model binary should be saved.
    ///
    /// Does not write anything; just computes `{output_dir}/{experiment}_model.bin`.
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.artifact_path("model.bin")
    }
}

#[derive(Serialize)]
struct FitArtifact<'a> {
    experiment: &'a str,
    #[serde(flatten)]
    summary: &'a FitSummary,
}

#[derive(Serialize)]
struct PredictArtifact<'a> {
    experiment: &'a str,
    n_samples: usize,
    timeline: &'a [f64],
    predictions: Vec<PredictionEntry<'a>>,
}

#[derive(Serialize)]
struct PredictionEntry<'a> {
    sample_id: &'a str,
    fuzzy_score: f64,
    chf: &'a [f64],
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn writer(dir: &Path, name: &str) -> ResultWriter {
        ResultWriter::new(dir, ExperimentName::new(name.into()).unwrap()).unwrap()
    }

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn write_fit_json_structure() {
        let dir = TempDir::new().unwrap();
        let summary = FitSummary {
            n_samples: 40,
            feature_names: vec!["age".into(), "dose".into()],
            n_estimators: 10,
            n_accepted: 9,
            n_rejected: 1,
            feature_subset_size: 1,
            n_jobs: 2,
            random_state: Some(7),
            timeline_len: 31,
            oob_metric: Some("harrell_c".into()),
            oob_score: Some(0.71),
            oob_defined: 40,
            fuzzy_concordance: None,
            fuzzy_informative: 38,
        };
        let path = writer(dir.path(), "fit_test").write_fit(&summary).unwrap();
        assert_eq!(path, dir.path().join("fit_test_fit.json"));

        let content = read_json(&path);
        assert_eq!(content["experiment"], "fit_test");
        assert_eq!(content["n_accepted"], 9);
        assert_eq!(content["random_state"], 7);
        assert_eq!(content["oob_metric"], "harrell_c");
        assert!(content["fuzzy_concordance"].is_null());
        assert_eq!(content["feature_names"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn write_predictions_json_structure() {
        let dir = TempDir::new().unwrap();
        let ids = vec![SampleId::new("P1".into()), SampleId::new("P2".into())];
        let timeline = [1.0, 2.0, 3.0];
        let chf = vec![vec![0.0, 0.1, 0.4], vec![0.2, 0.5, 0.9]];
        let path = writer(dir.path(), "pred")
            .write_predictions(&ids, &timeline, &chf, &[0.3, 1.2])
            .unwrap();

        let content = read_json(&path);
        assert_eq!(content["n_samples"], 2);
        assert_eq!(content["timeline"].as_array().unwrap().len(), 3);
        let predictions = content["predictions"].as_array().unwrap();
        assert_eq!(predictions[1]["sample_id"], "P2");
        assert_eq!(predictions[1]["chf"][2], 0.9);
        assert_eq!(predictions[0]["fuzzy_score"], 0.3);
    }

    #[test]
    fn write_predictions_length_mismatch() {
        let dir = TempDir::new().unwrap();
        let ids = vec![SampleId::new("P1".into())];
        let err = writer(dir.path(), "bad")
            .write_predictions(&ids, &[1.0], &[], &[0.0])
            .unwrap_err();
        assert!(matches!(
            err,
            IoError::PredictionLengthMismatch { n_ids: 1, n_chf: 0, n_fuzzy: 1 }
        ));
    }

    #[test]
    fn creates_nested_output_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested").join("deep");
        writer(&nested, "nested_test")
            .write_fit(&FitSummary::default())
            .unwrap();
        assert!(nested.join("nested_test_fit.json").exists());
    }

    #[test]
    fn model_path_uses_experiment_name() {
        let dir = TempDir::new().unwrap();
        let w = writer(dir.path(), "cohort");
        assert_eq!(w.model_path(), dir.path().join("cohort_model.bin"));
        assert!(!w.model_path().exists());
    }
}
