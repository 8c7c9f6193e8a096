//! CSV survival data reader with full input validation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::{SampleId, SurvivalDataset};

/// Default header name of the survival time column.
pub const DEFAULT_TIME_COLUMN: &str = "time";
/// Default header name of the event indicator column.
pub const DEFAULT_EVENT_COLUMN: &str = "event";

/// Reads survival features and labels from a CSV file.
///
/// Expected CSV format:
/// - Header row required; the first column is the sample ID
/// - `id,time,event,feature1,...,featureN` (label columns may appear anywhere after the ID)
/// - Every column other than the ID, time and event columns is a feature
///
/// Label columns are optional: a file with neither yields a dataset without
/// labels, which is enough for prediction. A file with only one of the two is
/// rejected.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::MissingColumn`] | One label column without the other, or no labels under [`SurvivalReader::require_labels`] |
/// | [`IoError::NoFeatureColumns`] | Only ID and label columns |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::NonFiniteValue`] | Cell is NaN, Inf, or unparseable float |
/// | [`IoError::DuplicateSampleId`] | Same sample ID appears twice |
pub struct SurvivalReader {
    path: PathBuf,
    time_column: String,
    event_column: String,
    labels_required: bool,
}

/// Where each role lives in the header.
struct ColumnLayout {
    label_columns: Option<(usize, usize)>,
    feature_columns: Vec<usize>,
}

impl SurvivalReader {
    /// Create a new reader for the given CSV file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            time_column: DEFAULT_TIME_COLUMN.to_string(),
            event_column: DEFAULT_EVENT_COLUMN.to_string(),
            labels_required: false,
        }
    }

    /// Read survival times from the column with this header name.
    #[must_use]
    pub fn with_time_column(mut self, name: impl Into<String>) -> Self {
        self.time_column = name.into();
        self
    }

    /// Read event indicators from the column with this header name.
    #[must_use]
    pub fn with_event_column(mut self, name: impl Into<String>) -> Self {
        self.event_column = name.into();
        self
    }

    /// Fail with [`IoError::MissingColumn`] when the file has no label columns.
    #[must_use]
    pub fn require_labels(mut self) -> Self {
        self.labels_required = true;
        self
    }

    fn layout(&self, header: &csv::StringRecord) -> Result<ColumnLayout, IoError> {
        let position = |name: &str| header.iter().skip(1).position(|h| h == name).map(|i| i + 1);
        let time = position(&self.time_column);
        let event = position(&self.event_column);

        let label_columns = match (time, event) {
            (Some(t), Some(e)) => Some((t, e)),
            (None, None) if !self.labels_required => None,
            (None, _) => {
                return Err(IoError::MissingColumn {
                    path: self.path.clone(),
                    column: self.time_column.clone(),
                });
            }
            (Some(_), None) => {
                return Err(IoError::MissingColumn {
                    path: self.path.clone(),
                    column: self.event_column.clone(),
                });
            }
        };

        let feature_columns: Vec<usize> = (1..header.len())
            .filter(|&c| label_columns.is_none_or(|(t, e)| c != t && c != e))
            .collect();
        if feature_columns.is_empty() {
            return Err(IoError::NoFeatureColumns {
                path: self.path.clone(),
            });
        }

        Ok(ColumnLayout { label_columns, feature_columns })
    }

    fn parse_cell(
        &self,
        record: &csv::StringRecord,
        header: &csv::StringRecord,
        row_index: usize,
        col: usize,
    ) -> Result<f64, IoError> {
        let raw = record.get(col).unwrap_or("");
        let non_finite = || IoError::NonFiniteValue {
            path: self.path.clone(),
            row_index,
            column: header.get(col).unwrap_or("").to_string(),
            raw: raw.to_string(),
        };
        let value: f64 = raw.trim().parse().map_err(|_| non_finite())?;
        if !value.is_finite() {
            return Err(non_finite());
        }
        Ok(value)
    }

    /// Read and validate the CSV file, returning a [`SurvivalDataset`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<SurvivalDataset, IoError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // flexible(true) so that InconsistentRowLength fires instead of CsvParse.
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let header = rdr
            .headers()
            .map_err(|e| IoError::CsvParse {
                path: self.path.clone(),
                offset: e.position().map_or(0, |p| p.byte()),
                source: e,
            })?
            .clone();
        let expected_cols = header.len();
        let layout = self.layout(&header)?;
        debug!(
            expected_cols,
            n_features = layout.feature_columns.len(),
            has_labels = layout.label_columns.is_some(),
            "read CSV header"
        );

        let feature_names: Vec<String> = layout
            .feature_columns
            .iter()
            .map(|&c| header.get(c).unwrap_or("").to_string())
            .collect();

        let mut sample_ids = Vec::new();
        let mut features = Vec::new();
        let mut labels = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| IoError::CsvParse {
                path: self.path.clone(),
                offset: e.position().map_or(0, |p| p.byte()),
                source: e,
            })?;

            let id = record.get(0).unwrap_or("").to_string();
            if record.len() != expected_cols {
                return Err(IoError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    sample_id: id,
                    expected: expected_cols,
                    got: record.len(),
                });
            }

            if let Some(&first_row) = seen.get(&id) {
                return Err(IoError::DuplicateSampleId {
                    path: self.path.clone(),
                    sample_id: id,
                    first_row,
                    second_row: row_index,
                });
            }
            seen.insert(id.clone(), row_index);

            let row = layout
                .feature_columns
                .iter()
                .map(|&c| self.parse_cell(&record, &header, row_index, c))
                .collect::<Result<Vec<f64>, IoError>>()?;

            if let Some((t, e)) = layout.label_columns {
                let time = self.parse_cell(&record, &header, row_index, t)?;
                let event = self.parse_cell(&record, &header, row_index, e)?;
                labels.push(vec![time, event]);
            }

            sample_ids.push(SampleId::new(id));
            features.push(row);
        }

        if sample_ids.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        info!(
            n_samples = sample_ids.len(),
            n_features = feature_names.len(),
            "survival dataset loaded"
        );

        let labels = layout.label_columns.map(|_| labels);
        Ok(SurvivalDataset::new(sample_ids, feature_names, features, labels))
    }
}
