//! Right-censored survival labels.

use crate::error::RsfError;

/// Observed (time, event) pair for one training sample.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SurvivalLabel {
    /// Event or censoring time.
    pub time: f64,
    /// `true` when the event was observed, `false` when censored.
    pub event: bool,
}

/// Validated label column for a training set, one entry per sample.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SurvivalLabels {
    labels: Vec<SurvivalLabel>,
}

impl SurvivalLabels {
    /// Validate a two-column `(time, event)` label table.
    ///
    /// Column 0 must hold finite times, column 1 must hold exactly `0.0` or `1.0`.
    ///
    /// # Errors
    ///
    /// Returns [`RsfError::InvalidLabelFormat`] on the first offending row, or
    /// when the table is empty.
    pub fn from_table(table: &[Vec<f64>]) -> Result<Self, RsfError> {
        if table.is_empty() {
            return Err(RsfError::InvalidLabelFormat {
                row: 0,
                reason: "label table has no rows".to_string(),
            });
        }
        let mut labels = Vec::with_capacity(table.len());
        for (row, values) in table.iter().enumerate() {
            if values.len() != 2 {
                return Err(RsfError::InvalidLabelFormat {
                    row,
                    reason: format!("expected 2 columns (time, event), got {}", values.len()),
                });
            }
            let time = values[0];
            if !time.is_finite() {
                return Err(RsfError::InvalidLabelFormat {
                    row,
                    reason: format!("time must be a finite number, got {time}"),
                });
            }
            let event = match values[1] {
                v if v == 0.0 => false,
                v if v == 1.0 => true,
                other => {
                    return Err(RsfError::InvalidLabelFormat {
                        row,
                        reason: format!("event indicator must be 0 or 1, got {other}"),
                    });
                }
            };
            labels.push(SurvivalLabel { time, event });
        }
        Ok(Self { labels })
    }

    /// Build labels from already-typed pairs.
    ///
    /// # Errors
    ///
    /// Returns [`RsfError::InvalidLabelFormat`] when empty or when a time is not finite.
    pub fn from_pairs(pairs: &[(f64, bool)]) -> Result<Self, RsfError> {
        if pairs.is_empty() {
            return Err(RsfError::InvalidLabelFormat {
                row: 0,
                reason: "label table has no rows".to_string(),
            });
        }
        let mut labels = Vec::with_capacity(pairs.len());
        for (row, &(time, event)) in pairs.iter().enumerate() {
            if !time.is_finite() {
                return Err(RsfError::InvalidLabelFormat {
                    row,
                    reason: format!("time must be a finite number, got {time}"),
                });
            }
            labels.push(SurvivalLabel { time, event });
        }
        Ok(Self { labels })
    }

    /// Return the number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Return `true` when there are no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Return the label of a single sample.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&SurvivalLabel> {
        self.labels.get(index)
    }

    /// Return all labels as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[SurvivalLabel] {
        &self.labels
    }

    /// Return the event/censoring times in sample order.
    #[must_use]
    pub fn times(&self) -> Vec<f64> {
        self.labels.iter().map(|l| l.time).collect()
    }

    /// Return the event indicators in sample order.
    #[must_use]
    pub fn events(&self) -> Vec<bool> {
        self.labels.iter().map(|l| l.event).collect()
    }

    /// Return the smallest and largest observed time.
    #[must_use]
    pub fn time_range(&self) -> (f64, f64) {
        self.labels
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), l| {
                (lo.min(l.time), hi.max(l.time))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_table() {
        let table = vec![vec![5.0, 1.0], vec![7.5, 0.0], vec![2.0, 1.0]];
        let labels = SurvivalLabels::from_table(&table).unwrap();
        assert_eq!(labels.len(), 3);
        assert!(labels.get(0).unwrap().event);
        assert!(!labels.get(1).unwrap().event);
        assert_eq!(labels.time_range(), (2.0, 7.5));
    }

    #[test]
    fn rejects_wrong_column_count() {
        let table = vec![vec![5.0, 1.0], vec![7.0, 0.0, 3.0]];
        let err = SurvivalLabels::from_table(&table).unwrap_err();
        assert!(matches!(err, RsfError::InvalidLabelFormat { row: 1, .. }));
    }

    #[test]
    fn rejects_non_binary_event() {
        let table = vec![vec![5.0, 0.5]];
        let err = SurvivalLabels::from_table(&table).unwrap_err();
        assert!(matches!(err, RsfError::InvalidLabelFormat { row: 0, .. }));
    }

    #[test]
    fn rejects_non_finite_time() {
        let table = vec![vec![1.0, 1.0], vec![f64::NAN, 1.0]];
        let err = SurvivalLabels::from_table(&table).unwrap_err();
        assert!(matches!(err, RsfError::InvalidLabelFormat { row: 1, .. }));
    }

    #[test]
    fn rejects_empty_table() {
        let err = SurvivalLabels::from_table(&[]).unwrap_err();
        assert!(matches!(err, RsfError::InvalidLabelFormat { .. }));
    }
}
