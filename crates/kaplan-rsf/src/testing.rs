//! Hand-built trees and growers for exercising the ensemble layer.

use crate::error::RsfError;
use crate::fuzzy::{FuzzyPositions, FuzzyTable};
use crate::grower::{FuzzyTraversal, GrowRequest, HazardTree, TreeGrower};

/// A tree whose outputs are fixed at construction.
#[derive(Debug, Clone)]
pub(crate) struct StubTree {
    pub(crate) chf: Vec<f64>,
    pub(crate) contributions: Vec<f64>,
    pub(crate) valid: bool,
    pub(crate) n_features: usize,
    pub(crate) rows: Vec<usize>,
    pub(crate) table: FuzzyTable,
    pub(crate) positions: FuzzyPositions,
}

impl StubTree {
    pub(crate) fn with_table(table: FuzzyTable) -> Self {
        let positions = FuzzyPositions::new(table.n_rows());
        Self {
            chf: Vec::new(),
            contributions: Vec::new(),
            valid: true,
            n_features: 1,
            rows: Vec::new(),
            table,
            positions,
        }
    }

    pub(crate) fn with_outputs(chf: Vec<f64>, contributions: Vec<f64>) -> Self {
        Self {
            chf,
            contributions,
            ..Self::with_table(FuzzyTable::new(0))
        }
    }
}

impl HazardTree for StubTree {
    fn prediction_possible(&self) -> bool {
        self.valid
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_chf(&self, sample: &[f64]) -> Result<Vec<f64>, RsfError> {
        if sample.len() != self.n_features {
            return Err(RsfError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }
        Ok(self.chf.clone())
    }

    fn predict_fuzzy(
        &self,
        sample: &[f64],
        traversal: &mut FuzzyTraversal,
    ) -> Result<(), RsfError> {
        if sample.len() != self.n_features {
            return Err(RsfError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }
        for &c in &self.contributions {
            traversal.contribute(c);
        }
        Ok(())
    }

    fn fuzzy_table(&self) -> &FuzzyTable {
        &self.table
    }

    fn fuzzy_positions(&self) -> &FuzzyPositions {
        &self.positions
    }
}

/// Grower that records its bootstrap rows and decides validity with `verdict`.
///
/// The produced tree predicts a flat CHF equal to the first bootstrap row
/// index and contributes that same value to fuzzy predictions.
pub(crate) struct StubGrower {
    pub(crate) verdict: fn(&GrowRequest<'_>) -> Result<bool, RsfError>,
}

impl TreeGrower for StubGrower {
    type Tree = StubTree;

    fn grow(&self, request: &GrowRequest<'_>) -> Result<StubTree, RsfError> {
        let valid = (self.verdict)(request)?;
        let marker = request.rows.first().copied().unwrap_or(0) as f64;
        let n_rows = request.labels.len();
        Ok(StubTree {
            chf: vec![marker; request.timeline.len()],
            contributions: vec![marker],
            valid,
            n_features: request.n_features,
            rows: request.rows.to_vec(),
            table: FuzzyTable::new(n_rows),
            positions: FuzzyPositions::new(n_rows),
        })
    }
}
