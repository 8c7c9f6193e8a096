//! Contract between the forest and the single-tree collaborator.
//!
//! The forest never looks inside a tree. It asks a [`TreeGrower`] to grow one
//! tree per bootstrap set and consumes the result through [`HazardTree`]:
//! crisp CHF prediction, fuzzy prediction, and the two fuzzy tables used by
//! the ensemble aggregate.

use crate::error::RsfError;
use crate::fuzzy::{FuzzyPositions, FuzzyTable};
use crate::labels::SurvivalLabels;
use crate::timeline::Timeline;

/// Everything a grower needs to build one ensemble member.
///
/// `features` and `labels` are the full training set, shared read-only by all
/// concurrent builds; `rows` is this member's bootstrap multiset.
#[derive(Debug, Clone, Copy)]
pub struct GrowRequest<'a> {
    /// Row-major training features.
    pub features: &'a [Vec<f64>],
    /// Training labels, aligned with `features`.
    pub labels: &'a SurvivalLabels,
    /// Bootstrap rows to grow on (may repeat).
    pub rows: &'a [usize],
    /// Feature columns this tree may split on.
    pub feature_subset: &'a [usize],
    /// Total feature count of each sample.
    pub n_features: usize,
    /// Minimum rows on each side of a split.
    pub min_leaf: usize,
    /// Minimum distinct event times on each side of a split.
    pub unique_deaths: usize,
    /// Seed for the tree's own randomness.
    pub seed: u64,
    /// Shared time axis for hazard outputs.
    pub timeline: &'a Timeline,
}

/// Builds one survival tree from a [`GrowRequest`].
pub trait TreeGrower: Sync {
    /// The tree type produced.
    type Tree: HazardTree;

    /// Grow one tree.
    ///
    /// # Errors
    ///
    /// Any error marks this ensemble member invalid, except errors for which
    /// [`RsfError::is_fatal`] holds, which abort the fit.
    fn grow(&self, request: &GrowRequest<'_>) -> Result<Self::Tree, RsfError>;
}

/// A grown survival tree, as consumed by the forest.
pub trait HazardTree: Send + Sync {
    /// `false` when the tree cannot produce meaningful predictions.
    fn prediction_possible(&self) -> bool;

    /// Number of features expected in each sample.
    fn n_features(&self) -> usize;

    /// Cumulative hazard for `sample`, aligned with the forest timeline.
    ///
    /// # Errors
    ///
    /// Returns [`RsfError::PredictionFeatureMismatch`] on a wrong-width sample.
    fn predict_chf(&self, sample: &[f64]) -> Result<Vec<f64>, RsfError>;

    /// Walk the tree with fuzzy membership, pushing contributions into `traversal`.
    ///
    /// # Errors
    ///
    /// Returns [`RsfError::PredictionFeatureMismatch`] on a wrong-width sample.
    fn predict_fuzzy(&self, sample: &[f64], traversal: &mut FuzzyTraversal)
    -> Result<(), RsfError>;

    /// Per-node hazard contributions for every training row (`U_s`).
    fn fuzzy_table(&self) -> &FuzzyTable;

    /// Per-node fuzzy membership positions for every training row (`fuzzy_pos`).
    fn fuzzy_positions(&self) -> &FuzzyPositions;

    /// Fuzzy contributions of `sample` from a fresh traversal.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`HazardTree::predict_fuzzy`].
    fn fuzzy_contributions(&self, sample: &[f64]) -> Result<Vec<f64>, RsfError> {
        let mut traversal = FuzzyTraversal::new(0);
        self.predict_fuzzy(sample, &mut traversal)?;
        Ok(traversal.into_contributions())
    }

    /// Scalar fuzzy score of `sample`: the mean of its contributions, 0 when there are none.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`HazardTree::predict_fuzzy`].
    fn fuzzy_score(&self, sample: &[f64]) -> Result<f64, RsfError> {
        let contributions = self.fuzzy_contributions(sample)?;
        if contributions.is_empty() {
            return Ok(0.0);
        }
        Ok(contributions.iter().sum::<f64>() / contributions.len() as f64)
    }
}

/// Recursive state threaded through one fuzzy tree walk.
///
/// Tracks the current depth and the product of memberships along the path;
/// a fresh context is created for every top-level prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyTraversal {
    depth: usize,
    weight: f64,
    contributions: Vec<f64>,
}

impl FuzzyTraversal {
    /// Start a walk at `depth_start` with unit weight and no contributions.
    #[must_use]
    pub fn new(depth_start: usize) -> Self {
        Self {
            depth: depth_start,
            weight: 1.0,
            contributions: Vec::new(),
        }
    }

    /// Current depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Product of memberships from the root to the current node.
    #[must_use]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Run `visit` one level deeper with the weight scaled by `membership`.
    ///
    /// Depth and weight are restored afterwards; contributions are kept.
    pub fn descend<R>(&mut self, membership: f64, visit: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.weight;
        self.weight *= membership;
        self.depth += 1;
        let out = visit(self);
        self.depth -= 1;
        self.weight = saved;
        out
    }

    /// Record `value` scaled by the current path weight.
    pub fn contribute(&mut self, value: f64) {
        self.contributions.push(self.weight * value);
    }

    /// Contributions recorded so far.
    #[must_use]
    pub fn contributions(&self) -> &[f64] {
        &self.contributions
    }

    /// Consume the context and return its contributions.
    #[must_use]
    pub fn into_contributions(self) -> Vec<f64> {
        self.contributions
    }
}
