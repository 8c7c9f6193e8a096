//! Random survival forests: bootstrap, grow, evaluate out-of-bag, predict.
//!
//! Builds an ensemble of survival trees that predicts a cumulative hazard
//! function over a discretized timeline from right-censored training data.
//! Trees are grown in parallel via rayon through the [`TreeGrower`] /
//! [`HazardTree`] contract, scored out-of-bag with a pluggable
//! [`SurvivalMetric`], and combined either by crisp averaging or by the
//! membership-weighted fuzzy aggregate.

mod bootstrap;
mod concordance;
mod config;
mod error;
mod forest;
mod fuzzy;
mod grower;
mod jobs;
mod labels;
mod node;
mod oob;
mod predict;
mod result;
mod serialize;
mod split;
mod timeline;
mod tree;

#[cfg(test)]
mod testing;

pub use bootstrap::{BootstrapMode, BootstrapSet, draw_bootstrap_samples, tree_seeds};
pub use concordance::{HarrellConcordance, SurvivalMetric, concordance_index};
pub use config::ForestConfig;
pub use error::RsfError;
pub use forest::SurvivalForest;
pub use fuzzy::{
    Branch, ColumnKind, FuzzyAggregate, FuzzyColumn, FuzzyPositions, FuzzyTable,
    fuzzy_ensemble_chf,
};
pub use grower::{FuzzyTraversal, GrowRequest, HazardTree, TreeGrower};
pub use jobs::NJobs;
pub use labels::{SurvivalLabel, SurvivalLabels};
pub use node::{FeatureIndex, Node, NodeIndex};
pub use oob::{OobEnsemble, OobReport, compute_oob_chf, compute_oob_ensembles, score_oob};
pub use result::TrainingMetadata;
pub use timeline::{MAX_TIMELINE_POINTS, Timeline};
pub use tree::{LogRankGrower, SurvivalTree, first_branch_membership};
