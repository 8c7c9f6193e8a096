//! CSV input and JSON result artifacts for the kaplan survival forest pipeline.
//!
//! Reads right-censored survival data (sample ID, time, event, features)
//! from CSV with full validation and writes fit summaries and per-sample
//! predictions as JSON. Has no dependency on `kaplan-rsf`: datasets expose
//! plain `Vec<Vec<f64>>` tables and the writer accepts primitives.

mod domain;
mod error;
mod reader;
mod writer;

pub use domain::{ExperimentName, SampleId, SurvivalDataset};
pub use error::IoError;
pub use reader::{DEFAULT_EVENT_COLUMN, DEFAULT_TIME_COLUMN, SurvivalReader};
pub use writer::{FitSummary, ResultWriter};
