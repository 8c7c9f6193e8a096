use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use kaplan_io::{
    DEFAULT_EVENT_COLUMN, DEFAULT_TIME_COLUMN, ExperimentName, FitSummary, ResultWriter,
    SurvivalDataset, SurvivalReader,
};
use kaplan_rsf::{BootstrapMode, ForestConfig, NJobs, SurvivalForest, SurvivalTree};

#[derive(Parser)]
#[command(name = "kaplan")]
#[command(about = "Random survival forests with fuzzy ensemble aggregation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Threads for batch prediction (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Names of the label columns in the input CSV.
#[derive(Args, Debug, Clone)]
struct LabelColumns {
    /// Header of the survival time column
    #[arg(long, default_value = DEFAULT_TIME_COLUMN)]
    time_column: String,

    /// Header of the event indicator column (1 = event, 0 = censored)
    #[arg(long, default_value = DEFAULT_EVENT_COLUMN)]
    event_column: String,
}

#[derive(Subcommand)]
enum Command {
    /// Train a survival forest and report out-of-bag performance
    Fit {
        /// Path to the labelled input CSV file
        #[arg(long)]
        data: PathBuf,

        /// Experiment name for output files (must match [a-zA-Z0-9_-]+)
        #[arg(long)]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Number of trees to grow
        #[arg(long, default_value_t = 100)]
        n_estimators: usize,

        /// Minimum samples per leaf
        #[arg(long, default_value_t = 3)]
        min_leaf: usize,

        /// Minimum distinct event times per child of a split
        #[arg(long, default_value_t = 3)]
        unique_deaths: usize,

        /// Tree-building workers; -1 uses all cores but one
        #[arg(long, allow_hyphen_values = true)]
        n_jobs: Option<i64>,

        /// RNG seed for reproducibility
        #[arg(long)]
        random_state: Option<u64>,

        /// Grow every tree on the full training set
        #[arg(long, default_value_t = false)]
        no_bootstrap: bool,

        /// Skip the out-of-bag concordance score
        #[arg(long, default_value_t = false)]
        no_oob_score: bool,

        #[command(flatten)]
        columns: LabelColumns,
    },

    /// Predict cumulative hazard and fuzzy risk for new samples
    Predict {
        /// Path to the trained model binary
        #[arg(long)]
        model: PathBuf,

        /// Path to the input CSV file (label columns optional)
        #[arg(long)]
        data: PathBuf,

        /// Experiment name for output files
        #[arg(long)]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        #[command(flatten)]
        columns: LabelColumns,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct FitOutput {
    experiment: String,
    n_samples: usize,
    n_features: usize,
    n_trees: usize,
    n_rejected: usize,
    oob_score: Option<f64>,
    fuzzy_concordance: Option<f64>,
    model_path: PathBuf,
}

#[derive(Serialize)]
struct PredictOutput {
    experiment: String,
    n_samples: usize,
    model_n_trees: usize,
    model_n_features: usize,
    timeline_len: usize,
}

fn read_dataset(
    path: &Path,
    columns: &LabelColumns,
    require_labels: bool,
) -> Result<SurvivalDataset> {
    let mut reader = SurvivalReader::new(path)
        .with_time_column(columns.time_column.clone())
        .with_event_column(columns.event_column.clone());
    if require_labels {
        reader = reader.require_labels();
    }
    let dataset = reader
        .read()
        .with_context(|| format!("failed to read {}", path.display()))?;
    info!(
        n_samples = dataset.n_samples(),
        n_features = dataset.n_features(),
        "dataset loaded"
    );
    Ok(dataset)
}

fn fit_summary(forest: &SurvivalForest, dataset: &SurvivalDataset) -> FitSummary {
    let meta = forest.metadata();
    let oob = forest.oob_report().ok();
    let fuzzy = forest.fuzzy_aggregate().ok();
    FitSummary {
        n_samples: meta.n_samples,
        feature_names: dataset.feature_names().to_vec(),
        n_estimators: meta.n_estimators,
        n_accepted: meta.n_accepted,
        n_rejected: meta.n_rejected,
        feature_subset_size: meta.feature_subset_size,
        n_jobs: meta.n_jobs,
        random_state: meta.random_state,
        timeline_len: forest.timeline().len(),
        oob_metric: oob.and_then(|r| r.metric.clone()),
        oob_score: oob.and_then(|r| r.score),
        oob_defined: oob.map_or(0, |r| r.ensemble.n_defined()),
        fuzzy_concordance: fuzzy.and_then(|f| f.concordance()),
        fuzzy_informative: fuzzy.map_or(0, |f| f.n_informative()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Prediction batches run on the global pool; training sizes its own via --n-jobs.
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Fit {
            data,
            experiment,
            output_dir,
            n_estimators,
            min_leaf,
            unique_deaths,
            n_jobs,
            random_state,
            no_bootstrap,
            no_oob_score,
            columns,
        } => {
            let experiment_name = ExperimentName::new(experiment.clone())?;

            // 1. Read labelled data
            let dataset = read_dataset(&data, &columns, true)?;
            let labels = dataset
                .labels()
                .context("input CSV has no label columns")?;

            // 2. Configure and fit
            let bootstrap = if no_bootstrap {
                BootstrapMode::Identity
            } else {
                BootstrapMode::WithReplacement
            };
            let mut config = ForestConfig::new(n_estimators)?
                .with_min_leaf(min_leaf)
                .with_unique_deaths(unique_deaths)
                .with_n_jobs(NJobs::from_raw(n_jobs)?)
                .with_random_state(random_state)
                .with_bootstrap(bootstrap);
            if no_oob_score {
                config = config.without_oob_score();
            }

            let forest = config
                .fit(dataset.features(), labels)
                .context("forest training failed")?;
            if forest.n_trees() == 0 {
                warn!("no tree could be grown; the saved model cannot predict");
            }

            // 3. Save model and fit summary
            let writer = ResultWriter::new(&output_dir, experiment_name)?;
            let model_path = writer.model_path();
            forest.save(&model_path).context("failed to save model")?;
            let summary = fit_summary(&forest, &dataset);
            writer.write_fit(&summary)?;

            // 4. Print summary
            let output = FitOutput {
                experiment,
                n_samples: summary.n_samples,
                n_features: dataset.n_features(),
                n_trees: summary.n_accepted,
                n_rejected: summary.n_rejected,
                oob_score: summary.oob_score,
                fuzzy_concordance: summary.fuzzy_concordance,
                model_path,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Predict {
            model,
            data,
            experiment,
            output_dir,
            columns,
        } => {
            let experiment_name = ExperimentName::new(experiment.clone())?;

            // 1. Load model
            let forest = SurvivalForest::<SurvivalTree>::load(&model)
                .with_context(|| format!("failed to load model {}", model.display()))?;
            info!(
                n_trees = forest.n_trees(),
                n_features = forest.n_features(),
                timeline_len = forest.timeline().len(),
                "model loaded"
            );

            // 2. Read samples; label columns, if present, are ignored
            let dataset = read_dataset(&data, &columns, false)?;

            // 3. Predict
            let chf = forest
                .predict(dataset.features())
                .context("CHF prediction failed")?;
            let fuzzy = forest
                .predict_fuzzy_batch(dataset.features())
                .context("fuzzy prediction failed")?;

            // 4. Write predictions JSON
            let writer = ResultWriter::new(&output_dir, experiment_name)?;
            writer.write_predictions(
                dataset.sample_ids(),
                forest.timeline().points(),
                &chf,
                &fuzzy,
            )?;

            // 5. Print summary
            let output = PredictOutput {
                experiment,
                n_samples: dataset.n_samples(),
                model_n_trees: forest.n_trees(),
                model_n_features: forest.n_features(),
                timeline_len: forest.timeline().len(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
