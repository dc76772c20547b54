//! Segment trainer CLI
//!
//! Fits, evaluates and inspects margin-band segmentation indexes.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use csv::WriterBuilder;
use lumen_segment_core::{
    pairwise_distances, to_dot, DotStyle, FixedOracle, GrownTree, IndexArtifact, Record, SegmentIndex,
    SegmentationConfig, Table, TreeGrowthOracle,
};
use lumen_segment_trainer::{
    derive_record, derive_table, Dataset, DatasetSchema, EntropyOracle, EvaluationParams, RawPayload,
    SegmentTrainer, DERIVED_FEATURES,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "segment-trainer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Margin-band segmentation trainer", long_about = None)]
struct Cli {
    /// Verbose logging (overridden by SEGMENT_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fit an index and save it
    Fit {
        /// Input CSV dataset path
        #[arg(short, long)]
        input: PathBuf,

        /// Segmentation config (TOML); defaults to all derived features
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output directory for index and hash
        #[arg(short, long, default_value = "models/segments")]
        output: PathBuf,

        /// Input is a raw export; derive features first
        #[arg(long)]
        raw: bool,

        /// CSV field delimiter
        #[arg(long, default_value = "|")]
        delimiter: char,

        /// Replay a grown tree (JSON) for every partition instead of the entropy baseline
        #[arg(long)]
        grown: Option<PathBuf>,

        /// Hold out this share of rows and report evaluation
        #[arg(long)]
        test_fraction: Option<f64>,

        /// Seed for deterministic shuffling
        #[arg(long, default_value = "42")]
        seed: i64,
    },

    /// Classify one record given as a JSON object
    Predict {
        /// Saved index path
        #[arg(short, long)]
        index: PathBuf,

        /// JSON object of feature values (or raw payload with --raw)
        record: String,

        /// Record is a raw payload; derive features first
        #[arg(long)]
        raw: bool,

        /// Stop at the first unmatched branch instead of imputing
        #[arg(long)]
        no_impute: bool,
    },

    /// Evaluate a saved index on a test CSV
    Evaluate {
        #[arg(short, long)]
        index: PathBuf,

        #[arg(short = 'f', long)]
        input: PathBuf,

        #[arg(long)]
        raw: bool,

        #[arg(long, default_value = "|")]
        delimiter: char,

        #[arg(long)]
        no_impute: bool,

        /// Write per-segment results as CSV
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List segment pairs by cutoff distance
    Distances {
        #[arg(short, long)]
        index: PathBuf,

        /// Number of most distant pairs to print
        #[arg(long, default_value = "20")]
        top: usize,
    },

    /// Export every partition tree as a Graphviz DOT file
    Render {
        #[arg(short, long)]
        index: PathBuf,

        #[arg(short, long, default_value = "models/segments/dot")]
        output: PathBuf,
    },
}

#[derive(Serialize)]
struct PredictionOutput {
    segment: u64,
    partition: String,
    path: String,
    cutoffs: Vec<f64>,
    problematic: bool,
    imputed: BTreeMap<String, String>,
    band: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Fit {
            input,
            config,
            output,
            raw,
            delimiter,
            grown,
            test_fraction,
            seed,
        } => fit(&input, config.as_deref(), &output, raw, delimiter, grown.as_deref(), test_fraction, seed),
        Commands::Predict {
            index,
            record,
            raw,
            no_impute,
        } => predict(&index, &record, raw, !no_impute),
        Commands::Evaluate {
            index,
            input,
            raw,
            delimiter,
            no_impute,
            report,
        } => evaluate(&index, &input, raw, delimiter, !no_impute, report.as_deref()),
        Commands::Distances { index, top } => distances(&index, top),
        Commands::Render { index, output } => render(&index, &output),
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("SEGMENT_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!("Failed to set tracing subscriber: {err}"))
}

fn delimiter_byte(delimiter: char) -> Result<u8> {
    u8::try_from(delimiter).with_context(|| format!("Delimiter '{delimiter}' is not a single byte"))
}

fn load_config(path: Option<&Path>) -> Result<SegmentationConfig> {
    match path {
        Some(path) => SegmentationConfig::load_from_file(path).context("Failed to load config"),
        None => Ok(SegmentationConfig::new(
            Vec::new(),
            DERIVED_FEATURES.iter().map(|f| f.to_string()).collect(),
            "gm",
        )),
    }
}

fn load_dataset(input: &Path, config: &SegmentationConfig, raw: bool, delimiter: char) -> Result<Dataset> {
    let delimiter = delimiter_byte(delimiter)?;
    if raw {
        let file = File::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
        let (table, _) = derive_table(file, delimiter).context("Failed to derive features")?;
        return Ok(Dataset::new(table));
    }
    let schema = DatasetSchema::from_config(config).with_delimiter(delimiter);
    Dataset::from_csv(input, &schema).context("Failed to load dataset")
}

fn load_index(path: &Path) -> Result<SegmentIndex> {
    let artifact = IndexArtifact::load_json(path)
        .with_context(|| format!("Failed to load index {}", path.display()))?;
    Ok(artifact.index)
}

fn load_oracle(grown: Option<&Path>) -> Result<Box<dyn TreeGrowthOracle>> {
    match grown {
        Some(path) => {
            let json = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
            let grown: GrownTree = serde_json::from_str(&json).context("Failed to parse grown tree")?;
            info!("Replaying grown tree from: {}", path.display());
            Ok(Box::new(FixedOracle::new(grown)))
        }
        None => Ok(Box::new(EntropyOracle)),
    }
}

#[allow(clippy::too_many_arguments)]
fn fit(
    input: &Path,
    config: Option<&Path>,
    output: &Path,
    raw: bool,
    delimiter: char,
    grown: Option<&Path>,
    test_fraction: Option<f64>,
    seed: i64,
) -> Result<()> {
    info!("Lumen Segment Trainer v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(config)?;
    let dataset = load_dataset(input, &config, raw, delimiter)?;
    info!("Loaded {} rows", dataset.len());

    let oracle = load_oracle(grown)?;
    let trainer = SegmentTrainer::new(config);

    let index = match test_fraction {
        Some(test_fraction) => {
            let params = EvaluationParams {
                test_fraction,
                seed,
                ..EvaluationParams::default()
            };
            trainer.fit_and_evaluate(&dataset, oracle.as_ref(), &params)?.0
        }
        None => trainer.fit(dataset.table(), oracle.as_ref())?,
    };

    fs::create_dir_all(output).context("Failed to create output directory")?;

    let artifact = IndexArtifact::new(index).context("Failed to serialize index")?;
    let index_path = output.join("index.json");
    artifact.save_json(&index_path).context("Failed to write index file")?;

    let hash_path = output.join("index.hash");
    fs::write(&hash_path, &artifact.index_hash).context("Failed to write hash file")?;

    info!("Index: {}", index_path.display());
    info!("Hash: {} ({})", hash_path.display(), artifact.index_hash);
    Ok(())
}

fn parse_record(json: &str, raw: bool) -> Result<Record> {
    if raw {
        let payload: RawPayload = serde_json::from_str(json).context("Failed to parse raw payload")?;
        return Ok(derive_record(&payload)?);
    }
    let fields: BTreeMap<String, String> = serde_json::from_str(json).context("Failed to parse record")?;
    Ok(fields
        .into_iter()
        .fold(Record::new(), |record, (feature, value)| record.with(feature, &value)))
}

fn predict(index_path: &Path, json: &str, raw: bool, impute: bool) -> Result<()> {
    let index = load_index(index_path)?;
    let record = parse_record(json, raw)?;

    let prediction = index.predict(&record, impute)?;
    let segment = prediction.segment;
    let output = PredictionOutput {
        segment: segment.id().0,
        partition: segment.partition().to_string(),
        path: segment.path().to_string(),
        cutoffs: segment.cutoffs().values().to_vec(),
        problematic: segment.is_problematic(),
        imputed: prediction
            .imputed
            .iter()
            .map(|(feature, value)| (feature.to_string(), value.to_string()))
            .collect(),
        band: record.target.and_then(|gm| prediction.band_of(gm)),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn evaluate(
    index_path: &Path,
    input: &Path,
    raw: bool,
    delimiter: char,
    impute: bool,
    report_path: Option<&Path>,
) -> Result<()> {
    let index = load_index(index_path)?;
    let dataset = load_dataset(input, index.config(), raw, delimiter)?;
    let test: &Table = dataset.table();

    let report = lumen_segment_core::evaluate(&index, test, impute);
    lumen_segment_trainer::trainer::log_report(&report);

    if let Some(path) = report_path {
        let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut wtr = WriterBuilder::new().from_writer(file);
        wtr.write_record([
            "segment",
            "partition",
            "path",
            "train_rows",
            "test_rows",
            "share_difference",
            "band_counts",
            "out_of_band",
            "problematic",
            "cutoffs",
        ])?;
        for result in &report.results {
            let Some(segment) = index.segment(result.segment) else {
                continue;
            };
            let bands: Vec<String> = result.band_counts.iter().map(ToString::to_string).collect();
            wtr.write_record([
                result.segment.to_string(),
                segment.partition().to_string(),
                segment.path().to_string(),
                result.train_rows.to_string(),
                result.test_rows.to_string(),
                format!("{:.3}", report.share_difference(result)),
                bands.join(";"),
                result.out_of_band.to_string(),
                result.is_problematic.to_string(),
                segment.cutoffs().format(),
            ])?;
        }
        wtr.flush()?;
        info!("Report: {}", path.display());
    }
    Ok(())
}

fn distances(index_path: &Path, top: usize) -> Result<()> {
    let index = load_index(index_path)?;
    let (compatible, incompatible) = pairwise_distances(index.segments());

    info!(
        "{} comparable pairs, {} with mismatched cutoff counts",
        compatible.len(),
        incompatible.len()
    );
    for pair in compatible.iter().take(top) {
        if let Some(distance) = pair.distance.value() {
            println!("{}\t{}\t{:.6}", pair.left, pair.right, distance);
        }
    }
    Ok(())
}

fn render(index_path: &Path, output: &Path) -> Result<()> {
    let index = load_index(index_path)?;
    fs::create_dir_all(output).context("Failed to create output directory")?;

    let style = DotStyle::default();
    for (i, model) in index.partitions().iter().enumerate() {
        let path = output.join(format!("partition_{i}.dot"));
        fs::write(&path, to_dot(model, &style)).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Partition {} -> {}", model.key(), path.display());
    }
    Ok(())
}
