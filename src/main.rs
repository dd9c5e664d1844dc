use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vdw_crunch::analysis::{
    approximation_table, curve_named, run_analyses, standard_analyses, CrossKeyDataset, KEY_V,
    LENGTH_V,
};
use vdw_crunch::config::{PipelineConfig, PipelineConfigBuilder};
use vdw_crunch::fit::Model;
use vdw_crunch::key::KeyDomain;
use vdw_crunch::meta::{JsonDirStore, MetaStore, WriteMode};
use vdw_crunch::pipeline::Pipeline;
use vdw_crunch::predicate::{KeyFilter, KeyPredicate};
use vdw_crunch::report::{Reporter, SilentReporter, TracingReporter};
use vdw_crunch::trial::{DirectoryTrialSource, ParquetTrialSource, TrialSource};

#[derive(Debug, Parser)]
#[command(name = "vdw-crunch")]
#[command(about = "Fit success-rate curves to Van der Waerden trial data")]
struct Args {
    /// Log filter, e.g. `info` or `vdw_crunch=debug`
    #[arg(long, global = true, default_value = "info")]
    log: String,
    /// Print results only; no progress or warnings
    #[arg(long, short, global = true)]
    quiet: bool,
    /// JSON config file; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// How keys are interpreted
    #[arg(long, global = true)]
    domain: Option<KeyDomain>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Aggregate trials and write one fit record per key.
    Crunch {
        /// Trial directory (`<key>/<n>.txt`) or `.parquet` table
        #[arg(long)]
        source: PathBuf,
        /// Record directory
        #[arg(long)]
        target: PathBuf,
        /// Key filter, e.g. `p > 100`
        #[arg(long = "for")]
        filter: Option<String>,
        /// Only keys that are plain arithmetic progressions
        #[arg(long)]
        vdw_only: bool,
        /// Recompute keys that already have a record
        #[arg(long)]
        redo: bool,
        /// Model family fitted to each key
        #[arg(long)]
        model: Option<Model>,
        /// Fewest interior points worth fitting
        #[arg(long)]
        min_points: Option<usize>,
        /// Solver evaluation budget per key
        #[arg(long)]
        max_evaluations: Option<usize>,
    },
    /// Fit curves across the stored records.
    Meta {
        /// Record directory
        #[arg(long)]
        target: PathBuf,
        /// Key filter, e.g. `p > 100`
        #[arg(long = "for")]
        filter: Option<String>,
        /// Only keys that are plain arithmetic progressions
        #[arg(long)]
        vdw_only: bool,
        /// Points sampled from each fitted curve
        #[arg(long, default_value_t = 200)]
        samples: usize,
    },
    /// Sample the fitted curve of one key.
    Curve {
        /// Record directory
        #[arg(long)]
        target: PathBuf,
        /// Key
        #[arg(long)]
        key: u64,
        /// Start of the sampled range (default 1)
        #[arg(long)]
        from: Option<f64>,
        /// End of the sampled range (default `V`)
        #[arg(long)]
        to: Option<f64>,
        /// Number of points
        #[arg(long, default_value_t = 200)]
        samples: usize,
    },
    /// Print the stored record of one key.
    Show {
        /// Record directory
        #[arg(long)]
        target: PathBuf,
        /// Key
        #[arg(long)]
        key: u64,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if !args.quiet {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(&args.log))
            .with_writer(std::io::stderr)
            .init();
    }
    let reporter: Box<dyn Reporter> = if args.quiet {
        Box::new(SilentReporter)
    } else {
        Box::new(TracingReporter)
    };

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(domain) = args.domain {
        config.domain = domain;
    }

    match args.cmd {
        Command::Crunch {
            source,
            target,
            filter,
            vdw_only,
            redo,
            model,
            min_points,
            max_evaluations,
        } => {
            let mut builder = PipelineConfigBuilder::from(config);
            if redo {
                builder = builder.write_mode(WriteMode::Overwrite);
            }
            if let Some(model) = model {
                builder = builder.model(model);
            }
            if let Some(points) = min_points {
                builder = builder.min_fit_points(points);
            }
            if let Some(budget) = max_evaluations {
                builder = builder.max_evaluations(budget);
            }
            let config = builder.build()?;
            let filter = key_filter(filter.as_deref(), vdw_only)?;

            let pipeline = Pipeline::new(open_source(&source)?, JsonDirStore::open(&target)?, config)
                .with_reporter(reporter);
            let summary = pipeline.run(&filter)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Meta {
            target,
            filter,
            vdw_only,
            samples,
        } => {
            let store = JsonDirStore::open(&target)?;
            let filter = key_filter(filter.as_deref(), vdw_only)?;
            let dataset =
                CrossKeyDataset::new(config.domain, store.load_all(&reporter)?).filter(&filter);

            let reports = run_analyses(&dataset, &standard_analyses(), &config.solver, &reporter);
            let approximations = approximation_table(
                config.domain,
                curve_named(&reports, LENGTH_V),
                curve_named(&reports, KEY_V),
            );
            let curves: Vec<_> = reports
                .iter()
                .filter_map(|r| {
                    let fit = r.fit.as_ref()?;
                    Some(serde_json::json!({"name": r.name, "points": fit.sample(samples)}))
                })
                .collect();

            let output = serde_json::json!({
                "records": dataset.len(),
                "analyses": reports,
                "approximations": approximations,
                "curves": curves,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Curve {
            target,
            key,
            from,
            to,
            samples,
        } => {
            let store = JsonDirStore::open(&target)?;
            let record = store
                .get(key)?
                .with_context(|| format!("key {key} has not been crunched yet"))?;
            let curve = record
                .curve()
                .with_context(|| format!("key {key} had too few points for a fit"))?;

            let lo = from.unwrap_or(1.0);
            #[allow(clippy::cast_precision_loss)]
            let hi = to
                .or_else(|| record.first_total_success().map(|v| v as f64))
                .context("key has no V; pass --to")?;
            println!(
                "{}",
                serde_json::to_string_pretty(&curve.sample(lo, hi, samples))?
            );
        }
        Command::Show { target, key } => {
            let store = JsonDirStore::open(&target)?;
            let record = store
                .get(key)?
                .with_context(|| format!("key {key} has not been crunched yet"))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }

    Ok(())
}

fn key_filter(expr: Option<&str>, vdw_only: bool) -> anyhow::Result<KeyFilter> {
    let mut filter = KeyFilter::all().vdw_only(vdw_only);
    if let Some(expr) = expr {
        filter = filter.with_predicate(KeyPredicate::parse(expr)?);
    }
    Ok(filter)
}

fn open_source(path: &Path) -> anyhow::Result<Box<dyn TrialSource>> {
    if path.extension().is_some_and(|ext| ext == "parquet") {
        let source = ParquetTrialSource::open(path)
            .with_context(|| format!("reading trial table {}", path.display()))?;
        Ok(Box::new(source))
    } else {
        anyhow::ensure!(path.is_dir(), "{} is not a directory", path.display());
        Ok(Box::new(DirectoryTrialSource::new(path)))
    }
}
