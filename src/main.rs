use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};

mod classifier;
mod cluster;
mod config;
mod dataset;
mod ensemble;
mod error;
mod models;
mod pipeline;
mod report;
mod risk;
mod sequence;
mod source;

use config::{stream, PipelineConfig};
use models::{FeatureRow, Schema};
use source::{CsvSource, DataSource, SyntheticSource};

#[derive(Parser)]
#[command(name = "burnout-risk")]
#[command(about = "Student burnout risk scoring with a formula, classifier ensemble and risk clusters", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and print the evaluation report
    Run {
        #[command(flatten)]
        population: PopulationArgs,
        #[command(flatten)]
        student: StudentArgs,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Write the report here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Score one student with the formula only
    Score {
        #[command(flatten)]
        student: StudentArgs,
    },
    /// Write the scored population with cluster ids as CSV
    Export {
        #[command(flatten)]
        population: PopulationArgs,
        #[arg(long, default_value = "scored.csv")]
        out: PathBuf,
    },
}

#[derive(Args)]
struct PopulationArgs {
    /// JSON file with pipeline settings
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
    /// Synthetic population size
    #[arg(long, conflicts_with = "csv")]
    population: Option<usize>,
    /// Read the population from CSV instead of generating it
    #[arg(long)]
    csv: Option<PathBuf>,
}

#[derive(Args)]
struct StudentArgs {
    #[arg(long, default_value_t = 8)]
    pending: i64,
    #[arg(long, default_value_t = 3)]
    missed: i64,
    #[arg(long, default_value_t = 6)]
    overlapping: i64,
    #[arg(long, default_value_t = 42)]
    completion_rate: i64,
    #[arg(long, default_value_t = 4)]
    exam_proximity: i64,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl PopulationArgs {
    fn load_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)
                .with_context(|| format!("failed to read config {}", path.display()))?,
            None => PipelineConfig::default(),
        };
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(size) = self.population {
            config.population_size = size;
        }
        Ok(config)
    }

    fn source(&self, config: &PipelineConfig) -> Box<dyn DataSource> {
        match &self.csv {
            Some(path) => Box::new(CsvSource::new(path)),
            None => Box::new(SyntheticSource::new(
                config.population_size,
                config.component_seed(stream::POPULATION),
            )),
        }
    }
}

impl StudentArgs {
    fn row(&self) -> anyhow::Result<FeatureRow> {
        FeatureRow::new(
            self.pending,
            self.missed,
            self.overlapping,
            self.completion_rate,
            self.exam_proximity,
        )
        .context("invalid student features")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            population,
            student,
            format,
            out,
        } => {
            let config = population.load_config()?;
            let source = population.source(&config);
            let test_row = student.row()?;

            let report = pipeline::run(&config, source.as_ref(), test_row)
                .await
                .context("pipeline run failed")?;
            let rendered = match format {
                OutputFormat::Text => report::render_text(&report),
                OutputFormat::Json => report::render_json(&report)?,
            };

            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Report written to {}.", path.display());
                }
                None => print!("{rendered}"),
            }
        }
        Commands::Score { student } => {
            let row = student.row()?;
            let breakdown = risk::score_breakdown(&row);
            let mut output = String::new();
            report::render_breakdown(&mut output, &breakdown);

            println!("Burnout score: {}", breakdown.score);
            println!("Risk level: {}", risk::risk_level(breakdown.score));
            print!("{output}");
        }
        Commands::Export { population, out } => {
            let config = population.load_config()?;
            config.validate()?;
            let source = population.source(&config);
            let records = source
                .load()
                .with_context(|| format!("failed to load {} population", source.name()))?;
            let dataset = dataset::DatasetBuilder::new(source.name(), Schema::current()).build(records);

            let clusters = cluster::RiskClusterer::new(
                config.cluster_count,
                config.cluster_restarts,
                config.cluster_max_iter,
                config.component_seed(stream::CLUSTER),
            )?
            .fit_predict(&dataset, &Schema::current())?;

            let written = source::export_csv(&out, &dataset, Some(&clusters))
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!(
                "Exported {written} scored students across {} clusters to {}.",
                clusters.distinct_clusters(),
                out.display()
            );
        }
    }

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
