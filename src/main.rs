use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fixture_catalog::{logging, Catalog, Config, SubmissionId};
use std::path::PathBuf;

/// Maintenance commands for the fixture catalog.
///
/// Staging and committing need the recognition models and are driven by the
/// confirmation surface through the library API.
#[derive(Parser, Debug)]
#[command(name = "fixture-catalog", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Keep the catalog in the platform data directory instead of the working directory
    #[arg(long)]
    user_data: bool,

    /// Override the detection index path
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Override the image tree root
    #[arg(long)]
    output_root: Option<PathBuf>,

    /// Override the staging directory
    #[arg(long)]
    staging_dir: Option<PathBuf>,

    /// Override the detector confidence cutoff
    #[arg(long)]
    detection_threshold: Option<f32>,

    /// Override the per-model-call deadline
    #[arg(long)]
    model_timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the index and directories
    Init,
    /// List the categories the classifier can produce
    Categories,
    /// Find stored images whose object label or category contains a keyword
    Search {
        keyword: String,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the index rows of one submission
    Records { submission: SubmissionId },
    /// Report index rows whose stored image is missing
    Verify,
    /// Delete every stored copy and index row of one submission
    Remove { submission: SubmissionId },
    /// Print index statistics
    Stats,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match (&cli.config, cli.user_data) {
        (Some(path), _) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        (None, true) => Config::in_data_dir()?,
        (None, false) => Config::default(),
    }
    .apply_env();

    if let Some(db_path) = &cli.db_path {
        config.db_path = db_path.clone();
    }
    if let Some(output_root) = &cli.output_root {
        config.output_root = output_root.clone();
    }
    if let Some(staging_dir) = &cli.staging_dir {
        config.staging_dir = staging_dir.clone();
    }
    if let Some(threshold) = cli.detection_threshold {
        config.detection_threshold = threshold;
    }
    if let Some(secs) = cli.model_timeout_secs {
        config.model_timeout_secs = secs;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    logging::init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let open = || Catalog::open(&config).context("opening catalog");

    match cli.command {
        Command::Categories => {
            for category in &config.categories {
                println!("{category}");
            }
        }
        Command::Init => {
            let catalog = open()?;
            println!("Catalog initialized");
            println!("  index:   {}", catalog.library().path().display());
            println!("  images:  {}", catalog.commits().tree().root().display());
            println!("  staging: {}", catalog.staging().dir().display());
        }
        Command::Search { keyword, json } => {
            let catalog = open()?;
            let paths = catalog.search().search(&keyword)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&paths)?);
            } else if paths.is_empty() {
                println!("No matching images found.");
            } else {
                for path in &paths {
                    println!("{}", path.display());
                }
            }
        }
        Command::Records { submission } => {
            let catalog = open()?;
            let records = catalog.search().records_for(&submission)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Verify => {
            let catalog = open()?;
            let report = catalog.search().verify()?;
            println!(
                "Checked {} record(s), {} missing on disk",
                report.checked,
                report.missing.len()
            );
            for record in &report.missing {
                println!(
                    "  {}",
                    record.stored_path(catalog.commits().tree().root()).display()
                );
            }
        }
        Command::Remove { submission } => {
            let catalog = open()?;
            let report = catalog.commits().remove(&submission)?;
            println!(
                "Removed {} stored copies and {} index rows",
                report.removed_copies, report.removed_rows
            );
        }
        Command::Stats => {
            let catalog = open()?;
            println!("Records:     {}", catalog.search().record_count()?);
            println!("Submissions: {}", catalog.search().submission_count()?);
        }
    }

    Ok(())
}
