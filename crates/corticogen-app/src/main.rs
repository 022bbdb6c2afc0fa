use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use corticogen_app::{ConfigOverrides, load_config, run_column};
use corticogen_core::ColumnConfig;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "corticogen",
    version,
    about = "Simulate the laminar lineage of cortical progenitor neurons"
)]
struct Cli {
    /// JSON configuration file; omitted fields take their defaults.
    #[arg(long, env = "CORTICOGEN_CONFIG")]
    config: Option<PathBuf>,

    /// Number of ticks to simulate (overrides lineage.sims_steps).
    #[arg(long)]
    steps: Option<u32>,

    /// RNG seed for a reproducible run.
    #[arg(long, env = "CORTICOGEN_SEED")]
    seed: Option<u64>,

    /// Probability that a stage differentiates on its roll.
    #[arg(long)]
    diff_prob: Option<f32>,

    /// Progenitors per side of the seeding grid.
    #[arg(long)]
    grid_side: Option<u32>,

    /// Log a progress line every N ticks; 0 disables.
    #[arg(long, default_value_t = 100)]
    report_every: u64,

    /// Print the run report as JSON instead of the census table.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ColumnConfig::default(),
    };
    ConfigOverrides {
        seed: cli.seed,
        diff_prob: cli.diff_prob,
        grid_side: cli.grid_side,
        steps: cli.steps,
    }
    .apply(&mut config);

    let report = run_column(config, cli.report_every)?;
    info!(
        ticks = report.ticks,
        population = report.population,
        births = report.births,
        differentiations = report.differentiations,
        "run complete",
    );

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("failed to format run report")?;
        println!("{json}");
    } else {
        println!("{}", report.census);
        println!("Simulation completed successfully!");
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
