//! Host-side helpers for the `corticogen` binary: configuration loading, CLI
//! overrides, and progress reporting.

use anyhow::{Context, Result};
use corticogen_core::{ColumnConfig, ColumnWorld, LineageObserver, RunReport, TickSummary};
use std::path::Path;
use tracing::info;

/// Read a JSON column configuration; absent fields fall back to defaults.
pub fn load_config(path: &Path) -> Result<ColumnConfig> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&data)
        .with_context(|| format!("config file {} did not contain valid JSON", path.display()))
}

/// Command-line values layered over the loaded configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub seed: Option<u64>,
    pub diff_prob: Option<f32>,
    pub grid_side: Option<u32>,
    pub steps: Option<u32>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut ColumnConfig) {
        if let Some(seed) = self.seed {
            config.rng_seed = Some(seed);
        }
        if let Some(diff_prob) = self.diff_prob {
            config.lineage.diff_prob = diff_prob;
        }
        if let Some(grid_side) = self.grid_side {
            config.seeding.grid_side = grid_side;
        }
        if let Some(steps) = self.steps {
            config.lineage.sims_steps = steps;
        }
    }
}

/// Logs a one-line progress summary every `every` ticks.
#[derive(Debug, Clone)]
pub struct ProgressObserver {
    every: u64,
}

impl ProgressObserver {
    /// `every == 0` disables reporting.
    #[must_use]
    pub const fn new(every: u64) -> Self {
        Self { every }
    }

    #[must_use]
    pub const fn should_report(&self, tick: u64) -> bool {
        self.every > 0 && tick % self.every == 0
    }
}

impl LineageObserver for ProgressObserver {
    fn on_tick(&mut self, summary: &TickSummary) {
        if !self.should_report(summary.tick.0) {
            return;
        }
        info!(
            tick = summary.tick.0,
            population = summary.population,
            births = summary.events.births,
            differentiated = summary.census.differentiated(),
            migrating = summary.census.migrating,
            "column progress",
        );
    }
}

/// Build a column from `config`, seed the progenitor grid, and run `sims_steps` ticks.
pub fn run_column(config: ColumnConfig, report_every: u64) -> Result<RunReport> {
    let steps = u64::from(config.lineage.sims_steps);
    let mut world = ColumnWorld::new(config).context("invalid column configuration")?;
    world.set_observer(Box::new(ProgressObserver::new(report_every)));
    let seeded = world.seed_progenitors();
    info!(progenitors = seeded.len(), steps, "starting cortical column run");
    world
        .run(steps)
        .with_context(|| format!("simulation aborted at tick {}", world.tick()))
}
