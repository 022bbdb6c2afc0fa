//! Simulation parameters and host configuration.

use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ConfigError;
use crate::neuron::{Axis, CellType};

/// Name of the migration cue substance used by default.
pub const DEFAULT_SUBSTANCE: &str = "substance_kalium";

/// Read-only lineage parameters consumed by the behavior state machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationParameters {
    /// Probability that a stage differentiates on its roll.
    pub diff_prob: f32,
    /// Migration-substance seed per differentiated cell type index (1..=6).
    pub height_map: BTreeMap<u8, f32>,
    /// Initial intracellular substance of every seeded progenitor.
    pub intracellular_substance: f32,
    /// Number of ticks the host runs.
    pub sims_steps: u32,
    /// Substance followed by differentiated neurons while migrating.
    pub gradient_substance: String,
    /// Displacement per tick while following the gradient.
    pub chemotaxis_strength: f32,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            diff_prob: 0.5,
            height_map: default_height_map(),
            intracellular_substance: 400.0,
            sims_steps: 1_000,
            gradient_substance: DEFAULT_SUBSTANCE.to_string(),
            chemotaxis_strength: 3.0,
        }
    }
}

/// Marginal zone sits highest; each deeper-born layer migrates a shorter distance.
fn default_height_map() -> BTreeMap<u8, f32> {
    BTreeMap::from([
        (CellType::MarginalZone.index(), 150.0),
        (CellType::L6.index(), 130.0),
        (CellType::L5.index(), 110.0),
        (CellType::L4.index(), 90.0),
        (CellType::L3.index(), 70.0),
        (CellType::L2.index(), 50.0),
    ])
}

impl SimulationParameters {
    /// Migration-substance seed for `cell_type`, if configured.
    #[must_use]
    pub fn height_for(&self, cell_type: CellType) -> Option<f32> {
        self.height_map.get(&cell_type.index()).copied()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.diff_prob) {
            return Err(ConfigError::Invalid("diff_prob must lie within [0, 1]"));
        }
        for layer in CellType::LAYERS {
            match self.height_for(layer) {
                None => return Err(ConfigError::MissingHeight(layer)),
                Some(height) if !height.is_finite() => {
                    return Err(ConfigError::Invalid("height_map values must be finite"));
                }
                Some(_) => {}
            }
        }
        if !self.intracellular_substance.is_finite() {
            return Err(ConfigError::Invalid(
                "intracellular_substance must be finite",
            ));
        }
        if self.gradient_substance.is_empty() {
            return Err(ConfigError::Invalid("gradient_substance must be named"));
        }
        if !self.chemotaxis_strength.is_finite() || self.chemotaxis_strength < 0.0 {
            return Err(ConfigError::Invalid(
                "chemotaxis_strength must be non-negative and finite",
            ));
        }
        Ok(())
    }
}

/// Per-neuron physical and threshold defaults applied to seeded progenitors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CellTemplate {
    pub diameter: f32,
    pub growth_rate: f32,
    pub division_threshold: f32,
    pub internal_threshold: f32,
    pub migration_threshold: f32,
}

impl Default for CellTemplate {
    fn default() -> Self {
        Self {
            diameter: 20.0,
            growth_rate: 300.0,
            division_threshold: 10.0,
            internal_threshold: 20.0,
            migration_threshold: 5.0,
        }
    }
}

impl CellTemplate {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.diameter.is_finite() && self.diameter > 0.0) {
            return Err(ConfigError::Invalid("diameter must be positive and finite"));
        }
        if !(self.division_threshold.is_finite() && self.division_threshold > 0.0) {
            return Err(ConfigError::Invalid(
                "division_threshold must be positive and finite",
            ));
        }
        if !self.growth_rate.is_finite() || self.growth_rate < 0.0 {
            return Err(ConfigError::Invalid(
                "growth_rate must be non-negative and finite",
            ));
        }
        if !self.internal_threshold.is_finite() || !self.migration_threshold.is_finite() {
            return Err(ConfigError::Invalid("thresholds must be finite"));
        }
        Ok(())
    }
}

/// Analytic concentration profile of one extracellular substance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SubstanceConfig {
    pub name: String,
    /// Peak location along `axis`.
    pub mean: f32,
    pub sigma: f32,
    pub axis: Axis,
}

impl Default for SubstanceConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SUBSTANCE.to_string(),
            mean: 1_000.0,
            sigma: 300.0,
            axis: Axis::Y,
        }
    }
}

/// Settings for the bundled growth/division/chemotaxis collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MechanicsConfig {
    /// Scales volume growth per tick.
    pub time_step: f32,
    pub substances: Vec<SubstanceConfig>,
}

impl Default for MechanicsConfig {
    fn default() -> Self {
        Self {
            time_step: 0.01,
            substances: vec![SubstanceConfig::default()],
        }
    }
}

impl MechanicsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            return Err(ConfigError::Invalid("time_step must be positive and finite"));
        }
        if self
            .substances
            .iter()
            .any(|s| !(s.sigma.is_finite() && s.sigma > 0.0) || !s.mean.is_finite())
        {
            return Err(ConfigError::Invalid(
                "substance profiles need a finite mean and positive sigma",
            ));
        }
        Ok(())
    }
}

/// Placement of the initial progenitor sheet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SeedingConfig {
    /// Progenitors per side of the square seeding grid.
    pub grid_side: u32,
    pub spacing: f32,
    /// Edge length of the simulation cube; the grid is centred in it.
    pub max_bound: f32,
}

impl Default for SeedingConfig {
    fn default() -> Self {
        Self {
            grid_side: 4,
            spacing: 50.0,
            max_bound: 1_000.0,
        }
    }
}

/// Static configuration for a cortical column run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColumnConfig {
    /// Optional RNG seed for reproducible lineages.
    pub rng_seed: Option<u64>,
    pub lineage: SimulationParameters,
    pub cell: CellTemplate,
    pub mechanics: MechanicsConfig,
    pub seeding: SeedingConfig,
    /// Ceiling on live neurons; exceeding it aborts the run.
    pub max_population: usize,
    /// Maximum number of recent tick summaries retained in-memory.
    pub history_capacity: usize,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            rng_seed: None,
            lineage: SimulationParameters::default(),
            cell: CellTemplate::default(),
            mechanics: MechanicsConfig::default(),
            seeding: SeedingConfig::default(),
            max_population: 1_000_000,
            history_capacity: 256,
        }
    }
}

impl ColumnConfig {
    /// Validate every section, stopping at the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.lineage.validate()?;
        self.cell.validate()?;
        self.mechanics.validate()?;
        if self.seeding.grid_side == 0 {
            return Err(ConfigError::Invalid("seeding.grid_side must be non-zero"));
        }
        if !(self.seeding.spacing.is_finite() && self.seeding.spacing >= 0.0)
            || !(self.seeding.max_bound.is_finite() && self.seeding.max_bound > 0.0)
        {
            return Err(ConfigError::Invalid(
                "seeding spacing must be non-negative and max_bound positive",
            ));
        }
        if self.max_population == 0 {
            return Err(ConfigError::Invalid("max_population must be non-zero"));
        }
        let side = self.seeding.grid_side as usize;
        match side.checked_mul(side) {
            Some(count) if count <= self.max_population => {}
            _ => {
                return Err(ConfigError::Invalid(
                    "seeding grid must fit within max_population",
                ));
            }
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid("history_capacity must be non-zero"));
        }
        Ok(())
    }

    /// Returns the configured RNG, generating a seed from entropy if absent.
    pub(crate) fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}
