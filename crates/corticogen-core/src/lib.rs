//! Core lineage model for simulated cortical columns.
//!
//! Progenitor neurons proliferate, expand stage by stage, stochastically commit to
//! one of six laminar identities, and then run a migration clock while following a
//! chemical gradient. The [`grn`] module holds the per-neuron behavior state
//! machine; [`world::ColumnWorld`] drives it over a registry of neurons.

use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, new_key_type};

pub mod behavior;
pub mod census;
pub mod config;
pub mod error;
pub mod grn;
pub mod mechanics;
pub mod neuron;
pub mod world;

pub use behavior::{Behavior, BehaviorKind, BehaviorSet, GradientFollower, StateTransition};
pub use census::LayerCensus;
pub use config::{
    CellTemplate, ColumnConfig, DEFAULT_SUBSTANCE, MechanicsConfig, SeedingConfig,
    SimulationParameters, SubstanceConfig,
};
pub use error::{ConfigError, LineageError};
pub use grn::{LineageEvent, SliceOutcome, TickEnv, run_slice};
pub use mechanics::{GaussianBand, Mechanics, SphericalMechanics};
pub use neuron::{Axis, CellType, Generation, LineagePhase, Neuron, NeuronState, Position, Stage};
pub use world::{
    ColumnWorld, LineageObserver, NeuronArena, NullObserver, RunReport, TickEvents, TickSummary,
};

new_key_type! {
    /// Stable handle for neurons backed by a generational slot map.
    pub struct NeuronId;
}

/// Convenience alias for associating side data with neurons.
pub type NeuronMap<T> = SecondaryMap<NeuronId, T>;

/// Simulation clock (ticks processed since the column was built).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

impl std::fmt::Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
