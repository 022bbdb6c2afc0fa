//! Error types for configuration validation and lineage execution.

use thiserror::Error;

use crate::behavior::BehaviorKind;
use crate::neuron::CellType;

/// Rejected configuration, reported before any agent is created.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
    /// A reachable cell type has no migration height configured.
    #[error("height map has no entry for cell type {0} (index {idx})", idx = .0.index())]
    MissingHeight(CellType),
}

/// Failure raised while advancing the lineage state machine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LineageError {
    /// Seeding the migration clock needs a height that the parameters do not define.
    #[error("height map has no entry for cell type {cell_type} (index {idx})", idx = .cell_type.index())]
    MissingHeight { cell_type: CellType },
    /// Attaching would exceed the per-neuron behavior ceiling.
    #[error("cannot attach {kind:?}: behavior set already holds {capacity} entries")]
    BehaviorCapacity { kind: BehaviorKind, capacity: usize },
    /// A behavior of the same kind is already attached.
    #[error("{kind:?} is already attached")]
    DuplicateBehavior { kind: BehaviorKind },
    /// Committing this tick's daughters would exceed the configured population ceiling.
    #[error("population limit reached: {requested} neurons requested, limit is {limit}")]
    PopulationLimit { requested: usize, limit: usize },
}

impl LineageError {
    /// Whether the error stems from configuration rather than a broken invariant.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, LineageError::MissingHeight { .. })
    }
}
