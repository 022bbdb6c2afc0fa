//! Behavior variants and the bounded, ordered set each neuron carries.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::LineageError;
use crate::neuron::CellType;

const MAX_BEHAVIORS: usize = 3;

/// Tag identifying a behavior variant; removal always goes through the tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BehaviorKind {
    Dispatcher,
    SymmetricDivision,
    SingleDivision,
    StateTransition,
    DifferentiatedMigration,
    MigrationSignal,
}

/// Proliferative phase flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SymmetricDivision {
    pub finished: bool,
}

/// Per-stage gate between differentiating and expanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    /// Cell type produced if this stage differentiates.
    pub target: CellType,
    /// Set once the first roll missed; later rolls can no longer differentiate.
    pub expanding: bool,
    /// Set once this stage has attached its single division.
    pub multiplied: bool,
}

impl StateTransition {
    #[must_use]
    pub const fn new(target: CellType) -> Self {
        Self {
            target,
            expanding: false,
            multiplied: false,
        }
    }
}

/// Chemotaxis request handed to the mechanics collaborator every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientFollower {
    pub substance: String,
    pub strength: f32,
}

impl GradientFollower {
    #[must_use]
    pub fn new(substance: impl Into<String>, strength: f32) -> Self {
        Self {
            substance: substance.into(),
            strength,
        }
    }
}

/// Closed set of behaviors a neuron can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum Behavior {
    Dispatcher,
    SymmetricDivision(SymmetricDivision),
    SingleDivision,
    StateTransition(StateTransition),
    DifferentiatedMigration,
    MigrationSignal(GradientFollower),
}

impl Behavior {
    #[must_use]
    pub const fn kind(&self) -> BehaviorKind {
        match self {
            Behavior::Dispatcher => BehaviorKind::Dispatcher,
            Behavior::SymmetricDivision(_) => BehaviorKind::SymmetricDivision,
            Behavior::SingleDivision => BehaviorKind::SingleDivision,
            Behavior::StateTransition(_) => BehaviorKind::StateTransition,
            Behavior::DifferentiatedMigration => BehaviorKind::DifferentiatedMigration,
            Behavior::MigrationSignal(_) => BehaviorKind::MigrationSignal,
        }
    }
}

/// Ordered behavior list with a hard capacity and at most one entry per kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BehaviorSet {
    slots: SmallVec<[Behavior; MAX_BEHAVIORS]>,
}

impl BehaviorSet {
    /// Dispatcher plus at most two phase behaviors.
    pub const CAPACITY: usize = MAX_BEHAVIORS;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set holding only the dispatcher, as every progenitor starts.
    #[must_use]
    pub fn with_dispatcher() -> Self {
        let mut set = Self::new();
        set.slots.push(Behavior::Dispatcher);
        set
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate behaviors in attachment order.
    pub fn iter(&self) -> impl Iterator<Item = &Behavior> + '_ {
        self.slots.iter()
    }

    /// Iterate tags in attachment order.
    pub fn kinds(&self) -> impl Iterator<Item = BehaviorKind> + '_ {
        self.slots.iter().map(Behavior::kind)
    }

    #[must_use]
    pub fn kind_at(&self, index: usize) -> Option<BehaviorKind> {
        self.slots.get(index).map(Behavior::kind)
    }

    #[must_use]
    pub fn contains(&self, kind: BehaviorKind) -> bool {
        self.kinds().any(|k| k == kind)
    }

    #[must_use]
    pub fn get(&self, kind: BehaviorKind) -> Option<&Behavior> {
        self.slots.iter().find(|b| b.kind() == kind)
    }

    /// Append `behavior`, rejecting duplicates and overflow.
    pub fn attach(&mut self, behavior: Behavior) -> Result<(), LineageError> {
        let kind = behavior.kind();
        if self.contains(kind) {
            return Err(LineageError::DuplicateBehavior { kind });
        }
        if self.slots.len() >= Self::CAPACITY {
            return Err(LineageError::BehaviorCapacity {
                kind,
                capacity: Self::CAPACITY,
            });
        }
        self.slots.push(behavior);
        Ok(())
    }

    /// Remove the behavior tagged `kind`, preserving the order of the rest.
    pub fn detach(&mut self, kind: BehaviorKind) -> Option<Behavior> {
        let index = self.slots.iter().position(|b| b.kind() == kind)?;
        Some(self.slots.remove(index))
    }

    /// Overwrite the attached behavior of the same kind in place. Returns false when absent.
    pub fn replace(&mut self, behavior: Behavior) -> bool {
        let kind = behavior.kind();
        match self.slots.iter_mut().find(|b| b.kind() == kind) {
            Some(slot) => {
                *slot = behavior;
                true
            }
            None => false,
        }
    }
}
