//! Per-agent lineage record: scalar state plus the attached behavior set.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::behavior::{Behavior, BehaviorSet};
use crate::config::CellTemplate;
use crate::error::LineageError;

/// Position in the simulation cube (world units).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    /// Construct a new position.
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Component along `axis`.
    #[must_use]
    pub const fn along(&self, axis: Axis) -> f32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Translate by `delta` scaled with `scale`.
    pub fn translate(&mut self, delta: [f32; 3], scale: f32) {
        self.x += delta[0] * scale;
        self.y += delta[1] * scale;
        self.z += delta[2] * scale;
    }
}

/// Cartesian axis selector.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    #[default]
    Y,
    Z,
}

impl Axis {
    /// Unit vector pointing along the axis.
    #[must_use]
    pub const fn unit(self) -> [f32; 3] {
        match self {
            Axis::X => [1.0, 0.0, 0.0],
            Axis::Y => [0.0, 1.0, 0.0],
            Axis::Z => [0.0, 0.0, 1.0],
        }
    }
}

/// Lineage depth (daughters increment this).
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct Generation(pub u32);

impl Generation {
    /// Advances to the next lineage generation.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

/// Lifecycle marker: 0 is the proliferating progenitor, 1..=6 the per-layer expansion stages.
///
/// Stage 7 is reachable only by a lineage that expanded through every layer without
/// differentiating; nothing is ever attached there.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct Stage(pub u8);

impl Stage {
    pub const PROGENITOR: Stage = Stage(0);
    pub const FIRST_LAYER: Stage = Stage(1);
    pub const LAST_LAYER: Stage = Stage(6);
    pub const EXHAUSTED: Stage = Stage(7);

    /// Returns the following stage.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Cell type a state transition at this stage differentiates into.
    #[must_use]
    pub const fn layer_target(self) -> Option<CellType> {
        CellType::from_index(self.0)
    }

    #[must_use]
    pub const fn is_progenitor(self) -> bool {
        self.0 == Self::PROGENITOR.0
    }

    #[must_use]
    pub const fn is_exhausted(self) -> bool {
        self.0 > Self::LAST_LAYER.0
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Terminal laminar identity assigned at differentiation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum CellType {
    #[default]
    Undifferentiated = 0,
    MarginalZone = 1,
    L6 = 2,
    L5 = 3,
    L4 = 4,
    L3 = 5,
    L2 = 6,
}

impl CellType {
    /// Every differentiated type, in stage order.
    pub const LAYERS: [CellType; 6] = [
        CellType::MarginalZone,
        CellType::L6,
        CellType::L5,
        CellType::L4,
        CellType::L3,
        CellType::L2,
    ];

    /// Differentiated type for a layer index in `1..=6`.
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(CellType::MarginalZone),
            2 => Some(CellType::L6),
            3 => Some(CellType::L5),
            4 => Some(CellType::L4),
            5 => Some(CellType::L3),
            6 => Some(CellType::L2),
            _ => None,
        }
    }

    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn is_differentiated(self) -> bool {
        !matches!(self, CellType::Undifferentiated)
    }

    /// Short laminar label used in reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            CellType::Undifferentiated => "progenitor",
            CellType::MarginalZone => "MZ",
            CellType::L6 => "L6",
            CellType::L5 => "L5",
            CellType::L4 => "L4",
            CellType::L3 => "L3",
            CellType::L2 => "L2",
        }
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Scalar fields of a single neuron.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NeuronState {
    pub position: Position,
    pub diameter: f32,
    pub growth_rate: f32,
    pub division_threshold: f32,
    pub intracellular_substance: f32,
    pub internal_threshold: f32,
    pub migration_substance: f32,
    pub migration_threshold: f32,
    pub migrating: bool,
    pub stage: Stage,
    pub cell_type: CellType,
    pub generation: Generation,
}

impl NeuronState {
    /// Fresh progenitor built from the configured cell template.
    #[must_use]
    pub fn progenitor(template: &CellTemplate, position: Position, intracellular: f32) -> Self {
        Self {
            position,
            diameter: template.diameter,
            growth_rate: template.growth_rate,
            division_threshold: template.division_threshold,
            intracellular_substance: intracellular,
            internal_threshold: template.internal_threshold,
            migration_substance: 0.0,
            migration_threshold: template.migration_threshold,
            migrating: false,
            stage: Stage::PROGENITOR,
            cell_type: CellType::Undifferentiated,
            generation: Generation::default(),
        }
    }

    /// Reset the lineage fields of a freshly divided daughter from its parent.
    ///
    /// Physical fields (position, diameter) are left to the division primitive. The
    /// daughter keeps the parent's stage and growth parameters, starts undifferentiated,
    /// and sits one generation deeper.
    pub fn inherit_lineage(&mut self, parent: &NeuronState) {
        self.growth_rate = parent.growth_rate;
        self.division_threshold = parent.division_threshold;
        self.internal_threshold = parent.internal_threshold;
        self.migration_threshold = parent.migration_threshold;
        self.intracellular_substance = 0.0;
        self.migration_substance = 0.0;
        self.migrating = false;
        self.stage = parent.stage;
        self.cell_type = CellType::Undifferentiated;
        self.generation = parent.generation.next();
    }
}

/// Coarse lineage phase derived from the record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LineagePhase {
    Proliferating,
    Expanding(Stage),
    Migrating(CellType),
    Settled(CellType),
    Exhausted,
}

/// Agent record: scalar state plus its exclusively owned behaviors.
#[derive(Debug, Clone, PartialEq)]
pub struct Neuron {
    pub state: NeuronState,
    pub behaviors: BehaviorSet,
}

impl Neuron {
    /// Wrap `state` with only the dispatcher attached.
    #[must_use]
    pub fn new(state: NeuronState) -> Self {
        Self {
            state,
            behaviors: BehaviorSet::with_dispatcher(),
        }
    }

    /// Wrap `state` with an explicit behavior list, enforcing the set invariants.
    pub fn with_behaviors(
        state: NeuronState,
        behaviors: impl IntoIterator<Item = Behavior>,
    ) -> Result<Self, LineageError> {
        let mut set = BehaviorSet::new();
        for behavior in behaviors {
            set.attach(behavior)?;
        }
        Ok(Self {
            state,
            behaviors: set,
        })
    }

    #[must_use]
    pub fn phase(&self) -> LineagePhase {
        let state = &self.state;
        if state.cell_type.is_differentiated() {
            if state.migrating {
                LineagePhase::Migrating(state.cell_type)
            } else {
                LineagePhase::Settled(state.cell_type)
            }
        } else if state.stage.is_progenitor() {
            LineagePhase::Proliferating
        } else if state.stage.is_exhausted() {
            LineagePhase::Exhausted
        } else {
            LineagePhase::Expanding(state.stage)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::BehaviorKind;

    fn progenitor() -> NeuronState {
        NeuronState::progenitor(&CellTemplate::default(), Position::new(1.0, 0.0, 2.0), 400.0)
    }

    #[test]
    fn stage_targets_cover_layers_only() {
        assert_eq!(Stage::PROGENITOR.layer_target(), None);
        assert_eq!(Stage(1).layer_target(), Some(CellType::MarginalZone));
        assert_eq!(Stage(6).layer_target(), Some(CellType::L2));
        assert_eq!(Stage::EXHAUSTED.layer_target(), None);
        assert!(Stage::EXHAUSTED.is_exhausted());
        assert_eq!(Stage(255).next(), Stage(255));
    }

    #[test]
    fn cell_type_indices_round_trip_through_stage_numbers() {
        for (offset, layer) in CellType::LAYERS.iter().enumerate() {
            let index = offset as u8 + 1;
            assert_eq!(layer.index(), index);
            assert_eq!(CellType::from_index(index), Some(*layer));
        }
        assert!(!CellType::Undifferentiated.is_differentiated());
        assert_eq!(CellType::MarginalZone.to_string(), "MZ");
    }

    #[test]
    fn progenitor_starts_with_dispatcher_only() {
        let neuron = Neuron::new(progenitor());
        assert_eq!(neuron.behaviors.len(), 1);
        assert!(neuron.behaviors.contains(BehaviorKind::Dispatcher));
        assert_eq!(neuron.phase(), LineagePhase::Proliferating);
        assert_eq!(neuron.state.intracellular_substance, 400.0);
        assert!(!neuron.state.migrating);
    }

    #[test]
    fn inherit_lineage_resets_identity_but_keeps_stage() {
        let mut parent = progenitor();
        parent.stage = Stage(3);
        parent.generation = Generation(4);
        parent.migration_substance = 12.0;

        let mut daughter = parent.clone();
        daughter.cell_type = CellType::L4;
        daughter.migrating = true;
        daughter.inherit_lineage(&parent);

        assert_eq!(daughter.stage, Stage(3));
        assert_eq!(daughter.generation, Generation(5));
        assert_eq!(daughter.cell_type, CellType::Undifferentiated);
        assert!(!daughter.migrating);
        assert_eq!(daughter.migration_substance, 0.0);
        assert_eq!(daughter.intracellular_substance, 0.0);
    }

    #[test]
    fn phase_tracks_lineage_progress() {
        let mut neuron = Neuron::new(progenitor());
        neuron.state.stage = Stage(2);
        assert_eq!(neuron.phase(), LineagePhase::Expanding(Stage(2)));
        neuron.state.cell_type = CellType::L6;
        neuron.state.migrating = true;
        assert_eq!(neuron.phase(), LineagePhase::Migrating(CellType::L6));
        neuron.state.migrating = false;
        assert_eq!(neuron.phase(), LineagePhase::Settled(CellType::L6));

        let mut stray = Neuron::new(progenitor());
        stray.state.stage = Stage::EXHAUSTED;
        assert_eq!(stray.phase(), LineagePhase::Exhausted);
    }
}
