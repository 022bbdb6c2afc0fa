//! Laminar census: neuron counts per cell type.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::neuron::{CellType, NeuronState};

/// Counts of neurons per cell type at one point in time.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LayerCensus {
    pub undifferentiated: usize,
    pub marginal_zone: usize,
    pub l6: usize,
    pub l5: usize,
    pub l4: usize,
    pub l3: usize,
    pub l2: usize,
    /// Differentiated neurons whose migration clock is still running.
    pub migrating: usize,
}

impl LayerCensus {
    /// Tally every state yielded by `states`.
    pub fn from_states<'a>(states: impl IntoIterator<Item = &'a NeuronState>) -> Self {
        let mut census = Self::default();
        for state in states {
            census.record(state);
        }
        census
    }

    pub fn record(&mut self, state: &NeuronState) {
        *self.slot_mut(state.cell_type) += 1;
        if state.migrating {
            self.migrating += 1;
        }
    }

    #[must_use]
    pub const fn count(&self, cell_type: CellType) -> usize {
        match cell_type {
            CellType::Undifferentiated => self.undifferentiated,
            CellType::MarginalZone => self.marginal_zone,
            CellType::L6 => self.l6,
            CellType::L5 => self.l5,
            CellType::L4 => self.l4,
            CellType::L3 => self.l3,
            CellType::L2 => self.l2,
        }
    }

    fn slot_mut(&mut self, cell_type: CellType) -> &mut usize {
        match cell_type {
            CellType::Undifferentiated => &mut self.undifferentiated,
            CellType::MarginalZone => &mut self.marginal_zone,
            CellType::L6 => &mut self.l6,
            CellType::L5 => &mut self.l5,
            CellType::L4 => &mut self.l4,
            CellType::L3 => &mut self.l3,
            CellType::L2 => &mut self.l2,
        }
    }

    #[must_use]
    pub fn differentiated(&self) -> usize {
        CellType::LAYERS.iter().map(|&layer| self.count(layer)).sum()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.undifferentiated + self.differentiated()
    }
}

impl fmt::Display for LayerCensus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Superficial layers first, matching the laminar order of the cortex.
        writeln!(f, "Number of MZ neurons: {}", self.marginal_zone)?;
        for layer in [
            CellType::L2,
            CellType::L3,
            CellType::L4,
            CellType::L5,
            CellType::L6,
        ] {
            writeln!(f, "Number of {layer} neurons: {}", self.count(layer))?;
        }
        write!(
            f,
            "Number of undifferentiated cells: {}",
            self.undifferentiated
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CellTemplate;
    use crate::neuron::Position;

    fn state(cell_type: CellType, migrating: bool) -> NeuronState {
        let mut state = NeuronState::progenitor(&CellTemplate::default(), Position::default(), 0.0);
        state.cell_type = cell_type;
        state.migrating = migrating;
        state
    }

    #[test]
    fn tallies_each_layer() {
        let states = [
            state(CellType::Undifferentiated, false),
            state(CellType::MarginalZone, true),
            state(CellType::MarginalZone, false),
            state(CellType::L4, false),
            state(CellType::L2, true),
        ];
        let census = LayerCensus::from_states(&states);
        assert_eq!(census.count(CellType::MarginalZone), 2);
        assert_eq!(census.count(CellType::L4), 1);
        assert_eq!(census.count(CellType::L6), 0);
        assert_eq!(census.differentiated(), 4);
        assert_eq!(census.total(), 5);
        assert_eq!(census.migrating, 2);
    }

    #[test]
    fn report_lists_layers_superficial_first() {
        let census = LayerCensus {
            marginal_zone: 3,
            l2: 1,
            l6: 7,
            undifferentiated: 2,
            ..LayerCensus::default()
        };
        let report = census.to_string();
        let lines: Vec<_> = report.lines().collect();
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "Number of MZ neurons: 3");
        assert_eq!(lines[1], "Number of L2 neurons: 1");
        assert_eq!(lines[5], "Number of L6 neurons: 7");
        assert_eq!(lines[6], "Number of undifferentiated cells: 2");
    }
}
