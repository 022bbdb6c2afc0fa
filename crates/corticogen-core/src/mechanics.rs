//! Physical collaborator consumed by the lineage behaviors.
//!
//! The state machine only asks for three primitives: grow, divide, and follow a
//! substance gradient. [`SphericalMechanics`] is the bundled implementation: cells
//! are spheres whose volume grows by `amount * time_step`, division splits the
//! volume evenly along a random axis, and substances are static analytic
//! profiles rather than a diffused grid.

use rand::{Rng, RngCore};
use std::collections::{HashMap, HashSet};
use std::f32::consts::{PI, TAU};
use tracing::warn;

use crate::config::{MechanicsConfig, SubstanceConfig};
use crate::neuron::{Axis, NeuronState, Position};

/// Growth, division, and gradient-following primitives.
pub trait Mechanics: Send {
    /// Increase the size of `cell` by one growth increment.
    fn grow(&mut self, cell: &mut NeuronState, amount: f32);

    /// Split `mother`, returning the daughter's physical state.
    ///
    /// Lineage fields of the returned record are overwritten by the caller.
    fn divide(&mut self, mother: &mut NeuronState, rng: &mut dyn RngCore) -> NeuronState;

    /// Move `cell` up the gradient of `substance`.
    fn follow_gradient(&mut self, cell: &mut NeuronState, substance: &str, strength: f32);
}

/// Static Gaussian band of concentration along one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianBand {
    pub mean: f32,
    pub sigma: f32,
    pub axis: Axis,
}

impl GaussianBand {
    #[must_use]
    pub const fn new(mean: f32, sigma: f32, axis: Axis) -> Self {
        Self { mean, sigma, axis }
    }

    /// Normalised concentration in `(0, 1]` at `position`.
    #[must_use]
    pub fn concentration(&self, position: &Position) -> f32 {
        let offset = position.along(self.axis) - self.mean;
        (-(offset * offset) / (2.0 * self.sigma * self.sigma)).exp()
    }

    /// Spatial gradient of the concentration at `position`.
    #[must_use]
    pub fn gradient(&self, position: &Position) -> [f32; 3] {
        let offset = position.along(self.axis) - self.mean;
        let slope = -offset / (self.sigma * self.sigma) * self.concentration(position);
        let unit = self.axis.unit();
        [unit[0] * slope, unit[1] * slope, unit[2] * slope]
    }
}

impl From<&SubstanceConfig> for GaussianBand {
    fn from(config: &SubstanceConfig) -> Self {
        Self::new(config.mean, config.sigma, config.axis)
    }
}

fn sphere_volume(diameter: f32) -> f32 {
    PI / 6.0 * diameter.powi(3)
}

fn sphere_diameter(volume: f32) -> f32 {
    (6.0 * volume.max(0.0) / PI).cbrt()
}

fn random_unit_vector(rng: &mut dyn RngCore) -> [f32; 3] {
    let z: f32 = rng.random_range(-1.0..=1.0);
    let phi: f32 = rng.random_range(0.0..TAU);
    let radial = (1.0 - z * z).max(0.0).sqrt();
    [radial * phi.cos(), radial * phi.sin(), z]
}

/// Volume-based growth and division with analytic chemotaxis.
#[derive(Debug, Clone)]
pub struct SphericalMechanics {
    time_step: f32,
    substances: HashMap<String, GaussianBand>,
    unknown_reported: HashSet<String>,
}

impl Default for SphericalMechanics {
    fn default() -> Self {
        Self::from_config(&MechanicsConfig::default())
    }
}

impl SphericalMechanics {
    #[must_use]
    pub fn from_config(config: &MechanicsConfig) -> Self {
        Self {
            time_step: config.time_step,
            substances: config
                .substances
                .iter()
                .map(|s| (s.name.clone(), GaussianBand::from(s)))
                .collect(),
            unknown_reported: HashSet::new(),
        }
    }
}

impl Mechanics for SphericalMechanics {
    fn grow(&mut self, cell: &mut NeuronState, amount: f32) {
        let volume = sphere_volume(cell.diameter) + amount * self.time_step;
        cell.diameter = sphere_diameter(volume);
    }

    fn divide(&mut self, mother: &mut NeuronState, rng: &mut dyn RngCore) -> NeuronState {
        let half_volume = sphere_volume(mother.diameter) * 0.5;
        let diameter = sphere_diameter(half_volume);
        let axis = random_unit_vector(rng);
        let offset = diameter * 0.25;

        mother.diameter = diameter;
        let mut daughter = mother.clone();
        mother.position.translate(axis, -offset);
        daughter.position.translate(axis, offset);
        daughter
    }

    fn follow_gradient(&mut self, cell: &mut NeuronState, substance: &str, strength: f32) {
        let Some(band) = self.substances.get(substance) else {
            if self.unknown_reported.insert(substance.to_string()) {
                warn!(substance, "gradient requested for undefined substance; ignoring");
            }
            return;
        };
        let gradient = band.gradient(&cell.position);
        let norm = gradient.iter().map(|g| g * g).sum::<f32>().sqrt();
        if norm <= f32::EPSILON {
            return;
        }
        cell.position.translate(gradient, strength / norm);
    }
}
