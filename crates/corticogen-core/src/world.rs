//! Neuron registry and the tick driver for a cortical column.

use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, info};

use crate::census::LayerCensus;
use crate::config::ColumnConfig;
use crate::error::{ConfigError, LineageError};
use crate::grn::{self, LineageEvent, TickEnv};
use crate::mechanics::{Mechanics, SphericalMechanics};
use crate::neuron::{Neuron, NeuronState, Position};
use crate::{NeuronId, NeuronMap, Tick};

/// Dense neuron storage with generational handles.
#[derive(Debug, Default)]
pub struct NeuronArena {
    slots: SlotMap<NeuronId, usize>,
    handles: Vec<NeuronId>,
    neurons: Vec<Neuron>,
}

impl NeuronArena {
    /// Create an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live neurons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.neurons.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.neurons.is_empty()
    }

    pub fn reserve(&mut self, additional: usize) {
        self.slots.reserve(additional);
        self.handles.reserve(additional);
        self.neurons.reserve(additional);
    }

    /// Iterate over `(handle, neuron)` pairs in dense iteration order.
    pub fn iter(&self) -> impl Iterator<Item = (NeuronId, &Neuron)> + '_ {
        self.handles.iter().copied().zip(self.neurons.iter())
    }

    /// Scalar states in dense iteration order.
    pub fn states(&self) -> impl Iterator<Item = &NeuronState> + '_ {
        self.neurons.iter().map(|neuron| &neuron.state)
    }

    /// Returns the dense index for `id`, if present.
    #[must_use]
    pub fn index_of(&self, id: NeuronId) -> Option<usize> {
        self.slots.get(id).copied()
    }

    #[must_use]
    pub fn get(&self, id: NeuronId) -> Option<&Neuron> {
        let index = self.index_of(id)?;
        self.neurons.get(index)
    }

    /// Insert a neuron and return its handle.
    pub fn insert(&mut self, neuron: Neuron) -> NeuronId {
        let index = self.neurons.len();
        self.neurons.push(neuron);
        let id = self.slots.insert(index);
        self.handles.push(id);
        id
    }

    fn dense_mut(&mut self) -> &mut [Neuron] {
        &mut self.neurons
    }
}

/// Lineage transitions counted over one tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TickEvents {
    pub tick: Tick,
    pub births: usize,
    pub stage_advances: usize,
    pub differentiations: usize,
    pub settlements: usize,
    /// Neurons whose dispatcher found nothing to attach this tick.
    pub exhausted: usize,
}

impl TickEvents {
    fn absorb(&mut self, events: &[LineageEvent]) {
        for event in events {
            match event {
                // Births are counted when the spawn orders commit.
                LineageEvent::Divided { .. } => {}
                LineageEvent::StageAdvanced { .. } => self.stage_advances += 1,
                LineageEvent::Differentiated { .. } => self.differentiations += 1,
                LineageEvent::Settled { .. } => self.settlements += 1,
                LineageEvent::Exhausted { .. } => self.exhausted += 1,
            }
        }
    }
}

/// Snapshot recorded after each tick and forwarded to the observer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickSummary {
    pub tick: Tick,
    pub population: usize,
    pub events: TickEvents,
    pub census: LayerCensus,
}

/// Totals returned by [`ColumnWorld::run`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub ticks: u64,
    pub final_tick: Tick,
    pub population: usize,
    pub births: usize,
    pub differentiations: usize,
    pub settlements: usize,
    pub census: LayerCensus,
}

/// Hook invoked after each committed tick.
pub trait LineageObserver: Send {
    fn on_tick(&mut self, summary: &TickSummary);
}

/// No-op observer.
#[derive(Debug, Default)]
pub struct NullObserver;

impl LineageObserver for NullObserver {
    fn on_tick(&mut self, _summary: &TickSummary) {}
}

#[derive(Debug)]
struct SpawnOrder {
    parent_index: usize,
    neuron: Neuron,
}

/// Registry, clock, and collaborators of one simulated column.
pub struct ColumnWorld {
    config: ColumnConfig,
    tick: Tick,
    rng: SmallRng,
    mechanics: Box<dyn Mechanics>,
    neurons: NeuronArena,
    born_at: NeuronMap<Tick>,
    pending_spawns: Vec<SpawnOrder>,
    observer: Box<dyn LineageObserver>,
    history: VecDeque<TickSummary>,
}

impl fmt::Debug for ColumnWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnWorld")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("neuron_count", &self.neurons.len())
            .finish()
    }
}

impl ColumnWorld {
    /// Validate `config` and build an empty column with the bundled mechanics.
    pub fn new(config: ColumnConfig) -> Result<Self, ConfigError> {
        let mechanics = SphericalMechanics::from_config(&config.mechanics);
        Self::with_parts(config, Box::new(mechanics), Box::new(NullObserver))
    }

    /// Build an empty column with explicit collaborators.
    pub fn with_parts(
        config: ColumnConfig,
        mechanics: Box<dyn Mechanics>,
        observer: Box<dyn LineageObserver>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = config.seeded_rng();
        let history_capacity = config.history_capacity;
        Ok(Self {
            config,
            tick: Tick::zero(),
            rng,
            mechanics,
            neurons: NeuronArena::new(),
            born_at: NeuronMap::new(),
            pending_spawns: Vec::new(),
            observer,
            history: VecDeque::with_capacity(history_capacity),
        })
    }

    /// Place the configured progenitor grid on the `y = 0` plane, centred in the cube.
    pub fn seed_progenitors(&mut self) -> Vec<NeuronId> {
        let seeding = &self.config.seeding;
        let side = seeding.grid_side;
        let offset = seeding.max_bound / 2.0 - (side / 2) as f32 * seeding.spacing;
        let spacing = seeding.spacing;
        // Bounded by `max_population` in `ColumnConfig::validate`.
        let count = side as usize * side as usize;

        let mut ids = Vec::with_capacity(count);
        self.neurons.reserve(count);
        for i in 0..side {
            for j in 0..side {
                let position = Position::new(
                    offset + i as f32 * spacing,
                    0.0,
                    offset + j as f32 * spacing,
                );
                ids.push(self.add_progenitor(position));
            }
        }
        info!(count = ids.len(), side, "seeded progenitor grid");
        ids
    }

    /// Add a single progenitor at `position` built from the configured template.
    pub fn add_progenitor(&mut self, position: Position) -> NeuronId {
        let state = NeuronState::progenitor(
            &self.config.cell,
            position,
            self.config.lineage.intracellular_substance,
        );
        self.spawn_neuron(Neuron::new(state))
    }

    /// Register a fully initialised neuron.
    pub fn spawn_neuron(&mut self, neuron: Neuron) -> NeuronId {
        self.register(neuron, self.tick)
    }

    fn register(&mut self, neuron: Neuron, born: Tick) -> NeuronId {
        let id = self.neurons.insert(neuron);
        self.born_at.insert(id, born);
        id
    }

    fn stage_behaviors(&mut self, events: &mut TickEvents) -> Result<(), LineageError> {
        let Self {
            config,
            rng,
            mechanics,
            neurons,
            pending_spawns,
            ..
        } = self;
        let mut env = TickEnv {
            params: &config.lineage,
            rng,
            mechanics: &mut **mechanics,
        };
        for (parent_index, neuron) in neurons.dense_mut().iter_mut().enumerate() {
            let outcome = grn::run_slice(neuron, &mut env)?;
            events.absorb(&outcome.events);
            pending_spawns.extend(
                outcome
                    .daughters
                    .into_iter()
                    .map(|neuron| SpawnOrder {
                        parent_index,
                        neuron,
                    }),
            );
        }
        Ok(())
    }

    fn stage_spawn_commit(&mut self, events: &mut TickEvents) -> Result<(), LineageError> {
        if self.pending_spawns.is_empty() {
            return Ok(());
        }
        let mut orders = std::mem::take(&mut self.pending_spawns);
        let requested = self.neurons.len() + orders.len();
        if requested > self.config.max_population {
            return Err(LineageError::PopulationLimit {
                requested,
                limit: self.config.max_population,
            });
        }
        orders.sort_by_key(|order| order.parent_index);
        events.births = orders.len();
        self.neurons.reserve(orders.len());
        for order in orders {
            self.register(order.neuron, events.tick);
        }
        Ok(())
    }

    fn stage_summary(&mut self, events: TickEvents) {
        let summary = TickSummary {
            tick: events.tick,
            population: self.neurons.len(),
            events,
            census: self.census(),
        };
        self.observer.on_tick(&summary);
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary);
    }

    /// Execute one tick: every neuron's behaviors, then daughter registration.
    ///
    /// An error leaves the column mid-tick; callers should abandon the run.
    pub fn step(&mut self) -> Result<TickEvents, LineageError> {
        let next_tick = self.tick.next();
        let mut events = TickEvents {
            tick: next_tick,
            ..TickEvents::default()
        };

        self.stage_behaviors(&mut events)?;
        self.stage_spawn_commit(&mut events)?;
        self.tick = next_tick;
        self.stage_summary(events);
        Ok(events)
    }

    /// Step `steps` ticks, accumulating totals.
    pub fn run(&mut self, steps: u64) -> Result<RunReport, LineageError> {
        let mut births = 0;
        let mut differentiations = 0;
        let mut settlements = 0;
        for _ in 0..steps {
            let events = self.step()?;
            births += events.births;
            differentiations += events.differentiations;
            settlements += events.settlements;
        }
        let report = RunReport {
            ticks: steps,
            final_tick: self.tick,
            population: self.neurons.len(),
            births,
            differentiations,
            settlements,
            census: self.census(),
        };
        debug!(
            ticks = report.ticks,
            population = report.population,
            differentiations,
            "run finished"
        );
        Ok(report)
    }

    /// Current laminar census.
    #[must_use]
    pub fn census(&self) -> LayerCensus {
        LayerCensus::from_states(self.neurons.states())
    }

    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    #[must_use]
    pub fn config(&self) -> &ColumnConfig {
        &self.config
    }

    /// Read-only access to the neuron arena.
    #[must_use]
    pub fn neurons(&self) -> &NeuronArena {
        &self.neurons
    }

    #[must_use]
    pub fn neuron(&self, id: NeuronId) -> Option<&Neuron> {
        self.neurons.get(id)
    }

    /// Tick at which `id` was registered.
    #[must_use]
    pub fn born_at(&self, id: NeuronId) -> Option<Tick> {
        self.born_at.get(id).copied()
    }

    /// Iterate over retained tick summaries.
    pub fn history(&self) -> impl Iterator<Item = &TickSummary> {
        self.history.iter()
    }

    /// Replace the observer.
    pub fn set_observer(&mut self, observer: Box<dyn LineageObserver>) {
        self.observer = observer;
    }
}
