//! Gene-regulatory behavior state machine.
//!
//! Each tick a neuron runs its attached behaviors in attachment order. Behaviors
//! attached during the slice run later in that same slice; a behavior that detaches
//! itself (or a predecessor) never shifts a not-yet-run behavior past the cursor.
//!
//! ```text
//! Proliferating(s0) -> Expanding(s1..s6) -> Migrating(type) -> Settled(type)
//!                                     \-> Exhausted (s7, no differentiation)
//! ```

use rand::{Rng, RngCore};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::behavior::{Behavior, BehaviorKind, BehaviorSet, GradientFollower, StateTransition};
use crate::config::SimulationParameters;
use crate::error::LineageError;
use crate::mechanics::Mechanics;
use crate::neuron::{CellType, Neuron, Stage};

/// The dispatcher attaches a phase behavior only while fewer than this many are attached.
pub const DISPATCH_CEILING: usize = 2;

/// Collaborators shared by every slice of a tick.
pub struct TickEnv<'a> {
    pub params: &'a SimulationParameters,
    pub rng: &'a mut dyn RngCore,
    pub mechanics: &'a mut dyn Mechanics,
}

/// Lineage transition observed while running a slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineageEvent {
    StageAdvanced { from: Stage, to: Stage },
    Divided { by: BehaviorKind },
    Differentiated { cell_type: CellType },
    Settled { cell_type: CellType },
    /// Dispatcher found no phase behavior for the neuron's stage.
    Exhausted { stage: Stage },
}

/// Result of one neuron's slice: daughters to register and the transitions seen.
#[derive(Debug, Default)]
pub struct SliceOutcome {
    pub daughters: Vec<Neuron>,
    pub events: SmallVec<[LineageEvent; 4]>,
}

/// Run every attached behavior of `neuron` once.
pub fn run_slice(neuron: &mut Neuron, env: &mut TickEnv<'_>) -> Result<SliceOutcome, LineageError> {
    let mut outcome = SliceOutcome::default();
    let mut cursor = 0;
    while let Some(kind) = neuron.behaviors.kind_at(cursor) {
        let visited: SmallVec<[BehaviorKind; BehaviorSet::CAPACITY]> =
            neuron.behaviors.kinds().take(cursor + 1).collect();
        run_behavior(kind, neuron, env, &mut outcome)?;
        // Survivors of the visited prefix stay ahead of anything attached meanwhile.
        cursor = neuron
            .behaviors
            .kinds()
            .filter(|k| visited.contains(k))
            .count();
    }
    Ok(outcome)
}

/// Run a single behavior by tag. Absent tags are a no-op.
pub fn run_behavior(
    kind: BehaviorKind,
    neuron: &mut Neuron,
    env: &mut TickEnv<'_>,
    outcome: &mut SliceOutcome,
) -> Result<(), LineageError> {
    match kind {
        BehaviorKind::Dispatcher => dispatch(neuron, outcome),
        BehaviorKind::SymmetricDivision => symmetric_division(neuron, env, outcome),
        BehaviorKind::SingleDivision => single_division(neuron, env, outcome),
        BehaviorKind::StateTransition => state_transition(neuron, env, outcome),
        BehaviorKind::DifferentiatedMigration => {
            differentiated_migration(neuron, outcome);
            Ok(())
        }
        BehaviorKind::MigrationSignal => {
            migration_signal(neuron, env);
            Ok(())
        }
    }
}

fn dispatch(neuron: &mut Neuron, outcome: &mut SliceOutcome) -> Result<(), LineageError> {
    // Differentiation ends dispatching for good, even once the migration behaviors detach.
    if neuron.state.cell_type.is_differentiated() {
        return Ok(());
    }
    if neuron.behaviors.len() >= DISPATCH_CEILING {
        return Ok(());
    }
    let stage = neuron.state.stage;
    if stage.is_progenitor() {
        neuron
            .behaviors
            .attach(Behavior::SymmetricDivision(Default::default()))?;
    } else if let Some(target) = stage.layer_target() {
        neuron
            .behaviors
            .attach(Behavior::StateTransition(StateTransition::new(target)))?;
        trace!(%stage, %target, "attached state transition");
    } else {
        debug!(%stage, "no phase behavior for stage; lineage exhausted");
        outcome.events.push(LineageEvent::Exhausted { stage });
    }
    Ok(())
}

fn symmetric_division(
    neuron: &mut Neuron,
    env: &mut TickEnv<'_>,
    outcome: &mut SliceOutcome,
) -> Result<(), LineageError> {
    let Some(Behavior::SymmetricDivision(mut phase)) =
        neuron.behaviors.get(BehaviorKind::SymmetricDivision).cloned()
    else {
        return Ok(());
    };

    let state = &mut neuron.state;
    if state.diameter <= state.division_threshold && !phase.finished {
        let amount = state.growth_rate;
        env.mechanics.grow(state, amount);
    } else {
        let mut daughter = env.mechanics.divide(state, env.rng);
        daughter.inherit_lineage(state);
        daughter.intracellular_substance = state.intracellular_substance;
        outcome.daughters.push(Neuron::with_behaviors(
            daughter,
            [Behavior::Dispatcher, Behavior::SymmetricDivision(phase)],
        )?);
        outcome.events.push(LineageEvent::Divided {
            by: BehaviorKind::SymmetricDivision,
        });
    }

    state.intracellular_substance -= 1.0;

    if state.intracellular_substance < state.internal_threshold {
        phase.finished = true;
        neuron.behaviors.detach(BehaviorKind::SymmetricDivision);
        advance_stage(neuron, outcome);
    } else {
        neuron.behaviors.replace(Behavior::SymmetricDivision(phase));
    }
    Ok(())
}

fn state_transition(
    neuron: &mut Neuron,
    env: &mut TickEnv<'_>,
    outcome: &mut SliceOutcome,
) -> Result<(), LineageError> {
    let Some(Behavior::StateTransition(mut transition)) =
        neuron.behaviors.get(BehaviorKind::StateTransition).cloned()
    else {
        return Ok(());
    };

    let draw: f32 = env.rng.random();
    if draw < env.params.diff_prob && !transition.expanding {
        let cell_type = transition.target;
        // Nothing below this lookup may run on failure; a same-slice dispatcher
        // attach is the only change that precedes the error.
        let height = env
            .params
            .height_for(cell_type)
            .ok_or(LineageError::MissingHeight { cell_type })?;

        neuron.behaviors.detach(BehaviorKind::StateTransition);
        let state = &mut neuron.state;
        state.migration_substance = height;
        state.cell_type = cell_type;
        state.migrating = true;
        neuron.behaviors.attach(Behavior::DifferentiatedMigration)?;
        neuron
            .behaviors
            .attach(Behavior::MigrationSignal(GradientFollower::new(
                env.params.gradient_substance.as_str(),
                env.params.chemotaxis_strength,
            )))?;
        debug!(%cell_type, stage = %neuron.state.stage, height, "neuron differentiated");
        outcome
            .events
            .push(LineageEvent::Differentiated { cell_type });
        return Ok(());
    }

    transition.expanding = true;
    if neuron.behaviors.len() < BehaviorSet::CAPACITY && !transition.multiplied {
        neuron.behaviors.attach(Behavior::SingleDivision)?;
        transition.multiplied = true;
    }
    neuron.behaviors.replace(Behavior::StateTransition(transition));
    Ok(())
}

fn single_division(
    neuron: &mut Neuron,
    env: &mut TickEnv<'_>,
    outcome: &mut SliceOutcome,
) -> Result<(), LineageError> {
    let state = &mut neuron.state;
    if state.diameter <= state.division_threshold {
        let amount = state.growth_rate;
        env.mechanics.grow(state, amount);
        return Ok(());
    }

    let mut daughter = env.mechanics.divide(state, env.rng);
    daughter.inherit_lineage(state);
    outcome.daughters.push(Neuron::new(daughter));
    outcome.events.push(LineageEvent::Divided {
        by: BehaviorKind::SingleDivision,
    });

    neuron.behaviors.detach(BehaviorKind::SingleDivision);
    neuron.behaviors.detach(BehaviorKind::StateTransition);
    advance_stage(neuron, outcome);
    Ok(())
}

fn differentiated_migration(neuron: &mut Neuron, outcome: &mut SliceOutcome) {
    let state = &mut neuron.state;
    if !state.migrating {
        return;
    }
    state.migration_substance -= 1.0;
    if state.migration_substance <= state.migration_threshold {
        state.migrating = false;
        let cell_type = state.cell_type;
        neuron
            .behaviors
            .detach(BehaviorKind::DifferentiatedMigration);
        neuron.behaviors.detach(BehaviorKind::MigrationSignal);
        trace!(%cell_type, "neuron settled");
        outcome.events.push(LineageEvent::Settled { cell_type });
    }
}

fn migration_signal(neuron: &mut Neuron, env: &mut TickEnv<'_>) {
    let Neuron { state, behaviors } = neuron;
    if let Some(Behavior::MigrationSignal(follower)) = behaviors.get(BehaviorKind::MigrationSignal)
    {
        env.mechanics
            .follow_gradient(state, &follower.substance, follower.strength);
    }
}

fn advance_stage(neuron: &mut Neuron, outcome: &mut SliceOutcome) {
    let from = neuron.state.stage;
    let to = from.next();
    neuron.state.stage = to;
    trace!(%from, %to, "stage advanced");
    outcome.events.push(LineageEvent::StageAdvanced { from, to });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::SymmetricDivision;
    use crate::config::CellTemplate;
    use crate::neuron::{NeuronState, Position};
    use rand::{SeedableRng, rngs::SmallRng};

    /// Grows diameter linearly and splits it in half; keeps assertions exact.
    #[derive(Default)]
    struct LinearMechanics {
        follows: usize,
    }

    impl Mechanics for LinearMechanics {
        fn grow(&mut self, cell: &mut NeuronState, amount: f32) {
            cell.diameter += amount;
        }

        fn divide(&mut self, mother: &mut NeuronState, _rng: &mut dyn RngCore) -> NeuronState {
            mother.diameter *= 0.5;
            mother.clone()
        }

        fn follow_gradient(&mut self, cell: &mut NeuronState, _substance: &str, strength: f32) {
            self.follows += 1;
            cell.position.y += strength;
        }
    }

    struct Harness {
        params: SimulationParameters,
        rng: SmallRng,
        mechanics: LinearMechanics,
    }

    impl Harness {
        fn new(diff_prob: f32) -> Self {
            Self {
                params: SimulationParameters {
                    diff_prob,
                    ..SimulationParameters::default()
                },
                rng: SmallRng::seed_from_u64(0xC0FFEE),
                mechanics: LinearMechanics::default(),
            }
        }

        fn tick(&mut self, neuron: &mut Neuron) -> SliceOutcome {
            let mut env = TickEnv {
                params: &self.params,
                rng: &mut self.rng,
                mechanics: &mut self.mechanics,
            };
            let outcome = run_slice(neuron, &mut env).expect("slice");
            assert!(neuron.behaviors.len() <= BehaviorSet::CAPACITY);
            outcome
        }
    }

    fn template(growth_rate: f32, division_threshold: f32) -> CellTemplate {
        CellTemplate {
            diameter: 4.0,
            growth_rate,
            division_threshold,
            ..CellTemplate::default()
        }
    }

    fn progenitor(template: &CellTemplate) -> Neuron {
        Neuron::new(NeuronState::progenitor(template, Position::default(), 400.0))
    }

    fn at_stage(template: &CellTemplate, stage: Stage) -> Neuron {
        let mut neuron = progenitor(template);
        neuron.state.stage = stage;
        neuron
    }

    fn kinds(neuron: &Neuron) -> Vec<BehaviorKind> {
        neuron.behaviors.kinds().collect()
    }

    #[test]
    fn dispatcher_attaches_symmetric_division_and_runs_it_same_tick() {
        let mut harness = Harness::new(0.5);
        let mut neuron = progenitor(&template(1.0, 1_000.0));

        harness.tick(&mut neuron);
        assert_eq!(
            kinds(&neuron),
            vec![BehaviorKind::Dispatcher, BehaviorKind::SymmetricDivision]
        );
        assert_eq!(neuron.state.intracellular_substance, 399.0);
        assert_eq!(neuron.state.diameter, 5.0);

        harness.tick(&mut neuron);
        assert_eq!(neuron.behaviors.len(), 2, "dispatcher stays inert at the ceiling");
    }

    #[test]
    fn symmetric_division_advances_stage_at_tick_381() {
        let mut harness = Harness::new(0.5);
        let mut neuron = progenitor(&template(1.0, 1_000_000.0));

        for tick in 1..=380 {
            let outcome = harness.tick(&mut neuron);
            assert!(outcome.daughters.is_empty());
            assert_eq!(neuron.state.stage, Stage::PROGENITOR, "tick {tick}");
        }
        assert_eq!(neuron.state.intracellular_substance, 20.0);

        let outcome = harness.tick(&mut neuron);
        assert_eq!(neuron.state.stage, Stage::FIRST_LAYER);
        assert_eq!(neuron.state.intracellular_substance, 19.0);
        assert_eq!(kinds(&neuron), vec![BehaviorKind::Dispatcher]);
        assert!(outcome.events.contains(&LineageEvent::StageAdvanced {
            from: Stage::PROGENITOR,
            to: Stage::FIRST_LAYER
        }));

        // The reopened dispatcher picks the first layer up on the following tick.
        harness.tick(&mut neuron);
        assert!(neuron.behaviors.contains(BehaviorKind::StateTransition)
            || neuron.state.cell_type.is_differentiated());
    }

    #[test]
    fn symmetric_daughter_inherits_substance_before_decay() {
        let mut harness = Harness::new(0.5);
        let template = template(1.0, 3.0);
        let mut neuron = progenitor(&template);

        let outcome = harness.tick(&mut neuron);
        assert_eq!(outcome.daughters.len(), 1);
        let daughter = &outcome.daughters[0];
        assert_eq!(daughter.state.intracellular_substance, 400.0);
        assert_eq!(neuron.state.intracellular_substance, 399.0);
        assert_eq!(daughter.state.stage, Stage::PROGENITOR);
        assert_eq!(daughter.state.generation.0, 1);
        assert_eq!(
            daughter.behaviors.get(BehaviorKind::SymmetricDivision),
            Some(&Behavior::SymmetricDivision(SymmetricDivision::default()))
        );
        assert_eq!(
            outcome.events[0],
            LineageEvent::Divided {
                by: BehaviorKind::SymmetricDivision
            }
        );
    }

    #[test]
    fn certain_differentiation_fires_on_first_transition_tick() {
        let mut harness = Harness::new(1.0);
        let mut neuron = at_stage(&template(1.0, 1_000.0), Stage::FIRST_LAYER);

        let outcome = harness.tick(&mut neuron);
        assert_eq!(neuron.state.cell_type, CellType::MarginalZone);
        assert_eq!(neuron.state.stage, Stage::FIRST_LAYER);
        assert!(neuron.state.migrating);
        assert_eq!(
            kinds(&neuron),
            vec![
                BehaviorKind::Dispatcher,
                BehaviorKind::DifferentiatedMigration,
                BehaviorKind::MigrationSignal
            ]
        );
        assert!(outcome.events.contains(&LineageEvent::Differentiated {
            cell_type: CellType::MarginalZone
        }));
        // Attached in the same slice, so the clock already ticked once.
        assert_eq!(neuron.state.migration_substance, 149.0);
        assert_eq!(harness.mechanics.follows, 1);
    }

    #[test]
    fn missing_height_fails_before_mutation() {
        let mut harness = Harness::new(1.0);
        harness.params.height_map.remove(&CellType::L5.index());
        let mut neuron = at_stage(&template(1.0, 1_000.0), Stage(3));
        neuron
            .behaviors
            .attach(Behavior::StateTransition(StateTransition::new(CellType::L5)))
            .unwrap();
        let before = neuron.clone();

        let mut env = TickEnv {
            params: &harness.params,
            rng: &mut harness.rng,
            mechanics: &mut harness.mechanics,
        };
        let err = run_slice(&mut neuron, &mut env).expect_err("fatal lookup");
        assert_eq!(
            err,
            LineageError::MissingHeight {
                cell_type: CellType::L5
            }
        );
        assert!(err.is_configuration());
        assert_eq!(neuron, before);
    }

    #[test]
    fn missing_height_keeps_only_the_dispatcher_attach() {
        let mut harness = Harness::new(1.0);
        harness.params.height_map.remove(&CellType::L5.index());
        let mut neuron = at_stage(&template(1.0, 1_000.0), Stage(3));
        assert_eq!(kinds(&neuron), vec![BehaviorKind::Dispatcher]);
        let state_before = neuron.state.clone();

        let mut env = TickEnv {
            params: &harness.params,
            rng: &mut harness.rng,
            mechanics: &mut harness.mechanics,
        };
        let err = run_slice(&mut neuron, &mut env).expect_err("fatal lookup");
        assert_eq!(
            err,
            LineageError::MissingHeight {
                cell_type: CellType::L5
            }
        );
        assert_eq!(neuron.state, state_before);
        assert_eq!(
            kinds(&neuron),
            vec![BehaviorKind::Dispatcher, BehaviorKind::StateTransition]
        );
        assert_eq!(
            neuron.behaviors.get(BehaviorKind::StateTransition),
            Some(&Behavior::StateTransition(StateTransition::new(CellType::L5)))
        );
    }

    #[test]
    fn failed_roll_expands_once_and_never_differentiates_that_stage() {
        let mut harness = Harness::new(0.0);
        let mut neuron = at_stage(&template(1.0, 6.0), Stage(2));

        harness.tick(&mut neuron);
        assert_eq!(
            kinds(&neuron),
            vec![
                BehaviorKind::Dispatcher,
                BehaviorKind::StateTransition,
                BehaviorKind::SingleDivision
            ]
        );
        assert_eq!(
            neuron.behaviors.get(BehaviorKind::StateTransition),
            Some(&Behavior::StateTransition(StateTransition {
                target: CellType::L6,
                expanding: true,
                multiplied: true,
            }))
        );
        // Grew in the same slice it was attached.
        assert_eq!(neuron.state.diameter, 5.0);

        // Even a certain roll cannot differentiate once the stage is expanding.
        harness.params.diff_prob = 1.0;
        harness.tick(&mut neuron);
        assert_eq!(neuron.state.cell_type, CellType::Undifferentiated);
        assert_eq!(neuron.state.diameter, 6.0);
        assert_eq!(neuron.behaviors.len(), 3);
    }

    #[test]
    fn single_division_hands_stage_to_daughter_and_advances_parent() {
        let mut harness = Harness::new(0.0);
        let mut neuron = at_stage(&template(1.0, 5.0), Stage(2));

        harness.tick(&mut neuron); // attach transition + division, grow 4 -> 5
        let outcome = harness.tick(&mut neuron); // 5 <= 5, grow to 6
        assert!(outcome.daughters.is_empty());

        let outcome = harness.tick(&mut neuron);
        assert_eq!(outcome.daughters.len(), 1);
        let daughter = &outcome.daughters[0];
        assert_eq!(daughter.state.stage, Stage(2));
        assert_eq!(
            daughter.behaviors.kinds().collect::<Vec<_>>(),
            vec![BehaviorKind::Dispatcher]
        );
        assert_eq!(neuron.state.stage, Stage(3));
        assert_eq!(kinds(&neuron), vec![BehaviorKind::Dispatcher]);

        harness.tick(&mut neuron);
        assert_eq!(
            neuron.behaviors.get(BehaviorKind::StateTransition),
            Some(&Behavior::StateTransition(StateTransition {
                target: CellType::L5,
                expanding: true,
                multiplied: true,
            }))
        );
    }

    #[test]
    fn never_differentiating_mother_exhausts_while_daughters_restart() {
        let mut harness = Harness::new(0.0);
        let mut neuron = at_stage(&template(5.0, 4.5), Stage::FIRST_LAYER);
        let mut previous = neuron.state.stage;

        let mut exhausted = false;
        let mut daughter_stages = Vec::new();
        for _ in 0..200 {
            let outcome = harness.tick(&mut neuron);
            assert!(neuron.state.stage >= previous);
            for daughter in &outcome.daughters {
                assert_eq!(daughter.state.stage, previous);
                assert_eq!(kinds(daughter), vec![BehaviorKind::Dispatcher]);
                daughter_stages.push(daughter.state.stage);
            }
            previous = neuron.state.stage;
            if outcome
                .events
                .iter()
                .any(|e| matches!(e, LineageEvent::Exhausted { .. }))
            {
                exhausted = true;
                break;
            }
        }
        assert!(exhausted);
        assert_eq!(neuron.state.stage, Stage::EXHAUSTED);
        assert_eq!(neuron.state.cell_type, CellType::Undifferentiated);
        assert_eq!(kinds(&neuron), vec![BehaviorKind::Dispatcher]);
        // One undifferentiated daughter per stage, each free to proliferate again.
        assert_eq!(
            daughter_stages,
            (Stage::FIRST_LAYER.0..=Stage::LAST_LAYER.0)
                .map(Stage)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn migration_clock_settles_after_145_decrements() {
        let mut harness = Harness::new(1.0);
        let mut neuron = at_stage(&template(1.0, 1_000.0), Stage::FIRST_LAYER);

        let mut settled_on = None;
        for tick in 1..=200u32 {
            let outcome = harness.tick(&mut neuron);
            if outcome
                .events
                .contains(&LineageEvent::Settled {
                    cell_type: CellType::MarginalZone,
                })
            {
                settled_on = Some(tick);
                break;
            }
            assert!(neuron.state.migrating);
        }

        // Differentiation and the first decrement share tick 1.
        assert_eq!(settled_on, Some(145));
        assert!(!neuron.state.migrating);
        assert_eq!(neuron.state.migration_substance, 5.0);
        assert_eq!(kinds(&neuron), vec![BehaviorKind::Dispatcher]);
        assert_eq!(harness.mechanics.follows, 144);

        let frozen = neuron.clone();
        for _ in 0..10 {
            let outcome = harness.tick(&mut neuron);
            assert!(outcome.events.is_empty());
        }
        assert_eq!(neuron, frozen, "settled neurons stay settled");
    }

    #[test]
    fn migration_behavior_is_inert_when_not_migrating() {
        let mut harness = Harness::new(0.5);
        let mut neuron = at_stage(&template(1.0, 1_000.0), Stage(4));
        neuron.state.cell_type = CellType::L4;
        neuron.state.migration_substance = 40.0;
        neuron
            .behaviors
            .attach(Behavior::DifferentiatedMigration)
            .unwrap();

        harness.tick(&mut neuron);
        assert_eq!(neuron.state.migration_substance, 40.0);
        assert_eq!(neuron.behaviors.len(), 2);
    }
}
