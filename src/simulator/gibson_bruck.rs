use super::stochastic::{exponential, run_stochastic, Event, EventScheduler};
use super::*;
use crate::evaluator::Evaluator;
use crate::indexed_priority_queue::IndexedPriorityQueue;

/// The Gibson-Bruck next reaction method.
///
/// Each reaction keeps an absolute putative firing time in an indexed
/// priority queue. After an event only the fired reaction and the reactions
/// depending on it are touched: the fired one draws a new time, the others
/// have their pending time rescaled to their new propensity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GibsonBruck;

impl GibsonBruck {
    pub const ALIAS: &'static str = "gibson-bruck";
}

impl Simulator for GibsonBruck {
    fn alias(&self) -> &'static str {
        GibsonBruck::ALIAS
    }

    fn is_stochastic(&self) -> bool {
        true
    }

    fn run(
        &self,
        model: &Model,
        request: &SimulationRequest,
        parameters: &SimulatorParameters,
        rng: &mut dyn RngCore,
        ending_criteria: &mut [Box<dyn EndingCriterion>],
        sink: &mut dyn SampleSink,
    ) -> Result<Outcome> {
        let mut scheduler = NextReactionScheduler {
            propensities: Vec::with_capacity(model.num_reactions()),
            queue: IndexedPriorityQueue::with_capacity(model.num_reactions(), f64::total_cmp),
        };
        run_stochastic(
            &mut scheduler,
            model,
            request,
            parameters,
            rng,
            ending_criteria,
            sink,
        )
    }
}

type TimeQueue = IndexedPriorityQueue<f64, fn(&f64, &f64) -> std::cmp::Ordering>;

struct NextReactionScheduler {
    propensities: Vec<f64>,
    /// Putative firing times. The external index of each entry is the index
    /// of its reaction.
    queue: TimeQueue,
}

fn putative_time(now: f64, propensity: f64, rng: &mut dyn RngCore) -> f64 {
    if propensity > 0. {
        now + exponential(rng, propensity)
    } else {
        f64::INFINITY
    }
}

/// Reuses the randomness behind a pending time after the propensity of its
/// reaction changed from `old` to `new`.
fn rescaled_time(now: f64, pending: f64, old: f64, new: f64, rng: &mut dyn RngCore) -> f64 {
    if new <= 0. {
        f64::INFINITY
    } else if old > 0. && pending.is_finite() {
        now + (old / new) * (pending - now)
    } else {
        now + exponential(rng, new)
    }
}

impl EventScheduler for NextReactionScheduler {
    fn initialize(
        &mut self,
        evaluator: &mut Evaluator,
        populations: &[u64],
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        let model = evaluator.model();
        let now = evaluator.time();
        self.propensities.clear();
        self.queue.clear();
        for reaction in model.reactions() {
            let propensity = reaction.propensity(evaluator, populations)?;
            self.propensities.push(propensity);
            self.queue.insert(putative_time(now, propensity, rng));
        }
        Ok(())
    }

    fn next_event(
        &mut self,
        _evaluator: &mut Evaluator,
        _populations: &[u64],
        _horizon: f64,
        _rng: &mut dyn RngCore,
    ) -> Result<Option<(f64, Event)>> {
        Ok(self
            .queue
            .peek()
            .filter(|(time, _)| time.is_finite())
            .map(|(&time, reaction)| (time, Event::Fire(reaction))))
    }

    fn on_event(
        &mut self,
        reaction: usize,
        time: f64,
        evaluator: &mut Evaluator,
        populations: &[u64],
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        let model = evaluator.model();
        for &dependent in model.dependents(reaction) {
            let new = model.reactions()[dependent].propensity(evaluator, populations)?;
            let next = if dependent == reaction {
                putative_time(time, new, rng)
            } else {
                let pending = *self.queue.get(dependent)?;
                rescaled_time(time, pending, self.propensities[dependent], new, rng)
            };
            self.propensities[dependent] = new;
            self.queue.update(dependent, next)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::model::{CompileOptions, ModelDefinition, ReactionDefinition};
    use crate::time_series::Recorder;
    use rand::prelude::*;

    #[test]
    fn rescaling() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(rescaled_time(1., 3., 2., 4., &mut rng), 2.);
        assert_eq!(rescaled_time(1., 3., 2., 0., &mut rng), f64::INFINITY);
        let redrawn = rescaled_time(1., f64::INFINITY, 0., 4., &mut rng);
        assert!(redrawn.is_finite() && redrawn > 1.);
        assert_eq!(putative_time(1., 0., &mut rng), f64::INFINITY);
    }

    #[test]
    fn exhausts_when_nothing_can_fire() {
        let definition = ModelDefinition::new("dimerization")
            .compartment("c", 1.)
            .species("A", "c", 5.)
            .species("B", "c", 0.)
            .reaction(
                ReactionDefinition::mass_action("dimerize", 1.)
                    .reactant("A", 2)
                    .product("B", 1),
            );
        let model = Model::compile(&definition, &CompileOptions::default()).unwrap();
        let request = SimulationRequest::new(0., 1000., 11, &["A", "B"]);
        let mut recorder = Recorder::new(request.symbols.clone());
        let mut rng = StdRng::seed_from_u64(11);

        let outcome = GibsonBruck
            .run(
                &model,
                &request,
                &SimulatorParameters::default(),
                &mut rng,
                &mut [],
                &mut recorder,
            )
            .unwrap();
        assert_eq!(outcome.termination, Termination::Exhausted);
        assert_eq!(outcome.steps, 2);

        let series = recorder.finish().unwrap();
        assert_eq!(series.len(), 11);
        assert_eq!(series.value(10, "A"), Some(1.));
        assert_eq!(series.value(10, "B"), Some(2.));
    }
}
