use super::stochastic::{exponential, run_stochastic, Event, EventScheduler};
use super::*;
use crate::evaluator::Evaluator;
use rand::distr::Open01;
use rand::Rng;

/// Gillespie's direct method. Every event recomputes all propensities, draws
/// the waiting time from their sum and picks a reaction with probability
/// proportional to its propensity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GillespieDirect;

impl GillespieDirect {
    pub const ALIAS: &'static str = "gillespie-direct";
}

impl Simulator for GillespieDirect {
    fn alias(&self) -> &'static str {
        GillespieDirect::ALIAS
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
        let mut scheduler = DirectScheduler {
            propensities: vec![0.; model.num_reactions()],
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

struct DirectScheduler {
    propensities: Vec<f64>,
}

/// Index of the first entry whose running sum exceeds `target`. Rounding can
/// leave `target` at or above the full sum, in which case the last entry with
/// a nonzero weight is chosen.
pub(super) fn select(weights: &[f64], target: f64) -> Option<usize> {
    let mut partial_sum = 0.;
    for (i, &weight) in weights.iter().enumerate() {
        partial_sum += weight;
        if partial_sum > target {
            return Some(i);
        }
    }
    weights.iter().rposition(|&weight| weight > 0.)
}

impl EventScheduler for DirectScheduler {
    fn initialize(
        &mut self,
        _evaluator: &mut Evaluator,
        _populations: &[u64],
        _rng: &mut dyn RngCore,
    ) -> Result<()> {
        Ok(())
    }

    fn next_event(
        &mut self,
        evaluator: &mut Evaluator,
        populations: &[u64],
        _horizon: f64,
        rng: &mut dyn RngCore,
    ) -> Result<Option<(f64, Event)>> {
        let model = evaluator.model();
        for (propensity, reaction) in self.propensities.iter_mut().zip(model.reactions()) {
            *propensity = reaction.propensity(evaluator, populations)?;
        }
        let total: f64 = self.propensities.iter().sum();
        if total <= 0. {
            return Ok(None);
        }
        if !total.is_finite() {
            return Err(Error::NumericalFailure(format!(
                "total propensity {} at time {}",
                total,
                evaluator.time()
            )));
        }

        let time = evaluator.time() + exponential(rng, total);
        let u: f64 = rng.sample(Open01);
        Ok(select(&self.propensities, u * total).map(|reaction| (time, Event::Fire(reaction))))
    }

    fn on_event(
        &mut self,
        _reaction: usize,
        _time: f64,
        _evaluator: &mut Evaluator,
        _populations: &[u64],
        _rng: &mut dyn RngCore,
    ) -> Result<()> {
        Ok(())
    }
}
