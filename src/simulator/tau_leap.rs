use super::gillespie::select;
use super::stochastic::{exponential, run_stochastic, Event, EventScheduler};
use super::*;
use crate::evaluator::Evaluator;
use rand::distr::Open01;
use rand::Rng;
use rand_distr::{Distribution, Poisson};

/// A leap that would make a population negative is redrawn at most this
/// many times before the run fails.
const MAX_FAILED_LEAPS: usize = 10;
/// Single firings between two checks for a possible leap, in units of
/// `min_events_per_leap`.
const RECHECK_MULTIPLIER: u64 = 4;

/// Gillespie's tau-leap method.
///
/// While propensities are expected to stay nearly constant over an interval
/// tau, every reaction fires a Poisson distributed number of times in one
/// leap. The leap size bounds the expected change and the spread of every
/// propensity by `max_relative_error` times the total propensity. Where the
/// largest such leap would cover fewer than `min_events_per_leap` events,
/// reactions fire one at a time as in the direct method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GillespieTauLeap;

impl GillespieTauLeap {
    pub const ALIAS: &'static str = "gillespie-tauleap";
}

impl Simulator for GillespieTauLeap {
    fn alias(&self) -> &'static str {
        GillespieTauLeap::ALIAS
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
        let mut scheduler = TauLeapScheduler::new(model, parameters);
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

struct TauLeapScheduler {
    max_relative_error: f64,
    min_events_per_leap: u64,
    propensities: Vec<f64>,
    /// Change of one propensity when a single species gains one molecule.
    gradient: Vec<f64>,
    scratch: Vec<u64>,
    changes: Vec<i64>,
    last_was_leap: bool,
    firings_since_check: u64,
}

impl TauLeapScheduler {
    fn new(model: &Model, parameters: &SimulatorParameters) -> Self {
        TauLeapScheduler {
            max_relative_error: parameters.max_relative_error,
            min_events_per_leap: parameters.min_events_per_leap,
            propensities: vec![0.; model.num_reactions()],
            gradient: vec![0.; model.num_species()],
            scratch: Vec::with_capacity(model.num_species()),
            changes: vec![0; model.num_species()],
            last_was_leap: true,
            firings_since_check: 0,
        }
    }

    /// Largest tau over which the expected change of every propensity, and
    /// its standard deviation, stay below `max_relative_error * total`.
    ///
    /// Needs `self.propensities` to hold the propensities in `populations`.
    fn largest_leap(
        &mut self,
        evaluator: &mut Evaluator,
        populations: &[u64],
        total: f64,
    ) -> Result<f64> {
        let model = evaluator.model();
        let bound = self.max_relative_error * total;
        self.scratch.clear();
        self.scratch.extend_from_slice(populations);

        let mut tau = f64::INFINITY;
        for (j, reaction) in model.reactions().iter().enumerate() {
            for &species in reaction.reads() {
                self.scratch[species] = populations[species] + 1;
                evaluator.invalidate();
                let raised = reaction.propensity(evaluator, &self.scratch)?;
                self.scratch[species] = populations[species];
                self.gradient[species] = raised - self.propensities[j];
            }

            let mut mean = 0.;
            let mut variance = 0.;
            for (other, &propensity) in model.reactions().iter().zip(self.propensities.iter()) {
                if propensity <= 0. {
                    continue;
                }
                let sensitivity: f64 = other
                    .changes()
                    .iter()
                    .map(|&(species, change)| change as f64 * self.gradient[species])
                    .sum();
                mean += sensitivity * propensity;
                variance += sensitivity * sensitivity * propensity;
            }
            if mean != 0. {
                tau = tau.min(bound / mean.abs());
            }
            if variance > 0. {
                tau = tau.min(bound * bound / variance);
            }

            for &species in reaction.reads() {
                self.gradient[species] = 0.;
            }
        }
        evaluator.invalidate();
        Ok(tau)
    }

    /// Shrinks `tau` so that the expected firings leave at least half of
    /// every population that would otherwise be driven negative.
    fn limit_to_populations(&mut self, model: &Model, populations: &[u64], tau: f64) -> f64 {
        self.changes.fill(0);
        for (reaction, &propensity) in model.reactions().iter().zip(self.propensities.iter()) {
            let firings = (propensity * tau).floor() as i64;
            for &(species, change) in reaction.changes() {
                self.changes[species] =
                    self.changes[species].saturating_add(change.saturating_mul(firings));
            }
        }

        let mut fraction: f64 = 1.;
        for (&population, &change) in populations.iter().zip(self.changes.iter()) {
            if population > 0 && (population as i64).saturating_add(change) < 0 {
                fraction = fraction.min(-0.5 * population as f64 / change as f64);
            }
        }
        tau * fraction
    }

    /// Draws the number of firings of every reaction over `tau` and returns
    /// their net effect on each species.
    fn draw_leap(
        &mut self,
        model: &Model,
        populations: &[u64],
        tau: f64,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<i64>> {
        for _ in 0..MAX_FAILED_LEAPS {
            self.changes.fill(0);
            for (reaction, &propensity) in model.reactions().iter().zip(self.propensities.iter()) {
                let expected = propensity * tau;
                if expected <= 0. {
                    continue;
                }
                let firings = if 1. / expected.sqrt() > self.max_relative_error {
                    let poisson = Poisson::new(expected).map_err(|e| {
                        Error::NumericalFailure(format!(
                            "cannot draw {} firings of `{}`: {}",
                            expected,
                            reaction.name(),
                            e
                        ))
                    })?;
                    poisson.sample(rng) as i64
                } else {
                    expected.round() as i64
                };
                for &(species, change) in reaction.changes() {
                    self.changes[species] =
                        self.changes[species].saturating_add(change.saturating_mul(firings));
                }
            }

            let feasible = populations
                .iter()
                .zip(self.changes.iter())
                .all(|(&population, &change)| population.checked_add_signed(change).is_some());
            if feasible {
                return Ok(self.changes.clone());
            }
        }
        Err(Error::NumericalFailure(format!(
            "{} leaps of {} in a row drove a population negative; lower max_relative_error",
            MAX_FAILED_LEAPS, tau
        )))
    }
}

impl EventScheduler for TauLeapScheduler {
    fn initialize(
        &mut self,
        _evaluator: &mut Evaluator,
        _populations: &[u64],
        _rng: &mut dyn RngCore,
    ) -> Result<()> {
        self.last_was_leap = true;
        self.firings_since_check = 0;
        Ok(())
    }

    fn next_event(
        &mut self,
        evaluator: &mut Evaluator,
        populations: &[u64],
        horizon: f64,
        rng: &mut dyn RngCore,
    ) -> Result<Option<(f64, Event)>> {
        let model = evaluator.model();
        let now = evaluator.time();
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
                total, now
            )));
        }

        let mut leap = None;
        let due = self.last_was_leap
            || self.firings_since_check >= RECHECK_MULTIPLIER * self.min_events_per_leap;
        if due && horizon > now {
            self.firings_since_check = 0;
            let tau = self.largest_leap(evaluator, populations, total)?;
            if tau >= self.min_events_per_leap as f64 / total {
                leap = Some(tau.min(horizon - now));
            }
        }
        self.last_was_leap = leap.is_some();

        match leap {
            Some(tau) => {
                let tau = self.limit_to_populations(model, populations, tau);
                let changes = self.draw_leap(model, populations, tau, rng)?;
                let time = if tau >= horizon - now {
                    horizon
                } else {
                    now + tau
                };
                Ok(Some((time, Event::Leap(changes))))
            }
            None => {
                self.firings_since_check += 1;
                let time = now + exponential(rng, total);
                let u: f64 = rng.sample(Open01);
                Ok(select(&self.propensities, u * total)
                    .map(|reaction| (time, Event::Fire(reaction))))
            }
        }
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
