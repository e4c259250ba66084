use super::*;
use crate::ending_criterion;
use crate::evaluator::Evaluator;
use log::debug;
use rand::distr::Open01;
use rand::Rng;

/// Exponential waiting time for an event with the given total rate.
pub(super) fn exponential(rng: &mut dyn RngCore, rate: f64) -> f64 {
    let u: f64 = rng.sample(Open01);
    -u.ln() / rate
}

/// What happens at the next event time.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Event {
    /// A single firing of the reaction with this index.
    Fire(usize),
    /// Many firings at once, given as the net change of every species.
    Leap(Vec<i64>),
}

/// Adds a leap's net changes to `populations`, leaving them untouched if
/// any would become negative.
pub(super) fn apply_changes(populations: &mut [u64], changes: &[i64]) -> Result<()> {
    for (species, (&population, &change)) in populations.iter().zip(changes).enumerate() {
        if population.checked_add_signed(change).is_none() {
            return Err(Error::NumericalFailure(format!(
                "leap would take species {} from {} to {}",
                species,
                population,
                population as i128 + change as i128
            )));
        }
    }
    for (population, &change) in populations.iter_mut().zip(changes) {
        *population = population.wrapping_add_signed(change);
    }
    Ok(())
}

/// Chooses what happens next, and when.
pub(super) trait EventScheduler {
    fn initialize(
        &mut self,
        evaluator: &mut Evaluator,
        populations: &[u64],
        rng: &mut dyn RngCore,
    ) -> Result<()>;

    /// The absolute time of the next event and what it does, or `None` when
    /// no reaction can fire. Leaps never end after `horizon`, the next
    /// sample time.
    fn next_event(
        &mut self,
        evaluator: &mut Evaluator,
        populations: &[u64],
        horizon: f64,
        rng: &mut dyn RngCore,
    ) -> Result<Option<(f64, Event)>>;

    /// Called once `reaction` has fired alone at `time`, with the clock
    /// already advanced.
    fn on_event(
        &mut self,
        reaction: usize,
        time: f64,
        evaluator: &mut Evaluator,
        populations: &[u64],
        rng: &mut dyn RngCore,
    ) -> Result<()>;
}

/// Runs a discrete simulation, fetching events from `scheduler`.
#[allow(clippy::too_many_arguments)]
pub(super) fn run_stochastic(
    scheduler: &mut impl EventScheduler,
    model: &Model,
    request: &SimulationRequest,
    parameters: &SimulatorParameters,
    rng: &mut dyn RngCore,
    ending_criteria: &mut [Box<dyn EndingCriterion>],
    sink: &mut dyn SampleSink,
) -> Result<Outcome> {
    let mut populations = model.initial_populations()?;
    let mut sampler = Sampler::new(model, request, sink)?;
    let mut evaluator = Evaluator::with_cache(model, parameters.use_expression_cache);

    let mut time = request.start_time;
    let mut events = 0;
    for criterion in ending_criteria.iter_mut() {
        criterion.initialize(time);
    }

    let mut step = || -> Result<Termination> {
        sampler.record_through(time, &mut evaluator, &populations)?;
        evaluator.set_time(time);
        scheduler.initialize(&mut evaluator, &populations, rng)?;

        loop {
            if let Some(termination) = ending_criterion::should_end(ending_criteria) {
                return Ok(termination);
            }

            let horizon = sampler.next_after(time).unwrap_or(request.end_time);
            let (next_time, event) =
                match scheduler.next_event(&mut evaluator, &populations, horizon, rng)? {
                    Some(event) => event,
                    None => {
                        sampler.fill_remaining(&mut evaluator, &populations)?;
                        return Ok(Termination::Exhausted);
                    }
                };

            sampler.record_before(next_time, &mut evaluator, &populations)?;
            if sampler.is_done() {
                return Ok(Termination::EndTime);
            }

            match &event {
                Event::Fire(reaction) => model.reactions()[*reaction].apply(&mut populations)?,
                Event::Leap(changes) => apply_changes(&mut populations, changes)?,
            }
            time = next_time;
            events += 1;
            evaluator.set_time(time);
            evaluator.invalidate();
            if let Event::Fire(reaction) = event {
                scheduler.on_event(reaction, time, &mut evaluator, &populations, rng)?;
            }
            for criterion in ending_criteria.iter_mut() {
                criterion.update(time);
            }
        }
    };
    let termination = step().unwrap_or_else(Termination::Failed);

    debug!(
        "stochastic run of `{}` stopped after {} events at time {}: {}",
        model.name(),
        events,
        time,
        termination
    );
    Ok(Outcome {
        termination,
        steps: events,
        final_time: time,
    })
}
