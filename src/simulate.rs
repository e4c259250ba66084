use crate::analysis::EnsembleStatistics;
use crate::ending_criterion::{Cancellation, CancellationToken, EndingCriterion, EventCount};
use crate::error::{Error, Result};
use crate::model::Model;
use crate::simulator::{Outcome, SimulationRequest, Simulator, SimulatorParameters, Termination};
use crate::time_series::{Recorder, SampleSink, TimeSeries};
use log::info;
use rand::prelude::*;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

/// A finished single trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub series: TimeSeries,
    pub termination: Termination,
    /// Events fired or leaps taken, or integration steps accepted.
    pub steps: u64,
    pub final_time: f64,
    /// Seed of the run's random source.
    pub seed: u64,
}

impl Run {
    /// Turns a cancelled or failed run into its error, dropping the partial
    /// trajectory.
    pub fn into_result(self) -> Result<Run> {
        match self.termination {
            Termination::Cancelled => Err(Error::Cancelled),
            Termination::Failed(error) => Err(error),
            _ => Ok(self),
        }
    }
}

/// Independent trajectories of one request and their statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct Ensemble {
    pub runs: Vec<Run>,
    pub statistics: EnsembleStatistics,
    /// Base seed every trajectory seed was derived from.
    pub seed: u64,
}

/// Seed of trajectory `trajectory` in an ensemble with base seed `seed`,
/// scrambled with SplitMix64 so neighbouring trajectories are unrelated.
pub fn derive_seed(seed: u64, trajectory: u64) -> u64 {
    const GOLDEN_GAMMA: u64 = 0x9E3779B97F4A7C15;
    let mut z = seed ^ trajectory.wrapping_mul(GOLDEN_GAMMA);
    z = z.wrapping_add(GOLDEN_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

fn base_seed(parameters: &SimulatorParameters) -> u64 {
    parameters
        .seed
        .unwrap_or_else(|| rand::rng().random::<u64>())
}

fn ending_criteria(
    simulator: &dyn Simulator,
    parameters: &SimulatorParameters,
    token: &CancellationToken,
) -> Vec<Box<dyn EndingCriterion>> {
    let mut criteria: Vec<Box<dyn EndingCriterion>> =
        vec![Box::new(Cancellation::new(token.clone()))];
    let budget = if simulator.is_stochastic() {
        parameters.max_events
    } else {
        parameters.max_iterations
    };
    if let Some(threshold) = budget {
        criteria.push(Box::new(EventCount::new(threshold)));
    }
    criteria
}

/// Runs one trajectory, handing each sample to `sink` as soon as it is
/// taken. The random source is seeded with `derive_seed(seed, 0)`.
pub fn simulate_streaming(
    model: &Model,
    simulator: &dyn Simulator,
    request: &SimulationRequest,
    parameters: &SimulatorParameters,
    token: &CancellationToken,
    sink: &mut dyn SampleSink,
) -> Result<Outcome> {
    parameters.validate()?;
    let seed = derive_seed(base_seed(parameters), 0);
    stream_logged(model, simulator, request, parameters, token, seed, sink)
}

fn stream(
    model: &Model,
    simulator: &dyn Simulator,
    request: &SimulationRequest,
    parameters: &SimulatorParameters,
    token: &CancellationToken,
    seed: u64,
    sink: &mut dyn SampleSink,
) -> Result<Outcome> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut criteria = ending_criteria(simulator, parameters, token);
    simulator.run(model, request, parameters, &mut rng, &mut criteria, sink)
}

/// `stream`, with the start and end of the run logged.
fn stream_logged(
    model: &Model,
    simulator: &dyn Simulator,
    request: &SimulationRequest,
    parameters: &SimulatorParameters,
    token: &CancellationToken,
    seed: u64,
    sink: &mut dyn SampleSink,
) -> Result<Outcome> {
    info!(
        "simulating `{}` with {} from {} to {}",
        model.name(),
        simulator.alias(),
        request.start_time,
        request.end_time
    );
    let outcome = stream(model, simulator, request, parameters, token, seed, sink)?;
    info!(
        "finished `{}` after {} steps: {}",
        model.name(),
        outcome.steps,
        outcome.termination
    );
    Ok(outcome)
}

fn into_run(recorder: Recorder, outcome: Outcome, seed: u64) -> Result<Run> {
    Ok(Run {
        series: recorder.finish()?,
        termination: outcome.termination,
        steps: outcome.steps,
        final_time: outcome.final_time,
        seed,
    })
}

fn run_one(
    model: &Model,
    simulator: &dyn Simulator,
    request: &SimulationRequest,
    parameters: &SimulatorParameters,
    token: &CancellationToken,
    seed: u64,
) -> Result<Run> {
    let mut recorder = Recorder::new(request.symbols.clone());
    let outcome = stream(model, simulator, request, parameters, token, seed, &mut recorder)?;
    into_run(recorder, outcome, seed)
}

/// Runs one trajectory to completion.
pub fn simulate(
    model: &Model,
    simulator: &dyn Simulator,
    request: &SimulationRequest,
    parameters: &SimulatorParameters,
) -> Result<Run> {
    simulate_with_cancellation(model, simulator, request, parameters, &CancellationToken::new())
}

/// Runs one trajectory, stopping early once `token` is cancelled.
pub fn simulate_with_cancellation(
    model: &Model,
    simulator: &dyn Simulator,
    request: &SimulationRequest,
    parameters: &SimulatorParameters,
    token: &CancellationToken,
) -> Result<Run> {
    parameters.validate()?;
    let seed = derive_seed(base_seed(parameters), 0);
    let mut recorder = Recorder::new(request.symbols.clone());
    let outcome = stream_logged(
        model,
        simulator,
        request,
        parameters,
        token,
        seed,
        &mut recorder,
    )?;
    into_run(recorder, outcome, seed)
}

/// Runs `ensemble_size` independent trajectories in parallel. Deterministic
/// simulators always give the same trajectory, so they run it once.
///
/// Trajectory `i` uses the seed `derive_seed(base, i)`, so an ensemble is
/// reproducible from its base seed whatever the number of threads.
pub fn simulate_ensemble(
    model: &Model,
    simulator: &dyn Simulator,
    request: &SimulationRequest,
    parameters: &SimulatorParameters,
    token: &CancellationToken,
) -> Result<Ensemble> {
    parameters.validate()?;
    request.resolve(model)?;
    let size = if simulator.is_stochastic() {
        parameters.ensemble_size
    } else {
        1
    };
    let base = base_seed(parameters);
    info!(
        "simulating an ensemble of {} trajectories of `{}` with {} (seed {})",
        size,
        model.name(),
        simulator.alias(),
        base
    );

    let simulate = || -> Result<Vec<Run>> {
        (0..size as u64)
            .into_par_iter()
            .map(|trajectory| {
                let seed = derive_seed(base, trajectory);
                run_one(model, simulator, request, parameters, token, seed)
            })
            .collect()
    };
    let runs = match parameters.num_threads {
        Some(n) => ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?
            .install(simulate)?,
        None => simulate()?,
    };

    let statistics = EnsembleStatistics::from_series(
        &request.symbols,
        &request.sample_times(),
        runs.iter().map(|run| &run.series),
    )?;
    info!(
        "finished ensemble of `{}`: {} of {} trajectories complete",
        model.name(),
        runs.iter().filter(|run| run.termination.is_complete()).count(),
        runs.len()
    );
    Ok(Ensemble {
        runs,
        statistics,
        seed: base,
    })
}
