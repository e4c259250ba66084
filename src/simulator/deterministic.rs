use super::*;
use crate::ending_criterion;
use crate::evaluator::Evaluator;
use crate::reaction::RateFactor;
use log::debug;

/// dy/dt at `time`: every reaction's net change weighted by its rate.
pub(super) fn derivative(
    model: &Model,
    evaluator: &mut Evaluator,
    time: f64,
    y: &[f64],
    dydt: &mut [f64],
) -> Result<()> {
    evaluator.set_time(time);
    evaluator.invalidate();
    dydt.fill(0.);
    for reaction in model.reactions() {
        let rate = reaction.rate(evaluator, y, RateFactor::Power)?;
        if !rate.is_finite() {
            return Err(Error::NumericalFailure(format!(
                "reaction `{}` has rate {} at time {}",
                reaction.name(),
                rate,
                time
            )));
        }
        reaction.accumulate(dydt, rate);
    }
    Ok(())
}

/// A one-step method for the rate equations.
pub(super) trait Integrator {
    /// Called once before the first step of a run spanning `span`.
    fn initialize(&mut self, num_species: usize, span: f64, parameters: &SimulatorParameters);

    /// Advances `y` from `time` by at most `max_step` and returns the size of
    /// the step taken.
    fn step(
        &mut self,
        model: &Model,
        evaluator: &mut Evaluator,
        time: f64,
        y: &mut [f64],
        max_step: f64,
    ) -> Result<f64>;
}

/// Integrates the rate equations with `integrator`, stepping exactly onto
/// every sample time.
#[allow(clippy::too_many_arguments)]
pub(super) fn run_deterministic(
    integrator: &mut impl Integrator,
    model: &Model,
    request: &SimulationRequest,
    parameters: &SimulatorParameters,
    ending_criteria: &mut [Box<dyn EndingCriterion>],
    sink: &mut dyn SampleSink,
) -> Result<Outcome> {
    let mut y = model.initial_amounts();
    let mut sampler = Sampler::new(model, request, sink)?;
    let mut evaluator = Evaluator::with_cache(model, parameters.use_expression_cache);

    let mut time = request.start_time;
    let mut steps = 0;
    integrator.initialize(
        model.num_species(),
        request.end_time - request.start_time,
        parameters,
    );
    for criterion in ending_criteria.iter_mut() {
        criterion.initialize(time);
    }

    let mut advance = || -> Result<Termination> {
        sampler.record_through(time, &mut evaluator, &y)?;
        loop {
            if let Some(termination) = ending_criterion::should_end(ending_criteria) {
                return Ok(termination);
            }
            let target = match sampler.next_time() {
                Some(target) => target,
                None => return Ok(Termination::EndTime),
            };

            let remaining = target - time;
            let taken = integrator.step(model, &mut evaluator, time, &mut y, remaining)?;
            time = if taken >= remaining { target } else { time + taken };
            steps += 1;
            for criterion in ending_criteria.iter_mut() {
                criterion.update(time);
            }
            sampler.record_through(time, &mut evaluator, &y)?;
        }
    };
    let termination = advance().unwrap_or_else(Termination::Failed);

    debug!(
        "deterministic run of `{}` stopped after {} steps at time {}: {}",
        model.name(),
        steps,
        time,
        termination
    );
    Ok(Outcome {
        termination,
        steps,
        final_time: time,
    })
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::model::{CompileOptions, ModelDefinition, ReactionDefinition, Value};

    #[test]
    fn derivative_of_mass_action() {
        let definition = ModelDefinition::new("dimerization")
            .compartment("c", 1.)
            .species("A", "c", 4.)
            .species("B", "c", 0.)
            .boundary_species("S", "c", 3.)
            .reaction(
                ReactionDefinition::mass_action("dimerize", 0.5)
                    .reactant("A", 2)
                    .product("B", 1),
            )
            .reaction(
                ReactionDefinition::mass_action("feed", Value::parse("2 * time").unwrap())
                    .reactant("S", 1)
                    .product("A", 1),
            );
        let model = Model::compile(&definition, &CompileOptions::default()).unwrap();
        let mut evaluator = Evaluator::new(&model);
        let y = model.initial_amounts();
        let mut dydt = vec![0.; 3];

        derivative(&model, &mut evaluator, 1., &y, &mut dydt).unwrap();
        // dimerize: 0.5 * 4^2 = 8, feed: 2 * 1 * 3 = 6
        assert_eq!(dydt, vec![-16. + 6., 8., 0.]);
    }
}
