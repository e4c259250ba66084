use super::deterministic::{derivative, run_deterministic, Integrator};
use super::*;
use crate::evaluator::Evaluator;

/// Classical fourth order Runge-Kutta with a fixed step of
/// `(end - start) / min_steps`, shortened only to land on sample times.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RungeKuttaFixed;

impl RungeKuttaFixed {
    pub const ALIAS: &'static str = "ODE-RK4-fixed";
}

impl Simulator for RungeKuttaFixed {
    fn alias(&self) -> &'static str {
        RungeKuttaFixed::ALIAS
    }

    fn is_stochastic(&self) -> bool {
        false
    }

    fn run(
        &self,
        model: &Model,
        request: &SimulationRequest,
        parameters: &SimulatorParameters,
        _rng: &mut dyn RngCore,
        ending_criteria: &mut [Box<dyn EndingCriterion>],
        sink: &mut dyn SampleSink,
    ) -> Result<Outcome> {
        run_deterministic(
            &mut ClassicalRungeKutta::default(),
            model,
            request,
            parameters,
            ending_criteria,
            sink,
        )
    }
}

#[derive(Debug, Clone, Default)]
struct ClassicalRungeKutta {
    step: f64,
    k: [Vec<f64>; 4],
    scratch: Vec<f64>,
}

impl Integrator for ClassicalRungeKutta {
    fn initialize(&mut self, num_species: usize, span: f64, parameters: &SimulatorParameters) {
        self.step = span / parameters.min_steps as f64;
        for k in self.k.iter_mut() {
            *k = vec![0.; num_species];
        }
        self.scratch = vec![0.; num_species];
    }

    fn step(
        &mut self,
        model: &Model,
        evaluator: &mut Evaluator,
        time: f64,
        y: &mut [f64],
        max_step: f64,
    ) -> Result<f64> {
        let h = self.step.min(max_step);
        let [k1, k2, k3, k4] = &mut self.k;
        let scratch = &mut self.scratch;

        derivative(model, evaluator, time, y, k1)?;
        for i in 0..y.len() {
            scratch[i] = y[i] + 0.5 * h * k1[i];
        }
        derivative(model, evaluator, time + 0.5 * h, scratch, k2)?;
        for i in 0..y.len() {
            scratch[i] = y[i] + 0.5 * h * k2[i];
        }
        derivative(model, evaluator, time + 0.5 * h, scratch, k3)?;
        for i in 0..y.len() {
            scratch[i] = y[i] + h * k3[i];
        }
        derivative(model, evaluator, time + h, scratch, k4)?;

        for i in 0..y.len() {
            y[i] += h / 6. * (k1[i] + 2. * k2[i] + 2. * k3[i] + k4[i]);
            if !y[i].is_finite() {
                return Err(Error::NumericalFailure(format!(
                    "species `{}` diverged at time {}",
                    model.species()[i].name,
                    time + h
                )));
            }
        }
        Ok(h)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::model::{CompileOptions, ModelDefinition, ReactionDefinition};
    use crate::time_series::Recorder;

    #[test]
    fn conserves_isomerization() {
        let definition = ModelDefinition::new("isomerization")
            .compartment("c", 1.)
            .species("A", "c", 80.)
            .species("B", "c", 20.)
            .reaction(
                ReactionDefinition::mass_action("forward", 2.)
                    .reactant("A", 1)
                    .product("B", 1),
            )
            .reaction(
                ReactionDefinition::mass_action("backward", 1.)
                    .reactant("B", 1)
                    .product("A", 1),
            );
        let model = Model::compile(&definition, &CompileOptions::default()).unwrap();
        let request = SimulationRequest::new(0., 10., 11, &["A", "B"]);
        let parameters = SimulatorParameters {
            min_steps: 1000,
            ..Default::default()
        };
        let mut recorder = Recorder::new(request.symbols.clone());

        let outcome = RungeKuttaFixed
            .run(
                &model,
                &request,
                &parameters,
                &mut rand::rng(),
                &mut [],
                &mut recorder,
            )
            .unwrap();
        assert_eq!(outcome.termination, Termination::EndTime);
        assert!((1000..1010).contains(&outcome.steps));

        let series = recorder.finish().unwrap();
        for row in series.values().rows() {
            assert!((row[0] + row[1] - 100.).abs() < 1e-9);
        }
        // Equilibrium: 2 A = B.
        let (_, last) = series.last().unwrap();
        assert!((last[0] - 100. / 3.).abs() < 1e-6);
    }
}
