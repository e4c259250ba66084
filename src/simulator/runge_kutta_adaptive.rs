use super::deterministic::{derivative, run_deterministic, Integrator};
use super::*;
use crate::evaluator::Evaluator;
use log::debug;

const SAFETY: f64 = 0.9;
const PGROW: f64 = -0.2;
const PSHRINK: f64 = -0.25;
/// Error ratios below this grow the step by the maximum factor.
const ERRCON: f64 = 6e-4;
const MAX_GROWTH: f64 = 4.;
const MIN_SHRINK: f64 = 0.1;
const MAX_REJECTIONS: usize = 100;

// Dormand-Prince 5(4) tableau.
const C: [f64; 7] = [0., 1. / 5., 3. / 10., 4. / 5., 8. / 9., 1., 1.];
const A: [[f64; 6]; 7] = [
    [0., 0., 0., 0., 0., 0.],
    [1. / 5., 0., 0., 0., 0., 0.],
    [3. / 40., 9. / 40., 0., 0., 0., 0.],
    [44. / 45., -56. / 15., 32. / 9., 0., 0., 0.],
    [19372. / 6561., -25360. / 2187., 64448. / 6561., -212. / 729., 0., 0.],
    [9017. / 3168., -355. / 33., 46732. / 5247., 49. / 176., -5103. / 18656., 0.],
    [35. / 384., 0., 500. / 1113., 125. / 192., -2187. / 6784., 11. / 84.],
];
/// Difference between the fifth and fourth order weights.
const E: [f64; 7] = [
    71. / 57600.,
    0.,
    -71. / 16695.,
    71. / 1920.,
    -17253. / 339200.,
    22. / 525.,
    -1. / 40.,
];

/// Adaptive Runge-Kutta integration with the Dormand-Prince 5(4) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RungeKuttaAdaptive;

impl RungeKuttaAdaptive {
    pub const ALIAS: &'static str = "ODE-RK5-adaptive";
}

impl Simulator for RungeKuttaAdaptive {
    fn alias(&self) -> &'static str {
        RungeKuttaAdaptive::ALIAS
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
            &mut DormandPrince::default(),
            model,
            request,
            parameters,
            ending_criteria,
            sink,
        )
    }
}

#[derive(Debug, Clone, Default)]
struct DormandPrince {
    step: f64,
    max_step: f64,
    relative_tolerance: f64,
    absolute_tolerance: f64,
    stages: [Vec<f64>; 7],
    scratch: Vec<f64>,
    next: Vec<f64>,
}

impl DormandPrince {
    /// Largest scaled error of a trial step from `y` to `self.next`.
    fn error_ratio(&self, y: &[f64], h: f64) -> f64 {
        let mut ratio: f64 = 0.;
        for i in 0..y.len() {
            let error: f64 = h * (0..7).map(|s| E[s] * self.stages[s][i]).sum::<f64>();
            let scale = self.absolute_tolerance
                + self.relative_tolerance * y[i].abs().max(self.next[i].abs());
            let scaled = (error / scale).abs();
            if !scaled.is_finite() || !self.next[i].is_finite() {
                return f64::INFINITY;
            }
            ratio = ratio.max(scaled);
        }
        ratio
    }

    /// Fills every stage and `self.next` for a step of size `h`.
    fn trial(
        &mut self,
        model: &Model,
        evaluator: &mut Evaluator,
        time: f64,
        y: &[f64],
        h: f64,
    ) -> Result<()> {
        derivative(model, evaluator, time, y, &mut self.stages[0])?;
        for s in 1..7 {
            for i in 0..y.len() {
                self.scratch[i] =
                    y[i] + h * (0..s).map(|j| A[s][j] * self.stages[j][i]).sum::<f64>();
            }
            derivative(model, evaluator, time + C[s] * h, &self.scratch, &mut self.stages[s])?;
            if s == 6 {
                self.next.copy_from_slice(&self.scratch);
            }
        }
        Ok(())
    }
}

impl Integrator for DormandPrince {
    fn initialize(&mut self, num_species: usize, span: f64, parameters: &SimulatorParameters) {
        self.max_step = span / parameters.min_steps as f64;
        self.step = self.max_step / 5.;
        self.relative_tolerance = parameters.relative_tolerance;
        self.absolute_tolerance = parameters.absolute_tolerance;
        for stage in self.stages.iter_mut() {
            *stage = vec![0.; num_species];
        }
        self.scratch = vec![0.; num_species];
        self.next = vec![0.; num_species];
    }

    fn step(
        &mut self,
        model: &Model,
        evaluator: &mut Evaluator,
        time: f64,
        y: &mut [f64],
        max_step: f64,
    ) -> Result<f64> {
        let min_step = 16. * f64::EPSILON * time.abs().max(1.);
        let clipped = self.step >= max_step;
        let mut h = self.step.min(max_step);

        for rejections in 0..=MAX_REJECTIONS {
            if h < min_step && h < max_step {
                return Err(Error::NumericalFailure(format!(
                    "step size underflow at time {}: {} is below {}",
                    time, h, min_step
                )));
            }
            self.trial(model, evaluator, time, y, h)?;
            let ratio = self.error_ratio(y, h);
            if ratio <= 1. {
                y.copy_from_slice(&self.next);
                let growth = if ratio > ERRCON {
                    SAFETY * ratio.powf(PGROW)
                } else {
                    MAX_GROWTH
                };
                let proposed = h * growth;
                self.step = if clipped && rejections == 0 {
                    self.step.max(proposed)
                } else {
                    proposed
                }
                .min(self.max_step);
                return Ok(h);
            }

            h *= (SAFETY * ratio.powf(PSHRINK)).max(MIN_SHRINK);
            debug!(
                "rejected step at time {} with error ratio {}, retrying with {}",
                time, ratio, h
            );
        }
        Err(Error::NumericalFailure(format!(
            "step at time {} rejected {} times in a row",
            time, MAX_REJECTIONS
        )))
    }
}
