use crate::ending_criterion::EndingCriterion;
use crate::error::{Error, Result};
use crate::model::Model;
use crate::symbol::Slot;
use crate::time_series::{sample_times, SampleSink};
use downcast_rs::{impl_downcast, DowncastSync};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

mod sampler;
pub(crate) use sampler::Sampler;

mod stochastic;

mod gillespie;
pub use gillespie::*;

mod gibson_bruck;
pub use gibson_bruck::*;

mod tau_leap;
pub use tau_leap::*;

mod deterministic;

mod runge_kutta_adaptive;
pub use runge_kutta_adaptive::*;

mod runge_kutta_fixed;
pub use runge_kutta_fixed::*;

/// What to simulate: the time window, how many samples to take in it, and
/// which symbols to report at every sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub start_time: f64,
    pub end_time: f64,
    pub num_samples: usize,
    pub symbols: Vec<String>,
}

impl SimulationRequest {
    pub fn new(start_time: f64, end_time: f64, num_samples: usize, symbols: &[&str]) -> Self {
        SimulationRequest {
            start_time,
            end_time,
            num_samples,
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn sample_times(&self) -> Vec<f64> {
        sample_times(self.start_time, self.end_time, self.num_samples)
    }

    /// Checks the window and resolves every requested symbol in `model`.
    pub fn resolve(&self, model: &Model) -> Result<Vec<Slot>> {
        if !self.start_time.is_finite() || !self.end_time.is_finite() {
            return Err(Error::InvalidInput(format!(
                "time window [{}, {}] is not finite",
                self.start_time, self.end_time
            )));
        }
        if self.end_time <= self.start_time {
            return Err(Error::InvalidInput(format!(
                "end time {} is not after start time {}",
                self.end_time, self.start_time
            )));
        }
        if self.num_samples == 0 {
            return Err(Error::InvalidInput(
                "at least one sample must be requested".to_string(),
            ));
        }
        self.symbols
            .iter()
            .map(|symbol| {
                model
                    .resolve(symbol)
                    .ok_or_else(|| Error::DataNotFound(symbol.clone()))
            })
            .collect()
    }
}

/// Knobs shared by every simulator. Each simulator reads the ones that
/// apply to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorParameters {
    /// Number of independent trajectories in an ensemble.
    pub ensemble_size: usize,
    /// Base seed. Drawn from the thread rng when absent.
    pub seed: Option<u64>,
    /// Stop a stochastic run after this many events.
    pub max_events: Option<u64>,
    pub relative_tolerance: f64,
    pub absolute_tolerance: f64,
    /// The deterministic step never exceeds `(end - start) / min_steps`.
    pub min_steps: usize,
    /// Stop a deterministic run after this many accepted steps.
    pub max_iterations: Option<u64>,
    pub use_expression_cache: bool,
    /// Tau leaping keeps the expected relative change of every propensity
    /// over a leap below this bound.
    pub max_relative_error: f64,
    /// Tau leaping only leaps when a leap spans at least this many expected
    /// events, and fires reactions one at a time otherwise.
    pub min_events_per_leap: u64,
    /// Size of the ensemble thread pool. Rayon's global pool when absent.
    pub num_threads: Option<usize>,
}

impl Default for SimulatorParameters {
    fn default() -> Self {
        SimulatorParameters {
            ensemble_size: 1,
            seed: None,
            max_events: None,
            relative_tolerance: 1e-4,
            absolute_tolerance: 1e-2,
            min_steps: 10_000,
            max_iterations: Some(100_000_000),
            use_expression_cache: true,
            max_relative_error: 0.005,
            min_events_per_leap: 10,
            num_threads: None,
        }
    }
}

impl SimulatorParameters {
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(Error::InvalidInput(message));
        if self.ensemble_size == 0 {
            return invalid("ensemble size must be at least 1".to_string());
        }
        for (name, tolerance) in [
            ("relative", self.relative_tolerance),
            ("absolute", self.absolute_tolerance),
        ] {
            if !(tolerance.is_finite() && tolerance > 0.) {
                return invalid(format!("{} tolerance must be positive, got {}", name, tolerance));
            }
        }
        if self.min_steps == 0 {
            return invalid("min_steps must be at least 1".to_string());
        }
        if !(self.max_relative_error > 0. && self.max_relative_error < 1.) {
            return invalid(format!(
                "max_relative_error must lie in (0, 1), got {}",
                self.max_relative_error
            ));
        }
        if self.min_events_per_leap == 0 {
            return invalid("min_events_per_leap must be at least 1".to_string());
        }
        if self.num_threads == Some(0) {
            return invalid("num_threads must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// Every requested sample was taken.
    EndTime,
    /// No reaction could fire any more. Remaining samples hold the final state.
    Exhausted,
    /// The event or iteration budget ran out.
    BudgetExhausted,
    Cancelled,
    /// A runtime failure. Samples taken before it are kept.
    Failed(Error),
}

impl Termination {
    /// Whether every requested sample was produced.
    pub fn is_complete(&self) -> bool {
        matches!(self, Termination::EndTime | Termination::Exhausted)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::EndTime => write!(f, "reached end time"),
            Termination::Exhausted => write!(f, "no reaction can fire"),
            Termination::BudgetExhausted => write!(f, "budget exhausted"),
            Termination::Cancelled => write!(f, "cancelled"),
            Termination::Failed(error) => write!(f, "failed: {}", error),
        }
    }
}

/// Summary of a finished run. The samples themselves went to the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub termination: Termination,
    /// Events fired or leaps taken, or integration steps accepted.
    pub steps: u64,
    /// Clock at the last event or step.
    pub final_time: f64,
}

/// An algorithm that advances a model through time.
///
/// `run` returns `Err` only when the request cannot be started at all.
/// Anything that goes wrong once the run is under way is reported through
/// `Outcome::termination`, after the samples computed so far have been
/// handed to `sink`.
pub trait Simulator: DowncastSync {
    fn alias(&self) -> &'static str;

    /// Whether repeated runs differ, making ensembles meaningful.
    fn is_stochastic(&self) -> bool;

    fn run(
        &self,
        model: &Model,
        request: &SimulationRequest,
        parameters: &SimulatorParameters,
        rng: &mut dyn RngCore,
        ending_criteria: &mut [Box<dyn EndingCriterion>],
        sink: &mut dyn SampleSink,
    ) -> Result<Outcome>;
}
impl_downcast!(sync Simulator);

type Factory = Box<dyn Fn() -> Box<dyn Simulator> + Send + Sync>;

/// Simulators available by alias.
pub struct SimulatorRegistry {
    factories: BTreeMap<String, Factory>,
}

impl SimulatorRegistry {
    /// A registry with nothing in it.
    pub fn new() -> Self {
        SimulatorRegistry {
            factories: BTreeMap::new(),
        }
    }

    /// A registry holding every simulator of this crate.
    pub fn with_defaults() -> Self {
        let mut registry = SimulatorRegistry::new();
        registry.insert(GillespieDirect::ALIAS, || Box::new(GillespieDirect));
        registry.insert(GibsonBruck::ALIAS, || Box::new(GibsonBruck));
        registry.insert(GillespieTauLeap::ALIAS, || Box::new(GillespieTauLeap));
        registry.insert(RungeKuttaAdaptive::ALIAS, || Box::new(RungeKuttaAdaptive));
        registry.insert(RungeKuttaFixed::ALIAS, || Box::new(RungeKuttaFixed));
        registry
    }

    pub fn register<F>(&mut self, alias: &str, factory: F) -> Result<()>
    where
        F: Fn() -> Box<dyn Simulator> + Send + Sync + 'static,
    {
        if self.factories.contains_key(alias) {
            return Err(Error::InvalidInput(format!(
                "simulator `{}` is already registered",
                alias
            )));
        }
        self.insert(alias, factory);
        Ok(())
    }

    fn insert<F>(&mut self, alias: &str, factory: F)
    where
        F: Fn() -> Box<dyn Simulator> + Send + Sync + 'static,
    {
        self.factories.insert(alias.to_string(), Box::new(factory));
    }

    pub fn create(&self, alias: &str) -> Result<Box<dyn Simulator>> {
        self.factories
            .get(alias)
            .map(|factory| factory())
            .ok_or_else(|| Error::InvalidInput(format!("unknown simulator `{}`", alias)))
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.factories.contains_key(alias)
    }

    /// Registered aliases in sorted order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl Default for SimulatorRegistry {
    fn default() -> Self {
        SimulatorRegistry::with_defaults()
    }
}

impl fmt::Debug for SimulatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.aliases()).finish()
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::model::{CompileOptions, ModelDefinition, ReactionDefinition};

    fn decay() -> Model {
        let definition = ModelDefinition::new("decay")
            .compartment("c", 1.)
            .species("A", "c", 100.)
            .reaction(ReactionDefinition::mass_action("r", 1.).reactant("A", 1));
        Model::compile(&definition, &CompileOptions::default()).unwrap()
    }

    #[test]
    fn registry_aliases() {
        let registry = SimulatorRegistry::with_defaults();
        let aliases: Vec<_> = registry.aliases().collect();
        assert_eq!(
            aliases,
            vec![
                "ODE-RK4-fixed",
                "ODE-RK5-adaptive",
                "gibson-bruck",
                "gillespie-direct",
                "gillespie-tauleap"
            ]
        );
        for alias in aliases {
            assert_eq!(registry.create(alias).unwrap().alias(), alias);
        }
        assert!(matches!(
            registry.create("tauleap"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn registry_downcasts_and_rejects_duplicates() {
        let mut registry = SimulatorRegistry::new();
        registry
            .register("direct", || Box::new(GillespieDirect))
            .unwrap();
        assert!(registry
            .register("direct", || Box::new(GibsonBruck))
            .is_err());

        let simulator = registry.create("direct").unwrap();
        assert!(simulator.is_stochastic());
        assert!(simulator.downcast_ref::<GillespieDirect>().is_some());
        assert!(simulator.downcast_ref::<GibsonBruck>().is_none());
    }

    #[test]
    fn request_resolution() {
        let model = decay();
        let request = SimulationRequest::new(0., 1., 3, &["A", "time"]);
        assert_eq!(
            request.resolve(&model).unwrap(),
            vec![Slot::Species(0), Slot::Time]
        );
        assert_eq!(request.sample_times(), vec![0., 0.5, 1.]);

        let unknown = SimulationRequest::new(0., 1., 3, &["Z"]);
        assert_eq!(
            unknown.resolve(&model),
            Err(Error::DataNotFound("Z".to_string()))
        );
        for bad in [
            SimulationRequest::new(1., 1., 3, &["A"]),
            SimulationRequest::new(0., f64::INFINITY, 3, &["A"]),
            SimulationRequest::new(0., 1., 0, &["A"]),
        ] {
            assert!(matches!(bad.resolve(&model), Err(Error::InvalidInput(_))));
        }
    }

    #[test]
    fn parameter_validation() {
        assert!(SimulatorParameters::default().validate().is_ok());
        let bad = [
            SimulatorParameters {
                ensemble_size: 0,
                ..Default::default()
            },
            SimulatorParameters {
                relative_tolerance: 0.,
                ..Default::default()
            },
            SimulatorParameters {
                absolute_tolerance: f64::NAN,
                ..Default::default()
            },
            SimulatorParameters {
                min_steps: 0,
                ..Default::default()
            },
            SimulatorParameters {
                max_relative_error: 1.,
                ..Default::default()
            },
            SimulatorParameters {
                min_events_per_leap: 0,
                ..Default::default()
            },
        ];
        for parameters in bad {
            assert!(parameters.validate().is_err());
        }

        let parsed: SimulatorParameters =
            serde_json::from_str(r#"{"ensemble_size": 8, "seed": 3}"#).unwrap();
        assert_eq!(parsed.ensemble_size, 8);
        assert_eq!(parsed.seed, Some(3));
        assert_eq!(parsed.min_steps, 10_000);
    }
}
