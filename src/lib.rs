//! Simulation of chemical reaction networks.
//!
//! A [`ModelDefinition`] names compartments, species, parameters and
//! reactions whose rates are symbolic expressions. [`Model::compile`]
//! resolves every name once, expands multistep reactions and builds the
//! reaction dependency graph. A compiled model is then advanced in time by
//! a [`Simulator`]: exact stochastic simulation (Gillespie's direct method,
//! Gibson-Bruck's next reaction method), approximate tau leaping, or
//! numerical integration of the rate equations (adaptive Dormand-Prince,
//! fixed step Runge-Kutta).

pub mod analysis;
pub mod ending_criterion;
pub mod error;
pub mod evaluator;
pub mod expression;
pub mod indexed_priority_queue;
pub mod model;
pub mod reaction;
pub mod simulate;
pub mod simulator;
pub mod symbol;
pub mod time_series;

pub use ending_criterion::CancellationToken;
pub use error::{Error, Result};
pub use expression::Expression;
pub use model::{
    CompileOptions, Model, ModelDefinition, Participant, Rate, ReactionDefinition, Value,
};
pub use simulate::{
    simulate, simulate_ensemble, simulate_streaming, simulate_with_cancellation, Ensemble, Run,
};
pub use simulator::{
    GibsonBruck, GillespieDirect, GillespieTauLeap, RungeKuttaAdaptive, RungeKuttaFixed,
    SimulationRequest, Simulator, SimulatorParameters, SimulatorRegistry, Termination,
};
pub use time_series::{SampleSink, TimeSeries};
