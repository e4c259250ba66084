use crate::error::{Error, Result};
use crate::expression::{CompiledExpression, Expression};
use crate::reaction::Reaction;
use crate::symbol::{Slot, SymbolTable};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

mod compile;
pub use compile::*;

mod dependency_graph;
pub use dependency_graph::*;

mod multistep;

/// Compartment that species are placed in when none is declared for them.
pub const DEFAULT_COMPARTMENT: &str = "univ";
pub const DEFAULT_VOLUME: f64 = 1.0;

/// Largest population that can be represented exactly by an `f64`.
pub const MAX_EXACT_POPULATION: f64 = 9_007_199_254_740_992.0;

/// A quantity that is either a number or an expression over other symbols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Constant(f64),
    Expression(Expression),
}

impl Value {
    /// Parses `text`, collapsing plain numbers into constants.
    pub fn parse(text: &str) -> Result<Value> {
        Ok(match Expression::parse(text)? {
            Expression::Number(value) => Value::Constant(value),
            expression => Value::Expression(expression),
        })
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Constant(value)
    }
}

impl From<Expression> for Value {
    fn from(expression: Expression) -> Self {
        Value::Expression(expression)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompartmentDefinition {
    pub name: String,
    pub volume: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesDefinition {
    pub name: String,
    pub compartment: String,
    pub initial: Value,
    /// Boundary species are never changed by reactions. Only they may have
    /// expression-valued populations.
    #[serde(default)]
    pub boundary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub species: String,
    pub stoichiometry: u32,
}

/// How the rate of a reaction is computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rate {
    /// Rate constant times the combinatoric factor of every reactant.
    MassAction(Value),
    /// The expression is the full rate of the reaction.
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionDefinition {
    pub name: String,
    #[serde(default)]
    pub reactants: Vec<Participant>,
    #[serde(default)]
    pub products: Vec<Participant>,
    pub rate: Rate,
    /// Constants visible only to this reaction's rate, shadowing globals.
    #[serde(default)]
    pub parameters: Vec<(String, f64)>,
    /// Number of elementary steps. Reactions with more than one step are
    /// expanded into a chain of reactions when the model is compiled.
    #[serde(default = "one_step")]
    pub steps: u32,
}

fn one_step() -> u32 {
    1
}

impl ReactionDefinition {
    pub fn new(name: &str, rate: Rate) -> Self {
        ReactionDefinition {
            name: name.to_string(),
            reactants: Vec::new(),
            products: Vec::new(),
            rate,
            parameters: Vec::new(),
            steps: 1,
        }
    }

    pub fn mass_action(name: &str, rate_constant: impl Into<Value>) -> Self {
        ReactionDefinition::new(name, Rate::MassAction(rate_constant.into()))
    }

    pub fn custom(name: &str, rate: Expression) -> Self {
        ReactionDefinition::new(name, Rate::Expression(rate))
    }

    pub fn reactant(mut self, species: &str, stoichiometry: u32) -> Self {
        self.reactants.push(Participant {
            species: species.to_string(),
            stoichiometry,
        });
        self
    }

    pub fn product(mut self, species: &str, stoichiometry: u32) -> Self {
        self.products.push(Participant {
            species: species.to_string(),
            stoichiometry,
        });
        self
    }

    pub fn parameter(mut self, name: &str, value: f64) -> Self {
        self.parameters.push((name.to_string(), value));
        self
    }

    pub fn steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }
}

/// An uncompiled model, as handed over by a model builder or parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub name: String,
    #[serde(default)]
    pub compartments: Vec<CompartmentDefinition>,
    #[serde(default)]
    pub species: Vec<SpeciesDefinition>,
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
    #[serde(default)]
    pub reactions: Vec<ReactionDefinition>,
}

/*
 * Builders
 */
impl ModelDefinition {
    pub fn new(name: &str) -> Self {
        ModelDefinition {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn compartment(mut self, name: &str, volume: impl Into<Value>) -> Self {
        self.compartments.push(CompartmentDefinition {
            name: name.to_string(),
            volume: volume.into(),
        });
        self
    }

    pub fn species(mut self, name: &str, compartment: &str, initial: impl Into<Value>) -> Self {
        self.species.push(SpeciesDefinition {
            name: name.to_string(),
            compartment: compartment.to_string(),
            initial: initial.into(),
            boundary: false,
        });
        self
    }

    pub fn boundary_species(
        mut self,
        name: &str,
        compartment: &str,
        value: impl Into<Value>,
    ) -> Self {
        self.species.push(SpeciesDefinition {
            name: name.to_string(),
            compartment: compartment.to_string(),
            initial: value.into(),
            boundary: true,
        });
        self
    }

    pub fn parameter(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.parameters.push(ParameterDefinition {
            name: name.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn reaction(mut self, reaction: ReactionDefinition) -> Self {
        self.reactions.push(reaction);
        self
    }
}

/// A constant or a compiled expression.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledValue {
    Constant(f64),
    Expression(CompiledExpression),
}

impl CompiledValue {
    pub fn as_constant(&self) -> Option<f64> {
        match self {
            CompiledValue::Constant(value) => Some(*value),
            CompiledValue::Expression(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Compartment {
    pub name: String,
    pub volume: CompiledValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Species {
    pub name: String,
    pub compartment: usize,
    pub boundary: bool,
    pub value: CompiledValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: CompiledValue,
}

/// The compiled, immutable topology of a reaction network.
///
/// Every species, compartment and parameter has a stable index for the life
/// of the model. Runs keep their own state vectors; nothing here changes once
/// compilation is done, so one `Model` can be shared by many threads.
#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    compartments: Vec<Compartment>,
    species: Vec<Species>,
    parameters: Vec<Parameter>,
    reactions: Vec<Reaction>,
    symbols: SymbolTable,
    stoichiometry: Array2<i64>,
    dependency_graph: DependencyGraph,
}

/*
 * Access to data
 */
impl Model {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn compartments(&self) -> &[Compartment] {
        &self.compartments
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn num_species(&self) -> usize {
        self.species.len()
    }

    pub fn num_reactions(&self) -> usize {
        self.reactions.len()
    }

    /// Resolves a global name, including the reserved symbols.
    pub fn resolve(&self, name: &str) -> Option<Slot> {
        Slot::reserved(name).or_else(|| self.symbols.get(name))
    }

    pub fn species_index(&self, name: &str) -> Option<usize> {
        match self.symbols.get(name) {
            Some(Slot::Species(index)) => Some(index),
            _ => None,
        }
    }

    pub fn reaction_index(&self, name: &str) -> Option<usize> {
        self.reactions.iter().position(|r| r.name() == name)
    }

    /// Net change of each species (columns) caused by each reaction (rows).
    pub fn stoichiometry(&self) -> &Array2<i64> {
        &self.stoichiometry
    }

    pub fn dependency_graph(&self) -> &DependencyGraph {
        &self.dependency_graph
    }

    /// Reactions whose rates must be recomputed after `reaction` fires,
    /// including `reaction` itself.
    pub fn dependents(&self, reaction: usize) -> &[usize] {
        self.dependency_graph.dependents(reaction)
    }

    /// Initial amount of every species. Expression-valued boundary species
    /// hold a placeholder of zero; their value always comes from the
    /// evaluator.
    pub fn initial_amounts(&self) -> Vec<f64> {
        self.species
            .iter()
            .map(|species| species.value.as_constant().unwrap_or(0.))
            .collect()
    }

    /// Initial populations for discrete simulation. Every constant amount
    /// must be a nonnegative integer that an `f64` represents exactly.
    pub fn initial_populations(&self) -> Result<Vec<u64>> {
        let mut populations = Vec::with_capacity(self.species.len());
        for (species, amount) in self.species.iter().zip(self.initial_amounts()) {
            if amount < 0. || amount.fract() != 0. || amount > MAX_EXACT_POPULATION {
                return Err(Error::InvalidInput(format!(
                    "species `{}` has initial population {}, which is not a nonnegative integer \
                     usable in a stochastic simulation",
                    species.name, amount
                )));
            }
            populations.push(amount as u64);
        }
        Ok(populations)
    }
}
