use crate::error::{Error, Result};
use crate::evaluator::{Evaluator, PopulationView};
use crate::expression::CompiledExpression;
use crate::model::CompiledValue;

/// Below this population, reactants with stoichiometry above one are
/// counted combinatorially.
const MIN_POPULATION_FOR_COMBINATORIC_EFFECTS: f64 = 10_000.;

/// How a reactant's amount enters a mass-action rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateFactor {
    /// Number of distinct reactant combinations, used for discrete counts.
    Combinatoric,
    /// `x^s`, used for continuous amounts.
    Power,
}

impl RateFactor {
    pub fn factor(&self, amount: f64, stoichiometry: u32) -> f64 {
        if stoichiometry == 1 {
            return amount;
        }
        match self {
            RateFactor::Combinatoric
                if amount < MIN_POPULATION_FOR_COMBINATORIC_EFFECTS && amount.fract() == 0. =>
            {
                if amount < stoichiometry as f64 {
                    0.
                } else {
                    statrs::function::factorial::binomial(amount as u64, stoichiometry as u64)
                }
            }
            _ => amount.powi(stoichiometry as i32),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RateLaw {
    /// Rate constant times the rate factor of every reactant.
    MassAction(CompiledValue),
    /// Full rate given by an expression.
    Expression(CompiledExpression),
}

/// A compiled reaction. Species are referred to by their index in the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Reaction {
    name: String,
    reactants: Vec<(usize, u32)>,
    products: Vec<(usize, u32)>,
    changes: Vec<(usize, i64)>,
    requirements: Vec<(usize, u64)>,
    rate: RateLaw,
    local_names: Vec<String>,
    locals: Vec<f64>,
    reads: Vec<usize>,
    reads_time: bool,
}

/*
 * Constructors
 */
impl Reaction {
    /// `changes` holds the net change of every species the reaction
    /// modifies, and `requirements` the population each consumed species
    /// needs for the reaction to fire at all.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        reactants: Vec<(usize, u32)>,
        products: Vec<(usize, u32)>,
        changes: Vec<(usize, i64)>,
        requirements: Vec<(usize, u64)>,
        rate: RateLaw,
        local_names: Vec<String>,
        locals: Vec<f64>,
    ) -> Self {
        Reaction {
            name,
            reactants,
            products,
            changes,
            requirements,
            rate,
            local_names,
            locals,
            reads: Vec::new(),
            reads_time: false,
        }
    }

    pub(crate) fn set_reads(&mut self, reads: Vec<usize>, reads_time: bool) {
        self.reads = reads;
        self.reads_time = reads_time;
    }
}

/*
 * Access to data
 */
impl Reaction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reactants(&self) -> &[(usize, u32)] {
        &self.reactants
    }

    pub fn products(&self) -> &[(usize, u32)] {
        &self.products
    }

    /// Net change of each species modified by one firing.
    pub fn changes(&self) -> &[(usize, i64)] {
        &self.changes
    }

    pub fn species_updated(&self) -> impl Iterator<Item = usize> + '_ {
        self.changes.iter().map(|&(species, _)| species)
    }

    pub fn rate_law(&self) -> &RateLaw {
        &self.rate
    }

    pub fn local_names(&self) -> &[String] {
        &self.local_names
    }

    pub fn locals(&self) -> &[f64] {
        &self.locals
    }

    pub fn local_index(&self, name: &str) -> Option<usize> {
        self.local_names.iter().position(|local| local == name)
    }

    /// Species whose values the rate reads, directly or through
    /// expression-valued symbols. Sorted and without repeats.
    pub fn reads(&self) -> &[usize] {
        &self.reads
    }

    /// Whether the rate depends on the simulation clock.
    pub fn reads_time(&self) -> bool {
        self.reads_time
    }
}

/*
 * Evolution
 */
impl Reaction {
    /// Value of the rate law, without any check that the reaction can fire.
    pub fn rate<S>(&self, evaluator: &mut Evaluator, state: &S, factor: RateFactor) -> Result<f64>
    where
        S: PopulationView + ?Sized,
    {
        match &self.rate {
            RateLaw::MassAction(constant) => {
                let mut rate = evaluator.compiled_value(constant, &self.locals, state)?;
                for &(species, stoichiometry) in self.reactants.iter() {
                    let amount = evaluator.species_value(species, state)?;
                    rate *= factor.factor(amount, stoichiometry);
                }
                Ok(rate)
            }
            RateLaw::Expression(expression) => evaluator.evaluate(expression, &self.locals, state),
        }
    }

    /// Whether every consumed reactant is present in sufficient number.
    pub fn can_fire(&self, populations: &[u64]) -> bool {
        self.requirements
            .iter()
            .all(|&(species, required)| populations[species] >= required)
    }

    /// The propensity of this reaction in a discrete state. Zero whenever
    /// the reaction cannot fire, whatever its rate law says.
    pub fn propensity(&self, evaluator: &mut Evaluator, populations: &[u64]) -> Result<f64> {
        if !self.can_fire(populations) {
            return Ok(0.);
        }
        let propensity = self.rate(evaluator, populations, RateFactor::Combinatoric)?;
        if !propensity.is_finite() || propensity < 0. {
            return Err(Error::NumericalFailure(format!(
                "reaction `{}` has invalid propensity {}",
                self.name, propensity
            )));
        }
        Ok(propensity)
    }

    /// Fires the reaction once. Fails without touching `populations` if a
    /// population would become negative.
    pub fn apply(&self, populations: &mut [u64]) -> Result<()> {
        for &(species, change) in self.changes.iter() {
            if change < 0 && populations[species] < change.unsigned_abs() {
                return Err(Error::PopulationUnderflow {
                    reaction: self.name.clone(),
                    species,
                });
            }
        }
        for &(species, change) in self.changes.iter() {
            populations[species] = populations[species].wrapping_add_signed(change);
        }
        Ok(())
    }

    /// Adds `rate` times this reaction's net change to `derivative`.
    pub fn accumulate(&self, derivative: &mut [f64], rate: f64) {
        for &(species, change) in self.changes.iter() {
            derivative[species] += change as f64 * rate;
        }
    }
}
