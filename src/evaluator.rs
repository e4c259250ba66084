use crate::error::{Error, Result};
use crate::expression::CompiledExpression;
use crate::model::{CompiledValue, Model};
use crate::symbol::{Slot, AVOGADRO_CONSTANT};

/// Read access to the amount of each species in a run's state vector.
///
/// Discrete runs keep integer populations, continuous runs keep real
/// amounts. The evaluator reads both the same way.
pub trait PopulationView {
    fn amount(&self, species: usize) -> f64;
}

impl PopulationView for [u64] {
    fn amount(&self, species: usize) -> f64 {
        self[species] as f64
    }
}

impl PopulationView for [f64] {
    fn amount(&self, species: usize) -> f64 {
        self[species]
    }
}

impl PopulationView for Vec<u64> {
    fn amount(&self, species: usize) -> f64 {
        self[species] as f64
    }
}

impl PopulationView for Vec<f64> {
    fn amount(&self, species: usize) -> f64 {
        self[species]
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct CacheEntry {
    generation: u64,
    value: f64,
}

/// Memoized values of expression-valued symbols for one evaluation pass.
///
/// Entries are stamped with the generation they were computed in. Bumping
/// the generation invalidates every entry at once.
#[derive(Debug, Clone)]
pub struct ExpressionCache {
    enabled: bool,
    generation: u64,
    hits: u64,
    species: Vec<CacheEntry>,
    compartments: Vec<CacheEntry>,
    parameters: Vec<CacheEntry>,
}

impl ExpressionCache {
    pub fn new(model: &Model, enabled: bool) -> Self {
        ExpressionCache {
            enabled,
            generation: 1,
            hits: 0,
            species: vec![CacheEntry::default(); model.species().len()],
            compartments: vec![CacheEntry::default(); model.compartments().len()],
            parameters: vec![CacheEntry::default(); model.parameters().len()],
        }
    }

    pub fn invalidate(&mut self) {
        self.generation += 1;
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    fn entry(&mut self, slot: Slot) -> Option<&mut CacheEntry> {
        match slot {
            Slot::Species(i) => self.species.get_mut(i),
            Slot::Compartment(i) => self.compartments.get_mut(i),
            Slot::Parameter(i) => self.parameters.get_mut(i),
            _ => None,
        }
    }

    fn get(&mut self, slot: Slot) -> Option<f64> {
        if !self.enabled {
            return None;
        }
        let generation = self.generation;
        let value = self
            .entry(slot)
            .filter(|entry| entry.generation == generation)
            .map(|entry| entry.value);
        if value.is_some() {
            self.hits += 1;
        }
        value
    }

    fn insert(&mut self, slot: Slot, value: f64) {
        if !self.enabled {
            return;
        }
        let generation = self.generation;
        if let Some(entry) = self.entry(slot) {
            *entry = CacheEntry { generation, value };
        }
    }
}

/// Evaluates compiled expressions against a run's state.
///
/// Every name was resolved to a slot when the model was compiled, so the
/// evaluator only ever reads slots. It owns the run's clock and the
/// expression cache, which must be invalidated whenever the state changes.
#[derive(Debug, Clone)]
pub struct Evaluator<'m> {
    model: &'m Model,
    time: f64,
    cache: ExpressionCache,
}

impl<'m> Evaluator<'m> {
    pub fn new(model: &'m Model) -> Self {
        Evaluator::with_cache(model, true)
    }

    pub fn with_cache(model: &'m Model, use_cache: bool) -> Self {
        Evaluator {
            model,
            time: 0.,
            cache: ExpressionCache::new(model, use_cache),
        }
    }

    pub fn model(&self) -> &'m Model {
        self.model
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_time(&mut self, time: f64) {
        if time != self.time {
            self.time = time;
            self.cache.invalidate();
        }
    }

    /// Must be called after every change to the state vector.
    pub fn invalidate(&mut self) {
        self.cache.invalidate();
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache.hits()
    }

    /// Whether `name` resolves to a reserved or global symbol.
    pub fn has_value(&self, name: &str) -> bool {
        self.model.resolve(name).is_some()
    }

    /// Whether `name` resolves inside the rate of `reaction`, where the
    /// reaction's local parameters shadow globals.
    pub fn has_local_value(&self, reaction: usize, name: &str) -> bool {
        self.model
            .reactions()
            .get(reaction)
            .is_some_and(|r| r.local_index(name).is_some())
            || self.has_value(name)
    }

    /// The current value of a reserved or global symbol.
    pub fn value<S>(&mut self, name: &str, state: &S) -> Result<f64>
    where
        S: PopulationView + ?Sized,
    {
        let slot = self
            .model
            .resolve(name)
            .ok_or_else(|| Error::DataNotFound(name.to_string()))?;
        self.slot_value(slot, &[], state)
    }

    /// The current value of `name` as seen from the rate of `reaction`.
    pub fn reaction_value<S>(&mut self, reaction: usize, name: &str, state: &S) -> Result<f64>
    where
        S: PopulationView + ?Sized,
    {
        let model = self.model;
        if let Some(reaction) = model.reactions().get(reaction) {
            if Slot::reserved(name).is_none() {
                if let Some(index) = reaction.local_index(name) {
                    return Ok(reaction.locals()[index]);
                }
            }
        }
        self.value(name, state)
    }

    pub fn species_value<S>(&mut self, species: usize, state: &S) -> Result<f64>
    where
        S: PopulationView + ?Sized,
    {
        self.slot_value(Slot::Species(species), &[], state)
    }

    pub fn slot_value<S>(&mut self, slot: Slot, locals: &[f64], state: &S) -> Result<f64>
    where
        S: PopulationView + ?Sized,
    {
        let model = self.model;
        match slot {
            Slot::Time => Ok(self.time),
            Slot::Avogadro => Ok(AVOGADRO_CONSTANT),
            Slot::Local(i) => locals
                .get(i)
                .copied()
                .ok_or_else(|| Error::DataNotFound(format!("local parameter #{}", i))),
            Slot::Species(i) => {
                let species = model
                    .species()
                    .get(i)
                    .ok_or_else(|| Error::DataNotFound(format!("species #{}", i)))?;
                match &species.value {
                    CompiledValue::Expression(expression) if species.boundary => {
                        self.cached(slot, expression, state)
                    }
                    _ => Ok(state.amount(i)),
                }
            }
            Slot::Compartment(i) => {
                let compartment = model
                    .compartments()
                    .get(i)
                    .ok_or_else(|| Error::DataNotFound(format!("compartment #{}", i)))?;
                self.compiled_value_at(slot, &compartment.volume, state)
            }
            Slot::Parameter(i) => {
                let parameter = model
                    .parameters()
                    .get(i)
                    .ok_or_else(|| Error::DataNotFound(format!("parameter #{}", i)))?;
                self.compiled_value_at(slot, &parameter.value, state)
            }
        }
    }

    /// Evaluates a value that is not attached to a global slot, such as a
    /// mass-action rate constant.
    pub fn compiled_value<S>(
        &mut self,
        value: &CompiledValue,
        locals: &[f64],
        state: &S,
    ) -> Result<f64>
    where
        S: PopulationView + ?Sized,
    {
        match value {
            CompiledValue::Constant(value) => Ok(*value),
            CompiledValue::Expression(expression) => self.evaluate(expression, locals, state),
        }
    }

    pub fn evaluate<S>(
        &mut self,
        expression: &CompiledExpression,
        locals: &[f64],
        state: &S,
    ) -> Result<f64>
    where
        S: PopulationView + ?Sized,
    {
        expression.evaluate(&mut |slot| self.slot_value(slot, locals, state))
    }

    fn compiled_value_at<S>(
        &mut self,
        slot: Slot,
        value: &'m CompiledValue,
        state: &S,
    ) -> Result<f64>
    where
        S: PopulationView + ?Sized,
    {
        match value {
            CompiledValue::Constant(value) => Ok(*value),
            CompiledValue::Expression(expression) => self.cached(slot, expression, state),
        }
    }

    fn cached<S>(
        &mut self,
        slot: Slot,
        expression: &'m CompiledExpression,
        state: &S,
    ) -> Result<f64>
    where
        S: PopulationView + ?Sized,
    {
        if let Some(value) = self.cache.get(slot) {
            return Ok(value);
        }
        let value = self.evaluate(expression, &[], state)?;
        self.cache.insert(slot, value);
        Ok(value)
    }
}
