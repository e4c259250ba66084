use super::*;
use super::dependency_graph::read_set;
use crate::reaction::RateLaw;
use crate::symbol::{validate_name, Scope};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOptions {
    /// Reject reactions that mention undeclared species. When false, such
    /// species are declared with population zero in the default compartment.
    pub strict: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions { strict: true }
    }
}

impl CompileOptions {
    pub fn lax() -> Self {
        CompileOptions { strict: false }
    }
}

impl Model {
    /// Compiles a model definition: validates every name, expands multistep
    /// reactions, assigns each symbol a stable slot, compiles every value and
    /// rate, and builds the reaction dependency graph.
    pub fn compile(definition: &ModelDefinition, options: &CompileOptions) -> Result<Model> {
        let mut species_definitions = definition.species.clone();
        declare_missing_species(definition, options, &mut species_definitions)?;
        let reaction_definitions =
            multistep::expand(&definition.reactions, &mut species_definitions)?;
        let compartment_definitions = compartments_in_use(definition, &species_definitions);

        let mut symbols = SymbolTable::new();
        for (i, compartment) in compartment_definitions.iter().enumerate() {
            symbols.declare(&compartment.name, Slot::Compartment(i))?;
        }
        for (i, species) in species_definitions.iter().enumerate() {
            symbols.declare(&species.name, Slot::Species(i))?;
        }
        for (i, parameter) in definition.parameters.iter().enumerate() {
            symbols.declare(&parameter.name, Slot::Parameter(i))?;
        }
        let scope = Scope::global(&symbols);

        let mut compartments = Vec::with_capacity(compartment_definitions.len());
        for compartment in compartment_definitions.iter() {
            let volume = compile_value(&compartment.volume, &scope)?;
            if let Some(volume) = volume.as_constant() {
                if !(volume > 0. && volume.is_finite()) {
                    return Err(Error::InvalidInput(format!(
                        "compartment `{}` has invalid volume {}",
                        compartment.name, volume
                    )));
                }
            }
            compartments.push(Compartment {
                name: compartment.name.clone(),
                volume,
            });
        }

        let mut species = Vec::with_capacity(species_definitions.len());
        for definition in species_definitions.iter() {
            species.push(compile_species(definition, &symbols, &scope)?);
        }

        let mut parameters = Vec::with_capacity(definition.parameters.len());
        for parameter in definition.parameters.iter() {
            parameters.push(Parameter {
                name: parameter.name.clone(),
                value: compile_value(&parameter.value, &scope)?,
            });
        }

        check_for_cycles(&species, &compartments, &parameters)?;

        let mut reactions = Vec::with_capacity(reaction_definitions.len());
        let mut reaction_names = HashSet::new();
        for definition in reaction_definitions.iter() {
            if !reaction_names.insert(definition.name.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "reaction `{}` is declared more than once",
                    definition.name
                )));
            }
            let mut reaction = compile_reaction(definition, &symbols, &species)?;
            let slots: Vec<Slot> = match reaction.rate_law() {
                RateLaw::MassAction(constant) => reaction
                    .reactants()
                    .iter()
                    .map(|&(species, _)| Slot::Species(species))
                    .chain(match constant {
                        CompiledValue::Expression(expression) => expression.slots().collect(),
                        CompiledValue::Constant(_) => Vec::new(),
                    })
                    .collect(),
                RateLaw::Expression(expression) => expression.slots().collect(),
            };
            let (reads, reads_time) =
                read_set(slots.into_iter(), &species, &compartments, &parameters);
            reaction.set_reads(reads, reads_time);
            reactions.push(reaction);
        }

        let mut stoichiometry = Array2::zeros((reactions.len(), species.len()));
        for (r, reaction) in reactions.iter().enumerate() {
            for &(s, change) in reaction.changes() {
                stoichiometry[[r, s]] = change;
            }
        }

        let dependency_graph = DependencyGraph::build(&reactions, species.len());
        debug!(
            "compiled model `{}`: {} species, {} reactions, {} dependency edges",
            definition.name,
            species.len(),
            reactions.len(),
            dependency_graph.num_edges()
        );

        Ok(Model {
            name: definition.name.clone(),
            compartments,
            species,
            parameters,
            reactions,
            symbols,
            stoichiometry,
            dependency_graph,
        })
    }
}

fn declare_missing_species(
    definition: &ModelDefinition,
    options: &CompileOptions,
    species: &mut Vec<SpeciesDefinition>,
) -> Result<()> {
    let mut known: HashSet<String> = species.iter().map(|s| s.name.clone()).collect();
    for reaction in definition.reactions.iter() {
        for participant in reaction.reactants.iter().chain(reaction.products.iter()) {
            if known.contains(&participant.species) {
                continue;
            }
            if options.strict {
                return Err(Error::InvalidInput(format!(
                    "reaction `{}` refers to undeclared species `{}`",
                    reaction.name, participant.species
                )));
            }
            warn!(
                "reaction `{}` refers to undeclared species `{}`; declaring it with population 0",
                reaction.name, participant.species
            );
            known.insert(participant.species.clone());
            species.push(SpeciesDefinition {
                name: participant.species.clone(),
                compartment: DEFAULT_COMPARTMENT.to_string(),
                initial: Value::Constant(0.),
                boundary: false,
            });
        }
    }
    Ok(())
}

/// Declared compartments, plus the default one if some species lives in it
/// without it having been declared.
fn compartments_in_use(
    definition: &ModelDefinition,
    species: &[SpeciesDefinition],
) -> Vec<CompartmentDefinition> {
    let mut compartments = definition.compartments.clone();
    let default_declared = compartments.iter().any(|c| c.name == DEFAULT_COMPARTMENT);
    if !default_declared && species.iter().any(|s| s.compartment == DEFAULT_COMPARTMENT) {
        compartments.push(CompartmentDefinition {
            name: DEFAULT_COMPARTMENT.to_string(),
            volume: Value::Constant(DEFAULT_VOLUME),
        });
    }
    compartments
}

fn compile_value(value: &Value, scope: &Scope) -> Result<CompiledValue> {
    Ok(match value {
        Value::Constant(value) => CompiledValue::Constant(*value),
        Value::Expression(expression) => CompiledValue::Expression(expression.compile(scope)?),
    })
}

fn compile_species(
    definition: &SpeciesDefinition,
    symbols: &SymbolTable,
    scope: &Scope,
) -> Result<Species> {
    let compartment = match symbols.get(&definition.compartment) {
        Some(Slot::Compartment(index)) => index,
        _ => {
            return Err(Error::InvalidInput(format!(
                "species `{}` is in undeclared compartment `{}`",
                definition.name, definition.compartment
            )))
        }
    };
    let value = compile_value(&definition.initial, scope)?;
    if !definition.boundary {
        match value.as_constant() {
            Some(amount) if amount >= 0. && amount.is_finite() => {}
            Some(amount) => {
                return Err(Error::InvalidInput(format!(
                    "species `{}` has invalid initial population {}",
                    definition.name, amount
                )))
            }
            None => {
                return Err(Error::InvalidInput(format!(
                    "species `{}` is not a boundary species and must have a numeric initial \
                     population",
                    definition.name
                )))
            }
        }
    }
    Ok(Species {
        name: definition.name.clone(),
        compartment,
        boundary: definition.boundary,
        value,
    })
}

fn slot_name(
    slot: Slot,
    species: &[Species],
    compartments: &[Compartment],
    parameters: &[Parameter],
) -> String {
    match slot {
        Slot::Species(i) => species[i].name.clone(),
        Slot::Compartment(i) => compartments[i].name.clone(),
        Slot::Parameter(i) => parameters[i].name.clone(),
        other => format!("{:?}", other),
    }
}

/// Rejects expression-valued symbols that are defined in terms of
/// themselves, directly or through other symbols.
fn check_for_cycles(
    species: &[Species],
    compartments: &[Compartment],
    parameters: &[Parameter],
) -> Result<()> {
    let mut definitions: HashMap<Slot, &crate::expression::CompiledExpression> = HashMap::new();
    for (i, s) in species.iter().enumerate() {
        if let CompiledValue::Expression(expression) = &s.value {
            definitions.insert(Slot::Species(i), expression);
        }
    }
    for (i, c) in compartments.iter().enumerate() {
        if let CompiledValue::Expression(expression) = &c.volume {
            definitions.insert(Slot::Compartment(i), expression);
        }
    }
    for (i, p) in parameters.iter().enumerate() {
        if let CompiledValue::Expression(expression) = &p.value {
            definitions.insert(Slot::Parameter(i), expression);
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        InProgress,
        Done,
    }
    let mut marks: HashMap<Slot, Mark> = HashMap::new();
    let mut roots: Vec<Slot> = definitions.keys().copied().collect();
    roots.sort_by_key(|slot| format!("{:?}", slot));

    for root in roots {
        if marks.contains_key(&root) {
            continue;
        }
        // (slot, whether its dependencies have been pushed)
        let mut stack = vec![(root, false)];
        while let Some((slot, expanded)) = stack.pop() {
            if expanded {
                marks.insert(slot, Mark::Done);
                continue;
            }
            match marks.get(&slot) {
                Some(Mark::Done) => continue,
                Some(Mark::InProgress) => {
                    return Err(Error::InvalidInput(format!(
                        "`{}` is defined in terms of itself",
                        slot_name(slot, species, compartments, parameters)
                    )))
                }
                None => {}
            }
            marks.insert(slot, Mark::InProgress);
            stack.push((slot, true));
            if let Some(expression) = definitions.get(&slot) {
                for dependency in expression.slots() {
                    if !definitions.contains_key(&dependency) {
                        continue;
                    }
                    match marks.get(&dependency) {
                        Some(Mark::InProgress) => {
                            return Err(Error::InvalidInput(format!(
                                "`{}` is defined in terms of itself",
                                slot_name(dependency, species, compartments, parameters)
                            )))
                        }
                        Some(Mark::Done) => {}
                        None => stack.push((dependency, false)),
                    }
                }
            }
        }
    }
    Ok(())
}

fn resolve_participants(
    reaction: &str,
    participants: &[Participant],
    symbols: &SymbolTable,
) -> Result<Vec<(usize, u32)>> {
    let mut resolved: Vec<(usize, u32)> = Vec::with_capacity(participants.len());
    for participant in participants.iter() {
        if participant.stoichiometry == 0 {
            return Err(Error::InvalidInput(format!(
                "species `{}` has stoichiometry 0 in reaction `{}`",
                participant.species, reaction
            )));
        }
        let index = match symbols.get(&participant.species) {
            Some(Slot::Species(index)) => index,
            _ => {
                return Err(Error::InvalidInput(format!(
                    "`{}` in reaction `{}` is not a species",
                    participant.species, reaction
                )))
            }
        };
        if resolved.iter().any(|&(other, _)| other == index) {
            return Err(Error::InvalidInput(format!(
                "species `{}` appears more than once on one side of reaction `{}`",
                participant.species, reaction
            )));
        }
        resolved.push((index, participant.stoichiometry));
    }
    Ok(resolved)
}

fn compile_reaction(
    definition: &ReactionDefinition,
    symbols: &SymbolTable,
    species: &[Species],
) -> Result<Reaction> {
    validate_name(&definition.name)?;
    let reactants = resolve_participants(&definition.name, &definition.reactants, symbols)?;
    let products = resolve_participants(&definition.name, &definition.products, symbols)?;
    if reactants.is_empty() && products.is_empty() {
        return Err(Error::InvalidInput(format!(
            "reaction `{}` has no reactants and no products",
            definition.name
        )));
    }

    let mut net: Vec<(usize, i64)> = Vec::new();
    for &(s, stoichiometry) in reactants.iter() {
        net.push((s, -(stoichiometry as i64)));
    }
    for &(s, stoichiometry) in products.iter() {
        match net.iter_mut().find(|(other, _)| *other == s) {
            Some((_, change)) => *change += stoichiometry as i64,
            None => net.push((s, stoichiometry as i64)),
        }
    }
    let mut changes: Vec<(usize, i64)> = net
        .into_iter()
        .filter(|&(s, change)| change != 0 && !species[s].boundary)
        .collect();
    changes.sort_unstable();

    let requirements = reactants
        .iter()
        .filter(|&&(s, _)| !species[s].boundary)
        .map(|&(s, stoichiometry)| (s, stoichiometry as u64))
        .collect();

    let mut local_names = Vec::with_capacity(definition.parameters.len());
    let mut locals = Vec::with_capacity(definition.parameters.len());
    for (name, value) in definition.parameters.iter() {
        validate_name(name)?;
        if local_names.contains(name) {
            return Err(Error::InvalidInput(format!(
                "local parameter `{}` is declared more than once in reaction `{}`",
                name, definition.name
            )));
        }
        local_names.push(name.clone());
        locals.push(*value);
    }

    let scope = Scope::with_locals(symbols, &local_names);
    let rate = match &definition.rate {
        Rate::MassAction(constant) => RateLaw::MassAction(compile_value(constant, &scope)?),
        Rate::Expression(expression) => RateLaw::Expression(expression.compile(&scope)?),
    };

    Ok(Reaction::new(
        definition.name.clone(),
        reactants,
        products,
        changes,
        requirements,
        rate,
        local_names,
        locals,
    ))
}
