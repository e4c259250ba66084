use super::*;

pub(super) fn intermediate_name(reaction: &str, index: u32) -> String {
    format!("{}__intermediate_{}", reaction, index)
}

pub(super) fn step_name(reaction: &str, index: u32) -> String {
    format!("{}__step_{}", reaction, index)
}

/// Replaces every reaction with more than one step by a chain of first-order
/// reactions `A -> I0 -> I1 -> ... -> B`, each with the original rate
/// constant. The first link keeps the reaction's name. Intermediate species
/// start empty and are appended to `species`.
pub(super) fn expand(
    reactions: &[ReactionDefinition],
    species: &mut Vec<SpeciesDefinition>,
) -> Result<Vec<ReactionDefinition>> {
    let mut expanded = Vec::with_capacity(reactions.len());
    for reaction in reactions.iter() {
        match reaction.steps {
            0 => {
                return Err(Error::InvalidInput(format!(
                    "reaction `{}` must have at least one step",
                    reaction.name
                )))
            }
            1 => expanded.push(reaction.clone()),
            steps => expand_one(reaction, steps, species, &mut expanded)?,
        }
    }
    Ok(expanded)
}

fn expand_one(
    reaction: &ReactionDefinition,
    steps: u32,
    species: &mut Vec<SpeciesDefinition>,
    expanded: &mut Vec<ReactionDefinition>,
) -> Result<()> {
    let invalid = |reason: &str| {
        Error::InvalidInput(format!(
            "multistep reaction `{}` {}",
            reaction.name, reason
        ))
    };

    let (reactant, product) = match (&reaction.reactants[..], &reaction.products[..]) {
        ([reactant], [product]) if reactant.stoichiometry == 1 && product.stoichiometry == 1 => {
            (&reactant.species, &product.species)
        }
        _ => {
            return Err(invalid(
                "must have exactly one reactant and one product, each with stoichiometry 1",
            ))
        }
    };

    let rate = match &reaction.rate {
        Rate::MassAction(Value::Constant(rate)) => *rate,
        _ => return Err(invalid("must have a numeric mass-action rate")),
    };

    let compartment_of = |name: &str| {
        species
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.compartment.clone())
            .ok_or_else(|| invalid(&format!("refers to unknown species `{}`", name)))
    };
    let compartment = compartment_of(reactant)?;
    if compartment_of(product)? != compartment {
        return Err(invalid("must have its reactant and product in the same compartment"));
    }

    let mut previous = reactant.clone();
    for step in 0..steps {
        let name = match step {
            0 => reaction.name.clone(),
            _ => step_name(&reaction.name, step),
        };
        let next = if step + 1 == steps {
            product.clone()
        } else {
            let intermediate = intermediate_name(&reaction.name, step);
            species.push(SpeciesDefinition {
                name: intermediate.clone(),
                compartment: compartment.clone(),
                initial: Value::Constant(0.),
                boundary: false,
            });
            intermediate
        };
        let mut link = ReactionDefinition::mass_action(&name, rate)
            .reactant(&previous, 1)
            .product(&next, 1);
        link.parameters = reaction.parameters.clone();
        expanded.push(link);
        previous = next;
    }
    Ok(())
}
