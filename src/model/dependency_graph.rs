use super::*;

/// For every reaction `j`, the reactions whose rates can change when `j`
/// fires: those reading a species `j` modifies, those reading the clock,
/// and `j` itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    pub fn build(reactions: &[Reaction], num_species: usize) -> Self {
        let mut species_readers: Vec<Vec<usize>> = vec![Vec::new(); num_species];
        let mut time_readers = Vec::new();
        for (idx, reaction) in reactions.iter().enumerate() {
            for &species in reaction.reads() {
                species_readers[species].push(idx);
            }
            if reaction.reads_time() {
                time_readers.push(idx);
            }
        }

        let mut dependents = vec![Vec::new(); reactions.len()];
        let mut visit_markers = vec![0usize; reactions.len()];
        for (r, deps) in dependents.iter_mut().enumerate() {
            let mark = r + 1;
            visit_markers[r] = mark;
            deps.push(r);
            let readers = reactions[r]
                .species_updated()
                .flat_map(|species| species_readers[species].iter())
                .chain(time_readers.iter());
            for &dep in readers {
                if visit_markers[dep] != mark {
                    visit_markers[dep] = mark;
                    deps.push(dep);
                }
            }
            deps.sort_unstable();
        }
        DependencyGraph { dependents }
    }

    pub fn dependents(&self, reaction: usize) -> &[usize] {
        &self.dependents[reaction]
    }

    pub fn len(&self) -> usize {
        self.dependents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependents.is_empty()
    }

    pub fn num_edges(&self) -> usize {
        self.dependents.iter().map(Vec::len).sum()
    }
}

/// Species read by an expression-valued rate, following expression-valued
/// parameters, compartments and boundary species down to the species they
/// are defined by. Also reports whether the clock is read anywhere.
pub(super) fn read_set(
    slots: impl Iterator<Item = Slot>,
    species: &[Species],
    compartments: &[Compartment],
    parameters: &[Parameter],
) -> (Vec<usize>, bool) {
    let mut reads = Vec::new();
    let mut reads_time = false;
    let mut visited = std::collections::HashSet::new();
    let mut pending: Vec<Slot> = slots.collect();

    while let Some(slot) = pending.pop() {
        if !visited.insert(slot) {
            continue;
        }
        let definition = match slot {
            Slot::Time => {
                reads_time = true;
                None
            }
            Slot::Species(i) => match &species[i].value {
                CompiledValue::Expression(expression) if species[i].boundary => Some(expression),
                _ => {
                    reads.push(i);
                    None
                }
            },
            Slot::Compartment(i) => match &compartments[i].volume {
                CompiledValue::Expression(expression) => Some(expression),
                CompiledValue::Constant(_) => None,
            },
            Slot::Parameter(i) => match &parameters[i].value {
                CompiledValue::Expression(expression) => Some(expression),
                CompiledValue::Constant(_) => None,
            },
            Slot::Local(_) | Slot::Avogadro => None,
        };
        if let Some(expression) = definition {
            pending.extend(expression.slots());
        }
    }

    reads.sort_unstable();
    (reads, reads_time)
}
