use crate::error::{Error, Result};
use crate::expression::Function;
use std::collections::HashMap;

/// Name of the reserved symbol holding the simulation clock.
pub const TIME: &str = "time";
/// Name of the reserved symbol holding Avogadro's constant.
pub const AVOGADRO: &str = "Navo";
pub const AVOGADRO_CONSTANT: f64 = 6.0221415e23;

/// Where the value of a symbol lives once a model has been compiled.
///
/// Slots are assigned once during compilation and never change for the
/// lifetime of the model, so evaluating an expression never has to look a
/// name up again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Species(usize),
    Compartment(usize),
    Parameter(usize),
    /// A parameter local to one reaction, indexed into that reaction's locals.
    Local(usize),
    Time,
    Avogadro,
}

impl Slot {
    pub fn reserved(name: &str) -> Option<Slot> {
        match name {
            TIME => Some(Slot::Time),
            AVOGADRO => Some(Slot::Avogadro),
            _ => None,
        }
    }
}

/// A logical name together with the slot it was resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub slot: Slot,
}

pub fn is_reserved(name: &str) -> bool {
    Slot::reserved(name).is_some()
}

/// Checks that `name` can be used as a symbol: an identifier that is not a
/// reserved symbol or the name of a built-in function.
pub fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_identifier = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if !valid_identifier {
        return Err(Error::InvalidInput(format!(
            "`{}` is not a valid symbol name",
            name
        )));
    }
    if is_reserved(name) {
        return Err(Error::InvalidInput(format!(
            "`{}` is a reserved symbol and cannot be declared",
            name
        )));
    }
    if Function::from_name(name).is_some() {
        return Err(Error::InvalidInput(format!(
            "`{}` is the name of a function and cannot be declared",
            name
        )));
    }
    Ok(())
}

/// The global symbol table of a compiled model.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    slots: HashMap<String, Slot>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            slots: HashMap::new(),
        }
    }

    /// Declares a new global symbol. Names must be valid and unique across
    /// species, compartments and parameters.
    pub fn declare(&mut self, name: &str, slot: Slot) -> Result<()> {
        validate_name(name)?;
        if self.slots.contains_key(name) {
            return Err(Error::InvalidInput(format!(
                "symbol `{}` is declared more than once",
                name
            )));
        }
        self.slots.insert(name.to_string(), slot);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Slot> {
        self.slots.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// The names visible while compiling one expression.
///
/// Lookups consult reserved symbols first, then the local names, then the
/// global table.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    global: &'a SymbolTable,
    locals: &'a [String],
}

impl<'a> Scope<'a> {
    pub fn global(global: &'a SymbolTable) -> Self {
        Scope {
            global,
            locals: &[],
        }
    }

    pub fn with_locals(global: &'a SymbolTable, locals: &'a [String]) -> Self {
        Scope { global, locals }
    }

    pub fn resolve(&self, name: &str) -> Option<Slot> {
        if let Some(slot) = Slot::reserved(name) {
            return Some(slot);
        }
        if let Some(index) = self.locals.iter().position(|local| local == name) {
            return Some(Slot::Local(index));
        }
        self.global.get(name)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn names_are_validated() {
        assert!(validate_name("A_1").is_ok());
        assert!(validate_name("_x").is_ok());
        for bad in ["", "1A", "a-b", "a b", "time", "Navo", "exp", "theta"] {
            assert!(
                matches!(validate_name(bad), Err(Error::InvalidInput(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn duplicate_declarations_are_rejected() {
        let mut table = SymbolTable::new();
        table.declare("A", Slot::Species(0)).unwrap();
        assert_eq!(
            table.declare("A", Slot::Parameter(0)),
            Err(Error::InvalidInput(
                "symbol `A` is declared more than once".to_string()
            ))
        );
    }

    #[test]
    fn locals_shadow_globals() {
        let mut table = SymbolTable::new();
        table.declare("k", Slot::Parameter(3)).unwrap();
        table.declare("A", Slot::Species(0)).unwrap();
        let locals = vec!["k".to_string()];
        let scope = Scope::with_locals(&table, &locals);
        assert_eq!(scope.resolve("k"), Some(Slot::Local(0)));
        assert_eq!(scope.resolve("A"), Some(Slot::Species(0)));
        assert_eq!(scope.resolve("time"), Some(Slot::Time));
        assert_eq!(scope.resolve("B"), None);
        assert_eq!(Scope::global(&table).resolve("k"), Some(Slot::Parameter(3)));
    }
}
