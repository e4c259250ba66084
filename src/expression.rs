use crate::error::{Error, Result};
use crate::symbol::Scope;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

mod parser;

mod compiled;
pub use compiled::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Modulo,
}

impl BinaryOp {
    pub fn apply(&self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Subtract => lhs - rhs,
            BinaryOp::Multiply => lhs * rhs,
            BinaryOp::Divide => lhs / rhs,
            BinaryOp::Power => lhs.powf(rhs),
            BinaryOp::Modulo => lhs % rhs,
        }
    }

    fn symbol(&self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Subtract => '-',
            BinaryOp::Multiply => '*',
            BinaryOp::Divide => '/',
            BinaryOp::Power => '^',
            BinaryOp::Modulo => '%',
        }
    }
}

/// Built-in functions of one argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Exp,
    Log,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Abs,
    Floor,
    Ceil,
    Sqrt,
    /// Natural log of the gamma function.
    GammaLn,
    /// Heaviside step: 1 for positive arguments, 0 otherwise.
    Theta,
}

impl Function {
    const ALL: [Function; 14] = [
        Function::Exp,
        Function::Log,
        Function::Sin,
        Function::Cos,
        Function::Tan,
        Function::Asin,
        Function::Acos,
        Function::Atan,
        Function::Abs,
        Function::Floor,
        Function::Ceil,
        Function::Sqrt,
        Function::GammaLn,
        Function::Theta,
    ];

    pub fn from_name(name: &str) -> Option<Function> {
        Function::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Exp => "exp",
            Function::Log => "log",
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Asin => "asin",
            Function::Acos => "acos",
            Function::Atan => "atan",
            Function::Abs => "abs",
            Function::Floor => "floor",
            Function::Ceil => "ceil",
            Function::Sqrt => "sqrt",
            Function::GammaLn => "gammaln",
            Function::Theta => "theta",
        }
    }

    pub fn apply(&self, x: f64) -> f64 {
        match self {
            Function::Exp => x.exp(),
            Function::Log => x.ln(),
            Function::Sin => x.sin(),
            Function::Cos => x.cos(),
            Function::Tan => x.tan(),
            Function::Asin => x.asin(),
            Function::Acos => x.acos(),
            Function::Atan => x.atan(),
            Function::Abs => x.abs(),
            Function::Floor => x.floor(),
            Function::Ceil => x.ceil(),
            Function::Sqrt => x.sqrt(),
            Function::GammaLn => statrs::function::gamma::ln_gamma(x),
            Function::Theta => {
                if x > 0. {
                    1.
                } else {
                    0.
                }
            }
        }
    }
}

/// Parse tree of a rate expression.
///
/// Symbols are kept by name here. Use [`Expression::compile`] to resolve them
/// into slots before evaluating.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Number(f64),
    Symbol(String),
    Negate(Box<Expression>),
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
    Call(Function, Box<Expression>),
}

impl Expression {
    /// Parses an expression such as `k1 * A * B / (Km + A)`.
    ///
    /// Unary minus binds tighter than `^`, and `^` associates to the left, so
    /// `-2^2` is `4` and `2^3^2` is `64`.
    pub fn parse(text: &str) -> Result<Expression> {
        parser::Parser::new(text)?.parse()
    }

    pub fn symbol(name: &str) -> Expression {
        Expression::Symbol(name.to_string())
    }

    /// The distinct symbol names referenced by this expression.
    pub fn symbols(&self) -> BTreeSet<&str> {
        let mut symbols = BTreeSet::new();
        self.collect_symbols(&mut symbols);
        symbols
    }

    fn collect_symbols<'a>(&'a self, symbols: &mut BTreeSet<&'a str>) {
        match self {
            Expression::Number(_) => {}
            Expression::Symbol(name) => {
                symbols.insert(name);
            }
            Expression::Negate(operand) | Expression::Call(_, operand) => {
                operand.collect_symbols(symbols)
            }
            Expression::Binary(_, lhs, rhs) => {
                lhs.collect_symbols(symbols);
                rhs.collect_symbols(symbols);
            }
        }
    }

    /// Resolves every symbol leaf against `scope`, producing an expression
    /// that can be evaluated without any further name lookups.
    pub fn compile(&self, scope: &Scope) -> Result<CompiledExpression> {
        let mut nodes = Vec::new();
        self.compile_into(scope, &mut nodes)?;
        Ok(CompiledExpression::from_nodes(nodes))
    }

    fn compile_into(&self, scope: &Scope, nodes: &mut Vec<Node>) -> Result<usize> {
        let node = match self {
            Expression::Number(value) => Node::Constant(*value),
            Expression::Symbol(name) => match scope.resolve(name) {
                Some(slot) => Node::Load(slot),
                None => return Err(Error::DataNotFound(name.clone())),
            },
            Expression::Negate(operand) => Node::Negate(operand.compile_into(scope, nodes)?),
            Expression::Call(function, operand) => {
                Node::Call(*function, operand.compile_into(scope, nodes)?)
            }
            Expression::Binary(op, lhs, rhs) => {
                let lhs = lhs.compile_into(scope, nodes)?;
                let rhs = rhs.compile_into(scope, nodes)?;
                Node::Binary(*op, lhs, rhs)
            }
        };
        nodes.push(node);
        Ok(nodes.len() - 1)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Number(value) => write!(f, "{}", value),
            Expression::Symbol(name) => write!(f, "{}", name),
            Expression::Negate(operand) => write!(f, "-({})", operand),
            Expression::Call(function, operand) => write!(f, "{}({})", function.name(), operand),
            Expression::Binary(op, lhs, rhs) => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
        }
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Expression::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    fn number(value: f64) -> Box<Expression> {
        Box::new(Expression::Number(value))
    }

    #[test]
    fn precedence() {
        let expression = Expression::parse("1 + 2 * 3").unwrap();
        assert_eq!(
            expression,
            Expression::Binary(
                BinaryOp::Add,
                number(1.),
                Box::new(Expression::Binary(BinaryOp::Multiply, number(2.), number(3.)))
            )
        );
    }

    #[test]
    fn negation_binds_tighter_than_power() {
        let expression = Expression::parse("-2^2").unwrap();
        assert_eq!(
            expression,
            Expression::Binary(
                BinaryOp::Power,
                Box::new(Expression::Negate(number(2.))),
                number(2.)
            )
        );
    }

    #[test]
    fn power_is_left_associative() {
        let expression = Expression::parse("2^3^2").unwrap();
        assert_eq!(
            expression,
            Expression::Binary(
                BinaryOp::Power,
                Box::new(Expression::Binary(BinaryOp::Power, number(2.), number(3.))),
                number(2.)
            )
        );
    }

    #[test]
    fn functions_and_scientific_notation() {
        let expression = Expression::parse("exp(-k_2 * time) + 1.5e-3").unwrap();
        assert_eq!(
            expression.symbols().into_iter().collect::<Vec<_>>(),
            vec!["k_2", "time"]
        );
        let Expression::Binary(BinaryOp::Add, lhs, rhs) = expression else {
            panic!("expected an addition");
        };
        assert!(matches!(*lhs, Expression::Call(Function::Exp, _)));
        assert_eq!(*rhs, Expression::Number(1.5e-3));
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        for text in ["", "1 +", "(A", "A)", "2 3", "exp", "exp 2", "foo(1)", "A $ B", "1.2.3"] {
            assert!(
                matches!(Expression::parse(text), Err(Error::InvalidInput(_))),
                "{:?} should not parse",
                text
            );
        }
    }

    #[test]
    fn display_reparses_to_same_tree() {
        let expression = Expression::parse("-A^2 % 3 - theta(time - 1.25) / sqrt(B)").unwrap();
        let reparsed = Expression::parse(&expression.to_string()).unwrap();
        assert_eq!(expression, reparsed);
    }

    #[test]
    fn serializes_as_text() {
        let expression = Expression::parse("k * A").unwrap();
        let json = serde_json::to_string(&expression).unwrap();
        assert_eq!(json, "\"(k * A)\"");
        let parsed: Expression = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, expression);
    }

    #[test]
    fn theta_is_a_strict_step() {
        assert_eq!(Function::Theta.apply(0.), 0.);
        assert_eq!(Function::Theta.apply(1e-12), 1.);
        assert!((Function::GammaLn.apply(5.) - 24_f64.ln()).abs() < 1e-10);
    }
}
