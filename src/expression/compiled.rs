use super::*;
use crate::symbol::Slot;

/// One node of a compiled expression. Operands refer to earlier nodes of the
/// same arena by position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node {
    Constant(f64),
    Load(Slot),
    Negate(usize),
    Binary(BinaryOp, usize, usize),
    Call(Function, usize),
}

/// An expression whose symbols have all been resolved to slots.
///
/// Nodes are stored children-first in a flat arena with the root last.
/// Evaluation is a pure function of the values loaded from the slots.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    nodes: Vec<Node>,
}

impl CompiledExpression {
    pub(super) fn from_nodes(nodes: Vec<Node>) -> Self {
        CompiledExpression { nodes }
    }

    pub fn constant(value: f64) -> Self {
        CompiledExpression {
            nodes: vec![Node::Constant(value)],
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Every slot this expression loads from, in arena order. May contain
    /// repeats.
    pub fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        self.nodes.iter().filter_map(|node| match node {
            Node::Load(slot) => Some(*slot),
            _ => None,
        })
    }

    /// Evaluates the expression, calling `load` for every slot leaf.
    pub fn evaluate<F>(&self, load: &mut F) -> Result<f64>
    where
        F: FnMut(Slot) -> Result<f64>,
    {
        match self.nodes.len() {
            0 => Ok(0.),
            n => self.evaluate_node(n - 1, load),
        }
    }

    fn evaluate_node<F>(&self, index: usize, load: &mut F) -> Result<f64>
    where
        F: FnMut(Slot) -> Result<f64>,
    {
        Ok(match self.nodes[index] {
            Node::Constant(value) => value,
            Node::Load(slot) => load(slot)?,
            Node::Negate(operand) => -self.evaluate_node(operand, load)?,
            Node::Call(function, operand) => function.apply(self.evaluate_node(operand, load)?),
            Node::Binary(op, lhs, rhs) => {
                let lhs = self.evaluate_node(lhs, load)?;
                let rhs = self.evaluate_node(rhs, load)?;
                op.apply(lhs, rhs)
            }
        })
    }
}
