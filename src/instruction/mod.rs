pub mod encoding;

pub use encoding::{InstructionEncoding, InstructionError, SpecError};

use crate::expression::ExpressionNode;

/// A decoded instruction: resolved name plus one expression node per
/// declared operand.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Instruction {
    pub name: String,
    pub operands: Vec<ExpressionNode>,
}

impl Instruction {
    pub fn new(name: impl Into<String>, operands: Vec<ExpressionNode>) -> Self {
        Self {
            name: name.into(),
            operands,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum OperandKind {
    Expr,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    Str,
}

#[derive(Debug, Clone)]
pub struct InstructionSpec {
    pub name: String,
    pub opcode: Vec<u8>,
    pub operands: Vec<OperandKind>,
}

impl InstructionSpec {
    pub fn new(name: impl Into<String>, opcode: Vec<u8>, operands: Vec<OperandKind>) -> Self {
        Self {
            name: name.into(),
            opcode,
            operands,
        }
    }
}
