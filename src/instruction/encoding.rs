use std::collections::HashMap;

use thiserror::Error;

use crate::expression::{encoding as expression_encoding, ExpressionError, ExpressionNode};
use crate::reader::{ByteReader, UnexpectedEnd};
use crate::trie::{Trie, TrieBuilder};

use super::{Instruction, InstructionSpec, OperandKind};

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("empty opcode: {0}")]
    EmptyOpcode(String),

    #[error("duplicate opcode prefix: {0}")]
    DuplicateOpcodePrefix(String),

    #[error("duplicate opcode: {0}")]
    DuplicateOpcode(String),

    #[error("duplicate instruction name: {0}")]
    DuplicateName(String),
}

#[derive(Debug, Error)]
pub enum InstructionError {
    #[error("unexpected end of data")]
    UnexpectedEnd(#[from] UnexpectedEnd),

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error("unrecognized instruction at {0}")]
    UnrecognizedOpcode(usize),

    #[error("unrecognized instruction name: {0}")]
    UnknownName(String),

    #[error("expected {expected} arguments, got {got}")]
    OperandCount { expected: usize, got: usize },

    #[error("operand is not a number")]
    NotANumber,

    #[error("operand is not a string")]
    NotAString,

    #[error("string operand contains a NUL byte")]
    StringWithNul,
}

/// Encoder/decoder for one instruction set.
///
/// Built once from the flat spec list; the opcode trie and the name table
/// are read-only afterwards, so one instance serves any number of
/// encode/decode calls.
pub struct InstructionEncoding {
    specs: Vec<InstructionSpec>,
    tree: Trie<u8, usize>,
    by_name: HashMap<String, usize>,
}

impl InstructionEncoding {
    pub fn build_from(specs: Vec<InstructionSpec>) -> Result<Self, SpecError> {
        let tree = build_opcode_tree(&specs)?;

        let mut by_name = HashMap::new();
        for (index, spec) in specs.iter().enumerate() {
            if by_name.contains_key(&spec.name) {
                return Err(SpecError::DuplicateName(spec.name.clone()));
            }
            by_name.insert(spec.name.clone(), index);
        }

        Ok(Self {
            specs,
            tree,
            by_name,
        })
    }

    pub fn get_spec(&self, name: &str) -> Option<&InstructionSpec> {
        self.by_name.get(name).map(|&index| &self.specs[index])
    }

    pub fn encode(&self, out: &mut Vec<u8>, instruction: &Instruction) -> Result<(), InstructionError> {
        let spec = self
            .get_spec(&instruction.name)
            .ok_or_else(|| InstructionError::UnknownName(instruction.name.clone()))?;
        out.extend_from_slice(&spec.opcode);
        if instruction.operands.len() != spec.operands.len() {
            return Err(InstructionError::OperandCount {
                expected: spec.operands.len(),
                got: instruction.operands.len(),
            });
        }
        for (kind, operand) in spec.operands.iter().zip(&instruction.operands) {
            encode_operand(out, *kind, operand)?;
        }
        Ok(())
    }

    pub fn decode(&self, reader: &mut ByteReader) -> Result<Instruction, InstructionError> {
        let spec = self.decode_opcode(reader)?;
        let mut operands = Vec::with_capacity(spec.operands.len());
        for kind in &spec.operands {
            operands.push(decode_operand(reader, *kind)?);
        }
        Ok(Instruction::new(spec.name.clone(), operands))
    }

    fn decode_opcode(&self, reader: &mut ByteReader) -> Result<&InstructionSpec, InstructionError> {
        let start = reader.position();
        let mut cursor = &self.tree;
        loop {
            let byte = reader.read_u8()?;
            cursor = match cursor.branch(&byte) {
                Some(next) => next,
                None => return Err(InstructionError::UnrecognizedOpcode(start)),
            };
            if let Some(&index) = cursor.value() {
                return Ok(&self.specs[index]);
            }
        }
    }
}

fn build_opcode_tree(specs: &[InstructionSpec]) -> Result<Trie<u8, usize>, SpecError> {
    let mut tree = TrieBuilder::new();
    for (index, spec) in specs.iter().enumerate() {
        if spec.opcode.is_empty() {
            return Err(SpecError::EmptyOpcode(spec.name.clone()));
        }
        let mut cursor = &mut tree;
        for (depth, &byte) in spec.opcode.iter().enumerate() {
            if cursor.has_value() {
                return Err(SpecError::DuplicateOpcodePrefix(hex_string(&spec.opcode[..depth])));
            }
            cursor = cursor.ensure_branch(byte);
        }
        if cursor.has_branches() {
            return Err(SpecError::DuplicateOpcodePrefix(hex_string(&spec.opcode)));
        }
        if cursor.has_value() {
            return Err(SpecError::DuplicateOpcode(hex_string(&spec.opcode)));
        }
        cursor.set_value(index);
    }
    Ok(tree.freeze())
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02X}")).collect()
}

fn encode_operand(out: &mut Vec<u8>, kind: OperandKind, operand: &ExpressionNode) -> Result<(), InstructionError> {
    match kind {
        OperandKind::Expr => {
            expression_encoding::encode_expression(out, operand)?;
        }
        OperandKind::Int8 | OperandKind::UInt8 => {
            let value = operand.as_int().ok_or(InstructionError::NotANumber)?;
            out.push(value as u8);
        }
        OperandKind::Int16 | OperandKind::UInt16 => {
            let value = operand.as_int().ok_or(InstructionError::NotANumber)?;
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        OperandKind::Int32 => {
            let value = operand.as_int().ok_or(InstructionError::NotANumber)?;
            out.extend_from_slice(&value.to_le_bytes());
        }
        OperandKind::Str => {
            let value = operand.as_str().ok_or(InstructionError::NotAString)?;
            if value.bytes().any(|byte| byte == 0) {
                return Err(InstructionError::StringWithNul);
            }
            out.extend_from_slice(value.as_bytes());
            out.push(0);
        }
    }
    Ok(())
}

fn decode_operand(reader: &mut ByteReader, kind: OperandKind) -> Result<ExpressionNode, InstructionError> {
    let node = match kind {
        OperandKind::Expr => expression_encoding::decode_expression(reader)?,
        OperandKind::Int8 => ExpressionNode::Number(reader.read_u8()? as i8 as i32),
        OperandKind::UInt8 => ExpressionNode::Number(reader.read_u8()? as i32),
        OperandKind::Int16 => ExpressionNode::Number(reader.read_u16_le()? as i16 as i32),
        OperandKind::UInt16 => ExpressionNode::Number(reader.read_u16_le()? as i32),
        OperandKind::Int32 => ExpressionNode::Number(reader.read_u32_le()? as i32),
        OperandKind::Str => {
            let mut bytes = Vec::new();
            loop {
                let byte = reader.read_u8()?;
                if byte == 0 {
                    break;
                }
                bytes.push(byte);
            }
            ExpressionNode::Str(String::from_utf8_lossy(&bytes).into_owned())
        }
    };
    Ok(node)
}
