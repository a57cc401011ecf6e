pub mod encoding;
pub mod glyphs;
pub mod syntax;

pub use encoding::{CompiledStringEncoding, StringError, UnitWidth};
pub use glyphs::StringGlyphSyntax;

use std::collections::HashMap;

use thiserror::Error;

use crate::expression::ExpressionNode;
use crate::instruction::OperandKind;

/// One token of a game string.
///
/// `Tag` and `Glyph` appear in both the compiled and the uncompiled forms;
/// `Chunk` is plain text and exists only on the uncompiled side, before
/// glyph tokenization.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum StringToken {
    Tag { name: String, operands: Vec<ExpressionNode> },
    Glyph(i32),
    Chunk { text: String, italic: bool },
}

impl StringToken {
    pub fn tag(name: impl Into<String>, operands: Vec<ExpressionNode>) -> Self {
        StringToken::Tag {
            name: name.into(),
            operands,
        }
    }
}

/// A string table row: engine-visible string ID plus the token stream.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct StringTableEntry {
    pub index: i32,
    pub tokens: Vec<StringToken>,
}

impl StringTableEntry {
    pub fn new(index: i32, tokens: Vec<StringToken>) -> Self {
        Self { index, tokens }
    }
}

#[derive(Debug, Error)]
pub enum StringSpecError {
    #[error("duplicate string tag name: {0}")]
    DuplicateTagName(String),

    #[error("duplicate string tag opcode: {0:#04X}")]
    DuplicateTagOpcode(u8),

    #[error("string tag opcode out of range: {0:#04X}")]
    TagOpcodeOutOfRange(u8),

    #[error("empty glyph text for index {0:04X}")]
    EmptyGlyphText(i32),

    #[error("duplicate {style} glyph text: {text}")]
    DuplicateGlyphText { style: &'static str, text: String },

    #[error("duplicate glyph index: {0:04X}")]
    DuplicateGlyphIndex(i32),
}

#[derive(Debug, Clone)]
pub struct StringTagSpec {
    pub name: String,
    pub opcode: u8,
    pub operands: Vec<OperandKind>,
}

impl StringTagSpec {
    pub fn new(name: impl Into<String>, opcode: u8, operands: Vec<OperandKind>) -> Self {
        Self {
            name: name.into(),
            opcode,
            operands,
        }
    }
}

/// Tag dictionary for one game/flag-set combination, indexed both ways.
pub struct StringTagsSpec {
    by_name: HashMap<String, usize>,
    by_opcode: HashMap<u8, usize>,
    specs: Vec<StringTagSpec>,
}

impl StringTagsSpec {
    pub fn new(specs: Vec<StringTagSpec>) -> Result<Self, StringSpecError> {
        let mut by_name = HashMap::new();
        let mut by_opcode = HashMap::new();
        for (index, spec) in specs.iter().enumerate() {
            if spec.opcode >= 0x80 {
                return Err(StringSpecError::TagOpcodeOutOfRange(spec.opcode));
            }
            if by_name.contains_key(&spec.name) {
                return Err(StringSpecError::DuplicateTagName(spec.name.clone()));
            }
            if by_opcode.contains_key(&spec.opcode) {
                return Err(StringSpecError::DuplicateTagOpcode(spec.opcode));
            }
            by_name.insert(spec.name.clone(), index);
            by_opcode.insert(spec.opcode, index);
        }
        Ok(Self {
            by_name,
            by_opcode,
            specs,
        })
    }

    pub fn get_by_name(&self, name: &str) -> Option<&StringTagSpec> {
        self.by_name.get(name).map(|&index| &self.specs[index])
    }

    pub fn get_by_opcode(&self, opcode: u8) -> Option<&StringTagSpec> {
        self.by_opcode.get(&opcode).map(|&index| &self.specs[index])
    }
}

/// One charset glyph: engine code unit, its text, and which styles it
/// renders in.
#[derive(Debug, Clone)]
pub struct GlyphSpec {
    pub index: i32,
    pub text: String,
    pub regular: bool,
    pub italic: bool,
}

impl GlyphSpec {
    pub fn new(index: i32, text: impl Into<String>, regular: bool, italic: bool) -> Self {
        Self {
            index,
            text: text.into(),
            regular,
            italic,
        }
    }
}
