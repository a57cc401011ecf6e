pub mod compiler;
pub mod decompiler;
pub mod syntax;

pub use compiler::{compile_script, CompileError};
pub use decompiler::{decompile_script, DecompiledScript};

use crate::instruction::Instruction;

/// A compiled script body: flat code plus its two label-offset tables.
///
/// Offsets index into `code` (or one past its end, for label slots that
/// were never defined).
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RawScript {
    pub code: Vec<u8>,
    pub labels: Vec<usize>,
    pub return_labels: Vec<usize>,
}

impl RawScript {
    pub fn new(code: Vec<u8>, labels: Vec<usize>, return_labels: Vec<usize>) -> Self {
        Self {
            code,
            labels,
            return_labels,
        }
    }
}

/// One element of the plain-text script form. This is what the assembler
/// consumes and the decompiler produces.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum PlainScriptElement {
    Instruction(Instruction),
    Label(usize),
    ReturnLabel(usize),
    Comment(String),
    Error { position: usize, message: String },
    Raw(Vec<u8>),
}
