use std::collections::BTreeMap;

use thiserror::Error;

use crate::instruction::{Instruction, InstructionEncoding, InstructionError};

use super::{PlainScriptElement, RawScript};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Instruction(#[from] InstructionError),

    #[error("conflicting label: {0}")]
    ConflictingLabel(usize),

    #[error("conflicting return label: {0}")]
    ConflictingReturnLabel(usize),
}

/// Assembles plain script elements into code plus label tables.
pub fn compile_script(
    encoding: &InstructionEncoding,
    elements: &[PlainScriptElement],
) -> Result<RawScript, CompileError> {
    let mut compiler = ScriptCompiler {
        encoding,
        code: Vec::new(),
        label_table: BTreeMap::new(),
        return_label_table: BTreeMap::new(),
    };

    for element in elements {
        compiler.process_element(element)?;
    }

    Ok(compiler.finish())
}

struct ScriptCompiler<'a> {
    encoding: &'a InstructionEncoding,
    code: Vec<u8>,
    label_table: BTreeMap<usize, usize>,
    return_label_table: BTreeMap<usize, usize>,
}

impl<'a> ScriptCompiler<'a> {
    fn process_element(&mut self, element: &PlainScriptElement) -> Result<(), CompileError> {
        match element {
            PlainScriptElement::Instruction(instruction) => {
                self.process_instruction(instruction)?;
            }
            PlainScriptElement::Label(index) => {
                let offset = self.code.len();
                if self.label_table.contains_key(index) {
                    return Err(CompileError::ConflictingLabel(*index));
                }
                self.label_table.insert(*index, offset);
            }
            PlainScriptElement::ReturnLabel(index) => {
                let offset = self.code.len();
                if self.return_label_table.contains_key(index) {
                    return Err(CompileError::ConflictingReturnLabel(*index));
                }
                self.return_label_table.insert(*index, offset);
            }
            PlainScriptElement::Raw(data) => {
                self.code.extend_from_slice(data);
            }
            PlainScriptElement::Comment(_) | PlainScriptElement::Error { .. } => {}
        }
        Ok(())
    }

    fn process_instruction(&mut self, instruction: &Instruction) -> Result<(), CompileError> {
        // data-table rows decompile to these pseudo-instructions; they write
        // their operands raw instead of resolving through the opcode trie
        match instruction.name.to_ascii_lowercase().as_str() {
            "dw" | "adr" => {
                for operand in &instruction.operands {
                    let value = operand.as_int().ok_or(InstructionError::NotANumber)?;
                    self.code.extend_from_slice(&(value as u16).to_le_bytes());
                }
            }
            "dd" | "stringid" => {
                for operand in &instruction.operands {
                    let value = operand.as_int().ok_or(InstructionError::NotANumber)?;
                    self.code.extend_from_slice(&value.to_le_bytes());
                }
            }
            _ => {
                self.encoding.encode(&mut self.code, instruction)?;
            }
        }
        Ok(())
    }

    fn finish(self) -> RawScript {
        let end = self.code.len();

        let mut labels = Vec::new();
        for (index, offset) in self.label_table {
            while labels.len() < index {
                labels.push(end);
            }
            labels.push(offset);
        }

        let mut return_labels = Vec::new();
        for (index, offset) in self.return_label_table {
            while return_labels.len() < index {
                return_labels.push(end);
            }
            return_labels.push(offset);
        }

        RawScript::new(self.code, labels, return_labels)
    }
}
