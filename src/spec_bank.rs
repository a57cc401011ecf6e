use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::instruction::{InstructionSpec, OperandKind};
use crate::strings::{GlyphSpec, StringTagSpec};

#[derive(Debug, Error)]
pub enum BankError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bank YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("charset JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unrecognized operand kind name: {0}")]
    UnknownOperandKind(String),

    #[error("invalid opcode pattern: {0}")]
    BadOpcodePattern(String),

    #[error("invalid glyph index: {0}")]
    BadGlyphIndex(String),

    #[error("unknown flag set: {0}")]
    UnknownFlagSet(String),

    #[error("unknown charset: {0}")]
    UnknownCharset(String),
}

/// On-disk bank of per-game instruction, string-tag and glyph definitions.
///
/// The bank directory holds a `data.yaml` index pointing at YAML spec lists
/// and JSON charset files; entries are gated on named flag sets.
pub struct SpecBank {
    path: PathBuf,
    index: BankIndex,
}

#[derive(Debug, Deserialize)]
struct BankIndex {
    instructions: Vec<String>,
    stringtags: Vec<String>,
    charset: HashMap<String, String>,
    flags: HashMap<String, HashMap<String, bool>>,
}

#[derive(Debug, Deserialize)]
struct SerializedInstructionSpec {
    pattern: String,
    name: String,
    #[serde(default)]
    operands: Vec<String>,
    #[serde(default)]
    flags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SerializedStringTagSpec {
    opcode: u8,
    name: String,
    #[serde(default)]
    operands: Vec<String>,
    #[serde(default)]
    flags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SerializedGlyphSpec {
    text: String,
    regular: Option<bool>,
    italic: Option<bool>,
}

impl SpecBank {
    pub fn load(path: &Path) -> Result<Self, BankError> {
        let text = fs::read_to_string(path.join("data.yaml"))?;
        let index: BankIndex = serde_yaml::from_str(&text)?;
        Ok(Self {
            path: path.to_path_buf(),
            index,
        })
    }

    pub fn flags(&self, key: &str) -> Result<HashMap<String, bool>, BankError> {
        self.index
            .flags
            .get(key)
            .cloned()
            .ok_or_else(|| BankError::UnknownFlagSet(key.to_string()))
    }

    pub fn instruction_specs(&self, flags: &HashMap<String, bool>) -> Result<Vec<InstructionSpec>, BankError> {
        let mut result = Vec::new();
        for file in &self.index.instructions {
            let text = fs::read_to_string(self.path.join(file))?;
            result.extend(parse_instruction_specs(&text, flags)?);
        }
        Ok(result)
    }

    pub fn string_tag_specs(&self, flags: &HashMap<String, bool>) -> Result<Vec<StringTagSpec>, BankError> {
        let mut result = Vec::new();
        for file in &self.index.stringtags {
            let text = fs::read_to_string(self.path.join(file))?;
            result.extend(parse_string_tag_specs(&text, flags)?);
        }
        Ok(result)
    }

    pub fn glyph_specs(&self, charset: &str) -> Result<Vec<GlyphSpec>, BankError> {
        let file = self
            .index
            .charset
            .get(charset)
            .ok_or_else(|| BankError::UnknownCharset(charset.to_string()))?;
        let text = fs::read_to_string(self.path.join(file))?;
        parse_glyph_specs(&text)
    }
}

pub fn parse_instruction_specs(
    text: &str,
    flags: &HashMap<String, bool>,
) -> Result<Vec<InstructionSpec>, BankError> {
    let specs: Vec<SerializedInstructionSpec> = serde_yaml::from_str(text)?;
    let mut result = Vec::new();
    for spec in specs {
        if !check_flags(&spec.flags, flags) {
            continue;
        }
        let opcode = parse_opcode_pattern(&spec.pattern)?;
        let operands = parse_operand_kinds(&spec.operands)?;
        result.push(InstructionSpec::new(spec.name, opcode, operands));
    }
    Ok(result)
}

pub fn parse_string_tag_specs(
    text: &str,
    flags: &HashMap<String, bool>,
) -> Result<Vec<StringTagSpec>, BankError> {
    let specs: Vec<SerializedStringTagSpec> = serde_yaml::from_str(text)?;
    let mut result = Vec::new();
    for spec in specs {
        if !check_flags(&spec.flags, flags) {
            continue;
        }
        let operands = parse_operand_kinds(&spec.operands)?;
        result.push(StringTagSpec::new(spec.name, spec.opcode, operands));
    }
    Ok(result)
}

pub fn parse_glyph_specs(text: &str) -> Result<Vec<GlyphSpec>, BankError> {
    let map: HashMap<String, SerializedGlyphSpec> = serde_json::from_str(text)?;
    let mut glyphs = Vec::with_capacity(map.len());
    for (key, spec) in map {
        let index = i32::from_str_radix(&key, 16).map_err(|_| BankError::BadGlyphIndex(key.clone()))?;
        let mut regular = true;
        let mut italic = false;
        if let Some(value) = spec.italic {
            regular = false;
            italic = value;
        }
        if let Some(value) = spec.regular {
            regular = value;
        }
        glyphs.push(GlyphSpec::new(index, spec.text, regular, italic));
    }
    glyphs.sort_by_key(|glyph| glyph.index);
    Ok(glyphs)
}

fn parse_opcode_pattern(pattern: &str) -> Result<Vec<u8>, BankError> {
    let mut opcode = Vec::new();
    for part in pattern.split(' ') {
        let byte =
            u8::from_str_radix(part, 16).map_err(|_| BankError::BadOpcodePattern(pattern.to_string()))?;
        opcode.push(byte);
    }
    Ok(opcode)
}

fn parse_operand_kinds(names: &[String]) -> Result<Vec<OperandKind>, BankError> {
    let mut kinds = Vec::with_capacity(names.len());
    for name in names {
        let kind = match name.as_str() {
            "expr" => OperandKind::Expr,
            "int8" => OperandKind::Int8,
            "uint8" => OperandKind::UInt8,
            "int16" => OperandKind::Int16,
            "uint16" => OperandKind::UInt16,
            "int32" => OperandKind::Int32,
            "str" => OperandKind::Str,
            _ => return Err(BankError::UnknownOperandKind(name.clone())),
        };
        kinds.push(kind);
    }
    Ok(kinds)
}

/// A spec is active when every listed flag matches: `name` requires the
/// flag set, `~name` requires it clear.
fn check_flags(required: &[String], flags: &HashMap<String, bool>) -> bool {
    for flag in required {
        let (name, expected) = match flag.strip_prefix('~') {
            Some(name) => (name, false),
            None => (flag.as_str(), true),
        };
        if flags.get(name).copied() != Some(expected) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(pairs: &[(&str, bool)]) -> HashMap<String, bool> {
        pairs.iter().map(|(name, value)| (name.to_string(), *value)).collect()
    }

    #[test]
    fn test_parse_instruction_specs() {
        let text = "\
- pattern: \"00 01\"
  name: Nop
  operands: []
  flags: []
- pattern: \"10\"
  name: JumpTable
  operands: [expr, int16]
  flags: [steins]
- pattern: \"11\"
  name: Legacy
  operands: [int8]
  flags: [~steins]
";
        let specs = parse_instruction_specs(&text, &flags(&[("steins", true)])).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "Nop");
        assert_eq!(specs[0].opcode, [0x00, 0x01]);
        assert_eq!(specs[1].name, "JumpTable");
        assert_eq!(specs[1].operands, [OperandKind::Expr, OperandKind::Int16]);

        let specs = parse_instruction_specs(&text, &flags(&[("steins", false)])).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].name, "Legacy");
    }

    #[test]
    fn test_unknown_operand_kind() {
        let text = "\
- pattern: \"00\"
  name: Bad
  operands: [float]
";
        assert!(matches!(
            parse_instruction_specs(&text, &flags(&[])),
            Err(BankError::UnknownOperandKind(_))
        ));
    }

    #[test]
    fn test_bad_opcode_pattern() {
        let text = "\
- pattern: \"00 XY\"
  name: Bad
";
        assert!(matches!(
            parse_instruction_specs(&text, &flags(&[])),
            Err(BankError::BadOpcodePattern(_))
        ));
    }

    #[test]
    fn test_parse_string_tag_specs() {
        let text = "\
- opcode: 0
  name: newline
- opcode: 4
  name: color
  operands: [expr]
";
        let specs = parse_string_tag_specs(&text, &flags(&[])).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].opcode, 4);
        assert_eq!(specs[1].operands, [OperandKind::Expr]);
    }

    #[test]
    fn test_parse_glyph_specs() {
        let text = r#"{
            "0041": {"text": "A"},
            "0042": {"text": "B", "italic": true},
            "0043": {"text": "C", "italic": true, "regular": true}
        }"#;
        let glyphs = parse_glyph_specs(text).unwrap();
        assert_eq!(glyphs.len(), 3);

        assert_eq!(glyphs[0].index, 0x41);
        assert!(glyphs[0].regular && !glyphs[0].italic);
        assert!(!glyphs[1].regular && glyphs[1].italic);
        assert!(glyphs[2].regular && glyphs[2].italic);
    }

    #[test]
    fn test_check_flags() {
        let active = flags(&[("a", true), ("b", false)]);
        assert!(check_flags(&[], &active));
        assert!(check_flags(&["a".to_string()], &active));
        assert!(check_flags(&["~b".to_string()], &active));
        assert!(!check_flags(&["b".to_string()], &active));
        assert!(!check_flags(&["~a".to_string()], &active));
        assert!(!check_flags(&["missing".to_string()], &active));
    }
}
