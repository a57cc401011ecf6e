use thiserror::Error;

use crate::expression::{encoding as expression_encoding, ExpressionError, ExpressionNode};
use crate::instruction::OperandKind;
use crate::reader::{ByteReader, UnexpectedEnd};

use super::{StringTagsSpec, StringToken};

#[derive(Debug, Error)]
pub enum StringError {
    #[error("unexpected end of data")]
    UnexpectedEnd(#[from] UnexpectedEnd),

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error("unrecognized string tag name: {0}")]
    UnknownTagName(String),

    #[error("unrecognized string tag opcode {0:#04X} at {1}")]
    UnknownTagOpcode(u8, usize),

    #[error("expected {expected} tag operands, got {got}")]
    OperandCount { expected: usize, got: usize },

    #[error("tag operand is not a number")]
    NotANumber,

    #[error("text chunk in a compiled string")]
    UncompiledChunk,
}

/// Width of one glyph code unit in the compiled stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitWidth {
    U16,
    U32,
}

/// Codec for compiled string token streams: tag tokens below 0x80, glyph
/// units with the high bit set, one 0xFF terminator.
pub struct CompiledStringEncoding {
    unit_width: UnitWidth,
    tags: StringTagsSpec,
}

impl CompiledStringEncoding {
    pub fn new(unit_width: UnitWidth, tags: StringTagsSpec) -> Self {
        Self { unit_width, tags }
    }

    pub fn encode(&self, out: &mut Vec<u8>, tokens: &[StringToken]) -> Result<(), StringError> {
        for token in tokens {
            self.encode_token(out, token)?;
        }
        out.push(0xFF);
        Ok(())
    }

    pub fn decode(&self, reader: &mut ByteReader) -> Result<Vec<StringToken>, StringError> {
        let mut tokens = Vec::new();
        loop {
            let head = reader.peek_u8()?;
            if head == 0xFF {
                reader.read_u8()?;
                break;
            }
            if head & 0x80 == 0 {
                tokens.push(self.decode_tag(reader)?);
            } else {
                tokens.push(self.decode_unit(reader)?);
            }
        }
        Ok(tokens)
    }

    fn encode_token(&self, out: &mut Vec<u8>, token: &StringToken) -> Result<(), StringError> {
        match token {
            StringToken::Tag { name, operands } => self.encode_tag(out, name, operands),
            StringToken::Glyph(value) => {
                self.encode_unit(out, *value);
                Ok(())
            }
            StringToken::Chunk { .. } => Err(StringError::UncompiledChunk),
        }
    }

    fn encode_tag(&self, out: &mut Vec<u8>, name: &str, operands: &[ExpressionNode]) -> Result<(), StringError> {
        let spec = self
            .tags
            .get_by_name(name)
            .ok_or_else(|| StringError::UnknownTagName(name.to_string()))?;
        if operands.len() != spec.operands.len() {
            return Err(StringError::OperandCount {
                expected: spec.operands.len(),
                got: operands.len(),
            });
        }
        out.push(spec.opcode);
        for (kind, operand) in spec.operands.iter().zip(operands) {
            encode_operand(out, *kind, operand)?;
        }
        Ok(())
    }

    fn encode_unit(&self, out: &mut Vec<u8>, value: i32) {
        match self.unit_width {
            UnitWidth::U16 => {
                out.push(((value >> 8) & 0x7F) as u8 | 0x80);
                out.push(value as u8);
            }
            UnitWidth::U32 => {
                out.push(((value >> 24) & 0x7F) as u8 | 0x80);
                out.push((value >> 16) as u8);
                out.push((value >> 8) as u8);
                out.push(value as u8);
            }
        }
    }

    fn decode_tag(&self, reader: &mut ByteReader) -> Result<StringToken, StringError> {
        let position = reader.position();
        let opcode = reader.read_u8()?;
        let spec = self
            .tags
            .get_by_opcode(opcode)
            .ok_or(StringError::UnknownTagOpcode(opcode, position))?;
        let mut operands = Vec::with_capacity(spec.operands.len());
        for kind in &spec.operands {
            operands.push(decode_operand(reader, *kind)?);
        }
        Ok(StringToken::Tag {
            name: spec.name.clone(),
            operands,
        })
    }

    fn decode_unit(&self, reader: &mut ByteReader) -> Result<StringToken, StringError> {
        let value = match self.unit_width {
            UnitWidth::U16 => {
                let mut value = ((reader.read_u8()? & 0x7F) as i32) << 8;
                value |= reader.read_u8()? as i32;
                value
            }
            UnitWidth::U32 => {
                let mut value = ((reader.read_u8()? & 0x7F) as i32) << 24;
                value |= (reader.read_u8()? as i32) << 16;
                value |= (reader.read_u8()? as i32) << 8;
                value |= reader.read_u8()? as i32;
                value
            }
        };
        Ok(StringToken::Glyph(value))
    }
}

// tag integer operands are big-endian, unlike everything else in the format
fn encode_operand(out: &mut Vec<u8>, kind: OperandKind, operand: &ExpressionNode) -> Result<(), StringError> {
    match kind {
        OperandKind::Expr => {
            expression_encoding::encode_expression(out, operand)?;
        }
        OperandKind::Int8 | OperandKind::UInt8 => {
            let value = operand.as_int().ok_or(StringError::NotANumber)?;
            out.push(value as u8);
        }
        OperandKind::Int16 | OperandKind::UInt16 => {
            let value = operand.as_int().ok_or(StringError::NotANumber)?;
            out.push((value >> 8) as u8);
            out.push(value as u8);
        }
        OperandKind::Int32 => {
            let value = operand.as_int().ok_or(StringError::NotANumber)?;
            out.push((value >> 24) as u8);
            out.push((value >> 16) as u8);
            out.push((value >> 8) as u8);
            out.push(value as u8);
        }
        OperandKind::Str => {
            return Err(StringError::NotANumber);
        }
    }
    Ok(())
}

fn decode_operand(reader: &mut ByteReader, kind: OperandKind) -> Result<ExpressionNode, StringError> {
    let node = match kind {
        OperandKind::Expr => expression_encoding::decode_expression(reader)?,
        OperandKind::Int8 => ExpressionNode::Number(reader.read_u8()? as i8 as i32),
        OperandKind::UInt8 => ExpressionNode::Number(reader.read_u8()? as i32),
        OperandKind::Int16 => {
            let mut value = (reader.read_u8()? as i32) << 8;
            value |= reader.read_u8()? as i32;
            ExpressionNode::Number(value as i16 as i32)
        }
        OperandKind::UInt16 => {
            let mut value = (reader.read_u8()? as i32) << 8;
            value |= reader.read_u8()? as i32;
            ExpressionNode::Number(value)
        }
        OperandKind::Int32 => {
            let mut value = (reader.read_u8()? as i32) << 24;
            value |= (reader.read_u8()? as i32) << 16;
            value |= (reader.read_u8()? as i32) << 8;
            value |= reader.read_u8()? as i32;
            ExpressionNode::Number(value)
        }
        OperandKind::Str => return Err(StringError::NotANumber),
    };
    Ok(node)
}

#[cfg(test)]
mod tests {
    use crate::strings::StringTagSpec;

    use super::*;

    fn encoding() -> CompiledStringEncoding {
        let tags = StringTagsSpec::new(vec![
            StringTagSpec::new("newline", 0x00, vec![]),
            StringTagSpec::new("color", 0x04, vec![OperandKind::Expr]),
            StringTagSpec::new("voice", 0x09, vec![OperandKind::Int16]),
        ])
        .unwrap();
        CompiledStringEncoding::new(UnitWidth::U16, tags)
    }

    #[test]
    fn test_round_trip() {
        let encoding = encoding();
        let tokens = vec![
            StringToken::tag("color", vec![ExpressionNode::Number(3)]),
            StringToken::Glyph(0x0041),
            StringToken::Glyph(0x1F42),
            StringToken::tag("newline", vec![]),
            StringToken::tag("voice", vec![ExpressionNode::Number(0x1234)]),
        ];

        let mut out = Vec::new();
        encoding.encode(&mut out, &tokens).unwrap();

        let mut reader = ByteReader::new(&out);
        let decoded = encoding.decode(&mut reader).unwrap();
        assert_eq!(decoded, tokens);
        assert!(reader.at_end());
    }

    #[test]
    fn test_wire_layout() {
        let encoding = encoding();
        let tokens = vec![
            StringToken::Glyph(0x0141),
            StringToken::tag("voice", vec![ExpressionNode::Number(0x1234)]),
        ];

        let mut out = Vec::new();
        encoding.encode(&mut out, &tokens).unwrap();
        // glyph: 0x80 | high byte, low byte; voice operand is big-endian
        assert_eq!(out, [0x81, 0x41, 0x09, 0x12, 0x34, 0xFF]);
    }

    #[test]
    fn test_unknown_tag_opcode() {
        let encoding = encoding();
        let mut reader = ByteReader::new(&[0x7E, 0xFF]);
        assert!(matches!(
            encoding.decode(&mut reader),
            Err(StringError::UnknownTagOpcode(0x7E, 0))
        ));
    }

    #[test]
    fn test_missing_terminator() {
        let encoding = encoding();
        let mut reader = ByteReader::new(&[0x80, 0x41]);
        assert!(matches!(
            encoding.decode(&mut reader),
            Err(StringError::UnexpectedEnd(_))
        ));
    }

    #[test]
    fn test_chunk_must_be_compiled_first() {
        let encoding = encoding();
        let tokens = vec![StringToken::Chunk {
            text: "A".to_string(),
            italic: false,
        }];
        let mut out = Vec::new();
        assert!(matches!(
            encoding.encode(&mut out, &tokens),
            Err(StringError::UncompiledChunk)
        ));
    }

    #[test]
    fn test_u32_units() {
        let tags = StringTagsSpec::new(vec![]).unwrap();
        let encoding = CompiledStringEncoding::new(UnitWidth::U32, tags);
        let tokens = vec![StringToken::Glyph(0x01020304)];

        let mut out = Vec::new();
        encoding.encode(&mut out, &tokens).unwrap();
        assert_eq!(out, [0x81, 0x02, 0x03, 0x04, 0xFF]);

        let mut reader = ByteReader::new(&out);
        assert_eq!(encoding.decode(&mut reader).unwrap(), tokens);
    }
}
