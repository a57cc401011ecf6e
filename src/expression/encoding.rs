use thiserror::Error;

use crate::reader::{ByteReader, UnexpectedEnd};

use super::{ExpressionNode, Operation, OperatorKind};

#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error("unexpected end of data")]
    UnexpectedEnd(#[from] UnexpectedEnd),

    #[error("inefficiently encoded integer at {0}")]
    NonCanonicalInteger(usize),

    #[error("unrecognized operator opcode {0:#04X} at {1}")]
    UnknownOperator(u8, usize),

    #[error("token stream does not form a single expression")]
    Malformed,

    #[error("expression node cannot be encoded")]
    Unencodable,
}

/// One token of the flat calc-expression wire form.
///
/// Priorities are kept as full integers here; serialization truncates them
/// to one byte, so trees nested deeply enough to push a priority past 255
/// wrap on the wire and do not survive a round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExpressionToken {
    Literal { value: i32, priority: i32 },
    Operator { opcode: u8, priority: i32 },
}

impl ExpressionToken {
    fn is_lower_than(&self, min_priority: i32) -> bool {
        match self {
            ExpressionToken::Literal { .. } => false,
            ExpressionToken::Operator { priority, .. } => *priority < min_priority,
        }
    }
}

pub fn encode_expression(out: &mut Vec<u8>, expression: &ExpressionNode) -> Result<(), ExpressionError> {
    let mut tokens = Vec::new();
    encode_node(&mut tokens, expression, 0)?;
    encode_tokens(out, &tokens);
    Ok(())
}

pub fn decode_expression(reader: &mut ByteReader) -> Result<ExpressionNode, ExpressionError> {
    let tokens = decode_tokens(reader)?;
    let mut decoder = ExpressionDecoder { tokens, offset: 0 };
    let mut result = decoder.decode_expressions(0);
    if result.len() != 1 {
        return Err(ExpressionError::Malformed);
    }
    Ok(result.remove(0))
}

fn encode_node(tokens: &mut Vec<ExpressionToken>, node: &ExpressionNode, priority: i32) -> Result<(), ExpressionError> {
    match node {
        ExpressionNode::Number(value) => {
            tokens.push(ExpressionToken::Literal {
                value: *value,
                priority,
            });
            Ok(())
        }
        ExpressionNode::Operation(operation) => encode_operation(tokens, operation, priority),
        _ => Err(ExpressionError::Unencodable),
    }
}

fn encode_operation(tokens: &mut Vec<ExpressionToken>, operation: &Operation, priority: i32) -> Result<(), ExpressionError> {
    let spec = operation.kind.spec();
    for node in &operation.left {
        encode_node(tokens, node, priority + 20)?;
    }
    tokens.push(ExpressionToken::Operator {
        opcode: spec.opcode,
        priority: priority + spec.precedence,
    });
    for node in &operation.right {
        encode_node(tokens, node, priority + 20)?;
    }
    Ok(())
}

fn encode_tokens(out: &mut Vec<u8>, tokens: &[ExpressionToken]) {
    for token in tokens {
        match *token {
            ExpressionToken::Operator { opcode, priority } => {
                out.push(opcode);
                out.push(priority as u8);
            }
            ExpressionToken::Literal { value, priority } => {
                encode_var_int(out, value);
                out.push(priority as u8);
            }
        }
    }
    out.push(0x00);
}

fn decode_tokens(reader: &mut ByteReader) -> Result<Vec<ExpressionToken>, ExpressionError> {
    let mut tokens = Vec::new();
    loop {
        let head = reader.peek_u8()?;
        if head == 0x00 {
            reader.read_u8()?;
            break;
        }
        if head & 0x80 == 0 {
            let position = reader.position();
            let opcode = reader.read_u8()?;
            let priority = reader.read_u8()? as i32;
            if OperatorKind::from_opcode(opcode).is_none() {
                return Err(ExpressionError::UnknownOperator(opcode, position));
            }
            tokens.push(ExpressionToken::Operator { opcode, priority });
        } else {
            let value = decode_var_int(reader)?;
            let priority = reader.read_u8()? as i32;
            tokens.push(ExpressionToken::Literal { value, priority });
        }
    }
    Ok(tokens)
}

/// Writes `value` in the canonical 1/2/3/5-byte form, tag in the top three
/// bits of the first byte.
fn encode_var_int(out: &mut Vec<u8>, value: i32) {
    if !(-0x100000..0x100000).contains(&value) {
        out.push(0xE0);
        out.push(value as u8);
        out.push((value >> 8) as u8);
        out.push((value >> 16) as u8);
        out.push((value >> 24) as u8);
    } else if !(-0x1000..0x1000).contains(&value) {
        out.push(0xC0 | ((value >> 16) & 0x1F) as u8);
        out.push(value as u8);
        out.push((value >> 8) as u8);
    } else if !(-0x10..0x10).contains(&value) {
        out.push(0xA0 | ((value >> 8) & 0x1F) as u8);
        out.push(value as u8);
    } else {
        out.push(0x80 | (value & 0x1F) as u8);
    }
}

/// Rejects any form that would have fit a smaller tag, so every integer has
/// exactly one valid encoding.
fn decode_var_int(reader: &mut ByteReader) -> Result<i32, ExpressionError> {
    let start = reader.position();
    let head = reader.read_u8()?;
    if head & 0x60 == 0x60 {
        let mut value = reader.read_u8()? as i32;
        value |= (reader.read_u8()? as i32) << 8;
        value |= (reader.read_u8()? as i32) << 16;
        value |= (reader.read_u8()? as i32) << 24;
        if head & 0x1F != 0 {
            return Err(ExpressionError::NonCanonicalInteger(start));
        }
        if (-0x100000..0x100000).contains(&value) {
            return Err(ExpressionError::NonCanonicalInteger(start));
        }
        Ok(value)
    } else if head & 0x40 == 0x40 {
        let mut value = ((head & 0x1F) as i32) << 16;
        value |= reader.read_u8()? as i32;
        value |= (reader.read_u8()? as i32) << 8;
        let value = sign_extend(value, 21);
        if (-0x1000..0x1000).contains(&value) {
            return Err(ExpressionError::NonCanonicalInteger(start));
        }
        Ok(value)
    } else if head & 0x20 == 0x20 {
        let mut value = ((head & 0x1F) as i32) << 8;
        value |= reader.read_u8()? as i32;
        let value = sign_extend(value, 13);
        if (-0x10..0x10).contains(&value) {
            return Err(ExpressionError::NonCanonicalInteger(start));
        }
        Ok(value)
    } else {
        Ok(sign_extend((head & 0x1F) as i32, 5))
    }
}

fn sign_extend(value: i32, length: u32) -> i32 {
    let shift = 32 - length;
    (value << shift) >> shift
}

struct ExpressionDecoder {
    tokens: Vec<ExpressionToken>,
    offset: usize,
}

impl ExpressionDecoder {
    /// Consumes tokens until one carries a priority below `min_priority`,
    /// folding operators over a working stack. The recursive call gathers
    /// the operator's right-hand sub-stream; whatever it yields beyond the
    /// declared right arity is a sibling expression and goes back on the
    /// stack.
    fn decode_expressions(&mut self, min_priority: i32) -> Vec<ExpressionNode> {
        let mut stack: Vec<ExpressionNode> = Vec::new();
        while self.offset < self.tokens.len() {
            let token = self.tokens[self.offset];
            if token.is_lower_than(min_priority) {
                break;
            }
            self.offset += 1;
            match token {
                ExpressionToken::Operator { opcode, priority } => {
                    // opcodes were validated while tokenizing
                    let spec = OperatorKind::from_opcode(opcode).unwrap().spec();

                    let mut left = Vec::with_capacity(spec.left);
                    for _ in 0..spec.left {
                        left.push(stack.pop().unwrap_or(ExpressionNode::Blank));
                    }

                    let mut extra = self.decode_expressions(priority + 1);

                    let mut right = Vec::with_capacity(spec.right);
                    for _ in 0..spec.right {
                        if extra.is_empty() {
                            right.push(ExpressionNode::Blank);
                        } else {
                            right.push(extra.remove(0));
                        }
                    }

                    stack.push(ExpressionNode::Operation(Operation {
                        kind: spec.kind,
                        left,
                        right,
                    }));
                    stack.append(&mut extra);
                }
                ExpressionToken::Literal { value, .. } => {
                    stack.push(ExpressionNode::Number(value));
                }
            }
        }
        stack
    }
}
