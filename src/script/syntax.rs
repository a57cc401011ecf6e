use std::fmt::Write;

use crate::expression::syntax as expression_syntax;
use crate::instruction::Instruction;
use crate::text_stream::{ParseError, TextStream};

use super::PlainScriptElement;

pub fn format_script(elements: &[PlainScriptElement]) -> String {
    let mut formatter = ScriptFormatter::new(None);
    formatter.format(elements, &[]);
    formatter.builder
}

/// Formats the script text together with its debug-map sidecar.
///
/// `instruction_positions` holds the code offset of each instruction
/// element in emission order; every sidecar line is
/// `position, row, text` for one instruction.
pub fn format_script_with_sdb(
    elements: &[PlainScriptElement],
    instruction_positions: &[usize],
) -> (String, String) {
    let mut formatter = ScriptFormatter::new(Some(String::new()));
    formatter.format(elements, instruction_positions);
    let sdb = formatter.sdb_builder.take().unwrap_or_default();
    (formatter.builder, sdb)
}

pub fn parse_script(stream: &mut TextStream) -> Result<Vec<PlainScriptElement>, ParseError> {
    let mut elements = Vec::new();
    stream.skip_space_comments()?;
    while stream.has(0) {
        elements.push(parse_element(stream)?);
        stream.skip_space_comments()?;
    }
    Ok(elements)
}

struct ScriptFormatter {
    builder: String,
    sdb_builder: Option<String>,
    row: usize,
}

impl ScriptFormatter {
    fn new(sdb_builder: Option<String>) -> Self {
        Self {
            builder: String::new(),
            sdb_builder,
            row: 1,
        }
    }

    fn format(&mut self, elements: &[PlainScriptElement], instruction_positions: &[usize]) {
        let mut instruction_index = 0;
        for element in elements {
            self.format_element(element, instruction_positions, &mut instruction_index);
        }
    }

    fn format_element(
        &mut self,
        element: &PlainScriptElement,
        instruction_positions: &[usize],
        instruction_index: &mut usize,
    ) {
        match element {
            PlainScriptElement::Instruction(instruction) => {
                let text = format_instruction(instruction);
                if let Some(sdb) = &mut self.sdb_builder {
                    if let Some(position) = instruction_positions.get(*instruction_index) {
                        write!(sdb, "{position:6},{0:6}, {text}\n", self.row).unwrap();
                    }
                }
                *instruction_index += 1;
                self.append(&format!("\t{text}\n"));
            }
            PlainScriptElement::Label(index) => {
                self.append(&format!("{index}:\n"));
            }
            PlainScriptElement::ReturnLabel(index) => {
                self.append(&format!("*{index}:\n"));
            }
            PlainScriptElement::Error { position, message } => {
                let message = format!("An error has occurred at 0x{position:X}: {message}");
                for line in message.split('\n') {
                    self.append(&format!("// {line}\n"));
                }
            }
            PlainScriptElement::Comment(text) => {
                for line in text.split('\n') {
                    self.append(&format!("// {line}\n"));
                }
            }
            PlainScriptElement::Raw(data) => {
                for (i, byte) in data.iter().enumerate() {
                    if i % 16 == 0 {
                        if i > 0 {
                            self.append("\n");
                        }
                        self.append("\thex ");
                    }
                    self.append(&format!(" {byte:02X}"));
                }
                if !data.is_empty() {
                    self.append("\n");
                }
            }
        }
    }

    fn append(&mut self, text: &str) {
        self.row += text.matches('\n').count();
        self.builder.push_str(text);
    }
}

fn format_instruction(instruction: &Instruction) -> String {
    let mut out = String::new();
    if instruction.name == "Eval" {
        expression_syntax::format_expression(&mut out, &instruction.operands[0]);
        out.push(';');
    } else {
        out.push_str(&instruction.name);
        for (i, operand) in instruction.operands.iter().enumerate() {
            if i != 0 {
                out.push(',');
            }
            out.push(' ');
            expression_syntax::format_expression(&mut out, operand);
        }
    }
    out
}

fn parse_element(stream: &mut TextStream) -> Result<PlainScriptElement, ParseError> {
    let ch = stream.peek(0);
    if is_instruction_name_start(ch) {
        let name = parse_instruction_name(stream)?;
        if name == "hex" {
            Ok(PlainScriptElement::Raw(parse_raw(stream)?))
        } else {
            let operands = parse_operands(stream)?;
            Ok(PlainScriptElement::Instruction(Instruction::new(name, operands)))
        }
    } else if ch.is_ascii_digit() {
        let index = parse_number(stream)?;
        if !stream.try_skip(':') {
            return Err(stream.error("expected ':'"));
        }
        stream.skip_hspace_comments()?;
        if stream.has(0) && !stream.try_skip('\n') {
            return Err(stream.error(format!("unexpected character: {}", stream.peek(0))));
        }
        Ok(PlainScriptElement::Label(index))
    } else if stream.try_skip('*') {
        if !stream.peek(0).is_ascii_digit() {
            return Err(stream.error("expected a number"));
        }
        let index = parse_number(stream)?;
        if !stream.try_skip(':') {
            return Err(stream.error("expected ':'"));
        }
        stream.skip_hspace_comments()?;
        if stream.has(0) && !stream.try_skip('\n') {
            return Err(stream.error(format!("unexpected character: {}", stream.peek(0))));
        }
        Ok(PlainScriptElement::ReturnLabel(index))
    } else if ch == '$' {
        parse_eval_instruction(stream)
    } else {
        Err(stream.error(format!("unexpected character: {ch}")))
    }
}

fn parse_operands(stream: &mut TextStream) -> Result<Vec<crate::expression::ExpressionNode>, ParseError> {
    let mut operands = Vec::new();
    if stream.has(0) && !stream.try_skip('\n') {
        if !stream.skip_hspace_comments()? {
            return Err(stream.error(format!("unexpected character: {}", stream.peek(0))));
        }
        while stream.has(0) && !stream.try_skip('\n') {
            if !operands.is_empty() {
                if !stream.try_skip(',') {
                    return Err(stream.error(format!("unexpected character: {}", stream.peek(0))));
                }
                stream.skip_hspace_comments()?;
            }
            operands.push(expression_syntax::parse_expression(stream)?);
            stream.skip_hspace_comments()?;
        }
    }
    Ok(operands)
}

fn parse_raw(stream: &mut TextStream) -> Result<Vec<u8>, ParseError> {
    let mut data = Vec::new();
    if stream.has(0) && !stream.try_skip('\n') {
        if !stream.skip_hspace_comments()? {
            return Err(stream.error(format!("unexpected character: {}", stream.peek(0))));
        }
        while stream.has(0) && !stream.try_skip('\n') {
            data.push(parse_hex_byte(stream)?);
            stream.skip_hspace_comments()?;
        }
    }
    Ok(data)
}

fn parse_eval_instruction(stream: &mut TextStream) -> Result<PlainScriptElement, ParseError> {
    let expression = expression_syntax::parse_expression(stream)?;
    stream.skip_hspace_comments()?;
    if !stream.try_skip(';') {
        return Err(stream.error("expected ';'"));
    }
    stream.skip_hspace_comments()?;
    if stream.has(0) && !stream.try_skip('\n') {
        return Err(stream.error(format!("unexpected character: {}", stream.peek(0))));
    }
    Ok(PlainScriptElement::Instruction(Instruction::new(
        "Eval",
        vec![expression],
    )))
}

fn parse_instruction_name(stream: &mut TextStream) -> Result<String, ParseError> {
    debug_assert!(is_instruction_name_start(stream.peek(0)));
    let mut name = String::new();
    while is_instruction_name_part(stream.peek(0)) {
        name.push(stream.next()?);
    }
    Ok(name)
}

fn parse_number(stream: &mut TextStream) -> Result<usize, ParseError> {
    debug_assert!(stream.peek(0).is_ascii_digit());
    let mut value: usize = 0;
    while stream.peek(0).is_ascii_digit() {
        let digit = stream.next()? as usize - '0' as usize;
        value = value
            .checked_mul(10)
            .and_then(|value| value.checked_add(digit))
            .ok_or_else(|| stream.error("number out of range"))?;
    }
    Ok(value)
}

fn parse_hex_byte(stream: &mut TextStream) -> Result<u8, ParseError> {
    let high = parse_nibble(stream)?;
    let low = parse_nibble(stream)?;
    Ok((high << 4) | low)
}

fn parse_nibble(stream: &mut TextStream) -> Result<u8, ParseError> {
    let ch = stream.peek(0);
    let value = match ch {
        '0'..='9' => ch as u8 - b'0',
        'A'..='F' => ch as u8 - b'A' + 0xA,
        'a'..='f' => ch as u8 - b'a' + 0xA,
        _ => return Err(stream.error(format!("unexpected character: {ch}"))),
    };
    stream.skip(1);
    Ok(value)
}

fn is_instruction_name_start(ch: char) -> bool {
    ch == '_' || ch.is_ascii_alphabetic()
}

fn is_instruction_name_part(ch: char) -> bool {
    is_instruction_name_start(ch) || ch.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use crate::expression::{ExpressionNode, Operation, OperatorKind};

    use super::*;

    fn parse(text: &str) -> Vec<PlainScriptElement> {
        let mut stream = TextStream::new(text);
        parse_script(&mut stream).unwrap()
    }

    #[test]
    fn test_format_elements() {
        let elements = [
            PlainScriptElement::Label(3),
            PlainScriptElement::Instruction(Instruction::new(
                "Jump",
                vec![ExpressionNode::Number(5)],
            )),
            PlainScriptElement::ReturnLabel(1),
            PlainScriptElement::Comment("note".to_string()),
            PlainScriptElement::Raw(vec![0xAB, 0xCD]),
        ];

        let text = format_script(&elements);
        assert_eq!(text, "3:\n\tJump 5\n*1:\n// note\n\thex  AB CD\n");
    }

    #[test]
    fn test_format_eval_shorthand() {
        let expression = ExpressionNode::Operation(Operation {
            kind: OperatorKind::Assign,
            left: vec![ExpressionNode::Operation(Operation {
                kind: OperatorKind::FuncWork,
                left: vec![],
                right: vec![ExpressionNode::Number(0)],
            })],
            right: vec![ExpressionNode::Number(1)],
        });
        let elements = [PlainScriptElement::Instruction(Instruction::new(
            "Eval",
            vec![expression],
        ))];

        let text = format_script(&elements);
        assert_eq!(text, "\t$W(0) = 1;\n");
    }

    #[test]
    fn test_format_error_element() {
        let elements = [PlainScriptElement::Error {
            position: 0x1F,
            message: "bad opcode".to_string(),
        }];

        let text = format_script(&elements);
        assert_eq!(text, "// An error has occurred at 0x1F: bad opcode\n");
    }

    #[test]
    fn test_raw_wraps_every_16_bytes() {
        let elements = [PlainScriptElement::Raw((0..20).collect())];
        let text = format_script(&elements);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("\thex  00 01"));
        assert!(lines[1].starts_with("\thex  10 11"));
    }

    #[test]
    fn test_parse_round_trip() {
        let source = "0:\n\tJump 5\n*2:\n\tSetFlag 1, -2\n\thex  AB CD\n\t$W(0) = 1;\n";
        let elements = parse(source);

        assert_eq!(elements.len(), 6);
        assert_eq!(elements[0], PlainScriptElement::Label(0));
        assert_eq!(elements[2], PlainScriptElement::ReturnLabel(2));
        assert_eq!(elements[4], PlainScriptElement::Raw(vec![0xAB, 0xCD]));
        match &elements[5] {
            PlainScriptElement::Instruction(instruction) => assert_eq!(instruction.name, "Eval"),
            other => panic!("expected instruction, got {other:?}"),
        }

        assert_eq!(format_script(&elements), source);
    }

    #[test]
    fn test_parse_skips_comments() {
        let source = "// header\n0:\n\t/* inline */ Jump 5\n";
        let elements = parse(source);
        assert_eq!(elements.len(), 2);
    }

    #[test]
    fn test_sdb_rows() {
        let elements = [
            PlainScriptElement::Label(0),
            PlainScriptElement::Instruction(Instruction::new("A", vec![])),
            PlainScriptElement::Instruction(Instruction::new("B", vec![])),
        ];
        let (text, sdb) = format_script_with_sdb(&elements, &[0, 3]);

        assert_eq!(text, "0:\n\tA\n\tB\n");
        let lines: Vec<&str> = sdb.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "     0,     2, A");
        assert_eq!(lines[1], "     3,     3, B");
    }

    #[test]
    fn test_parse_error_position() {
        let mut stream = TextStream::new("0:\n!bad\n");
        let error = parse_script(&mut stream).unwrap_err();
        assert_eq!(error.position.line, 2);
    }
}
