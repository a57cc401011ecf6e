use std::fmt::Write;

use thiserror::Error;

use crate::expression::syntax as expression_syntax;
use crate::text_stream::{ParseError, TextStream};

use super::{StringTableEntry, StringToken};

#[derive(Debug, Error)]
pub enum StringFormatError {
    #[error("cannot stringify a tag with more than one operand: {0}")]
    TooManyOperands(String),
}

pub fn format_string(out: &mut String, tokens: &[StringToken]) -> Result<(), StringFormatError> {
    for token in tokens {
        format_token(out, token)?;
    }
    Ok(())
}

pub fn parse_string(stream: &mut TextStream) -> Result<Vec<StringToken>, ParseError> {
    let mut tokens = Vec::new();
    let mut italic = false;
    while stream.has(0) && stream.peek(0) != '\n' {
        if stream.try_skip('〔') {
            tokens.push(StringToken::tag("nameStart", vec![]));
        } else if stream.try_skip('〕') {
            tokens.push(StringToken::tag("nameEnd", vec![]));
        } else if stream.peek(0) == '\\' {
            if matches!(stream.peek(1), '\\' | '〔' | '〕') {
                stream.skip(1);
                tokens.push(StringToken::Chunk {
                    text: stream.next()?.to_string(),
                    italic,
                });
            } else {
                tokens.push(parse_tag(stream)?);
            }
        } else if stream.try_skip_str("<i>") {
            italic = true;
        } else if stream.try_skip_str("</i>") {
            italic = false;
        } else {
            tokens.push(StringToken::Chunk {
                text: stream.next()?.to_string(),
                italic,
            });
        }
    }
    Ok(tokens)
}

/// `index:tokens`, one entry per line.
pub fn format_string_table(entries: &[StringTableEntry]) -> Result<String, StringFormatError> {
    let mut out = String::new();
    for entry in entries {
        write!(out, "{0}:", entry.index).unwrap();
        format_string(&mut out, &entry.tokens)?;
        out.push('\n');
    }
    Ok(out)
}

pub fn parse_string_table(stream: &mut TextStream) -> Result<Vec<StringTableEntry>, ParseError> {
    let mut entries = Vec::new();
    while stream.has(0) {
        if !stream.peek(0).is_ascii_digit() {
            return Err(stream.error("expected string index"));
        }
        let index = parse_number(stream)?;
        if !stream.try_skip(':') {
            return Err(stream.error("expected ':'"));
        }
        let tokens = parse_string(stream)?;
        if stream.has(0) && !stream.try_skip('\n') {
            return Err(stream.error("expected end of line"));
        }
        entries.push(StringTableEntry::new(index, tokens));
    }
    Ok(entries)
}

fn format_token(out: &mut String, token: &StringToken) -> Result<(), StringFormatError> {
    match token {
        StringToken::Chunk { text, italic } => {
            let mut escaped = String::new();
            for ch in text.chars() {
                if matches!(ch, '\\' | '〔' | '〕') {
                    escaped.push('\\');
                }
                escaped.push(ch);
            }
            if *italic {
                write!(out, "<i>{escaped}</i>").unwrap();
            } else {
                out.push_str(&escaped);
            }
        }
        StringToken::Tag { name, operands } => match name.as_str() {
            "nameStart" => out.push('〔'),
            "nameEnd" => out.push('〕'),
            _ => {
                out.push('\\');
                out.push_str(name);
                if operands.len() > 1 {
                    return Err(StringFormatError::TooManyOperands(name.clone()));
                }
                if let Some(operand) = operands.first() {
                    out.push(':');
                    expression_syntax::format_expression(out, operand);
                }
                out.push(';');
            }
        },
        StringToken::Glyph(value) => {
            write!(out, "\\glyph:0x{value:04X};").unwrap();
        }
    }
    Ok(())
}

fn parse_tag(stream: &mut TextStream) -> Result<StringToken, ParseError> {
    debug_assert_eq!(stream.peek(0), '\\');
    stream.skip(1);

    let mut name = String::new();
    while matches!(stream.peek(0), '0'..='9' | 'A'..='Z' | 'a'..='z' | '_') {
        name.push(stream.next()?);
    }

    let operands = if stream.try_skip(':') {
        let operand = expression_syntax::parse_expression(stream)?;
        if !stream.try_skip(';') {
            return Err(stream.error("expected ';'"));
        }
        vec![operand]
    } else if stream.try_skip(';') {
        vec![]
    } else {
        return Err(stream.error("expected ':' or ';'"));
    };

    if name == "glyph" {
        if operands.len() != 1 {
            return Err(stream.error("expected a single operand"));
        }
        let Some(value) = operands[0].as_int() else {
            return Err(stream.error("expected a number"));
        };
        return Ok(StringToken::Glyph(value));
    }

    Ok(StringToken::tag(name, operands))
}

fn parse_number(stream: &mut TextStream) -> Result<i32, ParseError> {
    debug_assert!(stream.peek(0).is_ascii_digit());
    let mut value: i32 = 0;
    while stream.peek(0).is_ascii_digit() {
        let digit = stream.next()? as i32 - '0' as i32;
        value = value
            .checked_mul(10)
            .and_then(|value| value.checked_add(digit))
            .ok_or_else(|| stream.error("number out of range"))?;
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use crate::expression::ExpressionNode;

    use super::*;

    fn chunk(text: &str, italic: bool) -> StringToken {
        StringToken::Chunk {
            text: text.to_string(),
            italic,
        }
    }

    fn format(tokens: &[StringToken]) -> String {
        let mut out = String::new();
        format_string(&mut out, tokens).unwrap();
        out
    }

    fn parse(text: &str) -> Vec<StringToken> {
        let mut stream = TextStream::new(text);
        parse_string(&mut stream).unwrap()
    }

    #[test]
    fn test_format_basic() {
        let tokens = [
            StringToken::tag("nameStart", vec![]),
            chunk("A", false),
            StringToken::tag("nameEnd", vec![]),
            chunk("B", true),
            StringToken::tag("color", vec![ExpressionNode::Number(2)]),
            StringToken::tag("newline", vec![]),
            StringToken::Glyph(0x1F),
        ];
        assert_eq!(format(&tokens), "〔A〕<i>B</i>\\color:2;\\newline;\\glyph:0x001F;");
    }

    #[test]
    fn test_parse_round_trip() {
        let source = "〔A〕<i>B</i>\\color:2;\\newline;\\glyph:0x001F;\\\\";
        let tokens = parse(source);
        assert_eq!(
            tokens,
            [
                StringToken::tag("nameStart", vec![]),
                chunk("A", false),
                StringToken::tag("nameEnd", vec![]),
                chunk("B", true),
                StringToken::tag("color", vec![ExpressionNode::Number(2)]),
                StringToken::tag("newline", vec![]),
                StringToken::Glyph(0x1F),
                chunk("\\", false),
            ]
        );
        assert_eq!(format(&tokens), source);
    }

    #[test]
    fn test_escaped_brackets_are_text() {
        let tokens = parse("\\〔x\\〕");
        assert_eq!(tokens, [chunk("〔", false), chunk("x", false), chunk("〕", false)]);
    }

    #[test]
    fn test_tag_with_two_operands_cannot_stringify() {
        let tokens = [StringToken::tag(
            "evalBoth",
            vec![ExpressionNode::Number(1), ExpressionNode::Number(2)],
        )];
        let mut out = String::new();
        assert!(matches!(
            format_string(&mut out, &tokens),
            Err(StringFormatError::TooManyOperands(_))
        ));
    }

    #[test]
    fn test_string_table_round_trip() {
        let entries = [
            StringTableEntry::new(0, vec![chunk("H", false), chunk("i", false)]),
            StringTableEntry::new(7, vec![StringToken::tag("newline", vec![])]),
        ];
        let text = format_string_table(&entries).unwrap();
        assert_eq!(text, "0:Hi\n7:\\newline;\n");

        let mut stream = TextStream::new(&text);
        let parsed = parse_string_table(&mut stream).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].index, 0);
        assert_eq!(parsed[0].tokens, [chunk("H", false), chunk("i", false)]);
        assert_eq!(parsed[1].index, 7);
    }

    #[test]
    fn test_string_stops_at_newline() {
        let tokens = parse("ab\ncd");
        assert_eq!(tokens, [chunk("a", false), chunk("b", false)]);
    }
}
