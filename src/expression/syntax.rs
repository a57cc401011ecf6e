use std::fmt::Write;

use crate::text_stream::{ParseError, TextStream};

use super::{ExpressionNode, Operation, OperatorKind};

pub fn format_expression(out: &mut String, expression: &ExpressionNode) {
    format_inner(out, expression);
}

pub fn parse_expression(stream: &mut TextStream) -> Result<ExpressionNode, ParseError> {
    parse_assign(stream)
}

fn format_parentheses(out: &mut String, expression: &ExpressionNode) {
    out.push('(');
    format_inner(out, expression);
    out.push(')');
}

fn format_brackets(out: &mut String, expression: &ExpressionNode) {
    out.push('[');
    format_inner(out, expression);
    out.push(']');
}

fn format_operand(out: &mut String, expression: &ExpressionNode, external_precedence: i32) {
    match expression {
        ExpressionNode::Operation(operation) if operation.kind.spec().precedence < external_precedence => {
            format_parentheses(out, expression);
        }
        _ => format_inner(out, expression),
    }
}

fn format_inner(out: &mut String, expression: &ExpressionNode) {
    match expression {
        ExpressionNode::Number(value) => {
            write!(out, "{value}").unwrap();
        }
        ExpressionNode::Identifier(name) => {
            out.push_str(name);
        }
        ExpressionNode::Str(value) => {
            format_string_literal(out, value);
        }
        ExpressionNode::Operation(operation) => {
            format_operation(out, operation);
        }
        ExpressionNode::Blank => {}
    }
}

fn format_operation(out: &mut String, operation: &Operation) {
    let precedence = operation.kind.spec().precedence;
    for node in &operation.left {
        format_operand(out, node, precedence);
        if !matches!(node, ExpressionNode::Blank) {
            out.push(' ');
        }
    }
    out.push_str(symbol(operation.kind));
    match operation.kind {
        OperatorKind::Not => {
            format_operand(out, &operation.right[0], precedence + 1);
        }
        OperatorKind::FuncWork
        | OperatorKind::FuncFlag
        | OperatorKind::FuncLabel
        | OperatorKind::FuncThread
        | OperatorKind::FuncRandom => {
            format_parentheses(out, &operation.right[0]);
        }
        OperatorKind::FuncMem => {
            format_brackets(out, &operation.right[0]);
            format_parentheses(out, &operation.right[1]);
        }
        _ => {
            for node in &operation.right {
                if !matches!(node, ExpressionNode::Blank) {
                    out.push(' ');
                }
                format_operand(out, node, precedence + 1);
            }
        }
    }
}

fn format_string_literal(out: &mut String, value: &str) {
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out.push('"');
}

fn symbol(kind: OperatorKind) -> &'static str {
    use OperatorKind::*;
    match kind {
        Assign => "=",
        AssignMul => "*=",
        AssignDiv => "/=",
        AssignAdd => "+=",
        AssignSub => "-=",
        AssignMod => "%=",
        AssignLsh => "<<=",
        AssignRsh => ">>=",
        AssignAnd => "&=",
        AssignOr => "|=",
        AssignXor => "^=",
        Incr => "++",
        Decr => "--",

        Eq => "==",
        Ne => "!=",
        Le => "<=",
        Ge => ">=",
        Lt => "<",
        Gt => ">",

        Not => "!",

        Xor => "^",
        Or => "|",
        And => "&",

        Lsh => "<<",
        Rsh => ">>",

        Add => "+",
        Sub => "-",

        Mod => "%",

        Mul => "*",
        Div => "/",

        FuncWork => "$W",
        FuncFlag => "$F",
        FuncMem => "$MR",
        FuncLabel => "$L",
        FuncThread => "$T",
        FuncRandom => "$R",
    }
}

fn parse_assign(stream: &mut TextStream) -> Result<ExpressionNode, ParseError> {
    let mut left = parse_compare(stream)?;
    while let Some(kind) = try_parse_assign_operator(stream) {
        stream.skip_hspace_comments()?;
        let right = match kind {
            OperatorKind::Incr | OperatorKind::Decr => vec![],
            _ => vec![parse_compare(stream)?],
        };
        left = ExpressionNode::Operation(Operation {
            kind,
            left: vec![left],
            right,
        });
    }
    Ok(left)
}

fn try_parse_assign_operator(stream: &mut TextStream) -> Option<OperatorKind> {
    use OperatorKind::*;
    let result = match stream.peek(0) {
        '=' => match stream.peek(1) {
            '=' => None,
            _ => Some(Assign),
        },
        '*' => match stream.peek(1) {
            '=' => Some(AssignMul),
            _ => None,
        },
        '/' => match stream.peek(1) {
            '=' => Some(AssignDiv),
            _ => None,
        },
        '+' => match stream.peek(1) {
            '=' => Some(AssignAdd),
            '+' => Some(Incr),
            _ => None,
        },
        '-' => match stream.peek(1) {
            '=' => Some(AssignSub),
            '-' => match stream.peek(2) {
                '0'..='9' => None,
                _ => Some(Decr),
            },
            _ => None,
        },
        '%' => match stream.peek(1) {
            '=' => Some(AssignMod),
            _ => None,
        },
        '<' => match (stream.peek(1), stream.peek(2)) {
            ('<', '=') => Some(AssignLsh),
            _ => None,
        },
        '>' => match (stream.peek(1), stream.peek(2)) {
            ('>', '=') => Some(AssignRsh),
            _ => None,
        },
        '&' => match stream.peek(1) {
            '=' => Some(AssignAnd),
            _ => None,
        },
        '|' => match stream.peek(1) {
            '=' => Some(AssignOr),
            _ => None,
        },
        '^' => match stream.peek(1) {
            '=' => Some(AssignXor),
            _ => None,
        },
        _ => None,
    };
    match result {
        None => {}
        Some(Assign) => stream.skip(1),
        Some(AssignLsh) | Some(AssignRsh) => stream.skip(3),
        Some(_) => stream.skip(2),
    }
    result
}

fn parse_compare(stream: &mut TextStream) -> Result<ExpressionNode, ParseError> {
    let mut left = parse_not(stream)?;
    while let Some(kind) = try_parse_compare_operator(stream) {
        stream.skip_hspace_comments()?;
        let right = parse_not(stream)?;
        left = ExpressionNode::Operation(Operation {
            kind,
            left: vec![left],
            right: vec![right],
        });
    }
    Ok(left)
}

fn try_parse_compare_operator(stream: &mut TextStream) -> Option<OperatorKind> {
    use OperatorKind::*;
    let result = match stream.peek(0) {
        '=' => match stream.peek(1) {
            '=' => Some(Eq),
            _ => None,
        },
        '!' => match stream.peek(1) {
            '=' => Some(Ne),
            _ => None,
        },
        '<' => match stream.peek(1) {
            '<' => None,
            '=' => Some(Le),
            _ => Some(Lt),
        },
        '>' => match stream.peek(1) {
            '>' => None,
            '=' => Some(Ge),
            _ => Some(Gt),
        },
        _ => None,
    };
    match result {
        None => {}
        Some(Lt) | Some(Gt) => stream.skip(1),
        Some(_) => stream.skip(2),
    }
    result
}

fn parse_not(stream: &mut TextStream) -> Result<ExpressionNode, ParseError> {
    if stream.peek(0) != '!' || stream.peek(1) == '=' {
        return parse_xor(stream);
    }
    stream.skip(1);
    stream.skip_hspace_comments()?;
    let right = parse_not(stream)?;
    Ok(ExpressionNode::Operation(Operation {
        kind: OperatorKind::Not,
        left: vec![],
        right: vec![right],
    }))
}

fn parse_xor(stream: &mut TextStream) -> Result<ExpressionNode, ParseError> {
    let mut left = parse_or(stream)?;
    while stream.peek(0) == '^' && stream.peek(1) != '=' {
        stream.skip(1);
        stream.skip_hspace_comments()?;
        let right = parse_or(stream)?;
        left = ExpressionNode::Operation(Operation {
            kind: OperatorKind::Xor,
            left: vec![left],
            right: vec![right],
        });
    }
    Ok(left)
}

fn parse_or(stream: &mut TextStream) -> Result<ExpressionNode, ParseError> {
    let mut left = parse_and(stream)?;
    while stream.peek(0) == '|' && stream.peek(1) != '=' {
        stream.skip(1);
        stream.skip_hspace_comments()?;
        let right = parse_and(stream)?;
        left = ExpressionNode::Operation(Operation {
            kind: OperatorKind::Or,
            left: vec![left],
            right: vec![right],
        });
    }
    Ok(left)
}

fn parse_and(stream: &mut TextStream) -> Result<ExpressionNode, ParseError> {
    let mut left = parse_shift(stream)?;
    while stream.peek(0) == '&' && stream.peek(1) != '=' {
        stream.skip(1);
        stream.skip_hspace_comments()?;
        let right = parse_shift(stream)?;
        left = ExpressionNode::Operation(Operation {
            kind: OperatorKind::And,
            left: vec![left],
            right: vec![right],
        });
    }
    Ok(left)
}

fn parse_shift(stream: &mut TextStream) -> Result<ExpressionNode, ParseError> {
    let mut left = parse_add_sub(stream)?;
    while let Some(kind) = try_parse_shift_operator(stream) {
        stream.skip_hspace_comments()?;
        let right = parse_add_sub(stream)?;
        left = ExpressionNode::Operation(Operation {
            kind,
            left: vec![left],
            right: vec![right],
        });
    }
    Ok(left)
}

fn try_parse_shift_operator(stream: &mut TextStream) -> Option<OperatorKind> {
    use OperatorKind::*;
    let result = match (stream.peek(0), stream.peek(1), stream.peek(2)) {
        ('<', '<', '=') => None,
        ('<', '<', _) => Some(Lsh),
        ('>', '>', '=') => None,
        ('>', '>', _) => Some(Rsh),
        _ => None,
    };
    if result.is_some() {
        stream.skip(2);
    }
    result
}

fn parse_add_sub(stream: &mut TextStream) -> Result<ExpressionNode, ParseError> {
    let mut left = parse_mod(stream)?;
    while let Some(kind) = try_parse_add_sub_operator(stream) {
        stream.skip_hspace_comments()?;
        let right = parse_mod(stream)?;
        left = ExpressionNode::Operation(Operation {
            kind,
            left: vec![left],
            right: vec![right],
        });
    }
    Ok(left)
}

fn try_parse_add_sub_operator(stream: &mut TextStream) -> Option<OperatorKind> {
    use OperatorKind::*;
    let result = match (stream.peek(0), stream.peek(1)) {
        ('+', '+') | ('+', '=') => None,
        ('+', _) => Some(Add),
        ('-', '-') | ('-', '=') => None,
        ('-', _) => Some(Sub),
        _ => None,
    };
    if result.is_some() {
        stream.skip(1);
    }
    result
}

fn parse_mod(stream: &mut TextStream) -> Result<ExpressionNode, ParseError> {
    let mut left = parse_mul_div(stream)?;
    while stream.peek(0) == '%' && stream.peek(1) != '=' {
        stream.skip(1);
        stream.skip_hspace_comments()?;
        let right = parse_mul_div(stream)?;
        left = ExpressionNode::Operation(Operation {
            kind: OperatorKind::Mod,
            left: vec![left],
            right: vec![right],
        });
    }
    Ok(left)
}

fn parse_mul_div(stream: &mut TextStream) -> Result<ExpressionNode, ParseError> {
    let mut left = parse_atom(stream)?;
    while let Some(kind) = try_parse_mul_div_operator(stream) {
        stream.skip_hspace_comments()?;
        let right = parse_atom(stream)?;
        left = ExpressionNode::Operation(Operation {
            kind,
            left: vec![left],
            right: vec![right],
        });
    }
    Ok(left)
}

fn try_parse_mul_div_operator(stream: &mut TextStream) -> Option<OperatorKind> {
    use OperatorKind::*;
    let result = match (stream.peek(0), stream.peek(1)) {
        ('*', '=') => None,
        ('*', _) => Some(Mul),
        ('/', '=') => None,
        ('/', _) => Some(Div),
        _ => None,
    };
    if result.is_some() {
        stream.skip(1);
    }
    result
}

fn parse_atom(stream: &mut TextStream) -> Result<ExpressionNode, ParseError> {
    let result;
    if stream.peek(0) == '(' {
        result = parse_parentheses(stream)?;
    } else if detect_number(stream) {
        result = parse_number(stream)?;
    } else if is_identifier_start(stream.peek(0)) {
        result = parse_identifier(stream)?;
    } else if stream.peek(0) == '"' {
        result = parse_string_literal(stream)?;
    } else if stream.peek(0) == '$' {
        let kind = parse_func_operator(stream)?;
        let mut operands = Vec::new();
        match kind {
            OperatorKind::FuncMem => {
                if stream.peek(0) != '[' {
                    return Err(stream.error("expected '['"));
                }
                operands.push(parse_brackets(stream)?);
                if stream.peek(0) != '(' {
                    return Err(stream.error("expected '('"));
                }
                operands.push(parse_parentheses(stream)?);
            }
            _ => {
                if stream.peek(0) != '(' {
                    return Err(stream.error("expected '('"));
                }
                operands.push(parse_parentheses(stream)?);
            }
        }
        result = ExpressionNode::Operation(Operation {
            kind,
            left: vec![],
            right: operands,
        });
    } else {
        return Err(stream.error(
            "expected parenthesis, a number, an identifier, a string, a function or an unary operator",
        ));
    }
    stream.skip_hspace_comments()?;
    Ok(result)
}

fn parse_func_operator(stream: &mut TextStream) -> Result<OperatorKind, ParseError> {
    debug_assert_eq!(stream.peek(0), '$');
    let start = stream.tell();
    stream.skip(1);
    let mut name = String::from("$");
    while stream.peek(0).is_ascii_uppercase() {
        name.push(stream.next()?);
    }
    let kind = match name.as_str() {
        "$W" => Some(OperatorKind::FuncWork),
        "$F" => Some(OperatorKind::FuncFlag),
        "$MR" => Some(OperatorKind::FuncMem),
        "$L" => Some(OperatorKind::FuncLabel),
        "$T" => Some(OperatorKind::FuncThread),
        "$R" => Some(OperatorKind::FuncRandom),
        _ => None,
    };
    match kind {
        Some(kind) => Ok(kind),
        None => {
            let error = stream.error(format!("unrecognized function: {name}"));
            stream.seek(start);
            Err(error)
        }
    }
}

fn parse_identifier(stream: &mut TextStream) -> Result<ExpressionNode, ParseError> {
    debug_assert!(is_identifier_start(stream.peek(0)));
    let mut name = String::new();
    while is_identifier_part(stream.peek(0)) {
        name.push(stream.next()?);
    }
    Ok(ExpressionNode::Identifier(name))
}

fn parse_string_literal(stream: &mut TextStream) -> Result<ExpressionNode, ParseError> {
    debug_assert_eq!(stream.peek(0), '"');
    stream.skip(1);
    let mut value = String::new();
    loop {
        if !stream.has(0) || stream.peek(0) == '\n' {
            return Err(stream.error("unterminated string literal"));
        }
        let ch = stream.next()?;
        match ch {
            '"' => break,
            '\\' => {
                let escaped = stream.next()?;
                match escaped {
                    'n' => value.push('\n'),
                    'r' => value.push('\r'),
                    't' => value.push('\t'),
                    _ => value.push(escaped),
                }
            }
            _ => value.push(ch),
        }
    }
    Ok(ExpressionNode::Str(value))
}

fn parse_parentheses(stream: &mut TextStream) -> Result<ExpressionNode, ParseError> {
    debug_assert_eq!(stream.peek(0), '(');
    stream.skip(1);
    stream.skip_hspace_comments()?;
    let result = parse_assign(stream)?;
    if !stream.try_skip(')') {
        return Err(stream.error("expected ')'"));
    }
    Ok(result)
}

fn parse_brackets(stream: &mut TextStream) -> Result<ExpressionNode, ParseError> {
    debug_assert_eq!(stream.peek(0), '[');
    stream.skip(1);
    stream.skip_hspace_comments()?;
    let result = parse_assign(stream)?;
    if !stream.try_skip(']') {
        return Err(stream.error("expected ']'"));
    }
    Ok(result)
}

fn parse_number(stream: &mut TextStream) -> Result<ExpressionNode, ParseError> {
    debug_assert!(detect_number(stream));
    let sign = stream.try_skip('-');
    let value = if stream.try_skip_str("0x") || stream.try_skip_str("0X") {
        parse_hex(stream)?
    } else {
        parse_decimal(stream)?
    };
    stream.skip_hspace_comments()?;
    let value = if sign { 0u32.wrapping_sub(value) } else { value };
    Ok(ExpressionNode::Number(value as i32))
}

fn parse_hex(stream: &mut TextStream) -> Result<u32, ParseError> {
    let mut result: u32 = 0;
    let mut success = false;
    loop {
        let ch = stream.peek(0);
        let digit = match ch {
            '0'..='9' => ch as u32 - '0' as u32,
            'A'..='F' => 0xA + (ch as u32 - 'A' as u32),
            'a'..='f' => 0xA + (ch as u32 - 'a' as u32),
            _ => break,
        };
        stream.skip(1);
        success = true;
        result = result.wrapping_mul(0x10).wrapping_add(digit);
    }
    if !success {
        return Err(stream.error("expected a hex digit"));
    }
    Ok(result)
}

fn parse_decimal(stream: &mut TextStream) -> Result<u32, ParseError> {
    let mut result: u32 = 0;
    let mut success = false;
    while let digit @ '0'..='9' = stream.peek(0) {
        stream.skip(1);
        success = true;
        result = result.wrapping_mul(10).wrapping_add(digit as u32 - '0' as u32);
    }
    if !success {
        return Err(stream.error("expected a decimal digit or \"0x\""));
    }
    Ok(result)
}

fn detect_number(stream: &TextStream) -> bool {
    let ch = stream.peek(0);
    if ch.is_ascii_digit() {
        return true;
    }
    if ch != '-' {
        return false;
    }
    stream.peek(1).is_ascii_digit()
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_identifier_part(ch: char) -> bool {
    is_identifier_start(ch) || ch.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ExpressionNode {
        let mut stream = TextStream::new(text);
        parse_expression(&mut stream).unwrap()
    }

    fn format(expression: &ExpressionNode) -> String {
        let mut out = String::new();
        format_expression(&mut out, expression);
        out
    }

    #[test]
    fn test_precedence() {
        let tree = parse("1 + 2 * 3");
        assert_eq!(format(&tree), "1 + 2 * 3");
        match &tree {
            ExpressionNode::Operation(op) => assert_eq!(op.kind, OperatorKind::Add),
            _ => panic!("expected operation"),
        }
    }

    #[test]
    fn test_parentheses_survive() {
        let tree = parse("(1 + 2) * 3");
        assert_eq!(format(&tree), "(1 + 2) * 3");
    }

    #[test]
    fn test_format_parse_identity() {
        let sources = [
            "$W(0) = 1",
            "$W(10) += $F(2) * 3",
            "$MR[2](100 + $W(3))",
            "!($F(1) == 0)",
            "$W(0) ++",
            "$W(1) --",
            "1 << 4 | 2 & 3",
            "-5 % 3",
            "$L(12)",
            "$T(0) != $R(100)",
            "$W(0) <<= 2",
        ];
        for source in sources {
            let tree = parse(source);
            assert_eq!(format(&tree), source, "source {source}");
            assert_eq!(parse(&format(&tree)), tree);
        }
    }

    #[test]
    fn test_hex_and_negative_numbers() {
        assert_eq!(parse("0x10"), ExpressionNode::Number(16));
        assert_eq!(parse("-0x10"), ExpressionNode::Number(-16));
        assert_eq!(parse("-12"), ExpressionNode::Number(-12));
        assert_eq!(parse("0xFFFFFFFF"), ExpressionNode::Number(-1));
    }

    #[test]
    fn test_decrement_vs_negative_literal() {
        // `- -3` must stay a subtraction of a negative literal, not a decrement
        let tree = parse("$W(0) = 1 - -3");
        let formatted = format(&tree);
        assert_eq!(formatted, "$W(0) = 1 - -3");
    }

    #[test]
    fn test_string_literal() {
        let tree = parse("\"ab\\\"c\"");
        assert_eq!(tree, ExpressionNode::Str("ab\"c".to_string()));
        assert_eq!(format(&tree), "\"ab\\\"c\"");
    }

    #[test]
    fn test_unknown_function_rewinds() {
        let mut stream = TextStream::new("$Q(1)");
        assert!(parse_expression(&mut stream).is_err());
        assert_eq!(stream.tell().offset, 0);
    }

    #[test]
    fn test_blank_formats_to_nothing() {
        let tree = ExpressionNode::Operation(Operation {
            kind: OperatorKind::Add,
            left: vec![ExpressionNode::Blank],
            right: vec![ExpressionNode::Number(2)],
        });
        assert_eq!(format(&tree), "+ 2");
    }
}
