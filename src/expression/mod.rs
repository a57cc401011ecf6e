pub mod encoding;
pub mod syntax;

pub use encoding::{decode_expression, encode_expression, ExpressionError};

/// A calc-expression tree.
///
/// `Blank` stands in for an operand the token stream did not supply; the
/// formatter renders it as nothing and the binary encoder rejects it.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ExpressionNode {
    Number(i32),
    Identifier(String),
    Str(String),
    Operation(Operation),
    Blank,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Operation {
    pub kind: OperatorKind,
    pub left: Vec<ExpressionNode>,
    pub right: Vec<ExpressionNode>,
}

impl ExpressionNode {
    pub fn operation(kind: OperatorKind, left: Vec<ExpressionNode>, right: Vec<ExpressionNode>) -> Self {
        let spec = kind.spec();
        debug_assert_eq!(left.len(), spec.left);
        debug_assert_eq!(right.len(), spec.right);
        ExpressionNode::Operation(Operation { kind, left, right })
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            ExpressionNode::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ExpressionNode::Str(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum OperatorKind {
    Mul,
    Div,
    Add,
    Sub,
    Mod,
    Lsh,
    Rsh,
    And,
    Xor,
    Or,
    Not,
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    Assign,
    AssignMul,
    AssignDiv,
    AssignAdd,
    AssignSub,
    AssignMod,
    AssignLsh,
    AssignRsh,
    AssignAnd,
    AssignOr,
    AssignXor,
    Incr,
    Decr,
    FuncWork,
    FuncFlag,
    FuncMem,
    FuncLabel,
    FuncThread,
    FuncRandom,
}

/// Wire and precedence data for one operator kind.
#[derive(Debug, Clone, Copy)]
pub struct OperatorSpec {
    pub kind: OperatorKind,
    pub opcode: u8,
    pub precedence: i32,
    pub left: usize,
    pub right: usize,
}

const fn spec(kind: OperatorKind, opcode: u8, precedence: i32, left: usize, right: usize) -> OperatorSpec {
    OperatorSpec {
        kind,
        opcode,
        precedence,
        left,
        right,
    }
}

impl OperatorKind {
    pub fn spec(self) -> OperatorSpec {
        use OperatorKind::*;
        match self {
            Mul => spec(Mul, 1, 9, 1, 1),
            Div => spec(Div, 2, 9, 1, 1),
            Add => spec(Add, 3, 7, 1, 1),
            Sub => spec(Sub, 4, 7, 1, 1),
            Mod => spec(Mod, 5, 8, 1, 1),
            Lsh => spec(Lsh, 6, 6, 1, 1),
            Rsh => spec(Rsh, 7, 6, 1, 1),
            And => spec(And, 8, 5, 1, 1),
            Xor => spec(Xor, 9, 3, 1, 1),
            Or => spec(Or, 10, 4, 1, 1),
            Not => spec(Not, 11, 2, 0, 1),
            Eq => spec(Eq, 12, 1, 1, 1),
            Ne => spec(Ne, 13, 1, 1, 1),
            Le => spec(Le, 14, 1, 1, 1),
            Ge => spec(Ge, 15, 1, 1, 1),
            Lt => spec(Lt, 16, 1, 1, 1),
            Gt => spec(Gt, 17, 1, 1, 1),
            Assign => spec(Assign, 20, 0, 1, 1),
            AssignMul => spec(AssignMul, 21, 0, 1, 1),
            AssignDiv => spec(AssignDiv, 22, 0, 1, 1),
            AssignAdd => spec(AssignAdd, 23, 0, 1, 1),
            AssignSub => spec(AssignSub, 24, 0, 1, 1),
            AssignMod => spec(AssignMod, 25, 0, 1, 1),
            AssignLsh => spec(AssignLsh, 26, 0, 1, 1),
            AssignRsh => spec(AssignRsh, 27, 0, 1, 1),
            AssignAnd => spec(AssignAnd, 28, 0, 1, 1),
            AssignOr => spec(AssignOr, 29, 0, 1, 1),
            AssignXor => spec(AssignXor, 30, 0, 1, 1),
            Incr => spec(Incr, 32, 0, 1, 0),
            Decr => spec(Decr, 33, 0, 1, 0),
            FuncWork => spec(FuncWork, 40, 10, 0, 1),
            FuncFlag => spec(FuncFlag, 41, 10, 0, 1),
            FuncMem => spec(FuncMem, 42, 10, 0, 2),
            FuncLabel => spec(FuncLabel, 43, 10, 0, 1),
            FuncThread => spec(FuncThread, 45, 10, 0, 1),
            FuncRandom => spec(FuncRandom, 51, 10, 0, 1),
        }
    }

    pub fn from_opcode(opcode: u8) -> Option<OperatorKind> {
        use OperatorKind::*;
        let kind = match opcode {
            1 => Mul,
            2 => Div,
            3 => Add,
            4 => Sub,
            5 => Mod,
            6 => Lsh,
            7 => Rsh,
            8 => And,
            9 => Xor,
            10 => Or,
            11 => Not,
            12 => Eq,
            13 => Ne,
            14 => Le,
            15 => Ge,
            16 => Lt,
            17 => Gt,
            20 => Assign,
            21 => AssignMul,
            22 => AssignDiv,
            23 => AssignAdd,
            24 => AssignSub,
            25 => AssignMod,
            26 => AssignLsh,
            27 => AssignRsh,
            28 => AssignAnd,
            29 => AssignOr,
            30 => AssignXor,
            32 => Incr,
            33 => Decr,
            40 => FuncWork,
            41 => FuncFlag,
            42 => FuncMem,
            43 => FuncLabel,
            45 => FuncThread,
            51 => FuncRandom,
            _ => return None,
        };
        Some(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_lookup_is_consistent() {
        for opcode in 0..=0x7F {
            if let Some(kind) = OperatorKind::from_opcode(opcode) {
                assert_eq!(kind.spec().opcode, opcode);
            }
        }
    }

    #[test]
    fn test_unary_arities() {
        assert_eq!(OperatorKind::Not.spec().left, 0);
        assert_eq!(OperatorKind::Incr.spec().right, 0);
        assert_eq!(OperatorKind::FuncMem.spec().right, 2);
    }
}
