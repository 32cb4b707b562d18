use strum::Display;

use super::lexer::TokenKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum UnaryOperator {
    /// -x
    #[strum(serialize = "-")]
    Negate,
    /// ~x
    #[strum(serialize = "~")]
    BitwiseNot,
    /// !x
    #[strum(serialize = "!")]
    LogicalNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BinaryOperator {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "%")]
    Modulo,
    #[strum(serialize = "&")]
    BitwiseAnd,
    #[strum(serialize = "|")]
    BitwiseOr,
    #[strum(serialize = "^")]
    BitwiseXor,
    #[strum(serialize = "<<")]
    ShiftLeft,
    #[strum(serialize = ">>")]
    ShiftRight,
    #[strum(serialize = "&&")]
    LogicalAnd,
    #[strum(serialize = "||")]
    LogicalOr,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = "<=")]
    LessEqual,
    #[strum(serialize = ">=")]
    GreaterEqual,
    #[strum(serialize = "==")]
    Equal,
    #[strum(serialize = "!=")]
    NotEqual,
}

/// Precedence of the conditional operator, below every binary operator
pub const TERNARY_PRECEDENCE: u32 = 1;

impl BinaryOperator {
    pub fn from_token(kind: TokenKind) -> Option<Self> {
        Some(match kind {
            TokenKind::Plus => Self::Add,
            TokenKind::Minus => Self::Subtract,
            TokenKind::Asterisk => Self::Multiply,
            TokenKind::Divide => Self::Divide,
            TokenKind::Modulus => Self::Modulo,
            TokenKind::BitwiseAnd => Self::BitwiseAnd,
            TokenKind::BitwiseOr => Self::BitwiseOr,
            TokenKind::BitwiseXor => Self::BitwiseXor,
            TokenKind::ShiftLeft => Self::ShiftLeft,
            TokenKind::ShiftRight => Self::ShiftRight,
            TokenKind::LogicalAnd => Self::LogicalAnd,
            TokenKind::LogicalOr => Self::LogicalOr,
            TokenKind::LessThan => Self::Less,
            TokenKind::GreaterThan => Self::Greater,
            TokenKind::LessThanOrEqualTo => Self::LessEqual,
            TokenKind::GreaterThanOrEqualTo => Self::GreaterEqual,
            TokenKind::DoubleEquals => Self::Equal,
            TokenKind::NotEquals => Self::NotEqual,
            _ => return None,
        })
    }

    pub fn precedence(self) -> u32 {
        match self {
            Self::LogicalOr => 2,
            Self::LogicalAnd => 3,
            Self::BitwiseOr => 4,
            Self::BitwiseXor => 5,
            Self::BitwiseAnd => 6,
            Self::Equal | Self::NotEqual => 7,
            Self::Less | Self::Greater | Self::LessEqual | Self::GreaterEqual => 8,
            Self::ShiftLeft | Self::ShiftRight => 9,
            Self::Add | Self::Subtract => 10,
            Self::Multiply | Self::Divide | Self::Modulo => 11,
        }
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Self::LogicalAnd | Self::LogicalOr)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, Self::Equal | Self::NotEqual)
    }

    pub fn is_relational(self) -> bool {
        matches!(
            self,
            Self::Less | Self::Greater | Self::LessEqual | Self::GreaterEqual
        )
    }

    /// Operators which produce a boolean result
    pub fn is_comparison(self) -> bool {
        self.is_equality() || self.is_relational()
    }

    /// Operators which require integral operands
    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            Self::BitwiseAnd
                | Self::BitwiseOr
                | Self::BitwiseXor
                | Self::ShiftLeft
                | Self::ShiftRight
        )
    }
}

/// Maps an assignment token to the operator it combines with, `None` for a
/// plain `=`.
pub fn assignment_operator(kind: TokenKind) -> Option<Option<BinaryOperator>> {
    Some(match kind {
        TokenKind::Equals => None,
        TokenKind::PlusEquals => Some(BinaryOperator::Add),
        TokenKind::MinusEquals => Some(BinaryOperator::Subtract),
        TokenKind::MultiplyEquals => Some(BinaryOperator::Multiply),
        TokenKind::DivideEquals => Some(BinaryOperator::Divide),
        TokenKind::ModulusEquals => Some(BinaryOperator::Modulo),
        TokenKind::BitwiseAndEquals => Some(BinaryOperator::BitwiseAnd),
        TokenKind::BitwiseOrEquals => Some(BinaryOperator::BitwiseOr),
        TokenKind::BitwiseXorEquals => Some(BinaryOperator::BitwiseXor),
        TokenKind::ShiftLeftEquals => Some(BinaryOperator::ShiftLeft),
        TokenKind::ShiftRightEquals => Some(BinaryOperator::ShiftRight),
        _ => return None,
    })
}
