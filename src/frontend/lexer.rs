use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use strum::EnumString;

use crate::{frontend::SourceFile, middle::ty::BaseKind};

/// Pull based token source.
///
/// The lexer only holds a borrowed source and a cursor, so cloning it is the
/// checkpoint mechanism used for speculative parses.
#[derive(Debug, Clone)]
pub struct Lexer<'source> {
    source: &'source SourceFile,
    position: usize,
    line: u32,
    column: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: Location,
    pub span: Span,
    pub literal: Literal,
}

/// 1-based line and column of a token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Literal {
    #[default]
    None,
    Int(i32),
    Uint(u32),
    Float(f32),
    Double(f64),
    String(String),
}

/// A built-in type name such as `float3x3` or `texture`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinType {
    pub base: BaseKind,
    pub rows: u32,
    pub cols: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    EndOfFile,
    Unknown,

    /* Words */
    Keyword(Keyword),  // struct
    Type(BuiltinType), // float4
    Identifier,        // main

    /* Literals */
    IntLiteral,    // 1
    UintLiteral,   // 1u
    FloatLiteral,  // 1.0
    DoubleLiteral, // 1.0l
    StringLiteral, // "hello, world"

    /* Delimiters */
    OpenParen,    // (
    CloseParen,   // )
    OpenBracket,  // [
    CloseBracket, // ]
    OpenBrace,    // {
    CloseBrace,   // }
    Semicolon,    // ;
    Comma,        // ,

    /* Other */
    Dot,         // .
    Colon,       // :
    DoubleColon, // ::
    Question,    // ?

    /* Unary Ops */
    Bang,      // !
    Tilde,     // ~
    Increment, // ++
    Decrement, // --

    /* Binary Ops */
    Plus,                 // +
    Minus,                // -
    Asterisk,             // *
    Divide,               // /
    Modulus,              // %
    LogicalAnd,           // &&
    LogicalOr,            // ||
    BitwiseXor,           // ^
    BitwiseAnd,           // &
    BitwiseOr,            // |
    ShiftLeft,            // <<
    ShiftRight,           // >>
    DoubleEquals,         // ==
    NotEquals,            // !=
    LessThan,             // <
    LessThanOrEqualTo,    // <=
    GreaterThan,          // >
    GreaterThanOrEqualTo, // >=

    /* Assignment */
    Equals,           // =
    PlusEquals,       // +=
    MinusEquals,      // -=
    MultiplyEquals,   // *=
    DivideEquals,     // /=
    ModulusEquals,    // %=
    BitwiseXorEquals, // ^=
    BitwiseAndEquals, // &=
    BitwiseOrEquals,  // |=
    ShiftLeftEquals,  // <<=
    ShiftRightEquals, // >>=
}

impl core::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::EndOfFile => "end of file",
            Self::Unknown => "unknown",
            Self::Keyword(keyword) => return write!(f, "{}", keyword.as_ref()),
            Self::Type(ty) => return write!(f, "{}", builtin_type_name(ty)),
            Self::Identifier => "identifier",
            Self::IntLiteral | Self::UintLiteral => "integral literal",
            Self::FloatLiteral | Self::DoubleLiteral => "floating point literal",
            Self::StringLiteral => "string literal",
            Self::OpenParen => "(",
            Self::CloseParen => ")",
            Self::OpenBracket => "[",
            Self::CloseBracket => "]",
            Self::OpenBrace => "{",
            Self::CloseBrace => "}",
            Self::Semicolon => ";",
            Self::Comma => ",",
            Self::Dot => ".",
            Self::Colon => ":",
            Self::DoubleColon => "::",
            Self::Question => "?",
            Self::Bang => "!",
            Self::Tilde => "~",
            Self::Increment => "++",
            Self::Decrement => "--",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Asterisk => "*",
            Self::Divide => "/",
            Self::Modulus => "%",
            Self::LogicalAnd => "&&",
            Self::LogicalOr => "||",
            Self::BitwiseXor => "^",
            Self::BitwiseAnd => "&",
            Self::BitwiseOr => "|",
            Self::ShiftLeft => "<<",
            Self::ShiftRight => ">>",
            Self::DoubleEquals => "==",
            Self::NotEquals => "!=",
            Self::LessThan => "<",
            Self::LessThanOrEqualTo => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqualTo => ">=",
            Self::Equals => "=",
            Self::PlusEquals => "+=",
            Self::MinusEquals => "-=",
            Self::MultiplyEquals => "*=",
            Self::DivideEquals => "/=",
            Self::ModulusEquals => "%=",
            Self::BitwiseXorEquals => "^=",
            Self::BitwiseAndEquals => "&=",
            Self::BitwiseOrEquals => "|=",
            Self::ShiftLeftEquals => "<<=",
            Self::ShiftRightEquals => ">>=",
        };

        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Keyword {
    If,
    Else,
    Switch,
    Case,
    Default,
    For,
    While,
    Do,
    Break,
    Continue,
    Return,
    Discard,
    Struct,
    Namespace,
    Technique,
    Pass,
    True,
    False,
    Vector,
    Matrix,

    /* Qualifiers */
    Extern,
    Static,
    Uniform,
    Volatile,
    Precise,
    In,
    Out,
    Inout,
    Const,
    Linear,
    Noperspective,
    Centroid,
    Nointerpolation,
}

fn builtin_type_name(ty: &BuiltinType) -> String {
    match (ty.rows, ty.cols) {
        (0, _) | (1, 1) => ty.base.to_string(),
        (rows, 1) => format!("{}{rows}", ty.base),
        (rows, cols) => format!("{}{rows}x{cols}", ty.base),
    }
}

/// Recognizes built-in type names: `float`, `int3`, `bool2x2`, `texture2D`...
fn builtin_type(word: &str) -> Option<BuiltinType> {
    let non_numeric = |base| {
        Some(BuiltinType {
            base,
            rows: 0,
            cols: 0,
        })
    };

    match word {
        "void" => return non_numeric(BaseKind::Void),
        "string" => return non_numeric(BaseKind::String),
        "texture" | "texture2D" => return non_numeric(BaseKind::Texture),
        "sampler" | "sampler2D" => return non_numeric(BaseKind::Sampler),
        _ => {}
    }

    let (base, dimensions) = [
        ("bool", BaseKind::Bool),
        ("int", BaseKind::Int),
        ("uint", BaseKind::Uint),
        ("dword", BaseKind::Uint),
        ("float", BaseKind::Float),
        ("half", BaseKind::Float),
        ("double", BaseKind::Float),
    ]
    .into_iter()
    .find_map(|(prefix, base)| word.strip_prefix(prefix).map(|rest| (base, rest)))?;

    let dimension = |c: u8| (b'1'..=b'4').contains(&c).then(|| (c - b'0') as u32);

    let (rows, cols) = match dimensions.as_bytes() {
        [] => (1, 1),
        [rows] => (dimension(*rows)?, 1),
        [rows, b'x', cols] => (dimension(*rows)?, dimension(*cols)?),
        _ => return None,
    };

    Some(BuiltinType { base, rows, cols })
}

/// Table of single char tokens (matched after longer sequences are checked for)
static SINGLE_TOKENS: Lazy<BTreeMap<u8, TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        (b'(', TokenKind::OpenParen),
        (b')', TokenKind::CloseParen),
        (b'[', TokenKind::OpenBracket),
        (b']', TokenKind::CloseBracket),
        (b'{', TokenKind::OpenBrace),
        (b'}', TokenKind::CloseBrace),
        (b';', TokenKind::Semicolon),
        (b',', TokenKind::Comma),
        (b'.', TokenKind::Dot),
        (b':', TokenKind::Colon),
        (b'?', TokenKind::Question),
        (b'!', TokenKind::Bang),
        (b'~', TokenKind::Tilde),
        (b'+', TokenKind::Plus),
        (b'-', TokenKind::Minus),
        (b'*', TokenKind::Asterisk),
        (b'/', TokenKind::Divide),
        (b'%', TokenKind::Modulus),
        (b'^', TokenKind::BitwiseXor),
        (b'&', TokenKind::BitwiseAnd),
        (b'|', TokenKind::BitwiseOr),
        (b'<', TokenKind::LessThan),
        (b'>', TokenKind::GreaterThan),
        (b'=', TokenKind::Equals),
    ])
});

/// Table of multi char operators, longest first
const MULTI_TOKENS: &[(&str, TokenKind)] = &[
    ("<<=", TokenKind::ShiftLeftEquals),
    (">>=", TokenKind::ShiftRightEquals),
    ("::", TokenKind::DoubleColon),
    ("++", TokenKind::Increment),
    ("--", TokenKind::Decrement),
    ("&&", TokenKind::LogicalAnd),
    ("||", TokenKind::LogicalOr),
    ("<<", TokenKind::ShiftLeft),
    (">>", TokenKind::ShiftRight),
    ("==", TokenKind::DoubleEquals),
    ("!=", TokenKind::NotEquals),
    ("<=", TokenKind::LessThanOrEqualTo),
    (">=", TokenKind::GreaterThanOrEqualTo),
    ("+=", TokenKind::PlusEquals),
    ("-=", TokenKind::MinusEquals),
    ("*=", TokenKind::MultiplyEquals),
    ("/=", TokenKind::DivideEquals),
    ("%=", TokenKind::ModulusEquals),
    ("^=", TokenKind::BitwiseXorEquals),
    ("&=", TokenKind::BitwiseAndEquals),
    ("|=", TokenKind::BitwiseOrEquals),
];

impl<'source> Lexer<'source> {
    pub fn new(source: &'source SourceFile) -> Self {
        Self {
            source,
            position: 0,
            line: 1,
            column: 1,
        }
    }

    fn bytes(&self) -> &'source [u8] {
        self.source.contents.as_bytes()
    }

    fn peek_byte(&self, offset: usize) -> Option<u8> {
        self.bytes().get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_byte(0) {
            self.position += 1;

            if c == b'\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn advance_by(&mut self, count: usize) {
        for _ in 0..count {
            self.advance();
        }
    }

    fn location(&self) -> Location {
        Location {
            line: self.line,
            column: self.column,
        }
    }

    fn ignore_line(&mut self) {
        while let Some(c) = self.peek_byte(0) {
            if c == b'\n' {
                break;
            }

            self.advance();
        }
    }

    fn ignore_block_comment(&mut self) {
        // Consume the opening "/*"
        self.advance_by(2);

        while let Some(c) = self.peek_byte(0) {
            if c == b'*' && self.peek_byte(1) == Some(b'/') {
                self.advance_by(2);
                return;
            }

            self.advance();
        }
    }

    /// Skips whitespace, comments and preprocessor lines
    fn ignore_trivia(&mut self) {
        while let Some(c) = self.peek_byte(0) {
            match c {
                c if c.is_ascii_whitespace() => self.advance(),
                b'/' if self.peek_byte(1) == Some(b'/') => self.ignore_line(),
                b'/' if self.peek_byte(1) == Some(b'*') => self.ignore_block_comment(),
                b'#' => self.ignore_line(),
                _ => break,
            }
        }
    }

    /// Produces the next token. Once the input is exhausted this keeps
    /// returning end of file tokens.
    pub fn lex(&mut self) -> Token {
        self.ignore_trivia();

        let start = self.position;
        let location = self.location();

        let (kind, literal) = match self.peek_byte(0) {
            None => (TokenKind::EndOfFile, Literal::None),
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => (self.read_word(), Literal::None),
            Some(c) if c.is_ascii_digit() => self.read_number(),
            Some(b'.') if self.peek_byte(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.read_number()
            }
            Some(b'"') => self.read_string(),
            Some(c) => (self.read_operator(c), Literal::None),
        };

        Token {
            kind,
            location,
            span: Span {
                start,
                end: self.position,
            },
            literal,
        }
    }

    // Keyword, built-in type or identifier
    fn read_word(&mut self) -> TokenKind {
        let start = self.position;

        while self
            .peek_byte(0)
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
        {
            self.advance();
        }

        let value = &self.source.contents[start..self.position];

        if let Ok(keyword) = value.parse() {
            TokenKind::Keyword(keyword)
        } else if let Some(ty) = builtin_type(value) {
            TokenKind::Type(ty)
        } else {
            TokenKind::Identifier
        }
    }

    fn read_number(&mut self) -> (TokenKind, Literal) {
        let start = self.position;

        if self.peek_byte(0) == Some(b'0') && matches!(self.peek_byte(1), Some(b'x' | b'X')) {
            self.advance_by(2);
            let digits_start = self.position;

            while self.peek_byte(0).is_some_and(|c| c.is_ascii_hexdigit()) {
                self.advance();
            }

            let digits = &self.source.contents[digits_start..self.position];
            let value = u64::from_str_radix(digits, 16).unwrap_or(0) as u32;

            return self.integer_suffix(value);
        }

        let mut is_float = false;

        while self.peek_byte(0).is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        if self.peek_byte(0) == Some(b'.') {
            is_float = true;
            self.advance();

            while self.peek_byte(0).is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        if matches!(self.peek_byte(0), Some(b'e' | b'E')) {
            let sign = usize::from(matches!(self.peek_byte(1), Some(b'+' | b'-')));

            if self.peek_byte(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.advance_by(1 + sign);

                while self.peek_byte(0).is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }

        let text = &self.source.contents[start..self.position];

        match self.peek_byte(0) {
            Some(b'f' | b'F' | b'h' | b'H') => {
                self.advance();
                let value = text.parse::<f32>().unwrap_or(0.0);
                (TokenKind::FloatLiteral, Literal::Float(value))
            }
            Some(b'l' | b'L') => {
                self.advance();
                let value = text.parse::<f64>().unwrap_or(0.0);
                (TokenKind::DoubleLiteral, Literal::Double(value))
            }
            _ if is_float => {
                let value = text.parse::<f32>().unwrap_or(0.0);
                (TokenKind::FloatLiteral, Literal::Float(value))
            }
            _ => {
                let value = text.parse::<u64>().unwrap_or(0) as u32;
                self.integer_suffix(value)
            }
        }
    }

    fn integer_suffix(&mut self, value: u32) -> (TokenKind, Literal) {
        if matches!(self.peek_byte(0), Some(b'u' | b'U')) {
            self.advance();
            (TokenKind::UintLiteral, Literal::Uint(value))
        } else {
            (TokenKind::IntLiteral, Literal::Int(value as i32))
        }
    }

    fn read_string(&mut self) -> (TokenKind, Literal) {
        // Consume the opening quote
        self.advance();

        let mut value = Vec::new();

        while let Some(c) = self.peek_byte(0) {
            match c {
                b'"' => {
                    self.advance();
                    let value = String::from_utf8_lossy(&value).into_owned();
                    return (TokenKind::StringLiteral, Literal::String(value));
                }
                b'\n' => break,
                b'\\' => {
                    self.advance();

                    let escaped = match self.peek_byte(0) {
                        Some(b'n') => b'\n',
                        Some(b't') => b'\t',
                        Some(b'r') => b'\r',
                        Some(b'0') => b'\0',
                        Some(other) => other,
                        None => break,
                    };

                    value.push(escaped);
                    self.advance();
                }
                c => {
                    value.push(c);
                    self.advance();
                }
            }
        }

        // Unterminated string literal
        (TokenKind::Unknown, Literal::None)
    }

    fn read_operator(&mut self, c: u8) -> TokenKind {
        let rest = &self.bytes()[self.position..];

        for (text, kind) in MULTI_TOKENS {
            if rest.starts_with(text.as_bytes()) {
                self.advance_by(text.len());
                return *kind;
            }
        }

        self.advance();

        SINGLE_TOKENS.get(&c).copied().unwrap_or(TokenKind::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(source: &str) -> Vec<Token> {
        let source = SourceFile::from_memory(source);
        let mut lexer = Lexer::new(&source);
        let mut tokens = Vec::new();

        loop {
            let token = lexer.lex();
            if token.kind == TokenKind::EndOfFile {
                break tokens;
            }
            tokens.push(token);
        }
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex_all(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn recognizes_builtin_types() {
        let float3x4 = BuiltinType {
            base: BaseKind::Float,
            rows: 3,
            cols: 4,
        };

        assert_eq!(
            kinds("float3x4 int2 foo5"),
            vec![
                TokenKind::Type(float3x4),
                TokenKind::Type(BuiltinType {
                    base: BaseKind::Int,
                    rows: 2,
                    cols: 1
                }),
                TokenKind::Identifier
            ]
        );
        assert_eq!(kinds("float5"), vec![TokenKind::Identifier]);
        assert_eq!(kinds("inout"), vec![TokenKind::Keyword(Keyword::Inout)]);
    }

    #[test]
    fn parses_number_literals() {
        let literals = lex_all("1 0x10 3u 1.5 2.0f .5 1e2 4.0l")
            .into_iter()
            .map(|t| t.literal)
            .collect::<Vec<_>>();

        assert_eq!(
            literals,
            vec![
                Literal::Int(1),
                Literal::Int(16),
                Literal::Uint(3),
                Literal::Float(1.5),
                Literal::Float(2.0),
                Literal::Float(0.5),
                Literal::Float(100.0),
                Literal::Double(4.0),
            ]
        );
    }

    #[test]
    fn skips_comments_and_preprocessor_lines() {
        let tokens = lex_all("#include \"a.fx\"\n// line\n/* block\n */ x");

        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].location, Location { line: 4, column: 5 });
    }

    #[test]
    fn prefers_longest_operators() {
        assert_eq!(
            kinds("<<= << <= < ++ +"),
            vec![
                TokenKind::ShiftLeftEquals,
                TokenKind::ShiftLeft,
                TokenKind::LessThanOrEqualTo,
                TokenKind::LessThan,
                TokenKind::Increment,
                TokenKind::Plus,
            ]
        );
    }

    #[test]
    fn processes_string_escapes() {
        let tokens = lex_all(r#""a\"b\n""#);
        assert_eq!(tokens[0].literal, Literal::String("a\"b\n".to_owned()));
    }

    #[test]
    fn clones_act_as_checkpoints() {
        let source = SourceFile::from_memory("a b c");
        let mut lexer = Lexer::new(&source);

        lexer.lex();
        let checkpoint = lexer.clone();
        let b = lexer.lex();
        lexer.lex();

        lexer = checkpoint;
        assert_eq!(lexer.lex(), b);
    }
}
