#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    Identifier(&'a str),
    Integer(i64),
    Float(f64),
    /// String contents with escapes already resolved.
    String(String),
    True,
    False,
    None,

    // Keywords
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Not,
    And,
    Or,
    Is,
    Def,
    Return,
    Yield,
    Pass,
    Break,
    Continue,

    // Operators
    Equal,        // =
    EqualEqual,   // ==
    NotEqual,     // !=
    Less,         // <
    LessEqual,    // <=
    Greater,      // >
    GreaterEqual, // >=
    Plus,         // +
    Minus,        // -
    Star,         // *
    DoubleStar,   // **
    Slash,        // /
    DoubleSlash,  // //
    Percent,      // %
    PlusEqual,    // +=
    MinusEqual,   // -=
    StarEqual,    // *=
    SlashEqual,   // /=
    DoubleSlashEqual, // //=
    PercentEqual, // %=

    // Delimiters
    Colon,    // :
    Comma,    // ,
    Dot,      // .
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    LBrace,   // {
    RBrace,   // }

    // Structural
    Newline,
    Indent,
    Dedent,
    EOF,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind<'a>, span: Span) -> Self {
        Self { kind, span }
    }
}
