use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("Invalid dedent to {indent_level} spaces at line {line}")]
    InvalidDedent { indent_level: usize, line: usize },
    #[error("Unexpected character '{character}' at line {line}, column {column}")]
    UnexpectedCharacter {
        character: char,
        line: usize,
        column: usize,
    },
    #[error("Tabs are not supported for indentation at line {line}")]
    TabIndentation { line: usize },
    #[error("Invalid number literal '{literal}' at line {line}, column {column}")]
    InvalidNumberLiteral {
        literal: String,
        line: usize,
        column: usize,
    },
    #[error("Unterminated string literal at line {line}, column {column}")]
    UnterminatedString { line: usize, column: usize },
    #[error("Unbalanced '{character}' at line {line}, column {column}")]
    UnbalancedBracket {
        character: char,
        line: usize,
        column: usize,
    },
}

pub type LexResult<T> = Result<T, LexError>;
