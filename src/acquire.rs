//! Locates one function definition inside module source.

use thiserror::Error;

use crate::ast::{FunctionDef, Statement};
use crate::parser::{self, ParseError};
use crate::runtime::Bindings;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AcquireError {
    #[error("Function '{name}' not found in source")]
    FunctionNotFound { name: String },
    #[error("Failed to parse '{name}': {source}")]
    Parse {
        name: String,
        #[source]
        source: ParseError,
    },
    #[error("Source for '{name}' does not hold a single function definition")]
    NotAFunction { name: String },
}

/// A function definition together with what its surroundings provide.
#[derive(Debug, Clone)]
pub struct AcquiredFunction {
    pub def: FunctionDef,
    /// Enclosing-scope bindings visible to the function body.
    pub scope: Bindings,
    /// Leading whitespace of the `def` line in the original source.
    pub baseline: String,
}

impl AcquiredFunction {
    pub fn new(def: FunctionDef, scope: Bindings) -> Self {
        Self {
            def,
            scope,
            baseline: String::new(),
        }
    }
}

/// Extracts `def name` from `source`, normalising its indentation.
///
/// The function may be nested inside other blocks. Decorator lines and
/// anything outside the definition's own block are ignored, so the rest of
/// the module need not be parseable.
pub fn acquire(source: &str, name: &str, scope: Bindings) -> Result<AcquiredFunction, AcquireError> {
    let lines = source.lines().collect::<Vec<_>>();
    let start = lines
        .iter()
        .position(|line| defines(line, name))
        .ok_or_else(|| AcquireError::FunctionNotFound {
            name: name.to_string(),
        })?;

    let header = lines[start];
    let baseline = header[..header.len() - header.trim_start().len()].to_string();
    let mut end = start + 1;
    let mut open_brackets = bracket_balance(header);
    while end < lines.len() {
        let line = lines[end];
        let continues = open_brackets > 0
            || line.trim().is_empty()
            || line.trim_start().starts_with('#')
            || indentation(line) > baseline.len();
        if !continues {
            break;
        }
        open_brackets += bracket_balance(line);
        end += 1;
    }

    let snippet = lines[start..end]
        .iter()
        .map(|line| line.get(baseline.len()..).unwrap_or("").trim_end())
        .collect::<Vec<_>>()
        .join("\n");
    let program = parser::parse(&snippet).map_err(|source| AcquireError::Parse {
        name: name.to_string(),
        source,
    })?;

    let mut statements = program.statements.into_iter();
    match (statements.next(), statements.next()) {
        (Some(Statement::FunctionDef(def)), None) if def.name == name => Ok(AcquiredFunction {
            def,
            scope,
            baseline,
        }),
        _ => Err(AcquireError::NotAFunction {
            name: name.to_string(),
        }),
    }
}

fn defines(line: &str, name: &str) -> bool {
    line.trim_start()
        .strip_prefix("def")
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .map(str::trim_start)
        .and_then(|rest| rest.strip_prefix(name))
        .is_some_and(|rest| rest.trim_start().starts_with('('))
}

fn indentation(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Net open brackets on a line, ignoring strings and comments roughly.
fn bracket_balance(line: &str) -> i32 {
    let mut balance = 0;
    let mut quote = None;
    for c in line.chars() {
        match (quote, c) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '#') => break,
            (None, '(' | '[' | '{') => balance += 1,
            (None, ')' | ']' | '}') => balance -= 1,
            _ => {}
        }
    }
    balance
}
