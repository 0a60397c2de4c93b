use std::{iter::Peekable, str::CharIndices};

pub mod error;
pub mod token;

pub use error::{LexError, LexResult};
pub use token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    indent_stack: Vec<usize>,
    pending_tokens: Vec<Token<'a>>,
    bracket_stack: Vec<char>,
    at_line_start: bool,
    line_has_content: bool,
    eof_reached: bool,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            indent_stack: vec![0],
            pending_tokens: Vec::new(),
            bracket_stack: Vec::new(),
            at_line_start: true,
            line_has_content: false,
            eof_reached: false,
            line: 1,
            column: 0,
        }
    }

    pub fn next_token(&mut self) -> LexResult<Token<'a>> {
        let token = self.lex_token()?;
        match token.kind {
            TokenKind::Newline => self.line_has_content = false,
            TokenKind::Indent | TokenKind::Dedent | TokenKind::EOF => {}
            _ => self.line_has_content = true,
        }
        Ok(token)
    }

    fn lex_token(&mut self) -> LexResult<Token<'a>> {
        if let Some(token) = self.pending_tokens.pop() {
            return Ok(token);
        }

        if self.eof_reached {
            return Ok(Token::new(TokenKind::EOF, self.empty_span()));
        }

        if self.at_line_start && self.bracket_stack.is_empty() {
            self.at_line_start = false;
            let indent_level = self.count_indentation()?;
            let current_indent = self.current_indent();
            let span = self.empty_span();

            if indent_level > current_indent {
                self.indent_stack.push(indent_level);
                return Ok(Token::new(TokenKind::Indent, span));
            } else if indent_level < current_indent {
                while let Some(&top) = self.indent_stack.last() {
                    if top > indent_level {
                        self.indent_stack.pop();
                        self.pending_tokens.push(Token::new(TokenKind::Dedent, span));
                    } else {
                        break;
                    }
                }
                if self.current_indent() != indent_level {
                    return Err(LexError::InvalidDedent {
                        indent_level,
                        line: self.line,
                    });
                }
                if let Some(token) = self.pending_tokens.pop() {
                    return Ok(token);
                }
            }
        }

        self.skip_whitespace_and_comments();

        let Some(&(start_idx, ch)) = self.chars.peek() else {
            return Ok(self.finish());
        };

        let start_line = self.line;
        let start_column = self.column;
        match ch {
            '\n' => {
                self.advance_char();
                if !self.bracket_stack.is_empty() {
                    // Implicit line joining inside brackets.
                    return self.lex_token();
                }
                self.at_line_start = true;
                Ok(self.token_from(TokenKind::Newline, start_idx, start_line, start_column))
            }
            '(' | '[' | '{' => {
                self.advance_char();
                self.bracket_stack.push(ch);
                let kind = match ch {
                    '(' => TokenKind::LParen,
                    '[' => TokenKind::LBracket,
                    _ => TokenKind::LBrace,
                };
                Ok(self.token_from(kind, start_idx, start_line, start_column))
            }
            ')' | ']' | '}' => {
                self.advance_char();
                let expected_open = match ch {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if self.bracket_stack.pop() != Some(expected_open) {
                    return Err(LexError::UnbalancedBracket {
                        character: ch,
                        line: start_line,
                        column: start_column,
                    });
                }
                let kind = match ch {
                    ')' => TokenKind::RParen,
                    ']' => TokenKind::RBracket,
                    _ => TokenKind::RBrace,
                };
                Ok(self.token_from(kind, start_idx, start_line, start_column))
            }
            ':' => self.single(TokenKind::Colon, start_idx),
            ',' => self.single(TokenKind::Comma, start_idx),
            '.' => self.single(TokenKind::Dot, start_idx),
            '=' => self.with_equal(TokenKind::Equal, TokenKind::EqualEqual, start_idx),
            '<' => self.with_equal(TokenKind::Less, TokenKind::LessEqual, start_idx),
            '>' => self.with_equal(TokenKind::Greater, TokenKind::GreaterEqual, start_idx),
            '+' => self.with_equal(TokenKind::Plus, TokenKind::PlusEqual, start_idx),
            '-' => self.with_equal(TokenKind::Minus, TokenKind::MinusEqual, start_idx),
            '%' => self.with_equal(TokenKind::Percent, TokenKind::PercentEqual, start_idx),
            '!' => {
                self.advance_char();
                if matches!(self.chars.peek(), Some(&(_, '='))) {
                    self.advance_char();
                    Ok(self.token_from(TokenKind::NotEqual, start_idx, start_line, start_column))
                } else {
                    Err(LexError::UnexpectedCharacter {
                        character: '!',
                        line: start_line,
                        column: start_column,
                    })
                }
            }
            '*' => {
                self.advance_char();
                if matches!(self.chars.peek(), Some(&(_, '*'))) {
                    self.advance_char();
                    return Ok(self.token_from(
                        TokenKind::DoubleStar,
                        start_idx,
                        start_line,
                        start_column,
                    ));
                }
                if matches!(self.chars.peek(), Some(&(_, '='))) {
                    self.advance_char();
                    return Ok(self.token_from(
                        TokenKind::StarEqual,
                        start_idx,
                        start_line,
                        start_column,
                    ));
                }
                Ok(self.token_from(TokenKind::Star, start_idx, start_line, start_column))
            }
            '/' => {
                self.advance_char();
                let kind = if matches!(self.chars.peek(), Some(&(_, '/'))) {
                    self.advance_char();
                    if matches!(self.chars.peek(), Some(&(_, '='))) {
                        self.advance_char();
                        TokenKind::DoubleSlashEqual
                    } else {
                        TokenKind::DoubleSlash
                    }
                } else if matches!(self.chars.peek(), Some(&(_, '='))) {
                    self.advance_char();
                    TokenKind::SlashEqual
                } else {
                    TokenKind::Slash
                };
                Ok(self.token_from(kind, start_idx, start_line, start_column))
            }
            '"' | '\'' => self.read_string(ch, start_idx, start_line, start_column),
            c if c.is_alphabetic() || c == '_' => {
                Ok(self.read_identifier(start_idx, start_line, start_column))
            }
            c if c.is_ascii_digit() => self.read_number(start_idx, start_line, start_column),
            _ => Err(LexError::UnexpectedCharacter {
                character: ch,
                line: start_line,
                column: start_column,
            }),
        }
    }

    /// Emits the trailing newline and dedents once the input is exhausted.
    fn finish(&mut self) -> Token<'a> {
        self.eof_reached = true;
        let span = self.empty_span();
        self.pending_tokens.push(Token::new(TokenKind::EOF, span));
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.pending_tokens.push(Token::new(TokenKind::Dedent, span));
        }
        if self.line_has_content {
            return Token::new(TokenKind::Newline, span);
        }
        self.pending_tokens
            .pop()
            .unwrap_or(Token::new(TokenKind::EOF, span))
    }

    fn count_indentation(&mut self) -> LexResult<usize> {
        loop {
            // Look ahead so blank and comment-only lines never produce Indent/Dedent.
            let mut lookahead = self.chars.clone();
            let mut width = 0;
            let mut blank = true;
            while let Some(&(_, c)) = lookahead.peek() {
                match c {
                    ' ' => {
                        width += 1;
                        lookahead.next();
                    }
                    '\t' => return Err(LexError::TabIndentation { line: self.line }),
                    '\r' => {
                        lookahead.next();
                    }
                    '\n' | '#' => break,
                    _ => {
                        blank = false;
                        break;
                    }
                }
            }

            if lookahead.peek().is_none() {
                return Ok(self.current_indent());
            }

            if blank {
                while let Some(&(_, c)) = self.chars.peek() {
                    self.advance_char();
                    if c == '\n' {
                        break;
                    }
                }
                if self.chars.peek().is_none() {
                    return Ok(self.current_indent());
                }
                continue;
            }

            for _ in 0..width {
                self.advance_char();
            }
            return Ok(width);
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            match c {
                ' ' | '\t' | '\r' => {
                    self.advance_char();
                }
                '\\' => {
                    // Explicit line continuation.
                    let mut lookahead = self.chars.clone();
                    lookahead.next();
                    if matches!(lookahead.peek(), Some(&(_, '\n'))) {
                        self.advance_char();
                        self.advance_char();
                    } else {
                        break;
                    }
                }
                '#' => {
                    while let Some(&(_, c)) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance_char();
                    }
                }
                _ => break,
            }
        }
    }

    fn read_identifier(&mut self, start: usize, line: usize, column: usize) -> Token<'a> {
        self.advance_char(); // Consume first char
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance_char();
            } else {
                break;
            }
        }

        let end_idx = self.current_index();
        let ident = &self.input[start..end_idx];
        let kind = match ident {
            "if" => TokenKind::If,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "not" => TokenKind::Not,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "is" => TokenKind::Is,
            "def" => TokenKind::Def,
            "return" => TokenKind::Return,
            "yield" => TokenKind::Yield,
            "pass" => TokenKind::Pass,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "True" => TokenKind::True,
            "False" => TokenKind::False,
            "None" => TokenKind::None,
            _ => TokenKind::Identifier(ident),
        };
        Token::new(
            kind,
            Span {
                start,
                end: end_idx,
                line,
                column,
            },
        )
    }

    fn read_number(&mut self, start: usize, line: usize, column: usize) -> LexResult<Token<'a>> {
        self.consume_digits();
        let mut is_float = false;

        let mut lookahead = self.chars.clone();
        if let Some(&(_, '.')) = lookahead.peek() {
            lookahead.next();
            if !matches!(lookahead.peek(), Some(&(_, c)) if c.is_alphabetic() || c == '_') {
                is_float = true;
                self.advance_char();
                self.consume_digits();
            }
        }

        if let Some(&(_, 'e' | 'E')) = self.chars.peek() {
            is_float = true;
            self.advance_char();
            if let Some(&(_, '+' | '-')) = self.chars.peek() {
                self.advance_char();
            }
            self.consume_digits();
        }

        let end_idx = self.current_index();
        let literal = &self.input[start..end_idx];
        let invalid = || LexError::InvalidNumberLiteral {
            literal: literal.to_string(),
            line,
            column,
        };
        let kind = if is_float {
            TokenKind::Float(literal.parse::<f64>().map_err(|_| invalid())?)
        } else {
            TokenKind::Integer(literal.parse::<i64>().map_err(|_| invalid())?)
        };
        Ok(Token::new(
            kind,
            Span {
                start,
                end: end_idx,
                line,
                column,
            },
        ))
    }

    fn read_string(
        &mut self,
        quote: char,
        start: usize,
        line: usize,
        column: usize,
    ) -> LexResult<Token<'a>> {
        self.advance_char(); // Consume opening quote
        let mut contents = String::new();
        while let Some(&(idx, c)) = self.chars.peek() {
            match c {
                '\n' => break,
                '\\' => {
                    self.advance_char();
                    let Some((_, escaped)) = self.advance_char() else {
                        break;
                    };
                    match escaped {
                        'n' => contents.push('\n'),
                        't' => contents.push('\t'),
                        'r' => contents.push('\r'),
                        '0' => contents.push('\0'),
                        '\\' | '\'' | '"' => contents.push(escaped),
                        other => {
                            contents.push('\\');
                            contents.push(other);
                        }
                    }
                }
                c if c == quote => {
                    self.advance_char(); // Consume closing quote
                    return Ok(Token::new(
                        TokenKind::String(contents),
                        Span {
                            start,
                            end: idx + 1,
                            line,
                            column,
                        },
                    ));
                }
                _ => {
                    contents.push(c);
                    self.advance_char();
                }
            }
        }
        Err(LexError::UnterminatedString { line, column })
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = LexResult<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_token())
    }
}

impl<'a> Lexer<'a> {
    fn advance_char(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, c)) = next {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn consume_digits(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                self.advance_char();
            } else {
                break;
            }
        }
    }

    fn single(&mut self, kind: TokenKind<'a>, start: usize) -> LexResult<Token<'a>> {
        let (line, column) = (self.line, self.column);
        self.advance_char();
        Ok(self.token_from(kind, start, line, column))
    }

    fn with_equal(
        &mut self,
        plain: TokenKind<'a>,
        with_equal: TokenKind<'a>,
        start: usize,
    ) -> LexResult<Token<'a>> {
        let (line, column) = (self.line, self.column);
        self.advance_char();
        if matches!(self.chars.peek(), Some(&(_, '='))) {
            self.advance_char();
            return Ok(self.token_from(with_equal, start, line, column));
        }
        Ok(self.token_from(plain, start, line, column))
    }

    fn token_from(
        &mut self,
        kind: TokenKind<'a>,
        start: usize,
        line: usize,
        column: usize,
    ) -> Token<'a> {
        let end = self.current_index();
        Token::new(
            kind,
            Span {
                start,
                end,
                line,
                column,
            },
        )
    }

    fn current_indent(&self) -> usize {
        self.indent_stack.last().copied().unwrap_or(0)
    }

    fn empty_span(&mut self) -> Span {
        let index = self.current_index();
        Span {
            start: index,
            end: index,
            line: self.line,
            column: self.column,
        }
    }

    fn current_index(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(idx, _)| *idx)
            .unwrap_or(self.input.len())
    }
}

pub fn tokenize(input: &str) -> LexResult<Vec<Token<'_>>> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let is_eof = matches!(token.kind, TokenKind::EOF);
        tokens.push(token);
        if is_eof {
            break;
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn kinds(input: &str) -> Vec<TokenKind<'_>> {
        tokenize(input)
            .expect("tokenize should succeed")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn test_simple_function() {
        let input = indoc! {"
            def f(x=0):
                for i in range(3):
                    yield i + x
        "};
        let expected_tokens = vec![
            TokenKind::Def,
            TokenKind::Identifier("f"),
            TokenKind::LParen,
            TokenKind::Identifier("x"),
            TokenKind::Equal,
            TokenKind::Integer(0),
            TokenKind::RParen,
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Indent,
            TokenKind::For,
            TokenKind::Identifier("i"),
            TokenKind::In,
            TokenKind::Identifier("range"),
            TokenKind::LParen,
            TokenKind::Integer(3),
            TokenKind::RParen,
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Indent,
            TokenKind::Yield,
            TokenKind::Identifier("i"),
            TokenKind::Plus,
            TokenKind::Identifier("x"),
            TokenKind::Newline,
            TokenKind::Dedent,
            TokenKind::Dedent,
            TokenKind::EOF,
        ];
        assert_eq!(kinds(input), expected_tokens);
    }

    #[test]
    fn skips_blank_and_comment_lines_without_indentation_changes() {
        let input = indoc! {"
            def f():
                x = 1

                # comment only
                return x  # trailing
        "};
        let tokens = kinds(input);
        assert_eq!(
            tokens.iter().filter(|kind| **kind == TokenKind::Indent).count(),
            1
        );
        assert!(tokens.contains(&TokenKind::Return));
    }

    #[test]
    fn joins_lines_inside_brackets() {
        let tokens = kinds("x = [1,\n     2]\n");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Identifier("x"),
                TokenKind::Equal,
                TokenKind::LBracket,
                TokenKind::Integer(1),
                TokenKind::Comma,
                TokenKind::Integer(2),
                TokenKind::RBracket,
                TokenKind::Newline,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn reads_compound_operators_floats_and_strings() {
        let tokens = kinds("v //= 2.5e1 ** 'a\\'b' != x\n");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Identifier("v"),
                TokenKind::DoubleSlashEqual,
                TokenKind::Float(25.0),
                TokenKind::DoubleStar,
                TokenKind::String("a'b".to_string()),
                TokenKind::NotEqual,
                TokenKind::Identifier("x"),
                TokenKind::Newline,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn emits_newline_and_dedents_without_trailing_newline() {
        let tokens = kinds("def f():\n    return 1");
        assert_eq!(
            &tokens[tokens.len() - 3..],
            &[TokenKind::Newline, TokenKind::Dedent, TokenKind::EOF]
        );
    }

    #[test]
    fn errors_on_invalid_character() {
        let err = tokenize("x = 1 @ 2\n").expect_err("expected lexing failure");
        assert!(err.to_string().contains("Unexpected character '@'"));
    }

    #[test]
    fn errors_on_integer_overflow() {
        let err = tokenize("n = 99999999999999999999999999\n").expect_err("expected overflow");
        assert!(err.to_string().contains("Invalid number literal"));
    }

    #[test]
    fn errors_on_unbalanced_brackets() {
        let err = tokenize("x = (1]\n").expect_err("expected bracket error");
        assert_eq!(
            err,
            LexError::UnbalancedBracket {
                character: ']',
                line: 1,
                column: 6
            }
        );
    }
}
