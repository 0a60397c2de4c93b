use thiserror::Error;

use crate::ast::{
    AssignTarget, BinaryOperator, BoolOperator, CompareOperator, Expression, FunctionDef,
    Parameter, Program, Statement, UnaryOperator,
};
use crate::lexer::{self, LexError, Token, TokenKind};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("Expected {expected}, got {found} at line {line}, column {column}")]
    Unexpected {
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },
    #[error("Cannot assign to {target} at line {line}")]
    InvalidAssignTarget { target: String, line: usize },
    #[error("Non-default parameter '{name}' follows default parameter at line {line}")]
    NonDefaultAfterDefault { name: String, line: usize },
}

pub struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    position: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token<'a>>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    pub fn parse_program(mut self) -> Result<Program, ParseError> {
        let mut statements = Vec::new();
        while !self.check(&TokenKind::EOF) {
            if self.consume_newlines() {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(Program { statements })
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        match self.current().kind {
            TokenKind::Def => self.parse_function_def(),
            TokenKind::For => self.parse_for(),
            TokenKind::While => self.parse_while(),
            TokenKind::If => {
                self.advance();
                self.parse_if_tail()
            }
            _ => {
                let statement = self.parse_simple_statement()?;
                self.expect_statement_end()?;
                Ok(statement)
            }
        }
    }

    fn parse_simple_statement(&mut self) -> Result<Statement, ParseError> {
        match self.current().kind {
            TokenKind::Return => {
                self.advance();
                if self.at_statement_end() {
                    return Ok(Statement::Return(None));
                }
                Ok(Statement::Return(Some(self.parse_expression_list()?)))
            }
            TokenKind::Pass => {
                self.advance();
                Ok(Statement::Pass)
            }
            TokenKind::Break => {
                self.advance();
                Ok(Statement::Break)
            }
            TokenKind::Continue => {
                self.advance();
                Ok(Statement::Continue)
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_expression_statement(&mut self) -> Result<Statement, ParseError> {
        let line = self.current().span.line;
        let expr = self.parse_yield_or_list()?;

        if self.check(&TokenKind::Equal) {
            self.advance();
            let target = self.to_target(expr, line)?;
            let value = self.parse_yield_or_list()?;
            return Ok(Statement::Assign { target, value });
        }

        let augmented = match self.current().kind {
            TokenKind::PlusEqual => Some(BinaryOperator::Add),
            TokenKind::MinusEqual => Some(BinaryOperator::Sub),
            TokenKind::StarEqual => Some(BinaryOperator::Mul),
            TokenKind::SlashEqual => Some(BinaryOperator::Div),
            TokenKind::DoubleSlashEqual => Some(BinaryOperator::FloorDiv),
            TokenKind::PercentEqual => Some(BinaryOperator::Mod),
            _ => None,
        };
        if let Some(op) = augmented {
            self.advance();
            let target = self.to_target(expr, line)?;
            if matches!(target, AssignTarget::Tuple(_)) {
                return Err(ParseError::InvalidAssignTarget {
                    target: "tuple in augmented assignment".to_string(),
                    line,
                });
            }
            let value = self.parse_yield_or_list()?;
            return Ok(Statement::AugAssign { target, op, value });
        }

        Ok(Statement::Expr(expr))
    }

    fn parse_function_def(&mut self) -> Result<Statement, ParseError> {
        self.expect(TokenKind::Def, "def")?;
        let name = self.expect_identifier()?;
        self.expect(TokenKind::LParen, "(")?;

        let mut params: Vec<Parameter> = Vec::new();
        while !self.check(&TokenKind::RParen) {
            let line = self.current().span.line;
            let param_name = self.expect_identifier()?;
            let default = if self.check(&TokenKind::Equal) {
                self.advance();
                Some(self.parse_expression()?)
            } else {
                None
            };
            if default.is_none() && params.iter().any(|param| param.default.is_some()) {
                return Err(ParseError::NonDefaultAfterDefault {
                    name: param_name,
                    line,
                });
            }
            params.push(Parameter {
                name: param_name,
                default,
            });
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }

        self.expect(TokenKind::RParen, ")")?;
        self.expect(TokenKind::Colon, ":")?;
        let body = self.parse_block()?;
        Ok(Statement::FunctionDef(FunctionDef { name, params, body }))
    }

    fn parse_for(&mut self) -> Result<Statement, ParseError> {
        self.expect(TokenKind::For, "for")?;
        let line = self.current().span.line;
        let mut targets = vec![self.parse_postfix()?];
        let mut trailing_comma = false;
        while self.check(&TokenKind::Comma) {
            self.advance();
            trailing_comma = true;
            if self.check(&TokenKind::In) {
                break;
            }
            targets.push(self.parse_postfix()?);
            trailing_comma = false;
        }
        let target_expr = if targets.len() == 1 && !trailing_comma {
            targets.remove(0)
        } else {
            Expression::Tuple(targets)
        };
        let target = self.to_target(target_expr, line)?;
        self.expect(TokenKind::In, "in")?;
        let iterable = self.parse_expression_list()?;
        self.expect(TokenKind::Colon, ":")?;
        let body = self.parse_block()?;
        Ok(Statement::For {
            target,
            iterable,
            body,
        })
    }

    fn parse_while(&mut self) -> Result<Statement, ParseError> {
        self.expect(TokenKind::While, "while")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::Colon, ":")?;
        let body = self.parse_block()?;
        Ok(Statement::While { condition, body })
    }

    /// Parses the remainder of an `if`/`elif` after its keyword. `elif` chains
    /// become nested `If` nodes in the else branch.
    fn parse_if_tail(&mut self) -> Result<Statement, ParseError> {
        let condition = self.parse_expression()?;
        self.expect(TokenKind::Colon, ":")?;
        let then_body = self.parse_block()?;

        let else_body = match self.current().kind {
            TokenKind::Elif => {
                self.advance();
                vec![self.parse_if_tail()?]
            }
            TokenKind::Else => {
                self.advance();
                self.expect(TokenKind::Colon, ":")?;
                self.parse_block()?
            }
            _ => Vec::new(),
        };

        Ok(Statement::If {
            condition,
            then_body,
            else_body,
        })
    }

    fn parse_block(&mut self) -> Result<Vec<Statement>, ParseError> {
        if !self.check(&TokenKind::Newline) {
            // Single-line suite: `if x: return 1`
            let statement = self.parse_simple_statement()?;
            self.expect_statement_end()?;
            return Ok(vec![statement]);
        }

        self.expect(TokenKind::Newline, "newline")?;
        self.consume_newlines();
        self.expect(TokenKind::Indent, "indent")?;

        let mut body = Vec::new();
        while !matches!(self.current().kind, TokenKind::Dedent | TokenKind::EOF) {
            if self.consume_newlines() {
                continue;
            }
            body.push(self.parse_statement()?);
        }
        if self.check(&TokenKind::Dedent) {
            self.advance();
        }
        Ok(body)
    }

    fn parse_yield_or_list(&mut self) -> Result<Expression, ParseError> {
        if self.check(&TokenKind::Yield) {
            self.advance();
            if self.at_statement_end() || self.check(&TokenKind::RParen) {
                return Ok(Expression::Yield(None));
            }
            let value = self.parse_expression_list()?;
            return Ok(Expression::Yield(Some(Box::new(value))));
        }
        self.parse_expression_list()
    }

    /// `a, b, c` without brackets; a single element without a trailing comma
    /// stays a plain expression.
    fn parse_expression_list(&mut self) -> Result<Expression, ParseError> {
        let first = self.parse_expression()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut elements = vec![first];
        while self.check(&TokenKind::Comma) {
            self.advance();
            if self.at_expression_list_end() {
                break;
            }
            elements.push(self.parse_expression()?);
        }
        Ok(Expression::Tuple(elements))
    }

    fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expression, ParseError> {
        let first = self.parse_and()?;
        if !self.check(&TokenKind::Or) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.check(&TokenKind::Or) {
            self.advance();
            values.push(self.parse_and()?);
        }
        Ok(Expression::BoolOp {
            op: BoolOperator::Or,
            values,
        })
    }

    fn parse_and(&mut self) -> Result<Expression, ParseError> {
        let first = self.parse_not()?;
        if !self.check(&TokenKind::And) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.check(&TokenKind::And) {
            self.advance();
            values.push(self.parse_not()?);
        }
        Ok(Expression::BoolOp {
            op: BoolOperator::And,
            values,
        })
    }

    fn parse_not(&mut self) -> Result<Expression, ParseError> {
        if self.check(&TokenKind::Not) {
            self.advance();
            let operand = self.parse_not()?;
            return Ok(Expression::UnaryOp {
                op: UnaryOperator::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expression, ParseError> {
        let left = self.parse_arith()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        while let Some(op) = self.comparison_operator() {
            comparators.push(self.parse_arith()?);
            ops.push(op);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expression::Compare {
            left: Box::new(left),
            ops,
            comparators,
        })
    }

    /// Consumes a comparison operator (including `not in` and `is not`).
    fn comparison_operator(&mut self) -> Option<CompareOperator> {
        let op = match self.current().kind {
            TokenKind::EqualEqual => CompareOperator::Eq,
            TokenKind::NotEqual => CompareOperator::NotEq,
            TokenKind::Less => CompareOperator::Lt,
            TokenKind::LessEqual => CompareOperator::LtE,
            TokenKind::Greater => CompareOperator::Gt,
            TokenKind::GreaterEqual => CompareOperator::GtE,
            TokenKind::In => CompareOperator::In,
            TokenKind::Not if matches!(self.peek_kind(), TokenKind::In) => {
                self.advance();
                CompareOperator::NotIn
            }
            TokenKind::Is => {
                if matches!(self.peek_kind(), TokenKind::Not) {
                    self.advance();
                    CompareOperator::IsNot
                } else {
                    CompareOperator::Is
                }
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn parse_arith(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_term()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            expr = Expression::BinaryOp {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_factor()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinaryOperator::Mul,
                TokenKind::Slash => BinaryOperator::Div,
                TokenKind::DoubleSlash => BinaryOperator::FloorDiv,
                TokenKind::Percent => BinaryOperator::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            expr = Expression::BinaryOp {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> Result<Expression, ParseError> {
        let op = match self.current().kind {
            TokenKind::Minus => UnaryOperator::Neg,
            TokenKind::Plus => UnaryOperator::Pos,
            _ => return self.parse_power(),
        };
        self.advance();
        let operand = self.parse_factor()?;
        Ok(Expression::UnaryOp {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_power(&mut self) -> Result<Expression, ParseError> {
        let base = self.parse_postfix()?;
        if self.check(&TokenKind::DoubleStar) {
            self.advance();
            // Right associative, and binds tighter than a unary operator on its left.
            let exponent = self.parse_factor()?;
            return Ok(Expression::BinaryOp {
                left: Box::new(base),
                op: BinaryOperator::Pow,
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current().kind {
                TokenKind::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    while !self.check(&TokenKind::RParen) {
                        args.push(self.parse_expression()?);
                        if !self.check(&TokenKind::Comma) {
                            break;
                        }
                        self.advance();
                    }
                    self.expect(TokenKind::RParen, ")")?;
                    expr = Expression::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression_list()?;
                    self.expect(TokenKind::RBracket, "]")?;
                    expr = Expression::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_identifier()?;
                    expr = Expression::Attribute {
                        object: Box::new(expr),
                        name,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        let expr = match &self.current().kind {
            TokenKind::Integer(value) => Expression::Integer(*value),
            TokenKind::Float(value) => Expression::Float(*value),
            TokenKind::String(value) => {
                let mut value = value.clone();
                self.advance();
                // Adjacent string literals concatenate.
                while let TokenKind::String(next) = &self.current().kind {
                    value.push_str(next);
                    self.advance();
                }
                return Ok(Expression::String(value));
            }
            TokenKind::True => Expression::Boolean(true),
            TokenKind::False => Expression::Boolean(false),
            TokenKind::None => Expression::None,
            TokenKind::Identifier(name) => Expression::Identifier(name.to_string()),
            TokenKind::LParen => return self.parse_parenthesized(),
            TokenKind::LBracket => {
                self.advance();
                let elements = self.parse_comma_separated(TokenKind::RBracket)?;
                self.expect(TokenKind::RBracket, "]")?;
                return Ok(Expression::List(elements));
            }
            TokenKind::LBrace => return self.parse_braced(),
            _ => return Err(self.error("expression")),
        };
        self.advance();
        Ok(expr)
    }

    fn parse_parenthesized(&mut self) -> Result<Expression, ParseError> {
        self.expect(TokenKind::LParen, "(")?;
        if self.check(&TokenKind::RParen) {
            self.advance();
            return Ok(Expression::Tuple(Vec::new()));
        }
        let first = self.parse_yield_or_list()?;
        self.expect(TokenKind::RParen, ")")?;
        Ok(first)
    }

    fn parse_braced(&mut self) -> Result<Expression, ParseError> {
        self.expect(TokenKind::LBrace, "{")?;
        if self.check(&TokenKind::RBrace) {
            self.advance();
            return Ok(Expression::Dict(Vec::new()));
        }

        let first = self.parse_expression()?;
        if self.check(&TokenKind::Colon) {
            self.advance();
            let first_value = self.parse_expression()?;
            let mut entries = vec![(first, first_value)];
            while self.check(&TokenKind::Comma) {
                self.advance();
                if self.check(&TokenKind::RBrace) {
                    break;
                }
                let key = self.parse_expression()?;
                self.expect(TokenKind::Colon, ":")?;
                let value = self.parse_expression()?;
                entries.push((key, value));
            }
            self.expect(TokenKind::RBrace, "}")?;
            return Ok(Expression::Dict(entries));
        }

        let mut elements = vec![first];
        while self.check(&TokenKind::Comma) {
            self.advance();
            if self.check(&TokenKind::RBrace) {
                break;
            }
            elements.push(self.parse_expression()?);
        }
        self.expect(TokenKind::RBrace, "}")?;
        Ok(Expression::Set(elements))
    }

    fn parse_comma_separated(&mut self, close: TokenKind<'a>) -> Result<Vec<Expression>, ParseError> {
        let mut elements = Vec::new();
        while !self.check(&close) {
            elements.push(self.parse_expression()?);
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        Ok(elements)
    }

    fn to_target(&self, expr: Expression, line: usize) -> Result<AssignTarget, ParseError> {
        match expr {
            Expression::Identifier(name) => Ok(AssignTarget::Name(name)),
            Expression::Tuple(elements) | Expression::List(elements) => Ok(AssignTarget::Tuple(
                elements
                    .into_iter()
                    .map(|element| self.to_target(element, line))
                    .collect::<Result<_, _>>()?,
            )),
            Expression::Index { object, index } => Ok(AssignTarget::Index {
                object: *object,
                index: *index,
            }),
            Expression::Attribute { object, name } => Ok(AssignTarget::Attribute {
                object: *object,
                name,
            }),
            other => Err(ParseError::InvalidAssignTarget {
                target: format!("{other:?}"),
                line,
            }),
        }
    }

    fn consume_newlines(&mut self) -> bool {
        let mut consumed = false;
        while self.check(&TokenKind::Newline) {
            consumed = true;
            self.advance();
        }
        consumed
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Newline | TokenKind::Dedent | TokenKind::EOF
        )
    }

    fn at_expression_list_end(&self) -> bool {
        self.at_statement_end()
            || matches!(
                self.current().kind,
                TokenKind::Equal
                    | TokenKind::Colon
                    | TokenKind::RParen
                    | TokenKind::RBracket
                    | TokenKind::PlusEqual
                    | TokenKind::MinusEqual
                    | TokenKind::StarEqual
                    | TokenKind::SlashEqual
                    | TokenKind::DoubleSlashEqual
                    | TokenKind::PercentEqual
            )
    }

    fn expect_statement_end(&mut self) -> Result<(), ParseError> {
        match self.current().kind {
            TokenKind::Newline => {
                self.advance();
                Ok(())
            }
            TokenKind::Dedent | TokenKind::EOF => Ok(()),
            _ => Err(self.error("newline")),
        }
    }

    fn expect_identifier(&mut self) -> Result<String, ParseError> {
        if let TokenKind::Identifier(name) = self.current().kind {
            let name = name.to_string();
            self.advance();
            Ok(name)
        } else {
            Err(self.error("identifier"))
        }
    }

    fn expect(&mut self, kind: TokenKind<'a>, expected: &str) -> Result<(), ParseError> {
        if self.check(&kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(expected))
        }
    }

    fn check(&self, kind: &TokenKind<'a>) -> bool {
        &self.current().kind == kind
    }

    fn current(&self) -> &Token<'a> {
        // The token stream always ends with EOF, and `advance` never moves past it.
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind<'a> {
        let index = (self.position + 1).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn advance(&mut self) {
        if self.position + 1 < self.tokens.len() {
            self.position += 1;
        }
    }

    fn error(&self, expected: &str) -> ParseError {
        let token = self.current();
        ParseError::Unexpected {
            expected: expected.to_string(),
            found: format!("{:?}", token.kind),
            line: token.span.line,
            column: token.span.column,
        }
    }
}

pub fn parse_tokens(tokens: Vec<Token<'_>>) -> Result<Program, ParseError> {
    if tokens.is_empty() {
        return Ok(Program {
            statements: Vec::new(),
        });
    }
    Parser::new(tokens).parse_program()
}

pub fn parse(input: &str) -> Result<Program, ParseError> {
    let tokens = lexer::tokenize(input)?;
    parse_tokens(tokens)
}
