//! Syntax tree shared by the pragma passes, the renderer and the interpreter.
//!
//! Nodes own their children; passes never mutate a tree in place; they build
//! a new one from rewritten children.

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    None,
    Identifier(String),
    List(Vec<Expression>),
    Tuple(Vec<Expression>),
    Dict(Vec<(Expression, Expression)>),
    Set(Vec<Expression>),
    Index {
        object: Box<Expression>,
        index: Box<Expression>,
    },
    Attribute {
        object: Box<Expression>,
        name: String,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    BoolOp {
        op: BoolOperator,
        values: Vec<Expression>,
    },
    /// Chained comparison: `left op0 c0 op1 c1 ...`.
    Compare {
        left: Box<Expression>,
        ops: Vec<CompareOperator>,
        comparators: Vec<Expression>,
    },
    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
    },
    Yield(Option<Box<Expression>>),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnaryOperator {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BoolOperator {
    And,
    Or,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CompareOperator {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Parameter {
    pub name: String,
    pub default: Option<Expression>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Parameter>,
    pub body: Vec<Statement>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Statement {
    FunctionDef(FunctionDef),
    Assign {
        target: AssignTarget,
        value: Expression,
    },
    AugAssign {
        target: AssignTarget,
        op: BinaryOperator,
        value: Expression,
    },
    For {
        target: AssignTarget,
        iterable: Expression,
        body: Vec<Statement>,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
    },
    If {
        condition: Expression,
        then_body: Vec<Statement>,
        else_body: Vec<Statement>,
    },
    Return(Option<Expression>),
    Pass,
    Break,
    Continue,
    Expr(Expression),
}

/// Assignment and loop target forms accepted by the parser.
#[derive(Debug, PartialEq, Clone)]
pub enum AssignTarget {
    Name(String),
    /// Tuple unpacking, `(a, b), c = ...`.
    Tuple(Vec<AssignTarget>),
    Index {
        object: Expression,
        index: Expression,
    },
    Attribute {
        object: Expression,
        name: String,
    },
}

impl AssignTarget {
    /// Names bound by this target. Subscript and attribute targets bind nothing.
    pub fn bound_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_bound_names(&mut names);
        names
    }

    fn collect_bound_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            AssignTarget::Name(name) => names.push(name),
            AssignTarget::Tuple(targets) => {
                for target in targets {
                    target.collect_bound_names(names);
                }
            }
            AssignTarget::Index { .. } | AssignTarget::Attribute { .. } => {}
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl Expression {
    pub fn identifier(name: impl Into<String>) -> Self {
        Expression::Identifier(name.into())
    }

    pub fn is_literal(&self) -> bool {
        match self {
            Expression::Integer(_)
            | Expression::Float(_)
            | Expression::Boolean(_)
            | Expression::String(_)
            | Expression::None => true,
            Expression::Tuple(elements) => elements.iter().all(Expression::is_literal),
            _ => false,
        }
    }
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::FloorDiv => "//",
            BinaryOperator::Mod => "%",
            BinaryOperator::Pow => "**",
        }
    }
}

impl CompareOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOperator::Eq => "==",
            CompareOperator::NotEq => "!=",
            CompareOperator::Lt => "<",
            CompareOperator::LtE => "<=",
            CompareOperator::Gt => ">",
            CompareOperator::GtE => ">=",
            CompareOperator::In => "in",
            CompareOperator::NotIn => "not in",
            CompareOperator::Is => "is",
            CompareOperator::IsNot => "is not",
        }
    }
}
