//! Canonical source rendering for syntax trees.
//!
//! Output uses four-space indentation and single-quoted strings, and omits
//! parentheses around a bare tuple in statement position (`c = 1, 2, 5`).

use crate::ast::{
    AssignTarget, BinaryOperator, BoolOperator, Expression, FunctionDef, Statement, UnaryOperator,
};
use crate::runtime::value::{format_float, quote_string};

const INDENT: &str = "    ";

/// Binding strength, loosest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Tuple,
    Or,
    And,
    Not,
    Compare,
    Additive,
    Multiplicative,
    Unary,
    Power,
    Postfix,
    Atom,
}

/// Renders a function definition, one trailing newline included.
pub fn render_function(def: &FunctionDef) -> String {
    let mut output = String::new();
    emit_function(def, 0, &mut output);
    output
}

/// Renders a function definition with every line shifted by `baseline`.
pub fn render_function_at(def: &FunctionDef, baseline: &str) -> String {
    let rendered = render_function(def);
    if baseline.is_empty() {
        return rendered;
    }
    rendered
        .lines()
        .map(|line| {
            if line.is_empty() {
                "\n".to_string()
            } else {
                format!("{baseline}{line}\n")
            }
        })
        .collect()
}

pub fn render_expression(expression: &Expression) -> String {
    emit_top_level(expression)
}

fn emit_function(def: &FunctionDef, depth: usize, output: &mut String) {
    let params = def
        .params
        .iter()
        .map(|param| match &param.default {
            Some(default) => format!("{}={}", param.name, emit(default, Precedence::Or)),
            None => param.name.clone(),
        })
        .collect::<Vec<_>>();
    push_line(output, depth, &format!("def {}({}):", def.name, params.join(", ")));
    emit_block(&def.body, depth + 1, output);
}

fn emit_block(body: &[Statement], depth: usize, output: &mut String) {
    if body.is_empty() {
        push_line(output, depth, "pass");
        return;
    }
    for statement in body {
        emit_statement(statement, depth, output);
    }
}

fn emit_statement(statement: &Statement, depth: usize, output: &mut String) {
    match statement {
        Statement::FunctionDef(def) => emit_function(def, depth, output),
        Statement::Assign { target, value } => {
            let line = format!("{} = {}", emit_target(target), emit_top_level(value));
            push_line(output, depth, &line);
        }
        Statement::AugAssign { target, op, value } => {
            let line = format!(
                "{} {}= {}",
                emit_target(target),
                op.symbol(),
                emit_top_level(value)
            );
            push_line(output, depth, &line);
        }
        Statement::For {
            target,
            iterable,
            body,
        } => {
            let line = format!(
                "for {} in {}:",
                emit_target(target),
                emit_top_level(iterable)
            );
            push_line(output, depth, &line);
            emit_block(body, depth + 1, output);
        }
        Statement::While { condition, body } => {
            push_line(output, depth, &format!("while {}:", emit(condition, Precedence::Or)));
            emit_block(body, depth + 1, output);
        }
        Statement::If {
            condition,
            then_body,
            else_body,
        } => emit_if("if", condition, then_body, else_body, depth, output),
        Statement::Return(None) => push_line(output, depth, "return"),
        Statement::Return(Some(value)) => {
            push_line(output, depth, &format!("return {}", emit_top_level(value)));
        }
        Statement::Pass => push_line(output, depth, "pass"),
        Statement::Break => push_line(output, depth, "break"),
        Statement::Continue => push_line(output, depth, "continue"),
        Statement::Expr(expression) => push_line(output, depth, &emit_top_level(expression)),
    }
}

fn emit_if(
    keyword: &str,
    condition: &Expression,
    then_body: &[Statement],
    else_body: &[Statement],
    depth: usize,
    output: &mut String,
) {
    push_line(
        output,
        depth,
        &format!("{keyword} {}:", emit(condition, Precedence::Or)),
    );
    emit_block(then_body, depth + 1, output);
    match else_body {
        [] => {}
        [
            Statement::If {
                condition,
                then_body,
                else_body,
            },
        ] => emit_if("elif", condition, then_body, else_body, depth, output),
        _ => {
            push_line(output, depth, "else:");
            emit_block(else_body, depth + 1, output);
        }
    }
}

fn push_line(output: &mut String, depth: usize, line: &str) {
    for _ in 0..depth {
        output.push_str(INDENT);
    }
    output.push_str(line);
    output.push('\n');
}

fn emit_target(target: &AssignTarget) -> String {
    match target {
        AssignTarget::Tuple(targets) if !targets.is_empty() => targets
            .iter()
            .map(emit_nested_target)
            .collect::<Vec<_>>()
            .join(", "),
        other => emit_nested_target(other),
    }
}

fn emit_nested_target(target: &AssignTarget) -> String {
    match target {
        AssignTarget::Name(name) => name.clone(),
        AssignTarget::Tuple(targets) => {
            let inner = targets.iter().map(emit_nested_target).collect::<Vec<_>>();
            if inner.len() == 1 {
                format!("({},)", inner[0])
            } else {
                format!("({})", inner.join(", "))
            }
        }
        AssignTarget::Index { object, index } => {
            format!("{}[{}]", emit(object, Precedence::Postfix), emit_top_level(index))
        }
        AssignTarget::Attribute { object, name } => {
            format!("{}.{name}", emit(object, Precedence::Postfix))
        }
    }
}

/// Statement-level rendering: bare tuples and yields need no parentheses.
fn emit_top_level(expression: &Expression) -> String {
    match expression {
        Expression::Tuple(elements) if !elements.is_empty() => {
            let rendered = elements
                .iter()
                .map(|element| emit(element, Precedence::Or))
                .collect::<Vec<_>>();
            if rendered.len() == 1 {
                format!("{},", rendered[0])
            } else {
                rendered.join(", ")
            }
        }
        Expression::Yield(value) => emit_yield(value.as_deref()),
        other => emit(other, Precedence::Tuple),
    }
}

fn emit_yield(value: Option<&Expression>) -> String {
    match value {
        Some(value) => format!("yield {}", emit_top_level(value)),
        None => "yield".to_string(),
    }
}

/// Renders `expression`, parenthesised when it binds looser than `context`.
fn emit(expression: &Expression, context: Precedence) -> String {
    let rendered = emit_unparenthesized(expression);
    if precedence(expression) < context {
        format!("({rendered})")
    } else {
        rendered
    }
}

fn precedence(expression: &Expression) -> Precedence {
    match expression {
        Expression::Tuple(elements) if !elements.is_empty() => Precedence::Tuple,
        Expression::Yield(_) => Precedence::Tuple,
        Expression::BoolOp {
            op: BoolOperator::Or,
            ..
        } => Precedence::Or,
        Expression::BoolOp {
            op: BoolOperator::And,
            ..
        } => Precedence::And,
        Expression::UnaryOp {
            op: UnaryOperator::Not,
            ..
        } => Precedence::Not,
        Expression::Compare { .. } => Precedence::Compare,
        Expression::BinaryOp { op, .. } => binary_precedence(*op),
        Expression::UnaryOp { .. } => Precedence::Unary,
        Expression::Integer(value) if *value < 0 => Precedence::Unary,
        Expression::Float(value) if value.is_sign_negative() => Precedence::Unary,
        Expression::Index { .. } | Expression::Attribute { .. } | Expression::Call { .. } => {
            Precedence::Postfix
        }
        _ => Precedence::Atom,
    }
}

fn binary_precedence(op: BinaryOperator) -> Precedence {
    match op {
        BinaryOperator::Add | BinaryOperator::Sub => Precedence::Additive,
        BinaryOperator::Mul | BinaryOperator::Div | BinaryOperator::FloorDiv | BinaryOperator::Mod => {
            Precedence::Multiplicative
        }
        BinaryOperator::Pow => Precedence::Power,
    }
}

fn next_tighter(precedence: Precedence) -> Precedence {
    match precedence {
        Precedence::Tuple => Precedence::Or,
        Precedence::Or => Precedence::And,
        Precedence::And => Precedence::Not,
        Precedence::Not => Precedence::Compare,
        Precedence::Compare => Precedence::Additive,
        Precedence::Additive => Precedence::Multiplicative,
        Precedence::Multiplicative => Precedence::Unary,
        Precedence::Unary => Precedence::Power,
        Precedence::Power => Precedence::Postfix,
        Precedence::Postfix | Precedence::Atom => Precedence::Atom,
    }
}

fn emit_unparenthesized(expression: &Expression) -> String {
    match expression {
        Expression::Integer(value) => value.to_string(),
        Expression::Float(value) => format_float(*value),
        Expression::Boolean(true) => "True".to_string(),
        Expression::Boolean(false) => "False".to_string(),
        Expression::String(value) => quote_string(value),
        Expression::None => "None".to_string(),
        Expression::Identifier(name) => name.clone(),
        Expression::List(elements) => format!("[{}]", emit_elements(elements)),
        Expression::Tuple(elements) => match elements.as_slice() {
            [] => "()".to_string(),
            [single] => format!("{},", emit(single, Precedence::Or)),
            _ => emit_elements(elements),
        },
        Expression::Set(elements) if elements.is_empty() => "set()".to_string(),
        Expression::Set(elements) => format!("{{{}}}", emit_elements(elements)),
        Expression::Dict(entries) => {
            let rendered = entries
                .iter()
                .map(|(key, value)| {
                    format!("{}: {}", emit(key, Precedence::Or), emit(value, Precedence::Or))
                })
                .collect::<Vec<_>>();
            format!("{{{}}}", rendered.join(", "))
        }
        Expression::Index { object, index } => {
            format!("{}[{}]", emit(object, Precedence::Postfix), emit_top_level(index))
        }
        Expression::Attribute { object, name } => {
            let object = match object.as_ref() {
                // `1.real` would lex as a float.
                Expression::Integer(value) if *value >= 0 => format!("({value})"),
                other => emit(other, Precedence::Postfix),
            };
            format!("{object}.{name}")
        }
        Expression::Call { callee, args } => {
            format!("{}({})", emit(callee, Precedence::Postfix), emit_elements(args))
        }
        Expression::UnaryOp { op, operand } => match op {
            UnaryOperator::Not => format!("not {}", emit(operand, Precedence::Not)),
            UnaryOperator::Neg => format!("-{}", emit(operand, Precedence::Unary)),
            UnaryOperator::Pos => format!("+{}", emit(operand, Precedence::Unary)),
        },
        Expression::BinaryOp { left, op, right } => {
            let own = binary_precedence(*op);
            let (left_context, right_context) = if *op == BinaryOperator::Pow {
                (Precedence::Postfix, Precedence::Unary)
            } else {
                (own, next_tighter(own))
            };
            format!(
                "{} {} {}",
                emit(left, left_context),
                op.symbol(),
                emit(right, right_context)
            )
        }
        Expression::BoolOp { op, values } => {
            let own = precedence(expression);
            let keyword = match op {
                BoolOperator::And => " and ",
                BoolOperator::Or => " or ",
            };
            values
                .iter()
                .map(|value| emit(value, next_tighter(own)))
                .collect::<Vec<_>>()
                .join(keyword)
        }
        Expression::Compare {
            left,
            ops,
            comparators,
        } => {
            let mut rendered = emit(left, Precedence::Additive);
            for (op, comparator) in ops.iter().zip(comparators) {
                rendered.push(' ');
                rendered.push_str(op.symbol());
                rendered.push(' ');
                rendered.push_str(&emit(comparator, Precedence::Additive));
            }
            rendered
        }
        Expression::Yield(value) => emit_yield(value.as_deref()),
    }
}

fn emit_elements(elements: &[Expression]) -> String {
    elements
        .iter()
        .map(|element| emit(element, Precedence::Or))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::parser;

    fn round_trip(source: &str) -> String {
        let program = parser::parse(source).expect("parse failed");
        match program.statements.first() {
            Some(Statement::FunctionDef(def)) => render_function(def),
            other => panic!("expected a function definition, got {other:?}"),
        }
    }

    #[test]
    fn renders_canonical_layout() {
        let source = indoc! {"
            def f(x, y=2):
                c = (1, 2, 5)
                ((a, b), z) = ((1, 2), 3)
                b = [1,2,4]
                s = \"text\"
                for i in range(3):
                    yield i
                if x:
                    return x
                elif y:
                    pass
                else:
                    return
        "};
        let expected = indoc! {"
            def f(x, y=2):
                c = 1, 2, 5
                (a, b), z = (1, 2), 3
                b = [1, 2, 4]
                s = 'text'
                for i in range(3):
                    yield i
                if x:
                    return x
                elif y:
                    pass
                else:
                    return
        "};
        assert_eq!(round_trip(source), expected);
    }

    #[test]
    fn parenthesizes_only_where_needed() {
        let source = indoc! {"
            def f(a, b, c):
                x = (a + b) * c
                y = a - (b - c)
                z = (a - b) - c
                w = -a ** 2
                v = (-a) ** 2
                u = (a ** b) ** c
                t = not (a and b) or c
                s = (a, b)[0]
                r = (yield a)
        "};
        let expected = indoc! {"
            def f(a, b, c):
                x = (a + b) * c
                y = a - (b - c)
                z = a - b - c
                w = -a ** 2
                v = (-a) ** 2
                u = (a ** b) ** c
                t = not (a and b) or c
                s = (a, b)[0]
                r = yield a
        "};
        assert_eq!(round_trip(source), expected);
    }

    #[test]
    fn renders_folded_literals() {
        let negative = Expression::BinaryOp {
            left: Box::new(Expression::Integer(-3)),
            op: BinaryOperator::Pow,
            right: Box::new(Expression::Integer(2)),
        };
        assert_eq!(render_expression(&negative), "(-3) ** 2");
        assert_eq!(render_expression(&Expression::Float(2.0)), "2.0");
        assert_eq!(
            render_expression(&Expression::Tuple(vec![Expression::Integer(1)])),
            "1,"
        );
        assert_eq!(
            render_expression(&Expression::List(vec![Expression::Tuple(vec![
                Expression::Integer(1),
                Expression::Integer(2)
            ])])),
            "[(1, 2)]"
        );
    }

    #[test]
    fn empty_bodies_render_as_pass() {
        let def = FunctionDef {
            name: "f".to_string(),
            params: Vec::new(),
            body: Vec::new(),
        };
        assert_eq!(render_function(&def), "def f():\n    pass\n");
        assert_eq!(
            render_function_at(&def, "    "),
            "    def f():\n        pass\n"
        );
    }
}
