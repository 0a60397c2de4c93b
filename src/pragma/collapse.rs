//! Constant folding.
//!
//! Every expression that folds to a value with literal syntax is replaced by
//! that literal, and an `if` whose condition folds is replaced by the branch
//! it takes.

use log::debug;

use crate::ast::{Expression, FunctionDef, Statement};
use crate::runtime::{Bindings, Value};

use super::env::Environment;
use super::error::PragmaError;
use super::eval;
use super::rewrite::{Rewriter, rewrite_block, rewrite_function, walk_if};
use super::{Pass, Rewrite};

#[derive(Debug, Clone, Default)]
pub struct CollapseLiterals {
    bindings: Bindings,
    emit_source: bool,
}

impl CollapseLiterals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binding(mut self, name: &str, value: Value) -> Self {
        self.bindings.insert(name.to_string(), value);
        self
    }

    pub fn with_bindings(mut self, bindings: Bindings) -> Self {
        self.bindings.extend(bindings);
        self
    }

    pub fn with_emit_source(mut self, emit_source: bool) -> Self {
        self.emit_source = emit_source;
        self
    }
}

impl Pass for CollapseLiterals {
    fn name(&self) -> &'static str {
        "collapse_literals"
    }

    fn emit_source(&self) -> bool {
        self.emit_source
    }

    fn transform(&self, def: &FunctionDef, scope: &Bindings) -> Result<Rewrite, PragmaError> {
        let mut env = Environment::seed(def, scope, &self.bindings);
        let function = rewrite_function(&mut CollapseRewriter, def, &mut env)?;
        Ok(Rewrite {
            function,
            bindings: self.bindings.clone(),
        })
    }
}

struct CollapseRewriter;

impl Rewriter for CollapseRewriter {
    fn rewrite_if(
        &mut self,
        condition: &Expression,
        then_body: &[Statement],
        else_body: &[Statement],
        env: &mut Environment,
    ) -> Result<Vec<Statement>, PragmaError> {
        let rewritten = self.rewrite_expression(condition, env)?;
        match eval::fold(&rewritten, env)? {
            Some(value) => {
                let taken = if value.is_truthy() { then_body } else { else_body };
                debug!(
                    "Erasing conditional, condition is always {}",
                    if value.is_truthy() { "true" } else { "false" }
                );
                rewrite_block(self, taken, env)
            }
            None => walk_if(self, condition, then_body, else_body, env),
        }
    }

    fn leave_expression(
        &mut self,
        expression: Expression,
        env: &Environment,
    ) -> Result<Expression, PragmaError> {
        match expression {
            Expression::Integer(_)
            | Expression::Float(_)
            | Expression::Boolean(_)
            | Expression::String(_)
            | Expression::None
            | Expression::List(_)
            | Expression::Dict(_)
            | Expression::Set(_)
            | Expression::Yield(_) => Ok(expression),
            _ => Ok(eval::fold(&expression, env)?
                .and_then(|value| value.to_literal())
                .unwrap_or(expression)),
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::parser;
    use crate::runtime::Opaque;
    use crate::unparse::render_function;

    fn function(source: &str) -> FunctionDef {
        match parser::parse(source)
            .expect("parse failed")
            .statements
            .into_iter()
            .next()
        {
            Some(Statement::FunctionDef(def)) => def,
            other => panic!("expected a function definition, got {other:?}"),
        }
    }

    fn collapse_with(pass: &CollapseLiterals, scope: &Bindings, source: &str) -> String {
        let _ = env_logger::builder().is_test(true).try_init();
        let rewrite = pass
            .transform(&function(source), scope)
            .expect("collapse failed");
        render_function(&rewrite.function)
    }

    fn collapse(source: &str) -> String {
        collapse_with(&CollapseLiterals::new(), &Bindings::new(), source)
    }

    #[test]
    fn folds_arithmetic() {
        assert_eq!(
            collapse(indoc! {"
                def f():
                    return 1 + 1
            "}),
            "def f():\n    return 2\n"
        );
    }

    #[test]
    fn folds_known_subscripts_but_not_lists() {
        assert_eq!(
            collapse(indoc! {"
                def f():
                    x = [1, 2, 3]
                    y = x
                    return x[0] + len(x)
            "}),
            indoc! {"
                def f():
                    x = [1, 2, 3]
                    y = x
                    return 4
            "}
        );
    }

    #[test]
    fn leaves_opaque_values_alone() {
        let mut scope = Bindings::new();
        scope.insert(
            "v".to_string(),
            Value::list(vec![Value::Opaque(Opaque::new("object")), Value::Opaque(Opaque::new("object"))]),
        );
        let source = indoc! {"
            def f():
                return v[0]
        "};
        assert_eq!(
            collapse_with(&CollapseLiterals::new(), &scope, source),
            "def f():\n    return v[0]\n"
        );
    }

    #[test]
    fn invalid_operations_are_left_in_place() {
        assert_eq!(
            collapse(indoc! {"
                def f():
                    return 1 + '2'
            "}),
            "def f():\n    return 1 + '2'\n"
        );
    }

    #[test]
    fn erases_constant_conditionals() {
        assert_eq!(
            collapse(indoc! {"
                def f():
                    x = 0
                    if x <= 0:
                        x = 1
                    return x
            "}),
            indoc! {"
                def f():
                    x = 0
                    x = 1
                    return 1
            "}
        );
    }

    #[test]
    fn erases_elif_chains_with_external_bindings() {
        let source = indoc! {"
            def f():
                if x == 0:
                    return 'a'
                elif x == 1:
                    return 'b'
                else:
                    return 'c'
        "};
        for (x, expected) in [(0, "'a'"), (1, "'b'"), (2, "'c'")] {
            let pass = CollapseLiterals::new().with_binding("x", Value::Integer(x));
            assert_eq!(
                collapse_with(&pass, &Bindings::new(), source),
                format!("def f():\n    return {expected}\n")
            );
        }
    }

    #[test]
    fn unknown_conditions_demote_branch_assignments() {
        assert_eq!(
            collapse(indoc! {"
                def f(y):
                    x = 0
                    if y:
                        x = 1
                    return x + 1
            "}),
            indoc! {"
                def f(y):
                    x = 0
                    if y:
                        x = 1
                    return x + 1
            "}
        );
    }

    #[test]
    fn parameters_with_defaults_stay_symbolic() {
        let source = indoc! {"
            def f(x=0):
                return x + 1
        "};
        assert_eq!(collapse(source), render_function(&function(source)));
    }

    #[test]
    fn is_idempotent() {
        let source = indoc! {"
            def f(y):
                a = 2 * 3
                b = (a, 'q')
                for i in range(a):
                    y += i * a
                while y > 100:
                    y = y // 2
                return b, y, -a ** 2
        "};
        let once = collapse(source);
        let twice = collapse(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn builtin_failures_abort() {
        let def = function(indoc! {"
            def f():
                return len(5)
        "});
        assert!(matches!(
            CollapseLiterals::new().transform(&def, &Bindings::new()),
            Err(PragmaError::Evaluation(_))
        ));
    }
}
