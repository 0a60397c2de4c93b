//! Loop unrolling.
//!
//! A `for` loop over a sequence known at transform time is replaced by one
//! copy of its body per element, with the loop variable substituted by the
//! element. The substituted element is left unfolded; folding is the job of
//! [`super::CollapseLiterals`].

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ast::{AssignTarget, Expression, FunctionDef, Statement};
use crate::builtins::BuiltinFunction;
use crate::runtime::{Bindings, Value, ops};
use crate::unparse;

use super::env::{Environment, Knowledge};
use super::error::{PragmaError, Unsupported};
use super::eval;
use super::rewrite::{
    Rewriter, assigned_names, has_loop_control, mutated_names, names_read_outside_loops,
    referenced_in, rewrite_block, rewrite_function, stored_names, subexpressions,
    walk_expression, walk_for,
};
use super::{Pass, Rewrite};

#[derive(Debug, Clone, Default)]
pub struct Unroll {
    bindings: Bindings,
    emit_source: bool,
}

impl Unroll {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `name` known as `value` throughout the function.
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

impl Pass for Unroll {
    fn name(&self) -> &'static str {
        "unroll"
    }

    fn emit_source(&self) -> bool {
        self.emit_source
    }

    fn transform(&self, def: &FunctionDef, scope: &Bindings) -> Result<Rewrite, PragmaError> {
        let mut env = Environment::seed(def, scope, &self.bindings);
        let mut rewriter = UnrollRewriter {
            observed: names_read_outside_loops(&def.body),
            ..UnrollRewriter::default()
        };
        let function = rewrite_function(&mut rewriter, def, &mut env)?;
        Ok(Rewrite {
            function,
            bindings: self.bindings.clone(),
        })
    }
}

/// One copy of an unrolled body.
struct Element {
    expression: Expression,
    knowledge: Knowledge,
}

enum Plan {
    Unroll(Vec<Element>),
    Keep(Unsupported),
}

#[derive(Default)]
struct UnrollRewriter {
    /// Loop variables currently replaced by an element expression.
    substitutions: FxHashMap<String, Expression>,
    /// List and tuple displays last assigned to a name, still valid.
    displays: FxHashMap<String, Vec<Expression>>,
    /// Names that may be read after a loop binding them has ended.
    observed: FxHashSet<String>,
}

impl Rewriter for UnrollRewriter {
    fn rewrite_expression(
        &mut self,
        expression: &Expression,
        env: &Environment,
    ) -> Result<Expression, PragmaError> {
        if let Expression::Identifier(name) = expression
            && let Some(substitute) = self.substitutions.get(name)
        {
            return Ok(substitute.clone());
        }
        walk_expression(self, expression, env)
    }

    fn rewrite_for(
        &mut self,
        target: &AssignTarget,
        iterable: &Expression,
        body: &[Statement],
        env: &mut Environment,
    ) -> Result<Vec<Statement>, PragmaError> {
        let rewritten = self.rewrite_expression(iterable, env)?;
        let elements = match self.plan(target, &rewritten, body, env)? {
            Plan::Unroll(elements) => elements,
            Plan::Keep(reason) => {
                debug!(
                    "Keeping loop over `{}`: {reason}",
                    unparse::render_expression(&rewritten)
                );
                return walk_for(self, target, iterable, body, env);
            }
        };
        let AssignTarget::Name(var) = target else {
            return walk_for(self, target, iterable, body, env);
        };

        debug!("Unrolling loop over '{var}' into {} copies", elements.len());
        let previous_knowledge = env.get(var).cloned();
        let previous_substitution = self.substitutions.remove(var);
        let last = elements
            .last()
            .map(|element| (element.expression.clone(), element.knowledge.clone()));
        let mut statements = Vec::new();
        for element in elements {
            env.set(var, element.knowledge);
            self.substitutions.insert(var.clone(), element.expression);
            statements.extend(rewrite_block(self, body, env)?);
        }
        self.substitutions.remove(var);
        if let Some(substitution) = previous_substitution {
            self.substitutions.insert(var.clone(), substitution);
        }
        env.restore(var, previous_knowledge);
        for name in assigned_names(body) {
            env.demote(&name);
            self.on_assign(&name, None);
        }
        statements.retain(|statement| !matches!(statement, Statement::Pass));
        if let Some((expression, knowledge)) = last
            && self.observed.contains(var)
        {
            debug!("Binding '{var}' to its last element after the loop");
            self.on_assign(var, Some(&expression));
            env.set(var, knowledge);
            statements.push(Statement::Assign {
                target: AssignTarget::Name(var.clone()),
                value: expression,
            });
        }
        Ok(statements)
    }

    fn on_assign(&mut self, name: &str, value: Option<&Expression>) {
        self.displays.remove(name);
        self.displays.retain(|_, elements| {
            let mut names = Vec::new();
            for element in elements.iter() {
                referenced_in(element, &mut names);
            }
            !names.iter().any(|referenced| referenced == name)
        });
        match value {
            Some(Expression::List(elements) | Expression::Tuple(elements)) => {
                let mut names = Vec::new();
                for element in elements {
                    referenced_in(element, &mut names);
                }
                if !names.iter().any(|referenced| referenced == name) {
                    self.displays.insert(name.to_string(), elements.clone());
                }
            }
            Some(Expression::Identifier(alias)) => {
                self.displays.remove(alias);
            }
            _ => {}
        }
    }
}

impl UnrollRewriter {
    fn plan(
        &self,
        target: &AssignTarget,
        iterable: &Expression,
        body: &[Statement],
        env: &Environment,
    ) -> Result<Plan, PragmaError> {
        let AssignTarget::Name(var) = target else {
            return Ok(Plan::Keep(Unsupported::TupleTarget));
        };
        if has_loop_control(body) {
            return Ok(Plan::Keep(Unsupported::LoopControl));
        }
        if stored_names(body).contains(var) {
            return Ok(Plan::Keep(Unsupported::ReboundTarget));
        }
        let mutated = mutated_names(body);
        let mut sources = Vec::new();
        referenced_in(iterable, &mut sources);
        if sources.iter().any(|name| mutated.contains(name)) {
            return Ok(Plan::Keep(Unsupported::MutatedIterable));
        }

        match iterable {
            Expression::Dict(_) | Expression::Set(_) => Ok(Plan::Keep(Unsupported::DictOrSet)),
            Expression::Call { callee, .. }
                if matches!(
                    eval::resolve_builtin(callee, env),
                    Some(BuiltinFunction::Reversed | BuiltinFunction::Zip | BuiltinFunction::Enumerate)
                ) =>
            {
                Ok(Plan::Keep(Unsupported::IteratorCombinator))
            }
            Expression::List(elements) | Expression::Tuple(elements) => {
                display_plan(elements, var, body, env)
            }
            Expression::Identifier(name) => match value_plan(iterable, env)? {
                Plan::Keep(reason) => match self.displays.get(name) {
                    Some(elements) => display_plan(elements, var, body, env),
                    None => Ok(Plan::Keep(reason)),
                },
                plan => Ok(plan),
            },
            _ => value_plan(iterable, env),
        }
    }
}

/// Elements of a sequence value known at transform time. Every element must
/// have literal syntax, since a substituted literal is a fresh object.
fn value_plan(iterable: &Expression, env: &Environment) -> Result<Plan, PragmaError> {
    let Some(value) = eval::fold(iterable, env)? else {
        return Ok(Plan::Keep(Unsupported::UnknownIterable));
    };
    if !matches!(
        value,
        Value::List(_) | Value::Tuple(_) | Value::Range(_) | Value::Str(_)
    ) {
        return Ok(Plan::Keep(Unsupported::UnknownIterable));
    }
    let mut elements = Vec::new();
    for element in ops::iterate(&value)? {
        let Some(expression) = element.to_literal() else {
            return Ok(Plan::Keep(Unsupported::NonLiteralElement));
        };
        elements.push(Element {
            expression,
            knowledge: Knowledge::Known(element),
        });
    }
    Ok(Plan::Unroll(elements))
}

/// Elements of a display, substituted as written when they do not fold to a
/// literal.
fn display_plan(
    elements: &[Expression],
    var: &str,
    body: &[Statement],
    env: &Environment,
) -> Result<Plan, PragmaError> {
    let assigned = assigned_names(body);
    let mut plan = Vec::with_capacity(elements.len());
    for element in elements {
        let folded = eval::fold(element, env)?;
        if let Some(literal) = folded.as_ref().and_then(Value::to_literal) {
            plan.push(Element {
                expression: literal,
                knowledge: folded.map_or(Knowledge::Unknown, Knowledge::Known),
            });
            continue;
        }
        let substitutable =
            is_symbolic(element, &assigned) && (!builds_list(element) || !shares_identity(body, var));
        if !substitutable {
            return Ok(Plan::Keep(Unsupported::NonLiteralElement));
        }
        plan.push(Element {
            expression: element.clone(),
            knowledge: folded.map_or(Knowledge::Unknown, Knowledge::Known),
        });
    }
    Ok(Plan::Unroll(plan))
}

/// Whether `expression` evaluates to the same thing wherever it is
/// substituted inside the loop body.
fn is_symbolic(expression: &Expression, assigned: &[String]) -> bool {
    match expression {
        Expression::Call { .. }
        | Expression::Index { .. }
        | Expression::Attribute { .. }
        | Expression::Yield(_)
        | Expression::Dict(_)
        | Expression::Set(_) => false,
        Expression::Identifier(name) => !assigned.contains(name),
        other => subexpressions(other)
            .into_iter()
            .all(|child| is_symbolic(child, assigned)),
    }
}

fn builds_list(expression: &Expression) -> bool {
    matches!(expression, Expression::List(_))
        || subexpressions(expression).into_iter().any(builds_list)
}

/// Whether the body could tell two evaluations of a list display apart.
fn shares_identity(body: &[Statement], var: &str) -> bool {
    mutated_names(body).iter().any(|name| name == var) || exposes_in(body, var)
}

fn exposes_in(body: &[Statement], var: &str) -> bool {
    body.iter().any(|statement| match statement {
        Statement::Assign { value, .. } | Statement::AugAssign { value, .. } => exposes(value, var),
        Statement::Return(Some(value)) => exposes(value, var),
        Statement::For { body, .. } | Statement::While { body, .. } => exposes_in(body, var),
        Statement::If {
            then_body,
            else_body,
            ..
        } => exposes_in(then_body, var) || exposes_in(else_body, var),
        _ => false,
    })
}

fn exposes(expression: &Expression, var: &str) -> bool {
    match expression {
        Expression::Identifier(name) => name == var,
        Expression::List(elements) | Expression::Tuple(elements) => {
            elements.iter().any(|element| exposes(element, var))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::parser;
    use crate::runtime::Opaque;
    use crate::unparse::render_function;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

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

    fn unroll_with(pass: Unroll, scope: &Bindings, source: &str) -> String {
        init();
        let rewrite = pass
            .transform(&function(source), scope)
            .expect("unroll failed");
        render_function(&rewrite.function)
    }

    fn unroll(source: &str) -> String {
        unroll_with(Unroll::new(), &Bindings::new(), source)
    }

    #[test]
    fn substitutes_unfolded_literals() {
        let result = unroll(indoc! {"
            def f():
                for i in range(3):
                    yield i + 0
        "});
        assert_eq!(
            result,
            indoc! {"
                def f():
                    yield 0 + 0
                    yield 1 + 0
                    yield 2 + 0
            "}
        );
    }

    #[test]
    fn unrolls_symbolically_over_unknown_names() {
        let result = unroll(indoc! {"
            def summation(x=0):
                a = [x, x, x]
                v = 0
                for i in a:
                    v += i
                return v
        "});
        assert_eq!(
            result,
            indoc! {"
                def summation(x=0):
                    a = [x, x, x]
                    v = 0
                    v += x
                    v += x
                    v += x
                    return v
            "}
        );
    }

    #[test]
    fn unrolls_nested_known_lists() {
        let result = unroll(indoc! {"
            def f():
                v = 0
                for i in [[1, 2, 3], [4, 5], [6]]:
                    for j in i:
                        v += j
                return v
        "});
        assert_eq!(
            result,
            indoc! {"
                def f():
                    v = 0
                    v += 1
                    v += 2
                    v += 3
                    v += 4
                    v += 5
                    v += 6
                    return v
            "}
        );
    }

    #[test]
    fn keeps_loops_it_cannot_unroll() {
        let sources = [
            indoc! {"
                def f(a):
                    d = reversed(a)
                    for i in d:
                        yield i
            "},
            indoc! {"
                def f():
                    for i in range(3):
                        if i == 1:
                            break
                        yield i
            "},
            indoc! {"
                def f():
                    for a, b in [(1, 2), (3, 4)]:
                        yield a
            "},
            indoc! {"
                def f():
                    for i in range(3):
                        i = i + 1
                        yield i
            "},
            indoc! {"
                def f():
                    for i in zip([1], [2]):
                        yield i
            "},
            indoc! {"
                def f():
                    x = [1, 2]
                    for i in x:
                        x.append(i)
            "},
        ];
        for source in sources {
            assert_eq!(unroll(source), render_function(&function(source)));
        }
    }

    #[test]
    fn keeps_loops_over_values_without_literal_syntax() {
        let mut scope = Bindings::new();
        scope.insert(
            "v".to_string(),
            Value::list(vec![Value::Opaque(Opaque::new("object")), Value::Opaque(Opaque::new("object"))]),
        );
        let source = indoc! {"
            def f():
                for o in v:
                    yield o
        "};
        assert_eq!(
            unroll_with(Unroll::new(), &scope, source),
            render_function(&function(source))
        );
    }

    #[test]
    fn uses_external_bindings() {
        let pass = Unroll::new().with_binding("a", Value::Builtin(BuiltinFunction::Range));
        let result = unroll_with(pass.clone(), &Bindings::new(), indoc! {"
            def f():
                for i in a(2):
                    yield i
        "});
        assert_eq!(
            result,
            indoc! {"
                def f():
                    yield 0
                    yield 1
            "}
        );
        let rewrite = pass
            .transform(&function("def f():\n    pass\n"), &Bindings::new())
            .expect("unroll failed");
        assert!(rewrite.bindings.contains_key("a"));
    }

    #[test]
    fn empty_iterables_vanish() {
        let result = unroll(indoc! {"
            def f(x):
                for i in range(0):
                    x += i
                for c in '':
                    x += 1
        "});
        assert_eq!(result, "def f(x):\n    pass\n");
    }

    #[test]
    fn binds_the_loop_variable_when_read_afterwards() {
        let result = unroll(indoc! {"
            def f(x):
                i = 10
                for i in range(3):
                    x += i
                return x, i
        "});
        assert_eq!(
            result,
            indoc! {"
                def f(x):
                    i = 10
                    x += 0
                    x += 1
                    x += 2
                    i = 2
                    return x, i
            "}
        );
    }

    #[test]
    fn empty_iterables_leave_the_loop_variable_alone() {
        let result = unroll(indoc! {"
            def f():
                i = 10
                for i in []:
                    yield i
                return i
        "});
        assert_eq!(result, "def f():\n    i = 10\n    return i\n");
    }

    #[test]
    fn pass_bodies_unroll_to_nothing() {
        let result = unroll(indoc! {"
            def f():
                for i in range(3):
                    pass
                for j in range(2):
                    pass
                    yield j
                return 1
        "});
        assert_eq!(
            result,
            indoc! {"
                def f():
                    yield 0
                    yield 1
                    return 1
            "}
        );
    }

    #[test]
    fn unrolls_ranges_with_the_most_negative_step() {
        let result = unroll(indoc! {"
            def f():
                for i in range(0, -10, -9223372036854775807 - 1):
                    yield i
        "});
        assert_eq!(result, "def f():\n    yield 0\n");
    }

    #[test]
    fn builtin_failures_abort() {
        init();
        let def = function(indoc! {"
            def f():
                for i in range(0, 3, 0):
                    yield i
        "});
        assert!(matches!(
            Unroll::new().transform(&def, &Bindings::new()),
            Err(PragmaError::Evaluation(_))
        ));
    }
}
