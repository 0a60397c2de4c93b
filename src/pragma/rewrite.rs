//! Generic tree rewriter shared by every pass.
//!
//! A pass implements [`Rewriter`] and overrides only the hooks it needs; the
//! `walk_*` functions rebuild the tree and keep the [`Environment`] in step
//! with what each statement does to the names it touches. Rewriting never
//! mutates the input: every hook receives a borrowed node and returns new
//! nodes.

use log::{trace, warn};
use rustc_hash::FxHashSet;

use crate::ast::{AssignTarget, BinaryOperator, Expression, FunctionDef, Statement};
use crate::builtins::BuiltinFunction;
use crate::runtime::ops;
use crate::unparse;

use super::env::{Environment, Knowledge, is_mutable};
use super::error::PragmaError;
use super::eval;

pub trait Rewriter: Sized {
    /// Rewrites one statement into zero or more statements.
    fn rewrite_statement(
        &mut self,
        statement: &Statement,
        env: &mut Environment,
    ) -> Result<Vec<Statement>, PragmaError> {
        walk_statement(self, statement, env)
    }

    fn rewrite_for(
        &mut self,
        target: &AssignTarget,
        iterable: &Expression,
        body: &[Statement],
        env: &mut Environment,
    ) -> Result<Vec<Statement>, PragmaError> {
        walk_for(self, target, iterable, body, env)
    }

    fn rewrite_if(
        &mut self,
        condition: &Expression,
        then_body: &[Statement],
        else_body: &[Statement],
        env: &mut Environment,
    ) -> Result<Vec<Statement>, PragmaError> {
        walk_if(self, condition, then_body, else_body, env)
    }

    fn rewrite_expression(
        &mut self,
        expression: &Expression,
        env: &Environment,
    ) -> Result<Expression, PragmaError> {
        walk_expression(self, expression, env)
    }

    /// Called on every expression after its children were rewritten.
    fn leave_expression(
        &mut self,
        expression: Expression,
        _env: &Environment,
    ) -> Result<Expression, PragmaError> {
        Ok(expression)
    }

    /// Called whenever `name` is rebound or may have changed. `value` is the
    /// rewritten right-hand side of a plain `name = value`, `None` otherwise.
    fn on_assign(&mut self, _name: &str, _value: Option<&Expression>) {}
}

/// Rewrites the body of `def`, leaving its signature untouched.
pub fn rewrite_function<R: Rewriter>(
    rewriter: &mut R,
    def: &FunctionDef,
    env: &mut Environment,
) -> Result<FunctionDef, PragmaError> {
    Ok(FunctionDef {
        name: def.name.clone(),
        params: def.params.clone(),
        body: rewrite_block(rewriter, &def.body, env)?,
    })
}

pub fn rewrite_block<R: Rewriter>(
    rewriter: &mut R,
    body: &[Statement],
    env: &mut Environment,
) -> Result<Vec<Statement>, PragmaError> {
    let mut rewritten = Vec::with_capacity(body.len());
    for statement in body {
        rewritten.extend(rewriter.rewrite_statement(statement, env)?);
    }
    Ok(rewritten)
}

pub fn walk_statement<R: Rewriter>(
    rewriter: &mut R,
    statement: &Statement,
    env: &mut Environment,
) -> Result<Vec<Statement>, PragmaError> {
    let rewritten = match statement {
        Statement::Assign { target, value } => {
            let value = rewriter.rewrite_expression(value, env)?;
            release(rewriter, &value, env);
            let target = rewrite_target(rewriter, target, env)?;
            match &target {
                AssignTarget::Name(name) => {
                    let folded = eval::fold(&value, env)?;
                    env.observe_assignment(name, folded);
                    rewriter.on_assign(name, Some(&value));
                }
                AssignTarget::Tuple(_) => {
                    for name in target.bound_names() {
                        forget(rewriter, name, env);
                    }
                }
                AssignTarget::Index { object, .. } | AssignTarget::Attribute { object, .. } => {
                    escape_all(rewriter, &value, env);
                    escape_all(rewriter, object, env);
                }
            }
            Statement::Assign { target, value }
        }
        Statement::AugAssign { target, op, value } => {
            let value = rewriter.rewrite_expression(value, env)?;
            release(rewriter, &value, env);
            let target = rewrite_target(rewriter, target, env)?;
            match &target {
                AssignTarget::Name(name) => augment(rewriter, name, *op, &value, env)?,
                AssignTarget::Tuple(_) => {
                    for name in target.bound_names() {
                        forget(rewriter, name, env);
                    }
                }
                AssignTarget::Index { object, .. } | AssignTarget::Attribute { object, .. } => {
                    escape_all(rewriter, &value, env);
                    escape_all(rewriter, object, env);
                }
            }
            Statement::AugAssign {
                target,
                op: *op,
                value,
            }
        }
        Statement::For {
            target,
            iterable,
            body,
        } => return rewriter.rewrite_for(target, iterable, body, env),
        Statement::While { condition, body } => {
            let invalidated = loop_invalidations(None, body);
            invalidate(rewriter, &invalidated, env);
            let condition = rewriter.rewrite_expression(condition, env)?;
            release(rewriter, &condition, env);
            let body = rewrite_block(rewriter, body, env)?;
            invalidate(rewriter, &invalidated, env);
            Statement::While { condition, body }
        }
        Statement::If {
            condition,
            then_body,
            else_body,
        } => return rewriter.rewrite_if(condition, then_body, else_body, env),
        Statement::Return(value) => Statement::Return(
            value
                .as_ref()
                .map(|value| rewriter.rewrite_expression(value, env))
                .transpose()?,
        ),
        Statement::Expr(expression) => {
            let expression = rewriter.rewrite_expression(expression, env)?;
            release(rewriter, &expression, env);
            Statement::Expr(expression)
        }
        Statement::FunctionDef(def) => {
            forget(rewriter, &def.name, env);
            Statement::FunctionDef(def.clone())
        }
        Statement::Pass => Statement::Pass,
        Statement::Break => Statement::Break,
        Statement::Continue => Statement::Continue,
    };
    Ok(vec![rewritten])
}

/// Keeps the loop and walks its body once with every name the body may
/// change already demoted.
pub fn walk_for<R: Rewriter>(
    rewriter: &mut R,
    target: &AssignTarget,
    iterable: &Expression,
    body: &[Statement],
    env: &mut Environment,
) -> Result<Vec<Statement>, PragmaError> {
    let iterable = rewriter.rewrite_expression(iterable, env)?;
    release(rewriter, &iterable, env);
    let invalidated = loop_invalidations(Some(target), body);
    invalidate(rewriter, &invalidated, env);
    let body = rewrite_block(rewriter, body, env)?;
    invalidate(rewriter, &invalidated, env);
    Ok(vec![Statement::For {
        target: target.clone(),
        iterable,
        body,
    }])
}

/// Walks both branches on copies of the environment and demotes anything
/// either branch may have changed.
pub fn walk_if<R: Rewriter>(
    rewriter: &mut R,
    condition: &Expression,
    then_body: &[Statement],
    else_body: &[Statement],
    env: &mut Environment,
) -> Result<Vec<Statement>, PragmaError> {
    let condition = rewriter.rewrite_expression(condition, env)?;
    release(rewriter, &condition, env);

    let mut then_env = env.clone();
    let then_body = rewrite_block(rewriter, then_body, &mut then_env)?;
    let mut else_env = env.clone();
    let else_body = rewrite_block(rewriter, else_body, &mut else_env)?;

    let mut changed = env.join(&[then_env, else_env]);
    for name in assigned_names(&then_body)
        .into_iter()
        .chain(assigned_names(&else_body))
    {
        if !changed.contains(&name) {
            changed.push(name);
        }
    }
    for name in &changed {
        forget(rewriter, name, env);
    }
    Ok(vec![Statement::If {
        condition,
        then_body,
        else_body,
    }])
}

/// Rebuilds `expression` from rewritten children, then hands it to
/// [`Rewriter::leave_expression`].
pub fn walk_expression<R: Rewriter>(
    rewriter: &mut R,
    expression: &Expression,
    env: &Environment,
) -> Result<Expression, PragmaError> {
    let rebuilt = match expression {
        Expression::Integer(_)
        | Expression::Float(_)
        | Expression::Boolean(_)
        | Expression::String(_)
        | Expression::None
        | Expression::Identifier(_) => expression.clone(),
        Expression::List(elements) => Expression::List(rewrite_all(rewriter, elements, env)?),
        Expression::Tuple(elements) => Expression::Tuple(rewrite_all(rewriter, elements, env)?),
        Expression::Set(elements) => Expression::Set(rewrite_all(rewriter, elements, env)?),
        Expression::Dict(entries) => {
            let mut rewritten = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                rewritten.push((
                    rewriter.rewrite_expression(key, env)?,
                    rewriter.rewrite_expression(value, env)?,
                ));
            }
            Expression::Dict(rewritten)
        }
        Expression::Index { object, index } => Expression::Index {
            object: rewrite_boxed(rewriter, object, env)?,
            index: rewrite_boxed(rewriter, index, env)?,
        },
        Expression::Attribute { object, name } => Expression::Attribute {
            object: rewrite_boxed(rewriter, object, env)?,
            name: name.clone(),
        },
        Expression::UnaryOp { op, operand } => Expression::UnaryOp {
            op: *op,
            operand: rewrite_boxed(rewriter, operand, env)?,
        },
        Expression::BinaryOp { left, op, right } => Expression::BinaryOp {
            left: rewrite_boxed(rewriter, left, env)?,
            op: *op,
            right: rewrite_boxed(rewriter, right, env)?,
        },
        Expression::BoolOp { op, values } => Expression::BoolOp {
            op: *op,
            values: rewrite_all(rewriter, values, env)?,
        },
        Expression::Compare {
            left,
            ops,
            comparators,
        } => Expression::Compare {
            left: rewrite_boxed(rewriter, left, env)?,
            ops: ops.clone(),
            comparators: rewrite_all(rewriter, comparators, env)?,
        },
        Expression::Call { callee, args } => Expression::Call {
            callee: rewrite_boxed(rewriter, callee, env)?,
            args: rewrite_all(rewriter, args, env)?,
        },
        Expression::Yield(value) => Expression::Yield(
            value
                .as_deref()
                .map(|value| rewrite_boxed(rewriter, value, env))
                .transpose()?,
        ),
    };
    rewriter.leave_expression(rebuilt, env)
}

fn rewrite_boxed<R: Rewriter>(
    rewriter: &mut R,
    child: &Expression,
    env: &Environment,
) -> Result<Box<Expression>, PragmaError> {
    Ok(Box::new(rewriter.rewrite_expression(child, env)?))
}

fn rewrite_all<R: Rewriter>(
    rewriter: &mut R,
    expressions: &[Expression],
    env: &Environment,
) -> Result<Vec<Expression>, PragmaError> {
    expressions
        .iter()
        .map(|expression| rewriter.rewrite_expression(expression, env))
        .collect()
}

/// Rewrites the expressions inside a target. A bare name being stored into
/// is left as written, so `x[0] = ..` never turns into a literal or a
/// synthetic name.
fn rewrite_target<R: Rewriter>(
    rewriter: &mut R,
    target: &AssignTarget,
    env: &Environment,
) -> Result<AssignTarget, PragmaError> {
    Ok(match target {
        AssignTarget::Name(name) => AssignTarget::Name(name.clone()),
        AssignTarget::Tuple(targets) => AssignTarget::Tuple(
            targets
                .iter()
                .map(|target| rewrite_target(rewriter, target, env))
                .collect::<Result<_, _>>()?,
        ),
        AssignTarget::Index { object, index } => AssignTarget::Index {
            object: rewrite_container(rewriter, object, env)?,
            index: rewriter.rewrite_expression(index, env)?,
        },
        AssignTarget::Attribute { object, name } => AssignTarget::Attribute {
            object: rewrite_container(rewriter, object, env)?,
            name: name.clone(),
        },
    })
}

fn rewrite_container<R: Rewriter>(
    rewriter: &mut R,
    object: &Expression,
    env: &Environment,
) -> Result<Expression, PragmaError> {
    match object {
        Expression::Identifier(_) => Ok(object.clone()),
        _ => rewriter.rewrite_expression(object, env),
    }
}

/// `name op= value`. A known list is extended in place, so everything
/// sharing it is demoted; other known values are recomputed.
fn augment<R: Rewriter>(
    rewriter: &mut R,
    name: &str,
    op: BinaryOperator,
    value: &Expression,
    env: &mut Environment,
) -> Result<(), PragmaError> {
    let current = env.known(name).cloned();
    if let Some(list) = current.as_ref().filter(|current| is_mutable(current)) {
        for demoted in env.demote_sharing(list) {
            rewriter.on_assign(&demoted, None);
        }
        forget(rewriter, name, env);
        return Ok(());
    }
    let operand = eval::fold(value, env)?;
    let updated = match (current, operand) {
        (Some(current), Some(operand)) => match ops::binary(op, &current, &operand) {
            Ok(updated) => Some(updated),
            Err(error) => {
                warn!(
                    "Cannot fold `{name} {}= {}`: {error}",
                    op.symbol(),
                    unparse::render_expression(value)
                );
                None
            }
        },
        _ => None,
    };
    env.observe_assignment(name, updated);
    rewriter.on_assign(name, None);
    Ok(())
}

fn forget<R: Rewriter>(rewriter: &mut R, name: &str, env: &mut Environment) {
    env.demote(name);
    rewriter.on_assign(name, None);
}

/// Names a loop body may change, split by how they must be invalidated.
struct LoopInvalidations {
    assigned: Vec<String>,
    mutated: Vec<String>,
}

fn loop_invalidations(target: Option<&AssignTarget>, body: &[Statement]) -> LoopInvalidations {
    let mut assigned = target
        .map(|target| {
            target
                .bound_names()
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    for name in assigned_names(body) {
        if !assigned.contains(&name) {
            assigned.push(name);
        }
    }
    LoopInvalidations {
        assigned,
        mutated: mutated_names(body),
    }
}

fn invalidate<R: Rewriter>(rewriter: &mut R, invalidated: &LoopInvalidations, env: &mut Environment) {
    for name in &invalidated.assigned {
        forget(rewriter, name, env);
    }
    for name in &invalidated.mutated {
        escape(rewriter, name, env);
    }
}

/// Demotes what `expression` hands to code the transform cannot see:
/// arguments of calls that are not whitelisted builtins, method receivers
/// and yielded values.
fn release<R: Rewriter>(rewriter: &mut R, expression: &Expression, env: &mut Environment) {
    let mut escaped = Vec::new();
    escaping_names(expression, env, &mut escaped);
    for name in escaped {
        escape(rewriter, &name, env);
    }
}

fn escape_all<R: Rewriter>(rewriter: &mut R, expression: &Expression, env: &mut Environment) {
    let mut names = Vec::new();
    referenced_in(expression, &mut names);
    for name in names {
        escape(rewriter, &name, env);
    }
}

fn escape<R: Rewriter>(rewriter: &mut R, name: &str, env: &mut Environment) {
    match env.lookup(name) {
        Knowledge::Known(value) if is_mutable(&value) => {
            trace!("'{name}' escapes");
            for demoted in env.demote_sharing(&value) {
                rewriter.on_assign(&demoted, None);
            }
        }
        Knowledge::Known(_) => {}
        Knowledge::Unknown => rewriter.on_assign(name, None),
    }
}

fn escaping_names(expression: &Expression, env: &Environment, escaped: &mut Vec<String>) {
    match expression {
        Expression::Call { callee, args } => {
            let whitelisted = eval::resolve_builtin(callee, env).is_some_and(|builtin| builtin.is_pure());
            if let Expression::Attribute { object, .. } = callee.as_ref() {
                referenced_in(object, escaped);
            }
            for arg in args {
                if whitelisted {
                    escaping_names(arg, env, escaped);
                } else {
                    referenced_in(arg, escaped);
                }
            }
            escaping_names(callee, env, escaped);
        }
        Expression::Yield(Some(value)) => referenced_in(value, escaped),
        other => {
            for child in subexpressions(other) {
                escaping_names(child, env, escaped);
            }
        }
    }
}

/// Syntactic over-approximation of the names a loop body may mutate in place.
pub fn mutated_names(body: &[Statement]) -> Vec<String> {
    let mut names = Vec::new();
    for statement in body {
        match statement {
            Statement::Assign { target, value } | Statement::AugAssign { target, value, .. } => {
                target_roots(target, &mut names);
                if matches!(target, AssignTarget::Index { .. } | AssignTarget::Attribute { .. }) {
                    referenced_in(value, &mut names);
                }
                syntactic_escapes(value, &mut names);
            }
            Statement::For { iterable, body, .. } => {
                syntactic_escapes(iterable, &mut names);
                names.extend(mutated_names(body));
            }
            Statement::While { condition, body } => {
                syntactic_escapes(condition, &mut names);
                names.extend(mutated_names(body));
            }
            Statement::If {
                condition,
                then_body,
                else_body,
            } => {
                syntactic_escapes(condition, &mut names);
                names.extend(mutated_names(then_body));
                names.extend(mutated_names(else_body));
            }
            Statement::Return(Some(expression)) | Statement::Expr(expression) => {
                syntactic_escapes(expression, &mut names)
            }
            _ => {}
        }
    }
    names.sort();
    names.dedup();
    names
}

fn target_roots(target: &AssignTarget, names: &mut Vec<String>) {
    match target {
        AssignTarget::Name(_) => {}
        AssignTarget::Tuple(targets) => {
            for target in targets {
                target_roots(target, names);
            }
        }
        AssignTarget::Index { object, .. } | AssignTarget::Attribute { object, .. } => {
            referenced_in(object, names)
        }
    }
}

fn syntactic_escapes(expression: &Expression, names: &mut Vec<String>) {
    match expression {
        Expression::Call { callee, args } => {
            let whitelisted = matches!(
                callee.as_ref(),
                Expression::Identifier(name)
                    if BuiltinFunction::from_name(name).is_some_and(BuiltinFunction::is_pure)
            );
            if let Expression::Attribute { object, .. } = callee.as_ref() {
                referenced_in(object, names);
            }
            for arg in args {
                if whitelisted {
                    syntactic_escapes(arg, names);
                } else {
                    referenced_in(arg, names);
                }
            }
            syntactic_escapes(callee, names);
        }
        Expression::Yield(Some(value)) => referenced_in(value, names),
        other => {
            for child in subexpressions(other) {
                syntactic_escapes(child, names);
            }
        }
    }
}

/// Direct child expressions, in evaluation order.
pub fn subexpressions(expression: &Expression) -> Vec<&Expression> {
    match expression {
        Expression::Integer(_)
        | Expression::Float(_)
        | Expression::Boolean(_)
        | Expression::String(_)
        | Expression::None
        | Expression::Identifier(_)
        | Expression::Yield(None) => Vec::new(),
        Expression::List(elements)
        | Expression::Tuple(elements)
        | Expression::Set(elements)
        | Expression::BoolOp {
            values: elements, ..
        } => elements.iter().collect(),
        Expression::Dict(entries) => entries
            .iter()
            .flat_map(|(key, value)| [key, value])
            .collect(),
        Expression::Index { object, index } => vec![object, index],
        Expression::Attribute { object, .. } => vec![object],
        Expression::UnaryOp { operand, .. } => vec![operand],
        Expression::BinaryOp { left, right, .. } => vec![left, right],
        Expression::Compare {
            left, comparators, ..
        } => std::iter::once(left.as_ref()).chain(comparators).collect(),
        Expression::Call { callee, args } => std::iter::once(callee.as_ref()).chain(args).collect(),
        Expression::Yield(Some(value)) => vec![value],
    }
}

/// Every identifier read by `expression`, in order of appearance.
pub fn referenced_in(expression: &Expression, names: &mut Vec<String>) {
    if let Expression::Identifier(name) = expression {
        if !names.contains(name) {
            names.push(name.clone());
        }
        return;
    }
    for child in subexpressions(expression) {
        referenced_in(child, names);
    }
}

/// Names bound anywhere in `body` by assignment, loop targets or nested
/// definitions. Nested function bodies are not searched.
pub fn assigned_names(body: &[Statement]) -> Vec<String> {
    let mut names = Vec::new();
    collect_assigned(body, &mut names);
    names
}

fn collect_assigned(body: &[Statement], names: &mut Vec<String>) {
    let mut add = |name: &str, names: &mut Vec<String>| {
        if !names.iter().any(|seen| seen == name) {
            names.push(name.to_string());
        }
    };
    for statement in body {
        match statement {
            Statement::Assign { target, .. } | Statement::AugAssign { target, .. } => {
                for name in target.bound_names() {
                    add(name, names);
                }
            }
            Statement::For { target, body, .. } => {
                for name in target.bound_names() {
                    add(name, names);
                }
                collect_assigned(body, names);
            }
            Statement::While { body, .. } => collect_assigned(body, names),
            Statement::If {
                then_body,
                else_body,
                ..
            } => {
                collect_assigned(then_body, names);
                collect_assigned(else_body, names);
            }
            Statement::FunctionDef(def) => add(&def.name, names),
            Statement::Return(_) | Statement::Pass | Statement::Break | Statement::Continue | Statement::Expr(_) => {}
        }
    }
}

/// Names `body` rebinds or stores into through a subscript or attribute.
pub fn stored_names(body: &[Statement]) -> Vec<String> {
    let mut names = assigned_names(body);
    collect_store_roots(body, &mut names);
    names
}

fn collect_store_roots(body: &[Statement], names: &mut Vec<String>) {
    for statement in body {
        match statement {
            Statement::Assign { target, .. } | Statement::AugAssign { target, .. } => {
                target_roots(target, names)
            }
            Statement::For { body, .. } | Statement::While { body, .. } => {
                collect_store_roots(body, names)
            }
            Statement::If {
                then_body,
                else_body,
                ..
            } => {
                collect_store_roots(then_body, names);
                collect_store_roots(else_body, names);
            }
            _ => {}
        }
    }
}

/// Every name a function mentions: parameters, bound names and reads,
/// including those inside nested definitions.
pub fn mentioned_names(def: &FunctionDef) -> FxHashSet<String> {
    let mut names = FxHashSet::default();
    names.insert(def.name.clone());
    for param in &def.params {
        names.insert(param.name.clone());
        if let Some(default) = &param.default {
            collect_reads(default, &mut names);
        }
    }
    collect_mentions(&def.body, &mut names);
    names
}

fn collect_mentions(body: &[Statement], names: &mut FxHashSet<String>) {
    for statement in body {
        match statement {
            Statement::Assign { target, value } | Statement::AugAssign { target, value, .. } => {
                mention_target(target, names);
                collect_reads(value, names);
            }
            Statement::For {
                target,
                iterable,
                body,
            } => {
                mention_target(target, names);
                collect_reads(iterable, names);
                collect_mentions(body, names);
            }
            Statement::While { condition, body } => {
                collect_reads(condition, names);
                collect_mentions(body, names);
            }
            Statement::If {
                condition,
                then_body,
                else_body,
            } => {
                collect_reads(condition, names);
                collect_mentions(then_body, names);
                collect_mentions(else_body, names);
            }
            Statement::FunctionDef(def) => names.extend(mentioned_names(def)),
            Statement::Return(Some(expression)) | Statement::Expr(expression) => {
                collect_reads(expression, names)
            }
            Statement::Return(None) | Statement::Pass | Statement::Break | Statement::Continue => {}
        }
    }
}

fn mention_target(target: &AssignTarget, names: &mut FxHashSet<String>) {
    match target {
        AssignTarget::Name(name) => {
            names.insert(name.clone());
        }
        AssignTarget::Tuple(targets) => {
            for target in targets {
                mention_target(target, names);
            }
        }
        AssignTarget::Index { object, index } => {
            collect_reads(object, names);
            collect_reads(index, names);
        }
        AssignTarget::Attribute { object, .. } => collect_reads(object, names),
    }
}

/// Names read anywhere except inside the body of a `for` loop binding them.
/// A loop variable in this set may be observed after its loop ends.
pub fn names_read_outside_loops(body: &[Statement]) -> FxHashSet<String> {
    let mut names = FxHashSet::default();
    collect_outer_reads(body, &mut Vec::new(), &mut names);
    names
}

fn collect_outer_reads(body: &[Statement], bound: &mut Vec<String>, names: &mut FxHashSet<String>) {
    for statement in body {
        match statement {
            Statement::Assign { target, value } => {
                read_unbound(value, bound, names);
                if let AssignTarget::Index { .. } | AssignTarget::Attribute { .. } = target {
                    target_reads_unbound(target, bound, names);
                }
            }
            Statement::AugAssign { target, value, .. } => {
                read_unbound(value, bound, names);
                target_reads_unbound(target, bound, names);
            }
            Statement::For {
                target,
                iterable,
                body,
            } => {
                read_unbound(iterable, bound, names);
                let depth = bound.len();
                bound.extend(target.bound_names().into_iter().map(str::to_string));
                collect_outer_reads(body, bound, names);
                bound.truncate(depth);
            }
            Statement::While { condition, body } => {
                read_unbound(condition, bound, names);
                collect_outer_reads(body, bound, names);
            }
            Statement::If {
                condition,
                then_body,
                else_body,
            } => {
                read_unbound(condition, bound, names);
                collect_outer_reads(then_body, bound, names);
                collect_outer_reads(else_body, bound, names);
            }
            Statement::FunctionDef(def) => names.extend(
                mentioned_names(def)
                    .into_iter()
                    .filter(|name| !bound.contains(name)),
            ),
            Statement::Return(Some(expression)) | Statement::Expr(expression) => {
                read_unbound(expression, bound, names)
            }
            Statement::Return(None) | Statement::Pass | Statement::Break | Statement::Continue => {}
        }
    }
}

fn read_unbound(expression: &Expression, bound: &[String], names: &mut FxHashSet<String>) {
    let mut reads = FxHashSet::default();
    collect_reads(expression, &mut reads);
    names.extend(reads.into_iter().filter(|name| !bound.contains(name)));
}

/// Reads performed by a store; an augmented name target reads itself.
fn target_reads_unbound(target: &AssignTarget, bound: &[String], names: &mut FxHashSet<String>) {
    let mut reads = FxHashSet::default();
    mention_target(target, &mut reads);
    names.extend(reads.into_iter().filter(|name| !bound.contains(name)));
}

fn collect_reads(expression: &Expression, names: &mut FxHashSet<String>) {
    if let Expression::Identifier(name) = expression {
        names.insert(name.clone());
    }
    for child in subexpressions(expression) {
        collect_reads(child, names);
    }
}

/// Whether `break` or `continue` applies to the loop owning `body`.
pub fn has_loop_control(body: &[Statement]) -> bool {
    body.iter().any(|statement| match statement {
        Statement::Break | Statement::Continue => true,
        Statement::If {
            then_body,
            else_body,
            ..
        } => has_loop_control(then_body) || has_loop_control(else_body),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::parser;
    use crate::runtime::{Bindings, Value};

    struct Identity;

    impl Rewriter for Identity {}

    /// Records every name reported through `on_assign`.
    #[derive(Default)]
    struct Recorder {
        assigned: Vec<(String, bool)>,
    }

    impl Rewriter for Recorder {
        fn on_assign(&mut self, name: &str, value: Option<&Expression>) {
            self.assigned.push((name.to_string(), value.is_some()));
        }
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

    fn walk<R: Rewriter>(rewriter: &mut R, source: &str) -> (FunctionDef, Environment) {
        let def = function(source);
        let mut env = Environment::seed(&def, &Bindings::new(), &Bindings::new());
        let rewritten = rewrite_function(rewriter, &def, &mut env).expect("rewrite failed");
        (rewritten, env)
    }

    #[test]
    fn identity_rewrite_preserves_the_tree() {
        let source = indoc! {"
            def f(x, y=2):
                a = [x, 1]
                for i in range(3):
                    if i > x:
                        a.append(i)
                    else:
                        continue
                while a:
                    a.pop()
                yield a.count(x)
                return {1: x}, {2}, a[0]
        "};
        let def = function(source);
        let (rewritten, _) = walk(&mut Identity, source);
        assert_eq!(rewritten, def);
    }

    #[test]
    fn straight_line_assignments_become_known() {
        let (_, env) = walk(&mut Identity, indoc! {"
            def f(x):
                a = 1
                b = a + 2
                c = x + 1
                d = a, b
        "});
        assert_eq!(env.known("b"), Some(&Value::Integer(3)));
        assert_eq!(env.lookup("c"), Knowledge::Unknown);
        assert_eq!(
            env.known("d"),
            Some(&Value::Tuple(vec![Value::Integer(1), Value::Integer(3)]))
        );
    }

    #[test]
    fn loops_and_branches_demote_assigned_names() {
        let (_, env) = walk(&mut Identity, indoc! {"
            def f(x):
                a = 1
                b = 2
                c = 3
                for i in range(3):
                    a = a + 1
                if x:
                    b = 2
                n = 0
                while n < 3:
                    n += 1
        "});
        assert_eq!(env.lookup("a"), Knowledge::Unknown);
        assert_eq!(env.lookup("b"), Knowledge::Unknown);
        assert_eq!(env.lookup("i"), Knowledge::Unknown);
        assert_eq!(env.lookup("n"), Knowledge::Unknown);
        assert_eq!(env.known("c"), Some(&Value::Integer(3)));
    }

    #[test]
    fn escaping_lists_are_demoted() {
        let (_, env) = walk(&mut Identity, indoc! {"
            def f(g):
                a = [1, 2]
                b = a
                c = [3]
                n = len(c)
                g(a)
                t = 1, 2
                u = 5
                u += 2
                p, q = 1, 2
        "});
        assert_eq!(env.lookup("a"), Knowledge::Unknown);
        assert_eq!(env.lookup("b"), Knowledge::Unknown);
        assert!(env.known("c").is_some());
        assert_eq!(env.known("n"), Some(&Value::Integer(1)));
        assert!(env.known("t").is_some());
        assert_eq!(env.known("u"), Some(&Value::Integer(7)));
        assert_eq!(env.lookup("p"), Knowledge::Unknown);
    }

    #[test]
    fn loop_bodies_see_mutated_containers_as_unknown() {
        let (_, env) = walk(&mut Identity, indoc! {"
            def f(x):
                a = [1]
                for i in x:
                    a[0] = a[0] + 1
        "});
        assert_eq!(env.lookup("a"), Knowledge::Unknown);
    }

    #[test]
    fn pure_builtin_arguments_are_not_mutated() {
        let def = function(indoc! {"
            def f(xs, ys, g):
                n = len(xs) + abs(min(xs))
                g(ys)
        "});
        assert_eq!(mutated_names(&def.body), vec!["n", "ys"]);
    }

    #[test]
    fn finds_loop_variables_read_after_their_loop() {
        let def = function(indoc! {"
            def f(x):
                for i in range(3):
                    for j in range(i):
                        x += i + j
                for k in range(2):
                    pass
                return x + k
        "});
        let mut names: Vec<_> = names_read_outside_loops(&def.body).into_iter().collect();
        names.sort();
        assert_eq!(names, vec!["k", "range", "x"]);
    }

    #[test]
    fn reports_assignments_to_the_rewriter() {
        let mut recorder = Recorder::default();
        walk(&mut recorder, indoc! {"
            def f(x):
                a = [x]
                a.append(1)
                (b, c), d = (1, 2), 3
        "});
        assert!(recorder.assigned.contains(&("a".to_string(), true)));
        assert!(recorder.assigned.contains(&("a".to_string(), false)));
        assert!(recorder.assigned.contains(&("b".to_string(), false)));
        assert!(recorder.assigned.contains(&("d".to_string(), false)));
    }

    #[test]
    fn collects_names() {
        let def = function(indoc! {"
            def f(x, y=z):
                a = 1
                for i in w:
                    if i:
                        b, c = i
                        break
                return v[0]
        "});
        assert_eq!(assigned_names(&def.body), vec!["a", "i", "b", "c"]);
        let mentioned = mentioned_names(&def);
        for name in ["f", "x", "y", "z", "a", "i", "w", "b", "c", "v"] {
            assert!(mentioned.contains(name), "missing {name}");
        }
        match &def.body[1] {
            Statement::For { body, .. } => assert!(has_loop_control(body)),
            other => panic!("expected a loop, got {other:?}"),
        }
        assert!(!has_loop_control(&def.body));
    }
}
