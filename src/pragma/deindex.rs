//! Constant-index elimination.
//!
//! Every `S[k]` whose index folds to an integer is replaced by a synthetic
//! name `S_k` bound to a snapshot of the element, taken when the pass runs.

use log::debug;
use rustc_hash::FxHashSet;

use crate::ast::{Expression, FunctionDef};
use crate::runtime::{Bindings, Value, ops};

use super::env::Environment;
use super::error::{ConfigError, PragmaError};
use super::eval;
use super::rewrite::{Rewriter, assigned_names, mentioned_names, rewrite_function};
use super::{Pass, Rewrite};

#[derive(Debug, Clone)]
pub struct Deindex {
    target: Option<Value>,
    binding_name: String,
    emit_source: bool,
}

impl Deindex {
    /// Replaces constant subscripts of `binding_name`, which must refer to
    /// `target` inside the function.
    pub fn new(target: Value, binding_name: &str) -> Self {
        Self {
            target: Some(target),
            binding_name: binding_name.to_string(),
            emit_source: false,
        }
    }

    /// Like [`Deindex::new`], with the target taken from whatever
    /// `binding_name` holds in the enclosing scope when the pass runs.
    pub fn from_scope(binding_name: &str) -> Self {
        Self {
            target: None,
            binding_name: binding_name.to_string(),
            emit_source: false,
        }
    }

    pub fn with_emit_source(mut self, emit_source: bool) -> Self {
        self.emit_source = emit_source;
        self
    }

    fn resolve_target(&self, scope: &Bindings) -> Result<Value, ConfigError> {
        let target = self
            .target
            .clone()
            .or_else(|| scope.get(&self.binding_name).cloned())
            .ok_or_else(|| ConfigError::MissingOption {
                pass: "deindex".to_string(),
                option: "target".to_string(),
            })?;
        if !matches!(
            target,
            Value::List(_) | Value::Tuple(_) | Value::Range(_) | Value::Str(_)
        ) {
            return Err(ConfigError::NotASequence {
                type_name: target.type_name().to_string(),
            });
        }
        Ok(target)
    }

    fn validate(&self, def: &FunctionDef) -> Result<(), ConfigError> {
        let is_local = def.params.iter().any(|param| param.name == self.binding_name)
            || assigned_names(&def.body).contains(&self.binding_name);
        if is_local {
            return Err(ConfigError::BindingIsLocal {
                name: self.binding_name.clone(),
                function: def.name.clone(),
            });
        }
        Ok(())
    }
}

impl Pass for Deindex {
    fn name(&self) -> &'static str {
        "deindex"
    }

    fn emit_source(&self) -> bool {
        self.emit_source
    }

    fn transform(&self, def: &FunctionDef, scope: &Bindings) -> Result<Rewrite, PragmaError> {
        let target = self.resolve_target(scope)?;
        self.validate(def)?;
        let mut rewriter = DeindexRewriter {
            target: &target,
            binding_name: &self.binding_name,
            function: &def.name,
            mentioned: mentioned_names(def),
            auxiliary: Bindings::new(),
        };
        let mut env = Environment::seed(def, scope, &Bindings::new());
        let function = rewrite_function(&mut rewriter, def, &mut env)?;
        debug!(
            "Replaced subscripts of '{}' with {} names",
            self.binding_name,
            rewriter.auxiliary.len()
        );
        Ok(Rewrite {
            function,
            bindings: rewriter.auxiliary,
        })
    }
}

struct DeindexRewriter<'a> {
    target: &'a Value,
    binding_name: &'a str,
    function: &'a str,
    mentioned: FxHashSet<String>,
    auxiliary: Bindings,
}

impl DeindexRewriter<'_> {
    fn synthesize(&mut self, index: i64) -> Result<String, PragmaError> {
        let len = ops::len(self.target)?;
        let position = ops::normalize_index(index, len)?;
        let name = format!("{}_{position}", self.binding_name);
        if self.auxiliary.contains_key(&name) {
            return Ok(name);
        }
        if self.mentioned.contains(&name) {
            return Err(ConfigError::NameCollision {
                name,
                function: self.function.to_string(),
            }
            .into());
        }
        let snapshot = ops::index(self.target, &Value::Integer(position as i64))?;
        self.auxiliary.insert(name.clone(), snapshot);
        Ok(name)
    }
}

impl Rewriter for DeindexRewriter<'_> {
    fn leave_expression(
        &mut self,
        expression: Expression,
        env: &Environment,
    ) -> Result<Expression, PragmaError> {
        let Expression::Index { object, index } = &expression else {
            return Ok(expression);
        };
        if !matches!(object.as_ref(), Expression::Identifier(name) if name == self.binding_name) {
            return Ok(expression);
        }
        match eval::fold(index, env)?.as_ref().and_then(Value::as_index) {
            Some(index) => Ok(Expression::Identifier(self.synthesize(index)?)),
            None => Ok(expression),
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::ast::Statement;
    use crate::parser;
    use crate::runtime::error::RuntimeError;
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

    fn numbers() -> Value {
        Value::list(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
    }

    #[test]
    fn replaces_constant_subscripts() {
        let def = function(indoc! {"
            def f(x):
                yield v[0]
                yield v[-1] + v[x]
                return v[0]
        "});
        let rewrite = Deindex::new(numbers(), "v")
            .transform(&def, &Bindings::new())
            .expect("deindex failed");
        assert_eq!(
            render_function(&rewrite.function),
            indoc! {"
                def f(x):
                    yield v_0
                    yield v_2 + v[x]
                    return v_0
            "}
        );
        assert_eq!(
            rewrite.bindings.keys().collect::<Vec<_>>(),
            vec!["v_0", "v_2"]
        );
        assert_eq!(rewrite.bindings["v_2"], Value::Integer(3));
    }

    #[test]
    fn snapshots_share_nested_lists() {
        let inner = Value::list(vec![Value::Integer(1)]);
        let target = Value::Tuple(vec![inner.clone()]);
        let def = function(indoc! {"
            def f():
                return v[0]
        "});
        let rewrite = Deindex::new(target, "v")
            .transform(&def, &Bindings::new())
            .expect("deindex failed");
        match (&rewrite.bindings["v_0"], &inner) {
            (Value::List(snapshot), Value::List(original)) => {
                assert!(std::rc::Rc::ptr_eq(snapshot, original))
            }
            other => panic!("expected lists, got {other:?}"),
        }
    }

    #[test]
    fn out_of_bounds_subscripts_abort() {
        let def = function(indoc! {"
            def f():
                return v[3]
        "});
        assert!(matches!(
            Deindex::new(numbers(), "v").transform(&def, &Bindings::new()),
            Err(PragmaError::Evaluation(RuntimeError::IndexOutOfRange { .. }))
        ));
    }

    #[test]
    fn rejects_local_binding_names() {
        for source in ["def f(v):\n    return v[0]\n", "def f():\n    v = 1\n    return v[0]\n"] {
            assert!(matches!(
                Deindex::new(numbers(), "v").transform(&function(source), &Bindings::new()),
                Err(PragmaError::Configuration(ConfigError::BindingIsLocal { .. }))
            ));
        }
    }

    #[test]
    fn rejects_colliding_names() {
        let def = function(indoc! {"
            def f(v_0):
                return v[0] + v_0
        "});
        assert!(matches!(
            Deindex::new(numbers(), "v").transform(&def, &Bindings::new()),
            Err(PragmaError::Configuration(ConfigError::NameCollision { .. }))
        ));
    }

    #[test]
    fn takes_the_target_from_the_enclosing_scope() {
        let def = function("def f():\n    return v[1]\n");
        let mut scope = Bindings::new();
        scope.insert("v".to_string(), numbers());
        let rewrite = Deindex::from_scope("v")
            .transform(&def, &scope)
            .expect("deindex failed");
        assert_eq!(rewrite.bindings["v_1"], Value::Integer(2));

        assert!(matches!(
            Deindex::from_scope("v").transform(&def, &Bindings::new()),
            Err(PragmaError::Configuration(ConfigError::MissingOption { .. }))
        ));
    }

    #[test]
    fn rejects_non_sequences() {
        let def = function("def f():\n    return v[0]\n");
        assert!(matches!(
            Deindex::new(Value::Integer(3), "v").transform(&def, &Bindings::new()),
            Err(PragmaError::Configuration(ConfigError::NotASequence { .. }))
        ));
    }
}
