use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use crate::ast::FunctionDef;
use crate::runtime::value::ListRef;
use crate::runtime::{Bindings, Value, ops};

/// What the transform knows about a name at one program point.
#[derive(Debug, Clone, PartialEq)]
pub enum Knowledge {
    Known(Value),
    Unknown,
}

impl Knowledge {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Knowledge::Known(value) => Some(value),
            Knowledge::Unknown => None,
        }
    }

    fn same_as(&self, other: &Knowledge) -> bool {
        match (self, other) {
            (Knowledge::Unknown, Knowledge::Unknown) => true,
            (Knowledge::Known(a), Knowledge::Known(b)) => {
                a.type_name() == b.type_name() && ops::identical(a, b)
            }
            _ => false,
        }
    }
}

pub type Frame = IndexMap<String, Knowledge>;

/// Scoped name to [`Knowledge`] mapping threaded through a rewrite.
///
/// Lookups search frames from the innermost outwards; writes land in the
/// innermost frame. A transform seeds two frames: the enclosing scope with
/// any pass-supplied bindings, then the function's parameters.
#[derive(Debug, Clone)]
pub struct Environment {
    frames: Vec<Frame>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::new()],
        }
    }

    /// Builds the environment at the top of `def`'s body.
    ///
    /// Parameters start unknown, shadowing the enclosing scope, unless a
    /// pass-supplied binding names them. Defaults are ignored: a caller may
    /// pass something else.
    pub fn seed(def: &FunctionDef, scope: &Bindings, externals: &Bindings) -> Self {
        let mut environment = Self::new();
        for (name, value) in scope.iter().chain(externals) {
            environment.observe_assignment(name, Some(value.clone()));
        }

        let mut params = Frame::new();
        for param in &def.params {
            let knowledge = match externals.get(&param.name) {
                Some(value) => Knowledge::Known(value.clone()),
                None => Knowledge::Unknown,
            };
            params.insert(param.name.clone(), knowledge);
        }
        environment.push_frame(params);
        environment
    }

    pub fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn get(&self, name: &str) -> Option<&Knowledge> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    pub fn lookup(&self, name: &str) -> Knowledge {
        self.get(name).cloned().unwrap_or(Knowledge::Unknown)
    }

    pub fn known(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(Knowledge::value)
    }

    pub fn observe_assignment(&mut self, name: &str, value: Option<Value>) {
        let knowledge = match value {
            Some(value) => Knowledge::Known(value),
            None => Knowledge::Unknown,
        };
        self.set(name, knowledge);
    }

    pub fn set(&mut self, name: &str, knowledge: Knowledge) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), knowledge);
        }
    }

    pub fn demote(&mut self, name: &str) {
        self.set(name, Knowledge::Unknown);
    }

    /// Puts back what `name` was before a temporary binding.
    pub fn restore(&mut self, name: &str, previous: Option<Knowledge>) {
        match previous {
            Some(knowledge) => self.set(name, knowledge),
            None => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.shift_remove(name);
                }
            }
        }
    }

    /// Visible names, innermost binding first, each listed once.
    fn names(&self) -> Vec<&str> {
        let mut seen = FxHashSet::default();
        let mut names = Vec::new();
        for frame in self.frames.iter().rev() {
            for name in frame.keys() {
                if seen.insert(name.as_str()) {
                    names.push(name.as_str());
                }
            }
        }
        names
    }

    fn items(&self) -> Vec<(&str, &Knowledge)> {
        self.names()
            .into_iter()
            .filter_map(|name| self.get(name).map(|knowledge| (name, knowledge)))
            .collect()
    }

    /// Demotes every known name whose value can reach a list reachable from
    /// `value`. Returns the demoted names.
    pub fn demote_sharing(&mut self, value: &Value) -> Vec<String> {
        let mut lists = Vec::new();
        collect_lists(value, &mut lists);
        if lists.is_empty() {
            return Vec::new();
        }
        let affected = self
            .items()
            .into_iter()
            .filter(|(_, knowledge)| {
                knowledge.value().is_some_and(|known| {
                    let mut reachable = Vec::new();
                    collect_lists(known, &mut reachable);
                    reachable
                        .iter()
                        .any(|list| lists.iter().any(|escaped| ListRef::ptr_eq(list, escaped)))
                })
            })
            .map(|(name, _)| name.to_string())
            .collect::<Vec<_>>();
        for name in &affected {
            self.demote(name);
        }
        affected
    }

    /// Demotes names whose knowledge differs between `self` and any branch.
    /// Returns the demoted names.
    pub fn join(&mut self, branches: &[Environment]) -> Vec<String> {
        let mut changed = Vec::new();
        for branch in branches {
            for (name, knowledge) in branch.items() {
                let unchanged = self.get(name).is_some_and(|before| before.same_as(knowledge));
                if !unchanged && !changed.iter().any(|seen: &String| seen == name) {
                    changed.push(name.to_string());
                }
            }
        }
        for name in &changed {
            self.demote(name);
        }
        changed
    }
}

fn collect_lists(value: &Value, lists: &mut Vec<ListRef>) {
    match value {
        Value::List(list) => {
            if lists.iter().any(|seen| ListRef::ptr_eq(seen, list)) {
                return;
            }
            lists.push(list.clone());
            for element in list.borrow().iter() {
                collect_lists(element, lists);
            }
        }
        Value::Tuple(elements) => {
            for element in elements {
                collect_lists(element, lists);
            }
        }
        _ => {}
    }
}

/// Whether `value` holds anything mutable.
pub fn is_mutable(value: &Value) -> bool {
    let mut lists = Vec::new();
    collect_lists(value, &mut lists);
    !lists.is_empty()
}
