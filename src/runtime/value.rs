use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::ast::Expression;
use crate::builtins::BuiltinFunction;

use super::error::RuntimeError;
use super::ops;

pub type ListRef = Rc<RefCell<Vec<Value>>>;

type NativeCallback = dyn Fn(&[Value]) -> Result<Value, RuntimeError>;

/// A value known at transform time or produced at run time.
///
/// Lists are shared and mutable, so a closure binding and the caller observe
/// the same list; every other variant is immutable.
#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Str(String),
    None,
    Tuple(Vec<Value>),
    List(ListRef),
    Range(RangeValue),
    Builtin(BuiltinFunction),
    Native(NativeFunction),
    Opaque(Opaque),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeValue {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl RangeValue {
    pub fn len(&self) -> usize {
        // Wide arithmetic: `i64::MIN` steps and full-width spans do not fit in i64.
        let (start, stop, step) = (self.start as i128, self.stop as i128, self.step as i128);
        let distance = if step > 0 { stop - start } else { start - stop };
        if step == 0 || distance <= 0 {
            return 0;
        }
        usize::try_from((distance - 1) / step.abs() + 1).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<i64> {
        if index >= self.len() {
            return None;
        }
        i64::try_from(self.start as i128 + self.step as i128 * index as i128).ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.len()).filter_map(|index| self.get(index))
    }
}

/// Host function installed through a closure binding.
#[derive(Clone)]
pub struct NativeFunction {
    name: Rc<str>,
    callback: Rc<NativeCallback>,
}

impl NativeFunction {
    pub fn new(
        name: &str,
        callback: impl Fn(&[Value]) -> Result<Value, RuntimeError> + 'static,
    ) -> Self {
        Self {
            name: Rc::from(name),
            callback: Rc::new(callback),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        (self.callback)(args)
    }

    pub fn same_function(&self, other: &NativeFunction) -> bool {
        Rc::ptr_eq(&self.callback, &other.callback)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native function {}>", self.name)
    }
}

static NEXT_OPAQUE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity-only object: can be bound by name but never written as a literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opaque {
    id: u64,
    label: String,
}

impl Opaque {
    pub fn new(label: &str) -> Self {
        Self {
            id: NEXT_OPAQUE_ID.fetch_add(1, Ordering::Relaxed),
            label: label.to_string(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Value {
    pub fn list(values: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(values)))
    }

    pub fn native(
        name: &str,
        callback: impl Fn(&[Value]) -> Result<Value, RuntimeError> + 'static,
    ) -> Self {
        Value::Native(NativeFunction::new(name, callback))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "int",
            Value::Float(_) => "float",
            Value::Boolean(_) => "bool",
            Value::Str(_) => "str",
            Value::None => "NoneType",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
            Value::Range(_) => "range",
            Value::Builtin(_) => "builtin_function_or_method",
            Value::Native(_) => "function",
            Value::Opaque(_) => "object",
        }
    }

    /// Integer view used for indices and `range` bounds; booleans count as 0/1.
    pub fn as_index(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            Value::Boolean(value) => Some(*value as i64),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        ops::truthy(self)
    }

    /// Literal syntax for this value, when it is immutable and has one.
    ///
    /// Lists are excluded: replacing an expression with a list display would
    /// create a fresh list where the original shared one.
    pub fn to_literal(&self) -> Option<Expression> {
        match self {
            Value::Integer(value) => Some(Expression::Integer(*value)),
            Value::Float(value) if value.is_finite() => Some(Expression::Float(*value)),
            Value::Boolean(value) => Some(Expression::Boolean(*value)),
            Value::Str(value) => Some(Expression::String(value.clone())),
            Value::None => Some(Expression::None),
            Value::Tuple(elements) => elements
                .iter()
                .map(Value::to_literal)
                .collect::<Option<Vec<_>>>()
                .map(Expression::Tuple),
            _ => None,
        }
    }

    /// Python `repr()`.
    pub fn repr(&self) -> String {
        match self {
            Value::Integer(value) => value.to_string(),
            Value::Float(value) => format_float(*value),
            Value::Boolean(true) => "True".to_string(),
            Value::Boolean(false) => "False".to_string(),
            Value::Str(value) => quote_string(value),
            Value::None => "None".to_string(),
            Value::Tuple(elements) => {
                if elements.len() == 1 {
                    return format!("({},)", elements[0].repr());
                }
                let rendered = elements.iter().map(Value::repr).collect::<Vec<_>>();
                format!("({})", rendered.join(", "))
            }
            Value::List(list) => {
                let rendered = list.borrow().iter().map(Value::repr).collect::<Vec<_>>();
                format!("[{}]", rendered.join(", "))
            }
            Value::Range(range) => {
                if range.step == 1 {
                    format!("range({}, {})", range.start, range.stop)
                } else {
                    format!("range({}, {}, {})", range.start, range.stop, range.step)
                }
            }
            Value::Builtin(builtin) => format!("<built-in function {}>", builtin.name()),
            Value::Native(native) => format!("<function {}>", native.name()),
            Value::Opaque(opaque) => format!("<{} #{}>", opaque.label(), opaque.id()),
        }
    }

    /// Python `str()`, as used by `print`.
    pub fn to_output(&self) -> String {
        match self {
            Value::Str(value) => value.clone(),
            other => other.repr(),
        }
    }
}

impl PartialEq for Value {
    /// Python `==`: numeric values compare across int/float/bool.
    fn eq(&self, other: &Self) -> bool {
        ops::equals(self, other)
    }
}

/// Float rendering matching Python's `repr` for finite values.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let formatted = format!("{value:e}");
        let (mantissa, exponent) = formatted.split_once('e').unwrap_or((&formatted, "0"));
        let (sign, digits) = match exponent.strip_prefix('-') {
            Some(digits) => ('-', digits),
            None => ('+', exponent),
        };
        return format!("{mantissa}e{sign}{digits:0>2}");
    }
    if value.fract() == 0.0 {
        return format!("{value:.1}");
    }
    format!("{value}")
}

/// String rendering matching Python's `repr`: single quotes unless the
/// contents hold a single quote and no double quote.
pub fn quote_string(value: &str) -> String {
    let quote = if value.contains('\'') && !value.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut rendered = String::with_capacity(value.len() + 2);
    rendered.push(quote);
    for c in value.chars() {
        match c {
            '\\' => rendered.push_str("\\\\"),
            '\n' => rendered.push_str("\\n"),
            '\r' => rendered.push_str("\\r"),
            '\t' => rendered.push_str("\\t"),
            '\0' => rendered.push_str("\\x00"),
            c if c == quote => {
                rendered.push('\\');
                rendered.push(c);
            }
            c => rendered.push(c),
        }
    }
    rendered.push(quote);
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_length_matches_python() {
        let cases = [
            ((0, 3, 1), 3),
            ((0, 0, 1), 0),
            ((5, 0, 1), 0),
            ((1, 10, 3), 3),
            ((10, 0, -3), 4),
            ((0, 10, -1), 0),
        ];
        for ((start, stop, step), expected) in cases {
            let range = RangeValue { start, stop, step };
            assert_eq!(range.len(), expected, "range({start}, {stop}, {step})");
        }
    }

    #[test]
    fn renders_floats_like_python() {
        assert_eq!(format_float(3.0), "3.0");
        assert_eq!(format_float(0.5), "0.5");
        assert_eq!(format_float(-2.25), "-2.25");
        assert_eq!(format_float(1e16), "1e+16");
        assert_eq!(format_float(1.5e-5), "1.5e-05");
    }

    #[test]
    fn quotes_strings_like_python() {
        assert_eq!(quote_string("a"), "'a'");
        assert_eq!(quote_string("it's"), "\"it's\"");
        assert_eq!(quote_string("both ' and \""), "'both \\' and \"'");
        assert_eq!(quote_string("line\n"), "'line\\n'");
    }

    #[test]
    fn only_immutable_values_have_literals() {
        assert_eq!(Value::Integer(3).to_literal(), Some(Expression::Integer(3)));
        assert_eq!(
            Value::Tuple(vec![Value::Integer(1), Value::Str("a".to_string())]).to_literal(),
            Some(Expression::Tuple(vec![
                Expression::Integer(1),
                Expression::String("a".to_string())
            ]))
        );
        assert_eq!(Value::list(vec![Value::Integer(1)]).to_literal(), None);
        assert_eq!(Value::Opaque(Opaque::new("object")).to_literal(), None);
        assert_eq!(
            Value::Tuple(vec![Value::Opaque(Opaque::new("object"))]).to_literal(),
            None
        );
        assert_eq!(Value::Float(f64::INFINITY).to_literal(), None);
    }

    #[test]
    fn opaque_values_compare_by_identity() {
        let first = Value::Opaque(Opaque::new("object"));
        let second = Value::Opaque(Opaque::new("object"));
        assert_eq!(first, first.clone());
        assert_ne!(first, second);
    }
}
