use crate::runtime::error::RuntimeError;
use crate::runtime::ops;
use crate::runtime::value::{Opaque, RangeValue, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFunction {
    Print,
    Len,
    Range,
    Abs,
    Min,
    Max,
    Object,
    Reversed,
    Enumerate,
    Zip,
    List,
    Sum,
}

impl BuiltinFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "print" => Some(Self::Print),
            "len" => Some(Self::Len),
            "range" => Some(Self::Range),
            "abs" => Some(Self::Abs),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "object" => Some(Self::Object),
            "reversed" => Some(Self::Reversed),
            "enumerate" => Some(Self::Enumerate),
            "zip" => Some(Self::Zip),
            "list" => Some(Self::List),
            "sum" => Some(Self::Sum),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Print => "print",
            Self::Len => "len",
            Self::Range => "range",
            Self::Abs => "abs",
            Self::Min => "min",
            Self::Max => "max",
            Self::Object => "object",
            Self::Reversed => "reversed",
            Self::Enumerate => "enumerate",
            Self::Zip => "zip",
            Self::List => "list",
            Self::Sum => "sum",
        }
    }

    /// Whether a call may be evaluated at transform time once its arguments are known.
    ///
    /// `reversed`, `zip`, `enumerate`, `list` and `sum` are deterministic but are
    /// deliberately left out: iterator combinators over constants are not folded.
    pub fn is_pure(self) -> bool {
        matches!(
            self,
            Self::Len | Self::Range | Self::Abs | Self::Min | Self::Max
        )
    }

    /// Calls every builtin except `print`, whose output belongs to the interpreter.
    pub fn call(self, args: &[Value]) -> Result<Value, RuntimeError> {
        match self {
            Self::Print => Err(RuntimeError::NotSupported {
                feature: "print outside the interpreter".to_string(),
            }),
            Self::Len => {
                let [value] = expect_args::<1>(self, args)?;
                let len = i64::try_from(ops::len(value)?).map_err(|_| RuntimeError::Overflow {
                    operation: "len".to_string(),
                })?;
                Ok(Value::Integer(len))
            }
            Self::Range => range(args).map(Value::Range),
            Self::Abs => {
                let [value] = expect_args::<1>(self, args)?;
                match value {
                    Value::Integer(n) => n.checked_abs().map(Value::Integer).ok_or_else(|| {
                        RuntimeError::Overflow {
                            operation: "abs".to_string(),
                        }
                    }),
                    Value::Boolean(b) => Ok(Value::Integer(*b as i64)),
                    Value::Float(f) => Ok(Value::Float(f.abs())),
                    other => Err(RuntimeError::UnsupportedUnary {
                        operation: "abs()".to_string(),
                        type_name: other.type_name().to_string(),
                    }),
                }
            }
            Self::Min | Self::Max => extremum(self, args),
            Self::Object => {
                expect_args::<0>(self, args)?;
                Ok(Value::Opaque(Opaque::new("object")))
            }
            Self::Reversed => {
                let [value] = expect_args::<1>(self, args)?;
                let mut items = ops::iterate(value)?;
                items.reverse();
                Ok(Value::list(items))
            }
            Self::Enumerate => {
                let [value] = expect_args::<1>(self, args)?;
                let items = ops::iterate(value)?
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| Value::Tuple(vec![Value::Integer(index as i64), item]))
                    .collect();
                Ok(Value::list(items))
            }
            Self::Zip => {
                let columns = args.iter().map(ops::iterate).collect::<Result<Vec<_>, _>>()?;
                let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
                let items = (0..rows)
                    .map(|row| Value::Tuple(columns.iter().map(|column| column[row].clone()).collect()))
                    .collect();
                Ok(Value::list(items))
            }
            Self::List => {
                if args.is_empty() {
                    return Ok(Value::list(Vec::new()));
                }
                let [value] = expect_args::<1>(self, args)?;
                Ok(Value::list(ops::iterate(value)?))
            }
            Self::Sum => {
                let [value] = expect_args::<1>(self, args)?;
                ops::iterate(value)?
                    .iter()
                    .try_fold(Value::Integer(0), |total, item| {
                        ops::binary(crate::ast::BinaryOperator::Add, &total, item)
                    })
            }
        }
    }
}

fn expect_args<const N: usize>(
    builtin: BuiltinFunction,
    args: &[Value],
) -> Result<&[Value; N], RuntimeError> {
    args.try_into().map_err(|_| RuntimeError::ArityMismatch {
        name: builtin.name().to_string(),
        expected: N.to_string(),
        found: args.len(),
    })
}

fn range(args: &[Value]) -> Result<RangeValue, RuntimeError> {
    let mut bounds = Vec::with_capacity(args.len());
    for arg in args {
        bounds.push(arg.as_index().ok_or_else(|| RuntimeError::InvalidArgumentType {
            operation: "range".to_string(),
            expected: "int".to_string(),
            got: arg.type_name().to_string(),
        })?);
    }
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => {
            return Err(RuntimeError::ArityMismatch {
                name: "range".to_string(),
                expected: "1 to 3".to_string(),
                found: args.len(),
            });
        }
    };
    if step == 0 {
        return Err(RuntimeError::RangeStepZero);
    }
    Ok(RangeValue { start, stop, step })
}

fn extremum(builtin: BuiltinFunction, args: &[Value]) -> Result<Value, RuntimeError> {
    let candidates = match args {
        [] => {
            return Err(RuntimeError::ArityMismatch {
                name: builtin.name().to_string(),
                expected: "at least 1".to_string(),
                found: 0,
            });
        }
        [single] => ops::iterate(single)?,
        many => many.to_vec(),
    };
    let mut candidates = candidates.into_iter();
    let mut best = candidates.next().ok_or_else(|| RuntimeError::EmptySequence {
        operation: builtin.name().to_string(),
    })?;
    let replace_when = if builtin == BuiltinFunction::Min {
        crate::ast::CompareOperator::Lt
    } else {
        crate::ast::CompareOperator::Gt
    };
    for candidate in candidates {
        if ops::compare(replace_when, &candidate, &best)? {
            best = candidate;
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_follows_native_boundaries() {
        let value = BuiltinFunction::Range
            .call(&[Value::Integer(1), Value::Integer(7), Value::Integer(3)])
            .expect("range failed");
        assert_eq!(
            ops::iterate(&value).expect("iterate failed"),
            vec![Value::Integer(1), Value::Integer(4)]
        );

        let empty = BuiltinFunction::Range
            .call(&[Value::Integer(0)])
            .expect("range failed");
        assert_eq!(ops::len(&empty).expect("len failed"), 0);

        let descending = BuiltinFunction::Range
            .call(&[Value::Integer(3), Value::Integer(0), Value::Integer(-1)])
            .expect("range failed");
        assert_eq!(
            ops::iterate(&descending).expect("iterate failed"),
            vec![Value::Integer(3), Value::Integer(2), Value::Integer(1)]
        );
    }

    #[test]
    fn range_handles_extreme_steps() {
        let single = BuiltinFunction::Range
            .call(&[Value::Integer(0), Value::Integer(-10), Value::Integer(i64::MIN)])
            .expect("range failed");
        assert_eq!(ops::iterate(&single).expect("iterate failed"), vec![Value::Integer(0)]);

        let wide = BuiltinFunction::Range
            .call(&[Value::Integer(i64::MIN), Value::Integer(i64::MAX), Value::Integer(i64::MAX)])
            .expect("range failed");
        assert_eq!(
            BuiltinFunction::Len.call(std::slice::from_ref(&wide)),
            Ok(Value::Integer(3))
        );
        assert_eq!(
            ops::iterate(&wide).expect("iterate failed"),
            vec![Value::Integer(i64::MIN), Value::Integer(-1), Value::Integer(i64::MAX - 1)]
        );
    }

    #[test]
    fn range_rejects_zero_step_and_bad_arguments() {
        assert_eq!(
            BuiltinFunction::Range.call(&[Value::Integer(0), Value::Integer(3), Value::Integer(0)]),
            Err(RuntimeError::RangeStepZero)
        );
        assert!(matches!(
            BuiltinFunction::Range.call(&[Value::Float(1.5)]),
            Err(RuntimeError::InvalidArgumentType { .. })
        ));
        assert!(matches!(
            BuiltinFunction::Range.call(&[]),
            Err(RuntimeError::ArityMismatch { .. })
        ));
    }

    #[test]
    fn len_min_max_and_abs() {
        let values = Value::Tuple(vec![Value::Integer(4), Value::Float(1.5), Value::Integer(9)]);
        assert_eq!(
            BuiltinFunction::Len.call(std::slice::from_ref(&values)),
            Ok(Value::Integer(3))
        );
        assert_eq!(
            BuiltinFunction::Min.call(std::slice::from_ref(&values)),
            Ok(Value::Float(1.5))
        );
        assert_eq!(
            BuiltinFunction::Max.call(&[Value::Integer(2), Value::Integer(5)]),
            Ok(Value::Integer(5))
        );
        assert_eq!(BuiltinFunction::Abs.call(&[Value::Integer(-3)]), Ok(Value::Integer(3)));
        assert!(matches!(
            BuiltinFunction::Len.call(&[Value::Integer(3)]),
            Err(RuntimeError::NoLength { .. })
        ));
    }

    #[test]
    fn only_side_effect_free_builtins_are_pure() {
        assert!(BuiltinFunction::Range.is_pure());
        assert!(BuiltinFunction::Len.is_pure());
        assert!(!BuiltinFunction::Print.is_pure());
        assert!(!BuiltinFunction::Object.is_pure());
        assert!(!BuiltinFunction::Zip.is_pure());
        assert!(!BuiltinFunction::Reversed.is_pure());
    }
}
