//! Built-in functions of the `fn:` namespace understood by the analyzer and
//! the reference evaluator

use crate::eval::EvalError;
use crate::value::Value;

/// How a function participates in evaluation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionClass {
    /// Computes a value from bound arguments
    Scalar,
    /// Folds the solutions of a group into one value
    Aggregate,
    /// `fn:group_by`
    Grouping,
}

#[derive(Clone, Copy, Debug)]
pub struct Builtin {
    pub name: &'static str,
    pub class: FunctionClass,
    /// `None` for variadic functions
    pub arity: Option<usize>,
}

pub const BUILTINS: &[Builtin] = &[
    Builtin { name: "fn:plus", class: FunctionClass::Scalar, arity: Some(2) },
    Builtin { name: "fn:minus", class: FunctionClass::Scalar, arity: Some(2) },
    Builtin { name: "fn:mult", class: FunctionClass::Scalar, arity: Some(2) },
    Builtin { name: "fn:div", class: FunctionClass::Scalar, arity: Some(2) },
    Builtin { name: "fn:list", class: FunctionClass::Scalar, arity: None },
    Builtin { name: "fn:map", class: FunctionClass::Scalar, arity: None },
    Builtin { name: "fn:struct", class: FunctionClass::Scalar, arity: None },
    Builtin { name: "fn:group_by", class: FunctionClass::Grouping, arity: None },
    Builtin { name: "fn:count", class: FunctionClass::Aggregate, arity: Some(0) },
    Builtin { name: "fn:sum", class: FunctionClass::Aggregate, arity: Some(1) },
    Builtin { name: "fn:max", class: FunctionClass::Aggregate, arity: Some(1) },
    Builtin { name: "fn:min", class: FunctionClass::Aggregate, arity: Some(1) },
    Builtin { name: "fn:collect", class: FunctionClass::Aggregate, arity: Some(1) },
];

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

/// True for `fn:group_by` and the aggregates
pub fn is_aggregating(name: &str) -> bool {
    matches!(
        lookup(name).map(|b| b.class),
        Some(FunctionClass::Aggregate | FunctionClass::Grouping)
    )
}

/// Evaluate a scalar builtin over ground arguments
pub fn apply_scalar(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    let builtin = match lookup(name) {
        Some(b) if b.class == FunctionClass::Scalar => b,
        Some(_) => return Err(EvalError::MisplacedAggregate(name.to_string())),
        None => return Err(EvalError::UnsupportedFunction(name.to_string())),
    };
    if let Some(expected) = builtin.arity {
        if args.len() != expected {
            return Err(EvalError::FunctionArity {
                function: name.to_string(),
                expected,
                found: args.len(),
            });
        }
    }
    match name {
        "fn:plus" => arithmetic(name, &args[0], &args[1], i64::checked_add, |a, b| a + b),
        "fn:minus" => arithmetic(name, &args[0], &args[1], i64::checked_sub, |a, b| a - b),
        "fn:mult" => arithmetic(name, &args[0], &args[1], i64::checked_mul, |a, b| a * b),
        "fn:div" => {
            if matches!(args[1], Value::Number(0)) || matches!(args[1], Value::Float(x) if x == 0.0) {
                return Err(EvalError::Function {
                    function: name.to_string(),
                    reason: "division by zero".to_string(),
                });
            }
            arithmetic(name, &args[0], &args[1], i64::checked_div, |a, b| a / b)
        }
        "fn:list" => Ok(Value::List(args)),
        "fn:map" | "fn:struct" => {
            if args.len() % 2 != 0 {
                return Err(EvalError::Function {
                    function: name.to_string(),
                    reason: format!("expects key/value pairs, got {} arguments", args.len()),
                });
            }
            let mut pairs = Vec::with_capacity(args.len() / 2);
            let mut iter = args.into_iter();
            while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
                pairs.push((k, v));
            }
            Ok(if name == "fn:map" {
                Value::Map(pairs)
            } else {
                Value::Struct(pairs)
            })
        }
        _ => Err(EvalError::UnsupportedFunction(name.to_string())),
    }
}

/// Integer arithmetic stays integral; any float operand makes the result a float
fn arithmetic(
    name: &str,
    a: &Value,
    b: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, EvalError> {
    let fail = |reason: String| EvalError::Function {
        function: name.to_string(),
        reason,
    };
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => int_op(*x, *y)
            .map(Value::Number)
            .ok_or_else(|| fail(format!("integer overflow on {x} and {y}"))),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => {
                let result = float_op(x, y);
                if result.is_finite() {
                    Ok(Value::Float(result))
                } else {
                    Err(fail(format!("non-finite result from {x} and {y}")))
                }
            }
            _ => Err(fail(format!(
                "expects numbers, got {} and {}",
                a.type_label(),
                b.type_label()
            ))),
        },
    }
}
