//! Runtime values and the tagged ingestion boundary
//!
//! [`Value`] is what the fact store holds. Callers hand values in as
//! [`TypedValue`], where a symbolic constant and a piece of text are
//! different variants no matter how they are spelled. The only place a bare
//! string may turn into a constant is [`Value::from_loose`], which applies
//! [`crate::lexical::promote_loose_string`].

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ir::Term;
use crate::lexical;

/// A ground runtime value
#[derive(Clone, Debug)]
pub enum Value {
    Name(String),
    Text(String),
    Bytes(Vec<u8>),
    Number(i64),
    Float(f64),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Struct(Vec<(Value, Value)>),
}

/// Why a value was refused at the ingestion boundary
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("variable {0} is not a ground value")]
    NotGround(String),
    #[error("{0:?} is not a valid symbolic constant")]
    InvalidConstant(String),
    #[error("float {0} is not finite")]
    NonFiniteFloat(f64),
    #[error("unsupported loose value: {0}")]
    UnsupportedLoose(String),
}

/// An explicitly tagged argument value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TypedValue {
    /// Only meaningful in query patterns; never ground
    Variable(String),
    Constant(String),
    Text(String),
    Bytes(Vec<u8>),
    Number(i64),
    Float(f64),
}

impl TypedValue {
    pub fn constant(name: impl Into<String>) -> Self {
        TypedValue::Constant(name.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        TypedValue::Text(text.into())
    }

    /// Convert to a ground value, checking the constant grammar
    pub fn into_value(self) -> Result<Value, ValueError> {
        match self {
            TypedValue::Variable(v) => Err(ValueError::NotGround(v)),
            TypedValue::Constant(c) if lexical::is_name_constant(&c) => Ok(Value::Name(c)),
            TypedValue::Constant(c) => Err(ValueError::InvalidConstant(c)),
            TypedValue::Text(s) => Ok(Value::Text(s)),
            TypedValue::Bytes(b) => Ok(Value::Bytes(b)),
            TypedValue::Number(n) => Ok(Value::Number(n)),
            TypedValue::Float(x) if x.is_finite() => Ok(Value::Float(x)),
            TypedValue::Float(x) => Err(ValueError::NonFiniteFloat(x)),
        }
    }
}

impl Value {
    pub fn name(name: impl Into<String>) -> Self {
        Value::Name(name.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Value::Text(text.into())
    }

    /// Legacy ingestion of untagged JSON values.
    ///
    /// Strings go through [`lexical::promote_loose_string`]; booleans become
    /// `/true` and `/false`; arrays become lists; objects become structs with
    /// promoted keys. `null` is refused.
    pub fn from_loose(value: &serde_json::Value) -> Result<Value, ValueError> {
        use serde_json::Value as Json;
        match value {
            Json::String(s) => Ok(match lexical::promote_loose_string(s) {
                Some(name) => Value::Name(name),
                None => Value::Text(s.clone()),
            }),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Number(i))
                } else {
                    match n.as_f64() {
                        Some(x) if x.is_finite() && n.is_f64() => Ok(Value::Float(x)),
                        _ => Err(ValueError::UnsupportedLoose(n.to_string())),
                    }
                }
            }
            Json::Bool(b) => Ok(Value::Name(format!("/{b}"))),
            Json::Array(items) => items
                .iter()
                .map(Value::from_loose)
                .collect::<Result<_, _>>()
                .map(Value::List),
            Json::Object(fields) => fields
                .iter()
                .map(|(k, v)| {
                    let key = Value::from_loose(&Json::String(k.clone()))?;
                    Ok((key, Value::from_loose(v)?))
                })
                .collect::<Result<_, _>>()
                .map(Value::Struct),
            Json::Null => Err(ValueError::UnsupportedLoose("null".to_string())),
        }
    }

    /// Convert a ground term without function applications
    pub fn from_ground_term(term: &Term) -> Option<Value> {
        Some(match term {
            Term::Var(_) | Term::Apply { .. } => return None,
            Term::Name(n) => Value::Name(n.clone()),
            Term::Text(s) => Value::Text(s.clone()),
            Term::Bytes(b) => Value::Bytes(b.clone()),
            Term::Number(n) => Value::Number(*n),
            Term::Float(x) => Value::Float(*x),
            Term::List(items) => Value::List(
                items
                    .iter()
                    .map(Value::from_ground_term)
                    .collect::<Option<_>>()?,
            ),
            Term::Map(flat) => Value::Map(pairs_from_terms(flat)?),
            Term::Struct(flat) => Value::Struct(pairs_from_terms(flat)?),
        })
    }

    pub fn to_term(&self) -> Term {
        match self {
            Value::Name(n) => Term::Name(n.clone()),
            Value::Text(s) => Term::Text(s.clone()),
            Value::Bytes(b) => Term::Bytes(b.clone()),
            Value::Number(n) => Term::Number(*n),
            Value::Float(x) => Term::Float(*x),
            Value::List(items) => Term::List(items.iter().map(Value::to_term).collect()),
            Value::Map(pairs) => Term::Map(flatten_pairs(pairs)),
            Value::Struct(pairs) => Term::Struct(flatten_pairs(pairs)),
        }
    }

    /// Numeric view used by comparisons and arithmetic
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Short type label used in mismatch messages
    pub fn type_label(&self) -> &'static str {
        match self {
            Value::Name(_) => "name",
            Value::Text(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Number(_) => "number",
            Value::Float(_) => "float64",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Struct(_) => "struct",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Name(_) => 0,
            Value::Text(_) => 1,
            Value::Bytes(_) => 2,
            Value::Number(_) => 3,
            Value::Float(_) => 4,
            Value::List(_) => 5,
            Value::Map(_) => 6,
            Value::Struct(_) => 7,
        }
    }
}

fn pairs_from_terms(flat: &[Term]) -> Option<Vec<(Value, Value)>> {
    if flat.len() % 2 != 0 {
        return None;
    }
    flat.chunks(2)
        .map(|pair| Some((Value::from_ground_term(&pair[0])?, Value::from_ground_term(&pair[1])?)))
        .collect()
}

fn flatten_pairs(pairs: &[(Value, Value)]) -> Vec<Term> {
    pairs
        .iter()
        .flat_map(|(k, v)| [k.to_term(), v.to_term()])
        .collect()
}

// Floats compare by total order so that values can key sets and maps.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Name(a), Value::Name(b)) | (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::List(a), Value::List(b)) => a.cmp(b),
            (Value::Map(a), Value::Map(b)) | (Value::Struct(a), Value::Struct(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Name(s) | Value::Text(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Number(n) => n.hash(state),
            Value::Float(x) => x.to_bits().hash(state),
            Value::List(items) => items.hash(state),
            Value::Map(pairs) | Value::Struct(pairs) => pairs.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::render::render_term(&self.to_term()))
    }
}

/// A ground atom
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fact {
    pub predicate: String,
    pub args: Vec<Value>,
}

impl Fact {
    pub fn new(predicate: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            predicate: predicate.into(),
            args,
        }
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.predicate)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", arg)?;
        }
        f.write_str(")")
    }
}
