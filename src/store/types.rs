use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct VariableId(pub u32);

impl VariableId {
    #[inline(always)]
    pub fn index(&self) -> usize { self.0 as usize }
    pub fn new(idx: usize) -> Self { Self(idx as u32) }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Amount,
    Boolean,
    Integer,
    /// Possible values of an enumeration, e.g. `["owner", "tenant", "free_lodger"]`.
    Enum(Vec<String>),
}

impl ValueType {
    pub fn default_value(&self) -> Value {
        match self {
            ValueType::Amount => Value::Amount(0.0),
            ValueType::Boolean => Value::Boolean(false),
            ValueType::Integer => Value::Integer(0),
            ValueType::Enum(variants) => Value::Enum(variants.first().cloned().unwrap_or_default()),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueType::Amount | ValueType::Integer)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Amount => f.write_str("amount"),
            ValueType::Boolean => f.write_str("boolean"),
            ValueType::Integer => f.write_str("integer"),
            ValueType::Enum(variants) => write!(f, "enum({})", variants.join("|")),
        }
    }
}

/// A computed or input quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Amount(f64),
    Enum(String),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Amount(_) => "amount",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Enum(_) => "enum",
        }
    }

    pub fn as_amount(&self) -> Option<f64> {
        match self { Value::Amount(v) => Some(*v), _ => None }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self { Value::Boolean(v) => Some(*v), _ => None }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self { Value::Integer(v) => Some(*v), _ => None }
    }

    pub fn as_enum(&self) -> Option<&str> {
        match self { Value::Enum(v) => Some(v), _ => None }
    }

    pub fn matches(&self, value_type: &ValueType) -> bool {
        match (self, value_type) {
            (Value::Amount(_), ValueType::Amount)
            | (Value::Boolean(_), ValueType::Boolean)
            | (Value::Integer(_), ValueType::Integer) => true,
            (Value::Enum(v), ValueType::Enum(variants)) => variants.iter().any(|x| x == v),
            _ => false,
        }
    }

    /// Widens integers to amounts when an amount is expected (JSON inputs
    /// such as `3000` arrive as integers). Other values pass through.
    pub fn coerce(self, value_type: &ValueType) -> Value {
        match (self, value_type) {
            (Value::Integer(v), ValueType::Amount) => Value::Amount(v as f64),
            (other, _) => other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Amount(v) => write!(f, "{v:.2}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Enum(v) => f.write_str(v),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self { Value::Amount(v) }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self { Value::Boolean(v) }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self { Value::Integer(v) }
}

/// How sub-period values combine when a coarser period is requested.
/// Flows such as income sum; stocks such as an eligibility flag take the last value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Sum,
    LastValue,
    Average,
}

/// Whether a negative formula result is kept or floored at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegativePolicy {
    #[default]
    Allow,
    ClampToZero,
}

/// How an input given for a coarser period is spread over the variable's own periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSpread {
    #[default]
    None,
    DivideByPeriod,
    CopyToSubperiods,
}

/// Which kind of entity a variable is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    #[default]
    Person,
    Group(String),
}

impl EntityType {
    pub fn group(name: &str) -> Self { EntityType::Group(name.to_string()) }

    pub fn name(&self) -> &str {
        match self {
            EntityType::Person => crate::entities::PERSON,
            EntityType::Group(name) => name,
        }
    }
}
