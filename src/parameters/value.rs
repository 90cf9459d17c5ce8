use crate::math::BracketScale;
use std::fmt;

/// The value a parameter takes from one breakpoint onwards.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Number(f64),
    Bool(bool),
    Scale(BracketScale),
}

impl ParameterValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ParameterValue::Number(_) => "number",
            ParameterValue::Bool(_) => "bool",
            ParameterValue::Scale(_) => "scale",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self { ParameterValue::Number(v) => Some(*v), _ => None }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self { ParameterValue::Bool(v) => Some(*v), _ => None }
    }

    pub fn as_scale(&self) -> Option<&BracketScale> {
        match self { ParameterValue::Scale(s) => Some(s), _ => None }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Number(v) => write!(f, "{v}"),
            ParameterValue::Bool(v) => write!(f, "{v}"),
            ParameterValue::Scale(s) => write!(f, "scale[{} brackets]", s.brackets().len()),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self { ParameterValue::Number(v) }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self { ParameterValue::Bool(v) }
}

impl From<BracketScale> for ParameterValue {
    fn from(s: BracketScale) -> Self { ParameterValue::Scale(s) }
}
