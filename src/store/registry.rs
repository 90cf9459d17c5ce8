use super::types::*;
use crate::compute::{EvaluationError, Session};
use crate::entities::EntityId;
use crate::periods::{Granularity, Period};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("Variable '{variable}' has no formula applicable on {date}")]
    NoApplicableFormula { variable: String, date: NaiveDate },
    #[error("Variable '{0}' is already registered")]
    DuplicateVariable(String),
    #[error("Variable '{variable}' has overlapping formula windows starting {first} and {second}")]
    OverlappingWindows { variable: String, first: NaiveDate, second: NaiveDate },
    #[error("Formula window of '{variable}' ends on {until}, before it starts on {from}")]
    InvalidWindow { variable: String, from: NaiveDate, until: NaiveDate },
    #[error("Default of '{variable}' is a {found}, expected {expected}")]
    DefaultTypeMismatch { variable: String, expected: String, found: &'static str },
    #[error("Variable '{variable}' of type {value_type} cannot aggregate by {aggregation:?}")]
    InvalidAggregation { variable: String, value_type: String, aggregation: Aggregation },
}

/// A formula computes one variable for one entity and period. It may call
/// back into the session for dependencies and parameters.
pub type FormulaFn = dyn Fn(&mut Session<'_>, EntityId, Period) -> Result<Value, EvaluationError> + Send + Sync;

/// Dates on which a formula is in force. `until` is the last day covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValidityWindow {
    pub from: NaiveDate,
    pub until: Option<NaiveDate>,
}

impl ValidityWindow {
    pub fn always() -> Self { Self { from: NaiveDate::MIN, until: None } }
    pub fn starting(from: NaiveDate) -> Self { Self { from, until: None } }
    pub fn between(from: NaiveDate, until: NaiveDate) -> Self { Self { from, until: Some(until) } }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && self.until.map_or(true, |u| date <= u)
    }
}

#[derive(Clone)]
pub struct FormulaEntry {
    pub window: ValidityWindow,
    func: Arc<FormulaFn>,
}

impl FormulaEntry {
    pub fn new(window: ValidityWindow, func: Arc<FormulaFn>) -> Self { Self { window, func } }

    pub fn call(&self, session: &mut Session<'_>, entity: EntityId, period: Period) -> Result<Value, EvaluationError> {
        (self.func)(session, entity, period)
    }
}

impl fmt::Debug for FormulaEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormulaEntry").field("window", &self.window).finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct VariableDefinition {
    pub name: String,
    pub value_type: ValueType,
    pub default: Value,
    pub granularity: Granularity,
    pub entity: EntityType,
    pub aggregation: Aggregation,
    pub negative_policy: NegativePolicy,
    pub input_spread: InputSpread,
    pub label: Option<String>,
    pub reference: Option<String>,
    /// Sorted by window start once registered.
    pub formulas: Vec<FormulaEntry>,
}

impl VariableDefinition {
    /// A person variable with the type's zero value as default. Numeric
    /// variables aggregate by sum, others by last value.
    pub fn new(name: &str, value_type: ValueType, granularity: Granularity) -> Self {
        let aggregation = if value_type.is_numeric() { Aggregation::Sum } else { Aggregation::LastValue };
        Self {
            name: name.to_string(),
            default: value_type.default_value(),
            value_type,
            granularity,
            entity: EntityType::Person,
            aggregation,
            negative_policy: NegativePolicy::Allow,
            input_spread: InputSpread::None,
            label: None,
            reference: None,
            formulas: Vec::new(),
        }
    }

    pub fn entity(mut self, entity: EntityType) -> Self { self.entity = entity; self }
    pub fn default_value(mut self, value: impl Into<Value>) -> Self { self.default = value.into(); self }
    pub fn aggregation(mut self, aggregation: Aggregation) -> Self { self.aggregation = aggregation; self }
    pub fn negative_policy(mut self, policy: NegativePolicy) -> Self { self.negative_policy = policy; self }
    pub fn input_spread(mut self, spread: InputSpread) -> Self { self.input_spread = spread; self }
    pub fn label(mut self, label: &str) -> Self { self.label = Some(label.to_string()); self }
    pub fn reference(mut self, reference: &str) -> Self { self.reference = Some(reference.to_string()); self }

    pub fn formula<F>(mut self, window: ValidityWindow, func: F) -> Self
    where
        F: Fn(&mut Session<'_>, EntityId, Period) -> Result<Value, EvaluationError> + Send + Sync + 'static,
    {
        self.formulas.push(FormulaEntry::new(window, Arc::new(func)));
        self
    }

    /// A variable without formulas takes its value from inputs or its default.
    pub fn is_input(&self) -> bool { self.formulas.is_empty() }

    pub fn formula_at(&self, date: NaiveDate) -> Option<&FormulaEntry> {
        // Windows are sorted and disjoint: the candidate is the last one starting on or before `date`.
        let idx = self.formulas.partition_point(|f| f.window.from <= date);
        idx.checked_sub(1).map(|i| &self.formulas[i]).filter(|f| f.window.contains(date))
    }
}

/// Process-wide table of variable definitions; read-only after registration.
#[derive(Debug, Clone, Default)]
pub struct VariableRegistry {
    definitions: Vec<VariableDefinition>,
    by_name: HashMap<String, VariableId>,
}

impl VariableRegistry {
    pub fn new() -> Self { Self::default() }
    pub fn len(&self) -> usize { self.definitions.len() }
    pub fn is_empty(&self) -> bool { self.definitions.is_empty() }

    pub fn register(&mut self, mut definition: VariableDefinition) -> Result<VariableId, RegistryError> {
        if self.by_name.contains_key(&definition.name) {
            return Err(RegistryError::DuplicateVariable(definition.name));
        }
        if !definition.default.matches(&definition.value_type) {
            return Err(RegistryError::DefaultTypeMismatch {
                variable: definition.name,
                expected: definition.value_type.to_string(),
                found: definition.default.kind(),
            });
        }

        let aggregates = match definition.aggregation {
            Aggregation::Sum => definition.value_type.is_numeric(),
            Aggregation::Average => definition.value_type == ValueType::Amount,
            Aggregation::LastValue => true,
        };
        if !aggregates {
            return Err(RegistryError::InvalidAggregation {
                variable: definition.name,
                value_type: definition.value_type.to_string(),
                aggregation: definition.aggregation,
            });
        }

        let reversed = definition.formulas.iter().find_map(|f| match f.window.until {
            Some(until) if until < f.window.from => Some((f.window.from, until)),
            _ => None,
        });
        if let Some((from, until)) = reversed {
            return Err(RegistryError::InvalidWindow { variable: definition.name, from, until });
        }

        definition.formulas.sort_by_key(|f| f.window.from);
        for pair in definition.formulas.windows(2) {
            let (a, b) = (&pair[0].window, &pair[1].window);
            if a.until.map_or(true, |until| until >= b.from) {
                return Err(RegistryError::OverlappingWindows {
                    variable: definition.name.clone(),
                    first: a.from,
                    second: b.from,
                });
            }
        }

        let id = VariableId::new(self.definitions.len());
        self.by_name.insert(definition.name.clone(), id);
        tracing::trace!(variable = %definition.name, formulas = definition.formulas.len(), "variable registered");
        self.definitions.push(definition);
        Ok(id)
    }

    pub fn register_all(&mut self, definitions: impl IntoIterator<Item = VariableDefinition>) -> Result<(), RegistryError> {
        for definition in definitions {
            self.register(definition)?;
        }
        tracing::info!(variables = self.len(), "variable registry loaded");
        Ok(())
    }

    pub fn id_of(&self, name: &str) -> Result<VariableId, RegistryError> {
        self.by_name.get(name).copied().ok_or_else(|| RegistryError::UnknownVariable(name.to_string()))
    }

    pub fn definition(&self, id: VariableId) -> Result<&VariableDefinition, RegistryError> {
        self.definitions.get(id.index()).ok_or_else(|| RegistryError::UnknownVariable(format!("#{}", id.0)))
    }

    pub fn lookup(&self, name: &str) -> Result<(VariableId, &VariableDefinition), RegistryError> {
        let id = self.id_of(name)?;
        Ok((id, self.definition(id)?))
    }

    pub fn get_formula(&self, name: &str, date: NaiveDate) -> Result<&FormulaEntry, RegistryError> {
        let (_, definition) = self.lookup(name)?;
        definition
            .formula_at(date)
            .ok_or_else(|| RegistryError::NoApplicableFormula { variable: name.to_string(), date })
    }

    pub fn get_default(&self, name: &str) -> Result<&Value, RegistryError> {
        Ok(&self.lookup(name)?.1.default)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().map(|d| d.name.as_str())
    }
}
