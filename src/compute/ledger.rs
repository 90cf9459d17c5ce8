//! ledger.rs
//! Write-once storage of computed and input values, keyed by request.

use crate::entities::EntityId;
use crate::periods::Period;
use crate::store::{Value, VariableId};
use std::collections::HashMap;

pub use self::error::EvaluationError;
mod error {
    use crate::entities::EntityError;
    use crate::math::MathError;
    use crate::parameters::ParameterError;
    use crate::periods::{Granularity, Period, PeriodError};
    use crate::store::RegistryError;
    use thiserror::Error;

    #[derive(Error, Debug, Clone, PartialEq)]
    pub enum EvaluationError {
        #[error(transparent)]
        Registry(#[from] RegistryError),
        #[error(transparent)]
        Parameter(#[from] ParameterError),
        #[error(transparent)]
        Entity(#[from] EntityError),
        #[error(transparent)]
        Math(#[from] MathError),
        #[error(transparent)]
        Period(#[from] PeriodError),
        #[error("Circular dependency: {}", .cycle.join(" -> "))]
        CircularDependency { cycle: Vec<String> },
        #[error("Evaluation exceeded the maximum depth of {limit}")]
        DepthExceeded { limit: usize },
        #[error("Variable '{variable}' belongs to {expected} entities, '{entity}' is a {found}")]
        EntityMismatch { variable: String, entity: String, expected: String, found: String },
        #[error("Variable '{variable}' expects {expected}, formula returned {found}")]
        TypeMismatch { variable: String, expected: String, found: &'static str },
        #[error("Variable '{variable}' is defined per {granularity} and cannot be evaluated for {period}")]
        IncompatiblePeriod { variable: String, granularity: Granularity, period: Period },
        #[error("Aggregating '{variable}' over {period} overflowed")]
        Overflow { variable: String, period: Period },
        #[error("Input for '{variable}' of '{entity}' in {period} conflicts with a stored value")]
        InputConflict { variable: String, entity: String, period: Period },
        #[error("Evaluating '{variable}' for '{entity}' in {period}: {source}")]
        Context { variable: String, entity: String, period: Period, source: Box<EvaluationError> },
    }

    impl EvaluationError {
        /// The underlying cause, with any context stripped.
        pub fn root(&self) -> &EvaluationError {
            let mut err = self;
            while let EvaluationError::Context { source, .. } = err {
                err = source;
            }
            err
        }

        /// Attaches the originating request. An error that already carries
        /// context is returned as is, so the innermost frame wins.
        pub fn within(self, variable: &str, entity: &str, period: Period) -> Self {
            match self {
                ctx @ EvaluationError::Context { .. } => ctx,
                other => EvaluationError::Context {
                    variable: variable.to_string(),
                    entity: entity.to_string(),
                    period,
                    source: Box::new(other),
                },
            }
        }
    }
}

/// One point of the evaluation space: a variable for an entity in a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey {
    pub variable: VariableId,
    pub entity: EntityId,
    pub period: Period,
}

impl RequestKey {
    pub fn new(variable: VariableId, entity: EntityId, period: Period) -> Self {
        Self { variable, entity, period }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    values: HashMap<RequestKey, Value>,
}

impl Ledger {
    pub fn new() -> Self { Self::default() }
    pub fn len(&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    #[inline(always)]
    pub fn get(&self, key: &RequestKey) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.values.contains_key(key)
    }

    /// Stores `value` under `key`. Writing an equal value again is a no-op;
    /// a different value is refused and the stored one returned.
    pub fn insert(&mut self, key: RequestKey, value: Value) -> Result<(), Value> {
        match self.values.get(&key) {
            Some(existing) if *existing == value => Ok(()),
            Some(existing) => Err(existing.clone()),
            None => {
                self.values.insert(key, value);
                Ok(())
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RequestKey, &Value)> {
        self.values.iter()
    }
}
