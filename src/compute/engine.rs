//! A single-threaded evaluation session over borrowed rules and entities.
//!
//! Requests are resolved on demand by recursive descent. Every resolved
//! request is memoised in the session's `Ledger`; a request already on the
//! resolution stack is a cycle.
use super::ledger::{EvaluationError, Ledger, RequestKey};
use super::normalize::{self, Resolution};
use crate::config::EngineConfig;
use crate::entities::{EntityGraph, EntityId};
use crate::math::BracketScale;
use crate::parameters::{ParameterStore, ParameterValue, ParameterView};
use crate::periods::Period;
use crate::store::{InputSpread, NegativePolicy, Value, ValueType, VariableDefinition, VariableId, VariableRegistry};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace, warn};

pub struct Session<'a> {
    parameters: &'a ParameterStore,
    variables: &'a VariableRegistry,
    entities: &'a EntityGraph,
    config: EngineConfig,
    ledger: Ledger,
    // Keys written by `set_input` rather than computed.
    inputs: HashSet<RequestKey>,
    stack: Vec<RequestKey>,
    in_progress: HashSet<RequestKey>,
    dependencies: HashMap<RequestKey, Vec<RequestKey>>,
    formula_calls: usize,
}

impl<'a> Session<'a> {
    pub fn new(parameters: &'a ParameterStore, variables: &'a VariableRegistry, entities: &'a EntityGraph) -> Self {
        Self::with_config(parameters, variables, entities, EngineConfig::default())
    }

    pub fn with_config(
        parameters: &'a ParameterStore,
        variables: &'a VariableRegistry,
        entities: &'a EntityGraph,
        config: EngineConfig,
    ) -> Self {
        Self {
            parameters,
            variables,
            entities,
            config,
            ledger: Ledger::new(),
            inputs: HashSet::new(),
            stack: Vec::new(),
            in_progress: HashSet::new(),
            dependencies: HashMap::new(),
            formula_calls: 0,
        }
    }

    pub fn parameters(&self) -> &'a ParameterStore { self.parameters }
    pub fn variables(&self) -> &'a VariableRegistry { self.variables }
    pub fn entities(&self) -> &'a EntityGraph { self.entities }
    pub fn config(&self) -> &EngineConfig { &self.config }
    pub fn ledger(&self) -> &Ledger { &self.ledger }

    /// Number of formula bodies run so far. Cache hits and inputs do not count.
    pub fn formula_calls(&self) -> usize { self.formula_calls }

    /// Direct dependencies of `key`, in first-request order. Empty unless tracing is enabled.
    pub fn dependencies(&self, key: &RequestKey) -> &[RequestKey] {
        self.dependencies.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_input(&self, key: &RequestKey) -> bool { self.inputs.contains(key) }

    pub fn describe(&self, key: &RequestKey) -> String {
        let name = self.variables.definition(key.variable).map_or("?", |d| d.name.as_str());
        format!("{}<{}>@{}", name, self.entities.key_of(key.entity), key.period)
    }

    pub fn evaluate(&mut self, variable: &str, entity: EntityId, period: Period) -> Result<Value, EvaluationError> {
        let id = self.variables.id_of(variable)?;
        self.evaluate_id(id, entity, period)
    }

    /// Formula-side name for `evaluate`.
    pub fn calculate(&mut self, variable: &str, entity: EntityId, period: Period) -> Result<Value, EvaluationError> {
        self.evaluate(variable, entity, period)
    }

    pub fn evaluate_id(&mut self, variable: VariableId, entity: EntityId, period: Period) -> Result<Value, EvaluationError> {
        let (variables, entities) = (self.variables, self.entities);
        let definition = variables.definition(variable)?;
        let key = RequestKey::new(variable, entity, period);

        self.evaluate_key(definition, key)
            .map_err(|e| e.within(&definition.name, entities.key_of(entity), period))
    }

    fn evaluate_key(&mut self, definition: &'a VariableDefinition, key: RequestKey) -> Result<Value, EvaluationError> {
        self.check_entity(definition, key.entity)?;
        self.record_dependency(key);

        if let Some(value) = self.ledger.get(&key) {
            trace!(variable = %definition.name, entity = %key.entity, period = %key.period, "cache hit");
            return Ok(value.clone());
        }
        debug!(variable = %definition.name, entity = %key.entity, period = %key.period, "cache miss");

        self.enter(key)?;
        let result = self.resolve(definition, key);
        self.leave(key);
        let value = result?;

        if self.ledger.insert(key, value.clone()).is_err() {
            return Err(EvaluationError::InputConflict {
                variable: definition.name.clone(),
                entity: self.entities.key_of(key.entity).to_string(),
                period: key.period,
            });
        }
        Ok(value)
    }

    fn check_entity(&self, definition: &VariableDefinition, entity: EntityId) -> Result<(), EvaluationError> {
        let found = self.entities.get(entity)?;
        let expected = definition.entity.name();
        if found.type_name() != expected {
            return Err(EvaluationError::EntityMismatch {
                variable: definition.name.clone(),
                entity: found.key.clone(),
                expected: expected.to_string(),
                found: found.type_name().to_string(),
            });
        }
        Ok(())
    }

    fn record_dependency(&mut self, key: RequestKey) {
        if !self.config.trace {
            return;
        }
        if let Some(parent) = self.stack.last() {
            let children = self.dependencies.entry(*parent).or_default();
            if !children.contains(&key) {
                children.push(key);
            }
        }
    }

    fn enter(&mut self, key: RequestKey) -> Result<(), EvaluationError> {
        if self.in_progress.contains(&key) {
            let first = self.stack.iter().position(|k| *k == key).unwrap_or(0);
            let cycle: Vec<String> =
                self.stack[first..].iter().chain(std::iter::once(&key)).map(|k| self.describe(k)).collect();
            warn!(cycle = %cycle.join(" -> "), "circular dependency");
            return Err(EvaluationError::CircularDependency { cycle });
        }
        if self.stack.len() >= self.config.max_depth {
            warn!(limit = self.config.max_depth, request = %self.describe(&key), "evaluation depth exceeded");
            return Err(EvaluationError::DepthExceeded { limit: self.config.max_depth });
        }
        self.stack.push(key);
        self.in_progress.insert(key);
        Ok(())
    }

    fn leave(&mut self, key: RequestKey) {
        self.stack.pop();
        self.in_progress.remove(&key);
    }

    fn resolve(&mut self, definition: &'a VariableDefinition, key: RequestKey) -> Result<Value, EvaluationError> {
        let incompatible = || EvaluationError::IncompatiblePeriod {
            variable: definition.name.clone(),
            granularity: definition.granularity,
            period: key.period,
        };
        let malformed = |found: &Value| EvaluationError::TypeMismatch {
            variable: definition.name.clone(),
            expected: definition.value_type.to_string(),
            found: found.kind(),
        };

        match normalize::resolution(definition, key.period).ok_or_else(incompatible)? {
            Resolution::Formula => self.run_formula(definition, key.entity, key.period),
            Resolution::Redirect(period) => self.evaluate_id(key.variable, key.entity, period),
            Resolution::Aggregate(parts) => {
                let mut values = Vec::with_capacity(parts.len());
                for period in parts {
                    values.push(self.evaluate_id(key.variable, key.entity, period)?);
                }
                normalize::combine(definition.aggregation, &definition.value_type, &values).ok_or_else(|| {
                    match values.iter().find(|v| !v.matches(&definition.value_type)) {
                        Some(odd) => malformed(odd),
                        None => EvaluationError::Overflow { variable: definition.name.clone(), period: key.period },
                    }
                })
            }
            Resolution::Divide { whole, parts } => {
                let value = self.evaluate_id(key.variable, key.entity, whole)?;
                normalize::divide(&value, parts).ok_or_else(|| malformed(&value))
            }
        }
    }

    fn run_formula(&mut self, definition: &'a VariableDefinition, entity: EntityId, period: Period) -> Result<Value, EvaluationError> {
        // Inputs, and dates outside every formula window, take the declared default.
        let Some(formula) = definition.formula_at(period.start()) else {
            return Ok(definition.default.clone());
        };

        debug!(variable = %definition.name, entity = %entity, period = %period, "running formula");
        self.formula_calls += 1;
        let value = formula.call(self, entity, period)?.coerce(&definition.value_type);

        if !value.matches(&definition.value_type) {
            return Err(EvaluationError::TypeMismatch {
                variable: definition.name.clone(),
                expected: definition.value_type.to_string(),
                found: value.kind(),
            });
        }
        Ok(apply_negative_policy(definition.negative_policy, value))
    }

    // ---- Typed reads for formulas ----

    pub fn amount(&mut self, variable: &str, entity: EntityId, period: Period) -> Result<f64, EvaluationError> {
        match self.evaluate(variable, entity, period)? {
            Value::Amount(v) => Ok(v),
            Value::Integer(v) => Ok(v as f64),
            other => Err(read_mismatch(variable, "amount", &other)),
        }
    }

    pub fn flag(&mut self, variable: &str, entity: EntityId, period: Period) -> Result<bool, EvaluationError> {
        let value = self.evaluate(variable, entity, period)?;
        value.as_bool().ok_or_else(|| read_mismatch(variable, "boolean", &value))
    }

    pub fn integer(&mut self, variable: &str, entity: EntityId, period: Period) -> Result<i64, EvaluationError> {
        let value = self.evaluate(variable, entity, period)?;
        value.as_integer().ok_or_else(|| read_mismatch(variable, "integer", &value))
    }

    pub fn enum_value(&mut self, variable: &str, entity: EntityId, period: Period) -> Result<String, EvaluationError> {
        match self.evaluate(variable, entity, period)? {
            Value::Enum(v) => Ok(v),
            other => Err(read_mismatch(variable, "enum", &other)),
        }
    }

    // ---- Parameters, resolved at the period start ----

    pub fn parameter(&self, path: &str, period: Period) -> Result<&'a ParameterValue, EvaluationError> {
        let parameters = self.parameters;
        Ok(parameters.resolve(path, period.start())?)
    }

    pub fn number(&self, path: &str, period: Period) -> Result<f64, EvaluationError> {
        Ok(self.parameters.number(path, period.start())?)
    }

    pub fn scale(&self, path: &str, period: Period) -> Result<&'a BracketScale, EvaluationError> {
        let parameters = self.parameters;
        Ok(parameters.scale(path, period.start())?)
    }

    pub fn parameters_at(&self, period: Period) -> ParameterView<'a> {
        self.parameters.at(period.start())
    }

    // ---- Entity navigation ----

    pub fn members(&self, group: EntityId) -> Result<Vec<EntityId>, EvaluationError> {
        Ok(self.entities.members(group)?)
    }

    pub fn role_members(&self, group: EntityId, role: &str) -> Result<&'a [EntityId], EvaluationError> {
        let entities = self.entities;
        Ok(entities.get_role_members(group, role)?)
    }

    pub fn group_of(&self, person: EntityId, group_type: &str) -> Option<EntityId> {
        self.entities.group_of(person, group_type)
    }

    /// Sum of a person-level amount over a group's members, or over one role.
    pub fn sum_members(
        &mut self,
        group: EntityId,
        role: Option<&str>,
        variable: &str,
        period: Period,
    ) -> Result<f64, EvaluationError> {
        let persons = match role {
            Some(role) => self.role_members(group, role)?.to_vec(),
            None => self.members(group)?,
        };
        let mut total = 0.0;
        for person in persons {
            total += self.amount(variable, person, period)?;
        }
        Ok(total)
    }

    // ---- Inputs ----

    /// Stores caller data before evaluation. A value for a coarser period is
    /// spread over the variable's own periods according to its `InputSpread`.
    pub fn set_input(
        &mut self,
        variable: &str,
        entity: EntityId,
        period: Period,
        value: impl Into<Value>,
    ) -> Result<(), EvaluationError> {
        let variables = self.variables;
        let (id, definition) = variables.lookup(variable)?;
        self.check_entity(definition, entity)?;

        let value = value.into().coerce(&definition.value_type);
        if !value.matches(&definition.value_type) {
            return Err(EvaluationError::TypeMismatch {
                variable: definition.name.clone(),
                expected: definition.value_type.to_string(),
                found: value.kind(),
            });
        }

        let incompatible = || EvaluationError::IncompatiblePeriod {
            variable: definition.name.clone(),
            granularity: definition.granularity,
            period,
        };
        let writes: Vec<(Period, Value)> = if period.granularity() == definition.granularity {
            vec![(period, value)]
        } else if period.granularity() > definition.granularity {
            let parts = period.subperiods(definition.granularity);
            match definition.input_spread {
                InputSpread::None => return Err(incompatible()),
                InputSpread::CopyToSubperiods => parts.into_iter().map(|p| (p, value.clone())).collect(),
                InputSpread::DivideByPeriod => {
                    let share = normalize::divide(&value, parts.len()).ok_or_else(|| EvaluationError::TypeMismatch {
                        variable: definition.name.clone(),
                        expected: ValueType::Amount.to_string(),
                        found: value.kind(),
                    })?;
                    parts.into_iter().map(|p| (p, share.clone())).collect()
                }
            }
        } else {
            return Err(incompatible());
        };

        // All or nothing: refuse before writing anything.
        for (p, v) in &writes {
            let key = RequestKey::new(id, entity, *p);
            if self.ledger.get(&key).is_some_and(|existing| existing != v) {
                return Err(EvaluationError::InputConflict {
                    variable: definition.name.clone(),
                    entity: self.entities.key_of(entity).to_string(),
                    period: *p,
                });
            }
        }

        debug!(variable = %definition.name, entity = %entity, period = %period, writes = writes.len(), "input set");
        for (p, v) in writes {
            let key = RequestKey::new(id, entity, p);
            self.ledger.insert(key, v).map_err(|_| EvaluationError::InputConflict {
                variable: definition.name.clone(),
                entity: self.entities.key_of(entity).to_string(),
                period: p,
            })?;
            self.inputs.insert(key);
        }
        Ok(())
    }
}

fn apply_negative_policy(policy: NegativePolicy, value: Value) -> Value {
    match (policy, value) {
        (NegativePolicy::ClampToZero, Value::Amount(v)) if v < 0.0 => Value::Amount(0.0),
        (NegativePolicy::ClampToZero, Value::Integer(v)) if v < 0 => Value::Integer(0),
        (_, value) => value,
    }
}

fn read_mismatch(variable: &str, expected: &str, found: &Value) -> EvaluationError {
    EvaluationError::TypeMismatch { variable: variable.to_string(), expected: expected.to_string(), found: found.kind() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::periods::Granularity;
    use crate::parameters::ParameterError;
    use crate::store::{Aggregation, RegistryError, ValidityWindow};
    use chrono::Datelike;
    use crate::testing::{self, Household};
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn month(m: u32) -> Period { Period::month(2024, m).unwrap() }
    fn year() -> Period { Period::year(2024).unwrap() }

    fn registry(defs: Vec<VariableDefinition>) -> VariableRegistry {
        let mut reg = VariableRegistry::new();
        reg.register_all(defs).unwrap();
        reg
    }

    fn graph() -> (EntityGraph, EntityId) {
        let mut b = EntityGraph::builder();
        let alice = b.add_person("alice").unwrap();
        (b.build(), alice)
    }

    #[test]
    fn test_monthly_salary_and_income_tax() {
        let Household { parameters, variables, entities, alice, household, .. } = testing::household();
        let mut session = Session::new(&parameters, &variables, &entities);
        session.set_input("salary", alice, year(), 60_000.0).unwrap();

        assert_eq!(session.evaluate("salary", alice, month(3)).unwrap(), Value::Amount(5_000.0));
        assert_eq!(session.evaluate("salary", alice, year()).unwrap(), Value::Amount(60_000.0));
        // 10% of the first 50k plus 30% of the next 10k.
        assert_eq!(session.amount("income_tax", alice, year()).unwrap(), 8_000.0);
        assert_eq!(session.amount("household_income", household, year()).unwrap(), 60_000.0);
    }

    #[test]
    fn test_household_year_sums_every_month_of_every_member() {
        let Household { parameters, variables, entities, alice, bob, household } = testing::household();
        let mut session = Session::new(&parameters, &variables, &entities);
        session.set_input("salary", alice, year(), 36_000.0).unwrap();
        for m in 1..=12 {
            session.set_input("salary", bob, month(m), f64::from(m) * 100.0).unwrap();
        }

        let mut expected = 0.0;
        for person in [alice, bob] {
            for m in 1..=12 {
                expected += session.amount("salary", person, month(m)).unwrap();
            }
        }
        assert_eq!(expected, 36_000.0 + 7_800.0);
        assert_eq!(session.amount("household_income", household, year()).unwrap(), expected);
    }

    #[test]
    fn test_repeated_evaluation_hits_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let variables = registry(vec![VariableDefinition::new("v", ValueType::Amount, Granularity::Month).formula(
            ValidityWindow::always(),
            move |_, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Amount(1.0))
            },
        )]);
        let parameters = ParameterStore::new();
        let (entities, alice) = graph();
        let mut session = Session::new(&parameters, &variables, &entities);

        for _ in 0..3 {
            assert_eq!(session.evaluate("v", alice, month(1)).unwrap(), Value::Amount(1.0));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.formula_calls(), 1);

        // January comes from the cache; the other eleven months run once each.
        assert_eq!(session.evaluate("v", alice, year()).unwrap(), Value::Amount(12.0));
        assert_eq!(calls.load(Ordering::SeqCst), 12);
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let variables = registry(vec![
            VariableDefinition::new("a", ValueType::Amount, Granularity::Month)
                .formula(ValidityWindow::always(), |s, e, p| Ok(Value::Amount(s.amount("b", e, p)? + 1.0))),
            VariableDefinition::new("b", ValueType::Amount, Granularity::Month)
                .formula(ValidityWindow::always(), |s, e, p| Ok(Value::Amount(s.amount("a", e, p)?))),
        ]);
        let parameters = ParameterStore::new();
        let (entities, alice) = graph();
        let mut session = Session::new(&parameters, &variables, &entities);

        let err = session.evaluate("a", alice, month(1)).unwrap_err();
        let EvaluationError::CircularDependency { cycle } = err.root() else { panic!("expected cycle, got {err}") };
        assert_eq!(cycle, &["a<alice>@2024-01", "b<alice>@2024-01", "a<alice>@2024-01"]);
        // The stack unwinds on failure; nothing stays in progress.
        assert!(session.stack.is_empty() && session.in_progress.is_empty());
        assert!(session.ledger().is_empty());
    }

    #[test]
    fn test_previous_period_is_not_a_cycle() {
        let variables = registry(vec![VariableDefinition::new("balance", ValueType::Amount, Granularity::Month)
            .aggregation(Aggregation::LastValue)
            .formula(ValidityWindow::always(), |s, e, p| {
                if p.start().month() == 1 {
                    return Ok(Value::Amount(100.0));
                }
                Ok(Value::Amount(s.amount("balance", e, p.offset(-1)?)? + 10.0))
            })]);
        let parameters = ParameterStore::new();
        let (entities, alice) = graph();
        let mut session = Session::new(&parameters, &variables, &entities);
        assert_eq!(session.amount("balance", alice, month(12)).unwrap(), 210.0);
        assert_eq!(session.amount("balance", alice, year()).unwrap(), 210.0);
    }

    #[test]
    fn test_depth_limit() {
        let variables = registry(vec![VariableDefinition::new("chain", ValueType::Amount, Granularity::Month)
            .formula(ValidityWindow::always(), |s, e, p| Ok(Value::Amount(s.amount("chain", e, p.offset(-1)?)? + 1.0)))]);
        let parameters = ParameterStore::new();
        let (entities, alice) = graph();
        let config = EngineConfig::default().with_max_depth(8);
        let mut session = Session::with_config(&parameters, &variables, &entities, config);

        let err = session.evaluate("chain", alice, month(6)).unwrap_err();
        assert_eq!(err.root(), &EvaluationError::DepthExceeded { limit: 8 });
        assert!(session.stack.is_empty());
    }

    #[test]
    fn test_entity_mismatch() {
        let Household { parameters, variables, entities, household, .. } = testing::household();
        let mut session = Session::new(&parameters, &variables, &entities);
        let err = session.evaluate("salary", household, month(1)).unwrap_err();
        assert!(matches!(err.root(), EvaluationError::EntityMismatch { expected, .. } if expected == "person"));
    }

    #[test]
    fn test_date_outside_every_window_takes_default() {
        let date = |y, m, d| chrono::NaiveDate::from_ymd_opt(y, m, d).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let variables = registry(vec![
            VariableDefinition::new("benefit", ValueType::Amount, Granularity::Month)
                .default_value(7.0)
                .formula(ValidityWindow::between(date(2020, 1, 1), date(2022, 12, 31)), move |_, _, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Amount(5.0))
                }),
            VariableDefinition::new("total", ValueType::Amount, Granularity::Month)
                .formula(ValidityWindow::always(), |s, e, p| Ok(Value::Amount(s.amount("benefit", e, p)? + 1.0))),
        ]);
        let parameters = ParameterStore::new();
        let (entities, alice) = graph();
        let mut session = Session::new(&parameters, &variables, &entities);

        assert_eq!(session.amount("benefit", alice, Period::month(2021, 6).unwrap()).unwrap(), 5.0);
        assert_eq!(session.evaluate("benefit", alice, month(1)).unwrap(), Value::Amount(7.0));
        assert_eq!(session.amount("total", alice, month(1)).unwrap(), 8.0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let key = RequestKey::new(variables.id_of("benefit").unwrap(), alice, month(1));
        assert_eq!(session.ledger().get(&key), Some(&Value::Amount(7.0)));
        // The registry itself still reports the gap.
        assert!(matches!(variables.get_formula("benefit", date(2024, 1, 1)), Err(RegistryError::NoApplicableFormula { .. })));
    }

    #[test]
    fn test_error_names_originating_variable() {
        let variables = registry(vec![
            VariableDefinition::new("allowance", ValueType::Amount, Granularity::Month)
                .formula(ValidityWindow::always(), |s, _, p| Ok(Value::Amount(s.number("allowance.amount", p)?))),
            VariableDefinition::new("total", ValueType::Amount, Granularity::Month)
                .formula(ValidityWindow::always(), |s, e, p| Ok(Value::Amount(s.amount("allowance", e, p)?))),
        ]);
        let parameters = ParameterStore::new();
        let (entities, alice) = graph();
        let mut session = Session::new(&parameters, &variables, &entities);

        let err = session.evaluate("total", alice, month(1)).unwrap_err();
        let EvaluationError::Context { variable, source, .. } = &err else { panic!("expected context") };
        assert_eq!(variable, "allowance");
        assert!(matches!(**source, EvaluationError::Parameter(ParameterError::UnknownParameter { .. })));
    }

    #[test]
    fn test_integer_year_sum_overflow() {
        let variables = registry(vec![VariableDefinition::new("units", ValueType::Integer, Granularity::Month)
            .formula(ValidityWindow::always(), |_, _, _| Ok(Value::Integer(i64::MAX / 4)))]);
        let parameters = ParameterStore::new();
        let (entities, alice) = graph();
        let mut session = Session::new(&parameters, &variables, &entities);

        assert_eq!(session.integer("units", alice, month(1)).unwrap(), i64::MAX / 4);
        let err = session.evaluate("units", alice, year()).unwrap_err();
        assert!(matches!(err.root(), EvaluationError::Overflow { variable, period } if variable == "units" && *period == year()));
    }

    #[test]
    fn test_type_mismatch_and_clamp() {
        let variables = registry(vec![
            VariableDefinition::new("flag", ValueType::Boolean, Granularity::Month)
                .formula(ValidityWindow::always(), |_, _, _| Ok(Value::Amount(1.0))),
            VariableDefinition::new("net", ValueType::Amount, Granularity::Month)
                .negative_policy(NegativePolicy::ClampToZero)
                .formula(ValidityWindow::always(), |_, _, _| Ok(Value::Amount(-40.0))),
            VariableDefinition::new("shortfall", ValueType::Amount, Granularity::Month)
                .formula(ValidityWindow::always(), |_, _, _| Ok(Value::Integer(-40))),
        ]);
        let parameters = ParameterStore::new();
        let (entities, alice) = graph();
        let mut session = Session::new(&parameters, &variables, &entities);

        assert!(matches!(session.evaluate("flag", alice, month(1)).unwrap_err().root(), EvaluationError::TypeMismatch { .. }));
        assert_eq!(session.amount("net", alice, month(1)).unwrap(), 0.0);
        assert_eq!(session.evaluate("shortfall", alice, month(1)).unwrap(), Value::Amount(-40.0));
    }

    #[test]
    fn test_input_spread_and_conflicts() {
        let variables = registry(vec![
            VariableDefinition::new("rent", ValueType::Amount, Granularity::Month),
            VariableDefinition::new("owner", ValueType::Boolean, Granularity::Month)
                .aggregation(Aggregation::LastValue)
                .input_spread(InputSpread::CopyToSubperiods),
            VariableDefinition::new("allowance", ValueType::Amount, Granularity::Month)
                .input_spread(InputSpread::DivideByPeriod),
        ]);
        let parameters = ParameterStore::new();
        let (entities, alice) = graph();
        let mut session = Session::new(&parameters, &variables, &entities);

        let err = session.set_input("rent", alice, year(), 1200.0).unwrap_err();
        assert!(matches!(err, EvaluationError::IncompatiblePeriod { .. }));
        let err = session.set_input("rent", alice, "2024-03-05".parse().unwrap(), 10.0).unwrap_err();
        assert!(matches!(err, EvaluationError::IncompatiblePeriod { .. }));
        assert!(matches!(session.set_input("rent", alice, month(1), true), Err(EvaluationError::TypeMismatch { .. })));

        session.set_input("owner", alice, year(), true).unwrap();
        assert!(session.flag("owner", alice, month(7)).unwrap());

        session.set_input("allowance", alice, month(2), 50.0).unwrap();
        // A conflicting spread must not write any month.
        let err = session.set_input("allowance", alice, year(), 1200.0).unwrap_err();
        assert!(matches!(err, EvaluationError::InputConflict { period, .. } if period == month(2)));
        assert_eq!(session.amount("allowance", alice, month(1)).unwrap(), 0.0);

        session.set_input("rent", alice, month(1), 700_i64).unwrap();
        session.set_input("rent", alice, month(1), 700.0).unwrap();
        assert!(session.set_input("rent", alice, month(1), 701.0).is_err());
        assert_eq!(session.amount("rent", alice, month(1)).unwrap(), 700.0);
    }

    #[test]
    fn test_projections_between_granularities() {
        let Household { parameters, variables, entities, alice, household, .. } = testing::household();
        let mut session = Session::new(&parameters, &variables, &entities);
        session.set_input("salary", alice, year(), 24_000.0).unwrap();
        session.set_input("rent", household, month(12), 900.0).unwrap();

        // Yearly tax is divided over the months of the year.
        let yearly = session.amount("income_tax", alice, year()).unwrap();
        assert_eq!(session.amount("income_tax", alice, month(4)).unwrap(), yearly / 12.0);
        // A stock read for the year is its December value.
        assert_eq!(session.amount("rent", household, year()).unwrap(), 900.0);
        // Sum over instants is undefined.
        let err = session.evaluate("salary", alice, "2024-03-05".parse().unwrap()).unwrap_err();
        assert!(matches!(err.root(), EvaluationError::IncompatiblePeriod { .. }));
    }

    #[test]
    fn test_group_variables_read_members() {
        let Household { parameters, variables, entities, alice, bob, household } = testing::household();
        let mut session = Session::new(&parameters, &variables, &entities);
        session.set_input("salary", alice, year(), 12_000.0).unwrap();
        session.set_input("salary", bob, year(), 24_000.0).unwrap();

        assert_eq!(session.sum_members(household, Some("head"), "salary", year()).unwrap(), 12_000.0);
        assert_eq!(session.sum_members(household, None, "salary", year()).unwrap(), 36_000.0);
        assert_eq!(session.group_of(bob, "household"), Some(household));
        assert!(session.role_members(household, "lodger").is_err());
        // The credit tapers away with household income: 3000 - 0.15 * (36000 - 20000).
        assert_eq!(session.amount("housing_credit", household, year()).unwrap(), 600.0);
    }

    #[test]
    fn test_housing_tax_reads_january_situation() {
        let Household { parameters, variables, entities, alice, household, .. } = testing::household();
        let owner = || Value::Enum("owner".into());

        // Unset status takes the first variant; tenants owe the minimal amount.
        let mut session = Session::new(&parameters, &variables, &entities);
        assert_eq!(session.enum_value("housing_occupancy_status", household, month(1)).unwrap(), testing::OCCUPANCY[0]);
        assert_eq!(session.amount("housing_tax", household, year()).unwrap(), 200.0);

        // Only January counts: a later move out does not change the tax.
        let mut session = Session::new(&parameters, &variables, &entities);
        session.set_input("salary", alice, year(), 24_000.0).unwrap();
        session.set_input("accommodation_size", household, month(1), 100.0).unwrap();
        session.set_input("housing_occupancy_status", household, month(1), owner()).unwrap();
        session.set_input("housing_occupancy_status", household, month(3), Value::Enum("free_lodger".into())).unwrap();
        assert_eq!(session.enum_value("housing_occupancy_status", household, month(3)).unwrap(), "free_lodger");
        assert_eq!(session.amount("housing_tax", household, year()).unwrap(), 1000.0);
        assert_eq!(session.amount("housing_tax", household, month(5)).unwrap(), 1000.0 / 12.0);
        assert_eq!(session.amount("disposable_income", household, month(1)).unwrap(), 2000.0 - 1000.0 / 12.0);

        let mut session = Session::new(&parameters, &variables, &entities);
        session.set_input("accommodation_size", household, month(1), 100.0).unwrap();
        session.set_input("housing_occupancy_status", household, month(1), Value::Enum("free_lodger".into())).unwrap();
        session.set_input("housing_occupancy_status", household, month(2), owner()).unwrap();
        assert_eq!(session.amount("housing_tax", household, year()).unwrap(), 0.0);

        let err = session.set_input("housing_occupancy_status", household, month(4), Value::Enum("castle".into()));
        assert!(matches!(err, Err(EvaluationError::TypeMismatch { .. })));
        assert!(!session.ledger().contains(&RequestKey::new(
            variables.id_of("housing_occupancy_status").unwrap(),
            household,
            month(4)
        )));
    }

    #[test]
    fn test_parameter_integer_and_average_reads() {
        let Household { parameters, variables, entities, household, .. } = testing::household();
        let mut session = Session::new(&parameters, &variables, &entities);
        assert_eq!(session.parameter("housing_tax.rate", year()).unwrap().as_number(), Some(10.0));
        assert_eq!(session.number("housing_tax.minimal_amount", month(6)).unwrap(), 200.0);
        assert_eq!(session.integer("household_size", household, year()).unwrap(), 2);
        // Integer sums are not divided into months.
        let err = session.integer("household_size", household, month(1)).unwrap_err();
        assert!(matches!(err.root(), EvaluationError::IncompatiblePeriod { .. }));

        let variables = registry(vec![VariableDefinition::new("energy_price", ValueType::Amount, Granularity::Month)
            .aggregation(Aggregation::Average)
            .formula(ValidityWindow::always(), |_, _, p| Ok(Value::Amount(p.start().month() as f64)))]);
        let (entities, alice) = graph();
        let mut session = Session::new(&parameters, &variables, &entities);
        assert_eq!(session.amount("energy_price", alice, year()).unwrap(), 6.5);
        assert_eq!(session.amount("energy_price", alice, month(3)).unwrap(), 3.0);
    }

    #[rstest]
    #[case::build_up(1_000.0, 250.0)]
    #[case::plateau(2_500.0, 5_000.0 / 12.0)]
    #[case::phase_out(5_000.0, 2_500.0 / 12.0)]
    #[case::phased_out(10_000.0, 0.0)]
    fn test_labour_credit(#[case] monthly_salary: f64, #[case] expected: f64) {
        let Household { parameters, variables, entities, alice, .. } = testing::household();
        let mut session = Session::new(&parameters, &variables, &entities);
        session.set_input("salary", alice, month(1), monthly_salary).unwrap();
        assert_eq!(session.amount("labour_credit", alice, month(1)).unwrap(), expected);
    }
}
