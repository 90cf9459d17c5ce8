//! Independent scenarios evaluated in parallel, one session each.

use super::engine::Session;
use super::ledger::EvaluationError;
use crate::config::EngineConfig;
use crate::entities::EntityGraph;
use crate::parameters::ParameterStore;
use crate::periods::Period;
use crate::store::{Value, VariableRegistry};
use rayon::prelude::*;
use serde::Deserialize;

/// One caller-supplied value. `entity` is the entity key.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InputRecord {
    pub variable: String,
    pub entity: String,
    pub period: Period,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Request {
    pub variable: String,
    pub entity: String,
    pub period: Period,
}

#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub entities: EntityGraph,
    pub inputs: Vec<InputRecord>,
}

/// Applies the scenario's inputs and evaluates `requests` in order.
pub fn run_scenario(
    parameters: &ParameterStore,
    variables: &VariableRegistry,
    config: EngineConfig,
    scenario: &Scenario,
    requests: &[Request],
) -> Result<Vec<Value>, EvaluationError> {
    let mut session = Session::with_config(parameters, variables, &scenario.entities, config);
    for input in &scenario.inputs {
        let entity = scenario.entities.entity_by_key(&input.entity)?;
        session.set_input(&input.variable, entity, input.period, input.value.clone())?;
    }
    requests
        .iter()
        .map(|r| {
            let entity = scenario.entities.entity_by_key(&r.entity)?;
            session.evaluate(&r.variable, entity, r.period)
        })
        .collect()
}

/// Results are in scenario order. A failing scenario does not affect the others.
pub fn run_scenarios(
    parameters: &ParameterStore,
    variables: &VariableRegistry,
    config: EngineConfig,
    scenarios: &[Scenario],
    requests: &[Request],
) -> Vec<Result<Vec<Value>, EvaluationError>> {
    tracing::info!(scenarios = scenarios.len(), requests = requests.len(), "running scenario batch");
    scenarios
        .par_iter()
        .map(|scenario| {
            let result = run_scenario(parameters, variables, config, scenario, requests);
            if let Err(e) = &result {
                tracing::debug!(scenario = %scenario.name, error = %e.root(), "scenario failed");
            }
            result
        })
        .collect()
}
