//! Rule evaluation for tax and benefit systems.
//!
//! A rule set is a `VariableRegistry` of named variables with date-windowed
//! formulas, evaluated against a `ParameterStore` of legislative constants
//! for the people and groups of an `EntityGraph`. Evaluation happens in a
//! `Session`, which memoises every request it resolves.

pub mod compute;
pub mod config;
pub mod display;
pub mod entities;
pub mod math;
pub mod parameters;
pub mod periods;
pub mod store;

pub use compute::{EvaluationError, Session};
pub use config::EngineConfig;
pub use entities::{EntityGraph, EntityId};
pub use parameters::ParameterStore;
pub use periods::{Granularity, Period};
pub use store::{Value, ValueType, VariableDefinition, VariableRegistry};
