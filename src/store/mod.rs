//! The variable registry: every named quantity, its type, periodicity and
//! date-windowed formulas.
pub mod registry;
pub mod types;

pub use registry::{FormulaEntry, FormulaFn, RegistryError, ValidityWindow, VariableDefinition, VariableRegistry};
pub use types::{Aggregation, EntityType, InputSpread, NegativePolicy, Value, ValueType, VariableId};
