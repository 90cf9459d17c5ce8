//! Time-indexed legislative constants and their loaders.
pub mod loader;
pub mod store;
pub mod value;

pub use loader::{load_parameters, load_parameters_file, load_parameters_json};
pub use store::{Breakpoint, Parameter, ParameterNode, ParameterStore, ParameterView};
pub use value::ParameterValue;

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("Unknown parameter '{path}'")]
    UnknownParameter { path: String },
    #[error("Parameter '{path}' has no value on or before {date}")]
    ParameterNotFound { path: String, date: NaiveDate },
    #[error("'{path}' is a parameter group, not a value")]
    GroupPath { path: String },
    #[error("Parameter '{path}' is a {found}, expected a {expected}")]
    TypeMismatch { path: String, expected: &'static str, found: &'static str },
    #[error("Parameter '{path}' already has a breakpoint at {date}")]
    DuplicateBreakpoint { path: String, date: NaiveDate },
    #[error("'{path}' is used both as a parameter and as a group")]
    PathConflict { path: String },
    #[error("Malformed parameter path '{0}'")]
    EmptyPath(String),
    #[error("Malformed parameter source: {0}")]
    Malformed(String),
    #[error("Cannot read parameter source: {0}")]
    Io(String),
}
