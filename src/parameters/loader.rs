//! Builds a `ParameterStore` from `(path, effective_from, value)` triples.
//!
//! The JSON form is a flat array of records:
//!
//! ```json
//! [
//!   { "path": "taxes.rate", "from": "2024-01-01", "value": 0.25 },
//!   { "path": "taxes.scale", "from": "2024-01-01",
//!     "value": { "brackets": [ { "threshold": 0, "rate": 0.1 },
//!                              { "threshold": null, "rate": 0.4 } ] } }
//! ]
//! ```
//!
//! A `null` threshold stands for the unbounded top of a scale.

use super::{ParameterError, ParameterStore, ParameterValue};
use crate::math::{Bracket, BracketScale};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

pub fn load_parameters<I, P>(source: I) -> Result<ParameterStore, ParameterError>
where
    I: IntoIterator<Item = (P, NaiveDate, ParameterValue)>,
    P: AsRef<str>,
{
    let mut store = ParameterStore::new();
    let mut breakpoints = 0usize;
    for (path, effective_from, value) in source {
        store.insert(path.as_ref(), effective_from, value)?;
        breakpoints += 1;
    }
    tracing::info!(parameters = store.leaf_count(), breakpoints, "parameter store loaded");
    Ok(store)
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    path: String,
    from: NaiveDate,
    value: RawValue,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Number(f64),
    Bool(bool),
    Scale { brackets: Vec<RawBracket> },
}

#[derive(Debug, Deserialize)]
struct RawBracket {
    threshold: Option<f64>,
    rate: f64,
}

impl RawRecord {
    fn into_triple(self) -> Result<(String, NaiveDate, ParameterValue), ParameterError> {
        let value = match self.value {
            RawValue::Number(v) => ParameterValue::Number(v),
            RawValue::Bool(v) => ParameterValue::Bool(v),
            RawValue::Scale { brackets } => {
                let brackets = brackets
                    .into_iter()
                    .map(|b| Bracket { threshold: b.threshold.unwrap_or(f64::INFINITY), rate: b.rate })
                    .collect();
                let scale = BracketScale::new(brackets)
                    .map_err(|e| ParameterError::Malformed(format!("{}: {e}", self.path)))?;
                ParameterValue::Scale(scale)
            }
        };
        Ok((self.path, self.from, value))
    }
}

pub fn load_parameters_json<R: Read>(reader: R) -> Result<ParameterStore, ParameterError> {
    let records: Vec<RawRecord> =
        serde_json::from_reader(reader).map_err(|e| ParameterError::Malformed(e.to_string()))?;
    let triples = records.into_iter().map(RawRecord::into_triple).collect::<Result<Vec<_>, _>>()?;
    load_parameters(triples)
}

pub fn load_parameters_file(path: impl AsRef<Path>) -> Result<ParameterStore, ParameterError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| ParameterError::Io(format!("{}: {e}", path.display())))?;
    tracing::debug!(file = %path.display(), "reading parameter file");
    load_parameters_json(BufReader::new(file))
}
