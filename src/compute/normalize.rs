//! Maps a requested period onto the periods a variable is actually defined for.

use crate::periods::{Granularity, Period};
use crate::store::{Aggregation, Value, ValueType, VariableDefinition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The request matches the declared granularity.
    Formula,
    /// Evaluate this one period instead and return its value unchanged.
    Redirect(Period),
    /// Evaluate each sub-period and combine by the variable's aggregation.
    Aggregate(Vec<Period>),
    /// Evaluate `whole` and take an equal share of it.
    Divide { whole: Period, parts: usize },
}

/// `None` when the variable cannot be expressed over `requested`.
pub fn resolution(definition: &VariableDefinition, requested: Period) -> Option<Resolution> {
    let declared = definition.granularity;
    let asked = requested.granularity();

    if asked == declared {
        return Some(Resolution::Formula);
    }

    if asked > declared {
        if declared == Granularity::Instant {
            // A stock sampled at the last day of the request; flows have no
            // meaning over instants.
            return match definition.aggregation {
                Aggregation::LastValue => Some(Resolution::Redirect(Period::instant(requested.last_day()))),
                Aggregation::Sum | Aggregation::Average => None,
            };
        }
        return Some(Resolution::Aggregate(requested.subperiods(declared)));
    }

    let whole = requested.containing(declared);
    match definition.aggregation {
        Aggregation::Sum => {
            if asked == Granularity::Instant || definition.value_type != ValueType::Amount {
                return None;
            }
            let parts = whole.subperiods(asked).len();
            Some(Resolution::Divide { whole, parts })
        }
        Aggregation::LastValue | Aggregation::Average => Some(Resolution::Redirect(whole)),
    }
}

/// Combines sub-period values. `None` if the values do not fit the aggregation
/// or an integer sum overflows.
pub fn combine(aggregation: Aggregation, value_type: &ValueType, values: &[Value]) -> Option<Value> {
    match aggregation {
        Aggregation::LastValue => values.last().cloned().or_else(|| Some(value_type.default_value())),
        Aggregation::Sum => match value_type {
            ValueType::Integer => values
                .iter()
                .try_fold(0i64, |total, v| total.checked_add(v.as_integer()?))
                .map(Value::Integer),
            ValueType::Amount => values.iter().map(Value::as_amount).sum::<Option<f64>>().map(Value::Amount),
            _ => None,
        },
        Aggregation::Average => {
            if values.is_empty() {
                return Some(value_type.default_value());
            }
            let total = values.iter().map(Value::as_amount).sum::<Option<f64>>()?;
            Some(Value::Amount(total / values.len() as f64))
        }
    }
}

/// An equal share of `value` over `parts` periods.
pub fn divide(value: &Value, parts: usize) -> Option<Value> {
    let amount = value.as_amount()?;
    Some(Value::Amount(if parts == 0 { amount } else { amount / parts as f64 }))
}
