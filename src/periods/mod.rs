//! Dated intervals over which variables are evaluated.
pub mod period;

pub use period::{Granularity, Period, PeriodError};
