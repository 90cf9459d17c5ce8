//! Linear phase-in and phase-out of credits and benefits.

use super::MathError;
use serde::{Deserialize, Serialize};

/// A benefit worth `full_value` up to `lower`, reduced by `rate` per unit
/// above it, and settled at `floor` from `upper` onwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Taper {
    pub lower: f64,
    pub upper: f64,
    pub full_value: f64,
    pub rate: f64,
    #[serde(default)]
    pub floor: f64,
}

impl Taper {
    pub fn new(lower: f64, upper: f64, full_value: f64, rate: f64) -> Result<Self, MathError> {
        Self { lower, upper, full_value, rate, floor: 0.0 }.validated()
    }

    pub fn with_floor(self, floor: f64) -> Result<Self, MathError> {
        Self { floor, ..self }.validated()
    }

    fn validated(self) -> Result<Self, MathError> {
        let fields = [self.lower, self.upper, self.full_value, self.rate, self.floor];
        if fields.iter().any(|v| v.is_nan()) {
            return Err(MathError::InvalidInput("taper parameters must not be NaN".into()));
        }
        if self.lower > self.upper {
            return Err(MathError::InvalidInput(format!(
                "taper lower bound {} exceeds upper bound {}",
                self.lower, self.upper
            )));
        }
        if self.rate < 0.0 {
            return Err(MathError::InvalidInput(format!("taper rate must be non-negative, got {}", self.rate)));
        }
        if self.floor > self.full_value {
            return Err(MathError::InvalidInput(format!(
                "taper floor {} exceeds full value {}",
                self.floor, self.full_value
            )));
        }
        Ok(self)
    }

    pub fn apply(&self, amount: f64) -> Result<f64, MathError> {
        if amount.is_nan() {
            return Err(MathError::InvalidInput("taper amount is NaN".into()));
        }
        let value = if amount <= self.lower {
            self.full_value
        } else if amount >= self.upper {
            self.floor
        } else {
            (self.full_value - self.rate * (amount - self.lower)).max(self.floor)
        };
        Ok(value)
    }
}

/// Tapers `full_value` between `lower_bound` and `upper_bound` with a zero floor.
pub fn compute_taper(
    amount: f64,
    lower_bound: f64,
    upper_bound: f64,
    full_value: f64,
    rate: f64,
) -> Result<f64, MathError> {
    Taper::new(lower_bound, upper_bound, full_value, rate)?.apply(amount)
}

/// Builds a credit up linearly with `amount` until it reaches `cap`.
pub fn compute_phase_in(amount: f64, rate: f64, cap: f64) -> Result<f64, MathError> {
    if amount.is_nan() || amount < 0.0 {
        return Err(MathError::InvalidInput(format!("phase-in amount must be non-negative, got {amount}")));
    }
    if rate.is_nan() || rate < 0.0 || cap.is_nan() || cap < 0.0 {
        return Err(MathError::InvalidInput(format!("invalid phase-in rate {rate} or cap {cap}")));
    }
    Ok((amount * rate).min(cap))
}
