//! Progressive bracket scales.

use super::MathError;
use serde::{Deserialize, Serialize};

/// One band of a scale: income from `threshold` up to the next bracket's
/// threshold is taxed at `rate`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    pub threshold: f64,
    pub rate: f64,
}

/// Ordered brackets with strictly increasing thresholds. The last threshold may
/// be `f64::INFINITY`, in which case that bracket is never reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Bracket>", into = "Vec<Bracket>")]
pub struct BracketScale {
    brackets: Vec<Bracket>,
}

impl BracketScale {
    pub fn new(brackets: Vec<Bracket>) -> Result<Self, MathError> {
        if brackets.is_empty() {
            return Err(MathError::InvalidScale("scale has no brackets".into()));
        }
        let last = brackets.len() - 1;
        for (i, b) in brackets.iter().enumerate() {
            if !b.rate.is_finite() {
                return Err(MathError::InvalidScale(format!("bracket {i} has non-finite rate {}", b.rate)));
            }
            if b.threshold.is_nan() || b.threshold < 0.0 {
                return Err(MathError::InvalidScale(format!("bracket {i} has invalid threshold {}", b.threshold)));
            }
            if b.threshold.is_infinite() && i != last {
                return Err(MathError::InvalidScale(format!("only the last threshold may be unbounded (bracket {i})")));
            }
        }
        if let Some(i) = brackets.windows(2).position(|w| w[0].threshold >= w[1].threshold) {
            return Err(MathError::InvalidScale(format!(
                "thresholds must be strictly increasing (brackets {i} and {})",
                i + 1
            )));
        }
        Ok(Self { brackets })
    }

    /// Convenience constructor from `(threshold, rate)` pairs.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Result<Self, MathError> {
        Self::new(pairs.iter().map(|&(threshold, rate)| Bracket { threshold, rate }).collect())
    }

    pub fn brackets(&self) -> &[Bracket] { &self.brackets }

    /// Rate of the bracket containing `amount`; zero below the first threshold.
    pub fn marginal_rate(&self, amount: f64) -> f64 {
        self.brackets
            .iter()
            .take_while(|b| b.threshold <= amount)
            .last()
            .map_or(0.0, |b| b.rate)
    }

    /// Upper bound of bracket `i` (the next threshold, or infinity).
    fn ceiling(&self, i: usize) -> f64 {
        self.brackets.get(i + 1).map_or(f64::INFINITY, |b| b.threshold)
    }
}

impl TryFrom<Vec<Bracket>> for BracketScale {
    type Error = MathError;
    fn try_from(brackets: Vec<Bracket>) -> Result<Self, Self::Error> { Self::new(brackets) }
}

impl From<BracketScale> for Vec<Bracket> {
    fn from(scale: BracketScale) -> Self { scale.brackets }
}

/// Sums, over every bracket, the share of `base_amount` falling in
/// `[threshold_i, threshold_{i+1})` times `rate_i`.
pub fn compute_progressive_tax(base_amount: f64, scale: &BracketScale) -> Result<f64, MathError> {
    if base_amount.is_nan() || base_amount < 0.0 {
        return Err(MathError::InvalidInput(format!(
            "progressive tax base must be non-negative, got {base_amount}"
        )));
    }

    let mut tax = 0.0;
    for (i, bracket) in scale.brackets.iter().enumerate() {
        if base_amount <= bracket.threshold {
            break;
        }
        let ceiling = scale.ceiling(i);
        let portion = base_amount.min(ceiling) - bracket.threshold;
        tax += portion * bracket.rate;
    }
    Ok(tax)
}
