//! Stateless bracket and tapering primitives shared by all legislative rules.
//!
//! These functions take raw numeric scales so they stay independent of
//! periods, entities and the parameter store.
pub mod brackets;
pub mod taper;

pub use brackets::{compute_progressive_tax, Bracket, BracketScale};
pub use taper::{compute_phase_in, compute_taper, Taper};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid bracket scale: {0}")]
    InvalidScale(String),
}
