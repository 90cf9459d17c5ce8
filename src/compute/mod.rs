//! On-demand evaluation of variables: sessions, memoisation and period projection.
pub mod batch;
pub mod engine;
pub mod ledger;
pub mod normalize;

pub use batch::{run_scenario, run_scenarios, InputRecord, Request, Scenario};
pub use engine::Session;
pub use ledger::{EvaluationError, Ledger, RequestKey};
