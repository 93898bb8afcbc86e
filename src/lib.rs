pub mod config;
pub mod engine;
pub mod ledger;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod payment;
pub mod pricing;
pub mod reaper;
pub mod wire;

pub use engine::{Engine, EngineBuilder, EngineError, ErrorCategory};
