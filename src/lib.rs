#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::unnecessary_literal_bound,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod analyzers;
pub mod cli;
pub mod collector;
pub mod config;
pub mod engine;
pub mod error;
pub mod manifest;
pub mod report;
pub mod utils;

pub use config::VettingConfig;
pub use engine::VettingEngine;
pub use error::{Result, VetError};
pub use report::{Finding, Recommendation, RiskLevel, Severity, VettingReport};
