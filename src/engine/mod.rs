//! The revise-review convergence loop.

pub mod controller;
mod generator;
mod reviewer;
pub mod state;
pub mod verdict;

pub use controller::{ConvergenceController, ConvergenceOutcome, RoundReport};
pub use generator::Generator;
pub use reviewer::Reviewer;
