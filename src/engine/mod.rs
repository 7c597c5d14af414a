//! Safety analysis computation engine.
//!
//! Turns crash records into ranked sites, appraises countermeasure
//! portfolios, selects projects under a budget, and evaluates treated sites
//! after construction. Everything here is a pure function of its inputs.

pub mod aggregate;
pub mod appraisal;
pub mod evaluate;
pub mod prioritize;
pub mod rank;
pub mod types;
pub mod utility;
