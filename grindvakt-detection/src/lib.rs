//! # Grindvakt Decision Engine
//!
//! Decides whether a resolved remote label is covered by the operator's
//! blocking criteria. No I/O and no shared state.

pub mod criteria;

pub use criteria::{should_block, CriteriaMatcher, DecisionError};
