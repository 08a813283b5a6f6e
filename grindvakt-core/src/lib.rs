//! # grindvakt-core
//!
//! Foundation layer shared by every Grindvakt crate.
//!
//! ### Key Submodules:
//! - `connection`: per-tick connection records and their resolved form
//! - `rule`: persistent block rules and deterministic rule naming
//! - `address`: remote addresses that are never block targets
//! - `command`: bounded execution of host utilities
//! - `error`: errors shared across adapters

pub mod address;
pub mod command;
pub mod connection;
pub mod error;
pub mod rule;

pub mod prelude {
    pub use crate::address::*;
    pub use crate::command::*;
    pub use crate::connection::*;
    pub use crate::error::*;
    pub use crate::rule::*;
}

pub use connection::{Connection, ConnectionDetail, Endpoint, Protocol, ResolvedConnection};
pub use error::CommandError;
pub use rule::{BlockRule, RuleNamer, DEFAULT_RULE_PREFIX};
