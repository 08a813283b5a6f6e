//! # Grindvakt Prevention
//!
//! Installs and removes per-IP outbound block rules in the host firewall and
//! keeps the ledger of installed rules consistent with it.
//!
//! ### Modules:
//! - `firewall/`: firewall control port with `netsh` and `iptables` adapters
//! - `ledger`: durable `{ blockRules, blockingStrings }` store
//! - `authority`: idempotent block / unblock with in-flight guards

pub mod authority;
pub mod error;
pub mod firewall;
pub mod ledger;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use authority::{BlockOutcome, CascadeReport, EnforcementAuthority, UnblockOutcome};
pub use error::{EnforcementError, FirewallError, LedgerError};
pub use firewall::{FirewallController, IptablesFirewall, NetshFirewall};
pub use ledger::{LedgerState, RetryPolicy, RuleLedger};
