//! # Grindvakt Remote Identity Resolution
//!
//! Turns a raw remote IP into the label the blocking criteria are matched
//! against: reverse DNS hostname first, then a cloud provider label when the
//! IP falls inside the provider's published ranges, otherwise the IP itself.

pub mod cloud_ranges;
pub mod dns;
pub mod error;
pub mod resolver;

pub use cloud_ranges::{CloudRangeIndex, RangeMatcher};
pub use dns::{ReverseDns, SystemDns};
pub use error::ResolverError;
pub use resolver::RemoteIdentityResolver;
