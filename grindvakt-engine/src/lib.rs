//! # Grindvakt Engine
//!
//! The connection enforcement engine: a periodic scan drives every TCP
//! connection of the target process through identify → resolve → decide →
//! enforce, and a control surface lets the operator inspect and revert what
//! was blocked.
//!
//! ### Modules:
//! - `identity`: memoized PID → process name lookups
//! - `pipeline`: per-connection processing
//! - `scan`: periodic fan-out with bounded concurrency
//! - `control`: operator operations on rules and criteria
//! - `channel`: loopback transport for operator commands to a running daemon
//! - `runtime`: assembly from configuration
//! - `shutdown`: signal-driven cancellation

pub mod channel;
pub mod control;
pub mod error;
pub mod identity;
pub mod pipeline;
pub mod runtime;
pub mod scan;
pub mod shutdown;

pub use channel::{
    dispatch, CascadeFailure, ControlClient, ControlRequest, ControlResponse, ControlServer,
    FailureKind,
};
pub use control::{ControlSurface, StatusReport};
pub use error::{ChannelError, ControlError, EngineError};
pub use identity::ProcessIdentityCache;
pub use pipeline::{Pipeline, PipelineOutcome};
pub use runtime::{HostAdapters, Runtime};
pub use scan::{ScanLoop, TickReport};
pub use shutdown::create_shutdown_token;
