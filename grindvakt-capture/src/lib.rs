//! grindvakt‑capture
//!
//! Observes the host: which TCP connections exist and which process owns
//! them. Each concern sits behind a trait with one adapter per platform:
//!
//! | trait | Windows | Linux |
//! |---|---|---|
//! | [`ConnectionSource`] | [`NetstatSource`] | [`ProcNetSource`] |
//! | [`ProcessInspector`] | [`TasklistInspector`] | [`ProcCommInspector`] |

pub mod error;
pub mod netstat;
pub mod proc_comm;
pub mod proc_net;
pub mod source;
pub mod tasklist;

pub use error::CaptureError;
pub use netstat::NetstatSource;
pub use proc_comm::ProcCommInspector;
pub use proc_net::ProcNetSource;
pub use source::{ConnectionSource, ProcessInspector};
pub use tasklist::TasklistInspector;
