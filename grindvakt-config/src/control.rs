use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Local channel through which operator commands reach a running daemon.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct ControlConfig {
    /// Loopback address the daemon listens on.
    #[validate(custom(function = validation::validate_loopback))]
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Upper bound for one request, cascades included (milliseconds).
    #[validate(range(min = 100, max = 600_000))]
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 47_310))
}
fn default_request_timeout() -> u64 {
    30_000
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}
