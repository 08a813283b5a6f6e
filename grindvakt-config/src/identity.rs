use serde::{Deserialize, Serialize};
use validator::{self, Validate};

/// Process identity cache parameters.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct IdentityConfig {
    /// Lifetime of a cached PID → name entry (seconds). `0` keeps entries forever.
    #[validate(range(max = 86_400))]
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Timeout for a single process lookup (milliseconds).
    #[validate(range(min = 100, max = 60_000))]
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_ms: u64,
}

fn default_cache_ttl() -> u64 {
    300
}
fn default_lookup_timeout() -> u64 {
    3000
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            lookup_timeout_ms: default_lookup_timeout(),
        }
    }
}
