//! # Grindvakt Configuration System
//!
//! Hierarchical configuration for the enforcement daemon and its operator CLI.
//!
//! ## Features
//! - **Unified Configuration**: one tree shared by the scan loop, resolver,
//!   enforcement and ledger
//! - **Validation**: runtime validation of every bounded parameter
//! - **Environment Awareness**: per-environment overrides and `GRINDVAKT_*`
//!   environment variables

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

mod control;
mod error;
mod identity;
mod ledger;
mod prevention;
mod resolver;
mod scan;
mod telemetry;
mod validation;

pub use control::ControlConfig;
pub use error::ConfigError;
pub use identity::IdentityConfig;
pub use ledger::LedgerConfig;
pub use prevention::{FirewallBackend, PreventionConfig};
pub use resolver::ResolverConfig;
pub use scan::ScanConfig;
pub use telemetry::TelemetryConfig;

const BASE_CONFIG_PATH: &str = "config/grindvakt.yaml";
const ENV_PREFIX: &str = "GRINDVAKT_";

/// Top‑level configuration container for all Grindvakt components.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct GrindvaktConfig {
    /// Scan loop cadence, target process and worker bounds.
    #[validate(nested)]
    #[serde(default)]
    pub scan: ScanConfig,

    /// Process identity lookups.
    #[validate(nested)]
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Reverse DNS and cloud range resolution.
    #[validate(nested)]
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Firewall backend and rule naming.
    #[validate(nested)]
    #[serde(default)]
    pub prevention: PreventionConfig,

    /// Persisted rule ledger.
    #[validate(nested)]
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Operator command channel of the running daemon.
    #[validate(nested)]
    #[serde(default)]
    pub control: ControlConfig,

    /// Logging output.
    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl GrindvaktConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default Values
    /// 2. `config/grindvakt.yaml` - Base settings. If missing, defaults are used.
    /// 3. `config/<GRINDVAKT_ENV>.yaml` - Environment‑specific overrides.
    /// 4. `GRINDVAKT_*` environment variables (`__` separates nesting levels).
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(GrindvaktConfig::default()));

        if Path::new(BASE_CONFIG_PATH).exists() {
            figment = figment.merge(Yaml::file(BASE_CONFIG_PATH));
        } else {
            info!("{BASE_CONFIG_PATH} not found, using default configuration");
        }

        let env = std::env::var("GRINDVAKT_ENV").unwrap_or_else(|_| "production".into());
        let env_file = format!("config/{}.yaml", env);
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        Self::extract_validated(figment)
    }

    /// Load configuration from a specific path, still honouring environment overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        let figment =
            Figment::from(Serialized::defaults(GrindvaktConfig::default())).merge(Yaml::file(path));
        Self::extract_validated(figment)
    }

    fn extract_validated(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn full_config_validation() {
        let config = GrindvaktConfig::default();
        config.validate().expect("Default config should validate");
    }

    #[test]
    fn environment_override() {
        Jail::expect_with(|jail| {
            jail.set_env("GRINDVAKT_SCAN__INTERVAL_MS", "5000");
            jail.set_env("GRINDVAKT_SCAN__TARGET_PROCESS", "code");
            let config = GrindvaktConfig::load().expect("config should load");
            assert_eq!(config.scan.interval_ms, 5000);
            assert_eq!(config.scan.target_process, "code");
            Ok(())
        });
    }

    #[test]
    fn yaml_file_layers_over_defaults() {
        Jail::expect_with(|jail| {
            std::fs::create_dir_all("config").map_err(|e| e.to_string())?;
            jail.create_file(
                "config/grindvakt.yaml",
                r#"
ledger:
  path: state/ledger.json
  seed_criteria: ["s3"]
prevention:
  whitelist: ["52.95.0.0/16"]
"#,
            )?;
            let config = GrindvaktConfig::load().expect("config should load");
            assert_eq!(config.ledger.path, PathBuf::from("state/ledger.json"));
            assert_eq!(config.ledger.seed_criteria, vec!["s3".to_string()]);
            assert_eq!(config.prevention.whitelist.len(), 1);
            assert_eq!(config.scan.interval_ms, 2000);
            Ok(())
        });
    }

    #[test]
    fn invalid_values_are_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("GRINDVAKT_SCAN__INTERVAL_MS", "10");
            assert!(matches!(
                GrindvaktConfig::load(),
                Err(ConfigError::Validation(_))
            ));
            Ok(())
        });
    }

    #[test]
    fn control_channel_must_stay_on_loopback() {
        Jail::expect_with(|jail| {
            jail.set_env("GRINDVAKT_CONTROL__LISTEN", "0.0.0.0:47310");
            assert!(matches!(
                GrindvaktConfig::load(),
                Err(ConfigError::Validation(_))
            ));
            jail.set_env("GRINDVAKT_CONTROL__LISTEN", "127.0.0.1:9000");
            let config = GrindvaktConfig::load().expect("config should load");
            assert_eq!(config.control.listen.port(), 9000);
            Ok(())
        });
    }

    #[test]
    fn missing_explicit_path_is_reported() {
        let err = GrindvaktConfig::load_from_path("does/not/exist.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
