// Configuration module entry point
// Loads adapter settings from an optional file and the environment snapshot

mod types;

pub use types::{Config, LoggingConfig};

use crate::env::Env;

/// Variable naming an alternative configuration file
pub const CONFIG_PATH_KEY: &str = "AZFUNC_CONFIG";
/// Configuration file looked up when no path is given (extension optional)
pub const DEFAULT_CONFIG_FILE: &str = "azfunc";
/// Prefix of configuration override variables, e.g. `AZFUNC__LOGGING__LEVEL`
pub const ENV_PREFIX: &str = "AZFUNC";

impl Config {
    /// Load configuration for an invocation
    ///
    /// The file named by `AZFUNC_CONFIG` (or `azfunc.*` in the working
    /// directory) is read when present; `AZFUNC__*` variables from the
    /// snapshot override it.
    pub fn from_env(env: &Env) -> Result<Self, config::ConfigError> {
        let path = env.get(CONFIG_PATH_KEY).unwrap_or(DEFAULT_CONFIG_FILE);
        Self::load_from(path, env)
    }

    /// Load configuration from the given file path and environment snapshot
    pub fn load_from(config_path: &str, env: &Env) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .source(Some(env.as_map().clone())),
            )
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("logging.access_log_format", "combined")?
            .build()?;

        settings.try_deserialize()
    }
}
