//! The `config` module loads worker settings.
//!
//! Values come from an optional `config/default` file (any format the
//! `config` crate understands) layered under `CAPTION_`-prefixed environment
//! variables, e.g. `CAPTION_BROKER__PASSWORD`. Anything left unset keeps its
//! default.

mod settings;

use config::{Config, ConfigError, Environment, File};

pub use settings::{BrokerSettings, InferenceSettings, LoggingSettings, Settings};

const DEFAULT_CONFIG_FILE: &str = "config/default";
const ENV_PREFIX: &str = "CAPTION";

/// Loads the configuration from the default file and environment variables.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(DEFAULT_CONFIG_FILE)
}

/// Loads the configuration from `path` (extension optional) and environment
/// variables. A missing file is not an error.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    builder.build()?.try_deserialize()
}
