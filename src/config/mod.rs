mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{ClientSettings, RelaySettings, ServerSettings, Settings};

/// Prefix of environment variables read by [`load_config`],
/// e.g. `RELAYCHAT__SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "RELAYCHAT";

/// Loads the configuration from `config/default` and `RELAYCHAT__*` environment variables.
/// Values that are not set anywhere keep their defaults.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(Settings::default().merged_with(partial))
}
