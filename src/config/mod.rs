mod settings;

use config::{Config, ConfigError, Environment, File};

pub use settings::{
    Acks, BrokerSettings, Compression, LoggingSettings, OffsetReset, PartialSettings,
    QueueSettings, Secret, SecurityProtocol, Settings, WorkerSettings,
};

/// Prefix of environment variables read by `load_config`, e.g.
/// `POPQUEUE__QUEUE__BOOTSTRAP_SERVERS`.
pub const ENV_PREFIX: &str = "POPQUEUE";

/// Loads the configuration from `.env`, the default file and environment
/// variables, then merges the result with default values.
pub fn load_config() -> Result<Settings, ConfigError> {
    // A missing .env file is not an error.
    let _ = dotenvy::dotenv();

    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}
