//! Configuration file loader for the `.pipewatch/` directory.
//!
//! Settings come from, in increasing priority:
//! - built-in defaults ([`MonitorConfig::default`])
//! - `.pipewatch/config.toml`
//! - the `PIPEWATCH_TOKEN` environment variable (token only)
//!
//! Command-line flags are applied on top by the binaries.

use crate::config::error::ConfigError;
use crate::config::error::ConfigResult;
use pw_protocol::config_models::MonitorConfig;
use std::path::Path;
use url::Url;

/// Name of the project-local configuration directory.
pub const CONFIG_DIR: &str = ".pipewatch";

/// Environment variable holding the authentication token.
pub const TOKEN_ENV: &str = "PIPEWATCH_TOKEN";

/// Loads the monitor configuration from `<root>/.pipewatch/config.toml`.
///
/// # Arguments
///
/// * `root` - Directory containing the `.pipewatch/` folder
///
/// # Returns
///
/// The parsed configuration. A missing directory or file yields the
/// defaults rather than an error.
///
/// # Errors
///
/// Returns `ConfigError` if:
/// - The file exists but cannot be read
/// - The file is not valid TOML or has fields of the wrong type
/// - A value is out of range (zero capacity, unparseable URL, ...)
///
/// # Example
///
/// ```rust,no_run
/// use pw_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Push endpoint: {}", config.ws_url);
/// # Ok(())
/// # }
/// ```
pub async fn load_config(root: &Path) -> ConfigResult<MonitorConfig> {
    let config_path = root.join(CONFIG_DIR).join("config.toml");

    let mut config = if config_path.exists() {
        let content =
            std::fs::read_to_string(&config_path).map_err(|source| ConfigError::FileRead {
                path: config_path.clone(),
                source,
            })?;

        toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
            path: config_path.clone(),
            source,
        })?
    } else {
        MonitorConfig::default()
    };

    apply_token_override(&mut config, std::env::var(TOKEN_ENV).ok());
    validate(&config, &config_path)?;

    Ok(config)
}

/// Replaces the configured token with `token` when one is given.
///
/// Blank values are ignored so an exported-but-empty variable does not
/// erase a token from the file.
pub fn apply_token_override(config: &mut MonitorConfig, token: Option<String>) {
    if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
        config.token = Some(token);
    }
}

/// Checks the values that would otherwise fail much later at runtime.
pub fn validate(config: &MonitorConfig, path: &Path) -> ConfigResult<()> {
    let invalid = |reason: String| ConfigError::InvalidConfig {
        path: path.to_path_buf(),
        reason,
    };

    let ws_url = Url::parse(&config.ws_url)
        .map_err(|e| invalid(format!("ws-url {:?}: {e}", config.ws_url)))?;
    if !matches!(ws_url.scheme(), "ws" | "wss") {
        return Err(invalid(format!(
            "ws-url must use ws:// or wss://, got {}",
            ws_url.scheme()
        )));
    }

    Url::parse(&config.api_base_url)
        .map_err(|e| invalid(format!("api-base-url {:?}: {e}", config.api_base_url)))?;

    if config.log_capacity == 0 {
        return Err(invalid("log-capacity must be at least 1".to_string()));
    }
    if config.reconnect_base_delay_ms == 0 {
        return Err(invalid("reconnect-base-delay-ms must be positive".to_string()));
    }
    if config.fallback_poll_interval_ms == 0 || config.running_poll_interval_ms == 0 {
        return Err(invalid("poll intervals must be positive".to_string()));
    }
    if config.follow_tolerance < 0.0 {
        return Err(invalid("follow-tolerance must not be negative".to_string()));
    }

    Ok(())
}
