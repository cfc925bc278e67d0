use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://expenso.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("expenso.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("EXPENSO_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("EXPENSO_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("EXPENSO_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("EXPENSO_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("EXPENSO_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("EXPENSO_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("EXPENSO_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("expenso.toml"), PathBuf::from("config/expenso.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    #[test]
    fn defaults_are_valid() {
        let _guard = env_lock().lock().expect("env lock");
        clear_vars(&["EXPENSO_DATABASE_URL", "EXPENSO_LOG_LEVEL", "EXPENSO_LOG_FORMAT"]);

        let config = AppConfig::load(LoadOptions::default()).expect("load defaults");
        assert_eq!(config.database.url, "sqlite://expenso.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn file_load_supports_env_interpolation() {
        let _guard = env_lock().lock().expect("env lock");
        env::set_var("TEST_EXPENSO_DB", "sqlite://from-env.db");

        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("expenso.toml");
        fs::write(
            &path,
            r#"
[database]
url = "${TEST_EXPENSO_DB}"
"#,
        )
        .expect("write config");

        let config =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                .expect("load config");

        clear_vars(&["TEST_EXPENSO_DB"]);
        assert_eq!(config.database.url, "sqlite://from-env.db");
    }

    #[test]
    fn precedence_is_defaults_then_file_then_env_then_overrides() {
        let _guard = env_lock().lock().expect("env lock");
        env::set_var("EXPENSO_LOG_LEVEL", "warn");

        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("expenso.toml");
        fs::write(
            &path,
            r#"
[database]
url = "sqlite://from-file.db"

[logging]
level = "error"
"#,
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(path),
            overrides: ConfigOverrides {
                database_url: Some("sqlite://from-override.db".to_string()),
                log_level: None,
            },
            ..LoadOptions::default()
        })
        .expect("load config");

        clear_vars(&["EXPENSO_LOG_LEVEL"]);
        assert_eq!(config.database.url, "sqlite://from-override.db");
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn non_sqlite_database_url_fails_validation() {
        let _guard = env_lock().lock().expect("env lock");
        clear_vars(&["EXPENSO_DATABASE_URL"]);

        let error = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("postgres://nope".to_string()),
                log_level: None,
            },
            ..LoadOptions::default()
        })
        .expect_err("postgres url should fail");

        assert!(matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("database.url")
        ));
    }

    #[test]
    fn missing_required_file_is_reported() {
        let _guard = env_lock().lock().expect("env lock");

        let error = AppConfig::load(LoadOptions {
            config_path: Some("does-not-exist.toml".into()),
            require_file: true,
            ..LoadOptions::default()
        })
        .expect_err("missing file should fail");

        assert!(matches!(error, ConfigError::MissingConfigFile(_)));
    }
}
