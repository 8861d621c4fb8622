use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{env, fmt, fs, io};

use scrape_log::{Level, LogConfig, LogFormat};
use scrape_receiver::{MetricPattern, TransactionConfig};
use serde::{Deserialize, Serialize};

/// Name of the configuration file within the configuration directory.
pub const CONFIG_FILE_NAME: &str = "config.yml";

/// Indicates config related errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    CouldNotOpenFile,
    /// Failed to save a file.
    CouldNotWriteFile,
    /// Parsing YAML failed.
    BadYaml,
    /// Parsing JSON failed.
    BadJson,
    /// Invalid config value.
    InvalidValue,
}

impl fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CouldNotOpenFile => write!(f, "could not open config file"),
            Self::CouldNotWriteFile => write!(f, "could not write config file"),
            Self::BadYaml => write!(f, "could not parse yaml config file"),
            Self::BadJson => write!(f, "could not parse json config file"),
            Self::InvalidValue => write!(f, "invalid config value"),
        }
    }
}

/// Defines the source of a config error.
#[derive(Debug, Default)]
enum ConfigErrorSource {
    /// An error occurring independently.
    #[default]
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating in a field override (an env var or a CLI parameter).
    FieldOverride(String),
}

impl fmt::Display for ConfigErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErrorSource::None => Ok(()),
            ConfigErrorSource::File(file_name) => {
                write!(f, " (file {})", file_name.display())
            }
            ConfigErrorSource::FieldOverride(name) => write!(f, " (field {name})"),
        }
    }
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    source: ConfigErrorSource,
    kind: ConfigErrorKind,
    inner: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ConfigError {
    #[inline]
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            source: ConfigErrorSource::None,
            kind,
            inner: None,
        }
    }

    #[inline]
    fn wrap<E>(kind: ConfigErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self {
            source: ConfigErrorSource::None,
            kind,
            inner: Some(error.into()),
        }
    }

    #[inline]
    fn field<E>(field: &str, error: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self {
            source: ConfigErrorSource::FieldOverride(field.to_owned()),
            ..Self::wrap(ConfigErrorKind::InvalidValue, error)
        }
    }

    #[inline]
    fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.source = ConfigErrorSource::File(path.as_ref().to_path_buf());
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.source)
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.as_ref().map(|error| error.as_ref() as _)
    }
}

/// Values that can be overridden from the environment or the command line.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OverridableConfig {
    /// The log level.
    pub log_level: Option<String>,
    /// The log output format.
    pub log_format: Option<String>,
    /// The pattern of the metric that carries the scrape start time.
    pub start_time_metric_regex: Option<String>,
}

impl OverridableConfig {
    /// Reads overrides from `SCRAPE_*` environment variables.
    ///
    /// Unset and empty variables do not override anything.
    pub fn from_env() -> Self {
        let var = |name: &str| env::var(name).ok().filter(|value| !value.is_empty());

        Self {
            log_level: var("SCRAPE_LOG_LEVEL"),
            log_format: var("SCRAPE_LOG_FORMAT"),
            start_time_metric_regex: var("SCRAPE_START_TIME_METRIC_REGEX"),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct ConfigValues {
    logging: LogConfig,
    receiver: TransactionConfig,
}

/// Config struct.
#[derive(Debug, Default)]
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl Config {
    /// Loads a config from a given config folder.
    ///
    /// The folder is resolved against the current working directory and must contain a
    /// `config.yml`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = env::current_dir()
            .map(|cwd| cwd.join(path.as_ref()))
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        let file = path.join(CONFIG_FILE_NAME);
        let values = load_yaml(&file)?;

        Ok(Config { values, path })
    }

    /// Creates a config from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Config, ConfigError> {
        Ok(Config {
            values: serde_json::from_value(value)
                .map_err(|error| ConfigError::wrap(ConfigErrorKind::BadJson, error))?,
            path: PathBuf::new(),
        })
    }

    /// Override configuration with values coming from other sources (e.g. env variables or
    /// command line parameters).
    pub fn apply_override(
        &mut self,
        mut overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        if let Some(level) = overrides.log_level.take() {
            self.values.logging.level = level
                .parse::<Level>()
                .map_err(|error| ConfigError::field("log_level", error))?;
        }

        if let Some(format) = overrides.log_format.take() {
            self.values.logging.format = format
                .parse::<LogFormat>()
                .map_err(|error| ConfigError::field("log_format", error))?;
        }

        if let Some(regex) = overrides.start_time_metric_regex.take() {
            let pattern = MetricPattern::new(&regex)
                .map_err(|error| ConfigError::field("start_time_metric_regex", error))?;
            self.values.receiver.start_time_metric_regex = Some(pattern);
        }

        Ok(self)
    }

    /// Serializes the current configuration to YAML.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.values)
            .map_err(|error| ConfigError::wrap(ConfigErrorKind::CouldNotWriteFile, error))
    }

    /// Writes the current configuration into the config folder.
    pub fn save(&self) -> Result<(), ConfigError> {
        let file = self.path.join(CONFIG_FILE_NAME);
        let yaml = self.to_yaml_string().map_err(|error| error.file(&file))?;

        fs::write(&file, yaml)
            .map_err(|error| ConfigError::wrap(ConfigErrorKind::CouldNotWriteFile, error))
            .map_err(|error| error.file(&file))
    }

    /// Returns the path of the config folder, if loaded from a file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Returns the configuration of scrape transactions.
    pub fn receiver(&self) -> &TransactionConfig {
        &self.values.receiver
    }

    /// Returns a shared copy of the transaction configuration.
    ///
    /// The configuration is shared by all transactions of a receiver.
    pub fn transaction_config(&self) -> Arc<TransactionConfig> {
        Arc::new(self.values.receiver.clone())
    }

    /// Initializes logging with the configured level and format.
    pub fn init_logging(&self) {
        scrape_log::init(self.logging());
    }
}

fn load_yaml(path: &Path) -> Result<ConfigValues, ConfigError> {
    let file = fs::File::open(path)
        .map_err(|error| ConfigError::wrap(ConfigErrorKind::CouldNotOpenFile, error))
        .map_err(|error| error.file(path))?;

    serde_yaml::from_reader(io::BufReader::new(file))
        .map_err(|error| ConfigError::wrap(ConfigErrorKind::BadYaml, error))
        .map_err(|error| error.file(path))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use similar_asserts::assert_eq;

    use super::*;

    fn write_config(yaml: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), yaml).unwrap();
        dir
    }

    #[test]
    fn test_load_from_path() {
        let dir = write_config(
            r#"
logging:
  level: debug
receiver:
  start_time_metric_regex: "^node_boot_time_seconds$"
  external_labels:
    cluster: eu-west-1
"#,
        );

        let config = Config::from_path(dir.path()).unwrap();
        assert_eq!(config.path(), dir.path());
        assert_eq!(config.logging().level, Level::Debug);
        assert_eq!(config.logging().format, LogFormat::Auto);

        let receiver = config.transaction_config();
        assert_eq!(
            receiver
                .start_time_metric_regex
                .as_ref()
                .map(MetricPattern::as_str),
            Some("^node_boot_time_seconds$")
        );
        assert_eq!(
            receiver.external_labels,
            BTreeMap::from([("cluster".to_owned(), "eu-west-1".to_owned())])
        );
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let dir = write_config("{}");

        let config = Config::from_path(dir.path()).unwrap();
        assert_eq!(config.logging(), &LogConfig::default());
        assert_eq!(config.receiver(), &TransactionConfig::default());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();

        let error = Config::from_path(dir.path()).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::CouldNotOpenFile);
        assert!(error.to_string().starts_with("could not open config file (file "));
        assert!(error.source().is_some());
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let dir = write_config("receiver:\n  start_time_metric_regex: \"(unclosed\"\n");

        let error = Config::from_path(dir.path()).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::BadYaml);
    }

    #[test]
    fn test_from_json_value() {
        let config = Config::from_json_value(serde_json::json!({
            "logging": { "format": "json" },
        }))
        .unwrap();

        assert_eq!(config.logging().format, LogFormat::Json);
        assert_eq!(config.logging().level, Level::Info);

        let error = Config::from_json_value(serde_json::json!({ "logging": 42 })).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::BadJson);
    }

    #[test]
    fn test_apply_override() {
        let mut config = Config::default();
        config
            .apply_override(OverridableConfig {
                log_level: Some("TRACE".to_owned()),
                log_format: Some("simplified".to_owned()),
                start_time_metric_regex: Some("^start_seconds$".to_owned()),
            })
            .unwrap();

        assert_eq!(config.logging().level, Level::Trace);
        assert_eq!(config.logging().format, LogFormat::Simplified);
        assert!(
            config
                .receiver()
                .start_time_metric_regex
                .as_ref()
                .is_some_and(|pattern| pattern.is_match("start_seconds"))
        );
    }

    #[test]
    fn test_invalid_override() {
        let mut config = Config::default();
        let error = config
            .apply_override(OverridableConfig {
                log_level: Some("loud".to_owned()),
                ..Default::default()
            })
            .unwrap_err();

        assert_eq!(error.kind(), ConfigErrorKind::InvalidValue);
        assert_eq!(error.to_string(), "invalid config value (field log_level)");
        assert_eq!(config.logging().level, Level::Info);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = write_config("logging:\n  level: warn\n");

        let mut config = Config::from_path(dir.path()).unwrap();
        config
            .apply_override(OverridableConfig {
                log_format: Some("json".to_owned()),
                ..Default::default()
            })
            .unwrap();
        config.save().unwrap();

        let reloaded = Config::from_path(dir.path()).unwrap();
        assert_eq!(reloaded.logging().level, Level::Warn);
        assert_eq!(reloaded.logging().format, LogFormat::Json);
    }
}
