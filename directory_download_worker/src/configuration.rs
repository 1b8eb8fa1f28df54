use std::path::PathBuf;

use lapin::ConnectionProperties;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_aux::field_attributes::{
    deserialize_bool_from_anything, deserialize_number_from_string,
    deserialize_option_number_from_string,
};

pub const DEFAULT_DOWNLOAD_DIR: &str = "/tmp/downloads";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub object_storage: ObjectStorageSettings,
    pub rabbitmq: RabbitMQSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    /// Identifies the deployment of this worker, used as the consumer tag prefix
    pub project_id: String,
    /// Root directory under which each job gets its own destination directory
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

fn default_download_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DOWNLOAD_DIR)
}

#[derive(Deserialize, Debug, Clone)]
pub struct ObjectStorageSettings {
    pub username: String,
    pub password: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    pub region: String,
    #[serde(default, deserialize_with = "deserialize_bool_from_anything")]
    pub use_tls: bool,
    /// Bucket holding the directories to download
    pub bucket_name: String,
    /// Maximum number of objects returned by one listing request.
    /// The object storage default is used when not set.
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub page_size: Option<usize>,
}

impl ObjectStorageSettings {
    pub fn endpoint(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RabbitMQSettings {
    pub username: String,
    pub password: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    /// Url-encoded virtual host, `%2f` for the default one
    #[serde(default = "default_vhost")]
    pub vhost: String,
    /// Name of the queue the jobs are consumed from
    pub subscription: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub prefetch_count: u16,
    /// Whether a negatively acknowledged message goes back to the queue to be redelivered
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub requeue_on_nack: bool,
}

fn default_vhost() -> String {
    "%2f".to_string()
}

impl RabbitMQSettings {
    pub fn get_uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            self.username,
            self.password.expose_secret(),
            self.host,
            self.port,
            self.vhost
        )
    }

    pub fn get_connection_properties(&self) -> ConnectionProperties {
        ConnectionProperties::default()
            // Use tokio executor and reactor.
            // At the moment the reactor is only available for unix.
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio)
    }
}

/// Extracts app settings from configuration files and env variables
///
/// `base.yaml` should contain shared settings for all environments.
/// A specific env file should be created for each environment: `develop.yaml`,`local.yaml` and `production.yaml`
/// The environment is set with the env var `APP_ENVIRONMENT`.
/// If `APP_ENVIRONMENT` is not set, `develop.yaml` is the default.
///
/// Settings are also taken from environment variables: with a prefix of APP and '__' as separator
/// For ex: `APP_OBJECT_STORAGE__BUCKET_NAME=my-bucket` would set `Settings.object_storage.bucket_name`
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path =
        std::env::current_dir().map_err(|error| config::ConfigError::Foreign(Box::new(error)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "develop".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    get_configuration_from(&configuration_directory, environment)
}

/// Same as `get_configuration`, reading the yaml files from a given directory
pub fn get_configuration_from(
    configuration_directory: &std::path::Path,
    environment: Environment,
) -> Result<Settings, config::ConfigError> {
    let environment_filename = format!("{}.yaml", environment.as_str());

    let settings = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(environment_filename),
        ))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}

/// The possible runtime environment for our application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Develop,
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Develop => "develop",
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "develop" => Ok(Self::Develop),
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `develop`, `local` or `production`.",
                other
            )),
        }
    }
}
