use clap::Parser;
use config::{Config, ConfigError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Command line flags. Every flag is optional and, when present, takes
/// precedence over the configuration files and the environment.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "nodepool_exporter",
    version,
    about = "Exposes the availability of a nodepool server as Prometheus metrics"
)]
pub struct Cli {
    /// Directory that may contain a config.toml or config.json file
    #[arg(long = "config-dir", default_value = "./")]
    pub config_dir: String,

    /// The address on which to expose the web interface and generated Prometheus metrics
    #[arg(long = "web.listen-address")]
    pub listen_address: Option<String>,

    /// Path under which to expose metrics
    #[arg(long = "web.telemetry-path")]
    pub telemetry_path: Option<String>,

    /// The nodepool hostname
    #[arg(long = "nodepool.listen-host")]
    pub nodepool_host: Option<String>,

    /// The nodepool port
    #[arg(long = "nodepool.listen-port")]
    pub nodepool_port: Option<String>,

    /// Only log messages with the given severity or above
    #[arg(long = "log.level")]
    pub log_level: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long = "print-config")]
    pub print_config: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Log {
    pub enable_stdout: bool,
    pub enable_log_file: bool,
    pub log_file_directory: Option<String>,
    pub level: String,
    pub directives: Vec<String>,
    pub max_log_files: usize,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            enable_stdout: true,
            enable_log_file: false,
            log_file_directory: Some("/var/log/nodepool-exporter/".to_owned()),
            level: "INFO".to_owned(),
            directives: vec![],
            max_log_files: 7,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Http {
    pub listen_address: String,
    pub telemetry_path: String,
}

impl Default for Http {
    fn default() -> Self {
        Self {
            listen_address: ":9533".to_owned(),
            telemetry_path: "/metrics".to_owned(),
        }
    }
}

impl Http {
    /// Splits the listen address into a host and a port. An empty host
    /// (e.g. `:9533`) means all IPv4 interfaces.
    pub fn bind_address(&self) -> Result<(&str, u16), ConfigError> {
        let (host, port) = self.listen_address.rsplit_once(':').ok_or_else(|| {
            ConfigError::Message(format!(
                "Invalid listen address [{}]: expected <host>:<port> or :<port>",
                self.listen_address
            ))
        })?;

        let port = port.parse::<u16>().map_err(|e| {
            ConfigError::Message(format!(
                "Invalid port in listen address [{}]: {}",
                self.listen_address, e
            ))
        })?;

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Ok(("0.0.0.0", port));
        }

        Ok((host, port))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Nodepool {
    pub host: String,
    pub port: String,
}

impl Default for Nodepool {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: "8005".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Configuration {
    #[serde(default = "Log::default")]
    pub log: Log,

    #[serde(default = "Http::default")]
    pub http: Http,

    #[serde(default = "Nodepool::default")]
    pub nodepool: Nodepool,
}

impl Configuration {
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let base_path = Path::new(&cli.config_dir);

        let cfg = Config::builder()
            .add_source(
                config::File::from(base_path.join("config.toml"))
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::File::from(base_path.join("config.json"))
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(config::Environment::with_prefix("CFG").separator("__"))
            .set_override_option("http.listen_address", cli.listen_address.clone())?
            .set_override_option("http.telemetry_path", cli.telemetry_path.clone())?
            .set_override_option("nodepool.host", cli.nodepool_host.clone())?
            .set_override_option("nodepool.port", cli.nodepool_port.clone())?
            .set_override_option("log.level", cli.log_level.clone())?
            .build()?;

        let configuration: Configuration = cfg.try_deserialize()?;
        configuration.validate()?;

        Ok(configuration)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.http.bind_address()?;

        let path = &self.http.telemetry_path;
        if !path.starts_with('/') || path == "/" {
            return Err(ConfigError::Message(format!(
                "Invalid telemetry path [{}]: it must start with '/' and must not be '/'",
                path
            )));
        }

        if self.nodepool.host.trim().is_empty() {
            return Err(ConfigError::Message(
                "The nodepool host must not be empty".to_owned(),
            ));
        }

        Ok(())
    }
}

pub fn print_config(configuration: &Configuration) -> Result<(), toml::ser::Error> {
    println!("{}", toml::to_string_pretty(configuration)?);
    Ok(())
}
