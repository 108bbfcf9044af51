use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq)]
pub enum RuntimeEnv {
    Development,
    Production,
    Staging,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RuntimeEnvParseError;

impl FromStr for RuntimeEnv {
    type Err = RuntimeEnvParseError;
    fn from_str(level: &str) -> Result<RuntimeEnv, Self::Err> {
        match level.to_lowercase().as_str() {
            "development" => Ok(RuntimeEnv::Development),
            "production" => Ok(RuntimeEnv::Production),
            "staging" => Ok(RuntimeEnv::Staging),
            _ => Err(RuntimeEnvParseError),
        }
    }
}

impl fmt::Display for RuntimeEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RuntimeEnv::Development => write!(f, "development"),
            RuntimeEnv::Production => write!(f, "production"),
            RuntimeEnv::Staging => write!(f, "staging"),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// A list of full CORS origin URLs that allowed to receive server responses.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = "http://localhost:3000,https://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "0.0.0.0")]
    pub interface: String,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 4000)]
    pub port: u16,

    /// The runtime environment. Production tightens socket credential
    /// requirements: handshakes without a token are rejected instead of
    /// admitted anonymously.
    #[arg(long, env, default_value_t = RuntimeEnv::Development, value_parser = parse_runtime_env)]
    pub runtime_env: RuntimeEnv,

    /// The log level to set the server's logger to
    #[arg(short, long, env, default_value = "INFO",
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,
}

impl Config {
    pub fn new() -> Self {
        // Load .env values into the process environment before clap reads
        // the env attributes.
        dotenv().ok();
        Config::parse()
    }

    /// Whether a socket handshake must carry a credential.
    /// Only Production is strict; Development and Staging admit anonymous
    /// connections for local frontend and preview work.
    pub fn require_socket_credential(&self) -> bool {
        self.runtime_env == RuntimeEnv::Production
    }
}

impl Default for Config {
    fn default() -> Self {
        // Parse with no CLI args so env vars and defaults apply.
        Config::parse_from(["chat_platform_rs"])
    }
}

fn parse_runtime_env(value: &str) -> Result<RuntimeEnv, String> {
    RuntimeEnv::from_str(value)
        .map_err(|_| format!("invalid runtime environment: {value} (expected development, staging or production)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_env_parses_case_insensitively() {
        assert_eq!(RuntimeEnv::from_str("PRODUCTION"), Ok(RuntimeEnv::Production));
        assert_eq!(RuntimeEnv::from_str("development"), Ok(RuntimeEnv::Development));
        assert_eq!(RuntimeEnv::from_str("Staging"), Ok(RuntimeEnv::Staging));
        assert_eq!(RuntimeEnv::from_str("qa"), Err(RuntimeEnvParseError));
    }

    #[test]
    fn only_production_requires_socket_credentials() {
        let mut config = Config::default();

        config.runtime_env = RuntimeEnv::Development;
        assert!(!config.require_socket_credential());

        config.runtime_env = RuntimeEnv::Staging;
        assert!(!config.require_socket_credential());

        config.runtime_env = RuntimeEnv::Production;
        assert!(config.require_socket_credential());
    }
}
