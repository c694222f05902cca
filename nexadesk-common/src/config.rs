use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

/// Settings every nexadesk process reads, nested into each binary's `Config`.
#[derive(Envconfig, Clone, Debug)]
pub struct ServiceConfig {
    #[envconfig(from = "NODE_ENV", default = "development")]
    pub env: String,

    #[envconfig(from = "APP_VERSION", default = "0.0.0")]
    pub version: String,

    #[envconfig(from = "GIT_SHA", default = "local")]
    pub git_sha: String,

    #[envconfig(from = "SERVICE_NAME")]
    pub service_name: Option<String>,

    #[envconfig(from = "LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl ServiceConfig {
    pub fn is_production(&self) -> bool {
        self.env == "production"
    }

    /// The configured service name, or the per-process default.
    pub fn service_name(&self, default: &str) -> String {
        match &self.service_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => default.to_owned(),
        }
    }

    /// `LOG_LEVEL` if set, otherwise `info` in production and `debug` elsewhere.
    pub fn log_level(&self) -> &str {
        match &self.log_level {
            Some(level) if !level.is_empty() => level.as_str(),
            _ if self.is_production() => "info",
            _ => "debug",
        }
    }
}

/// A strictly positive duration given in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub enum ParseEnvMsDurationError {
    NotANumber,
    NotPositive,
}

impl std::fmt::Display for ParseEnvMsDurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseEnvMsDurationError::NotANumber => write!(f, "expected a number of milliseconds"),
            ParseEnvMsDurationError::NotPositive => write!(f, "duration must be positive"),
        }
    }
}

impl std::error::Error for ParseEnvMsDurationError {}

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s
            .trim()
            .parse::<u64>()
            .map_err(|_| ParseEnvMsDurationError::NotANumber)?;
        if ms == 0 {
            return Err(ParseEnvMsDurationError::NotPositive);
        }

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}
