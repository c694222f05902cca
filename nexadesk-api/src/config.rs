use envconfig::Envconfig;

use nexadesk_common::config::{EnvMsDuration, ServiceConfig};

pub const DEFAULT_SERVICE_NAME: &str = "nexadesk-api";

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(nested = true)]
    pub service: ServiceConfig,

    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "PORT", default = "3000")]
    pub port: u16,

    #[envconfig(from = "SHUTDOWN_TIMEOUT_MS", default = "10000")]
    pub shutdown_timeout: EnvMsDuration,
}

impl Config {
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn service_name(&self) -> String {
        self.service.service_name(DEFAULT_SERVICE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;

    #[test]
    fn defaults() {
        let config = Config::init_from_hashmap(&HashMap::new()).unwrap();

        assert_eq!(config.bind(), "0.0.0.0:3000");
        assert_eq!(config.shutdown_timeout.0, Duration::from_millis(10_000));
        assert_eq!(config.service_name(), "nexadesk-api");
        assert_eq!(config.service.env, "development");
    }

    #[test]
    fn reads_port_and_name() {
        let env = HashMap::from([
            ("PORT".to_owned(), "8080".to_owned()),
            ("SERVICE_NAME".to_owned(), "desk-edge".to_owned()),
        ]);
        let config = Config::init_from_hashmap(&env).unwrap();

        assert_eq!(config.bind(), "0.0.0.0:8080");
        assert_eq!(config.service_name(), "desk-edge");
    }

    #[test]
    fn rejects_invalid_port() {
        let env = HashMap::from([("PORT".to_owned(), "not-a-port".to_owned())]);
        assert!(Config::init_from_hashmap(&env).is_err());
    }
}
