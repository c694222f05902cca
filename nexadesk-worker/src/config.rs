use envconfig::Envconfig;

use nexadesk_common::config::{EnvMsDuration, ServiceConfig};

pub const DEFAULT_SERVICE_NAME: &str = "nexadesk-worker";

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(nested = true)]
    pub service: ServiceConfig,

    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "METRICS_PORT", default = "9090")]
    pub metrics_port: u16,

    #[envconfig(from = "JOB_INTERVAL_MS", default = "2000")]
    pub job_interval: EnvMsDuration,

    #[envconfig(from = "SHUTDOWN_TIMEOUT_MS", default = "1000")]
    pub shutdown_timeout: EnvMsDuration,
}

impl Config {
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.metrics_port)
    }

    pub fn service_name(&self) -> String {
        self.service.service_name(DEFAULT_SERVICE_NAME)
    }
}
