use std::sync::Arc;

use envconfig::Envconfig;
use tokio::net::TcpListener;
use tracing::{error, Instrument};

use nexadesk_api::config::Config;
use nexadesk_api::server;
use nexadesk_common::config::ServiceConfig;
use nexadesk_common::lifecycle::{
    ExitIntent, ExitReason, Lifecycle, ShutdownCoordinator, Signals,
};
use nexadesk_common::logging;

async fn start(config: Config) -> ExitIntent {
    let signals = match Signals::new() {
        Ok(signals) => signals,
        Err(err) => {
            error!(error = %err, "failed to register signal handlers");
            return ExitReason::Startup.into();
        }
    };

    let address = config.bind();
    let listener = match TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, address = %address, "failed to bind listener");
            return ExitReason::Startup.into();
        }
    };

    let coordinator = Arc::new(ShutdownCoordinator::new(
        Lifecycle::new(),
        config.shutdown_timeout.0,
    ));
    tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.watch(signals).await }.in_current_span()
    });

    server::run(&config, listener, coordinator).await
}

#[tokio::main]
async fn main() {
    let config = match Config::init_from_env() {
        Ok(config) => config,
        Err(err) => {
            // Only the settings needed to log the failure.
            if let Ok(service) = ServiceConfig::init_from_env() {
                logging::init(&service);
            }
            error!(error = %err, "invalid configuration");
            ExitIntent::from(ExitReason::Startup).exit()
        }
    };

    logging::init(&config.service);
    let span = logging::service_span(&config.service_name(), &config.service);

    start(config).instrument(span).await.exit()
}
