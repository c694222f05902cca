use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use envconfig::Envconfig;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use nexadesk_api::config::Config;
use nexadesk_api::server::run;
use nexadesk_common::lifecycle::{
    ExitIntent, Lifecycle, LifecycleState, ShutdownCoordinator, ShutdownSignal,
};

pub fn default_config() -> Config {
    let env = HashMap::from([
        ("NODE_ENV".to_owned(), "test".to_owned()),
        ("APP_VERSION".to_owned(), "9.9.9".to_owned()),
        ("GIT_SHA".to_owned(), "deadbeef".to_owned()),
    ]);
    Config::init_from_hashmap(&env).unwrap()
}

pub struct ServerHandle {
    pub addr: SocketAddr,
    pub coordinator: Arc<ShutdownCoordinator>,
    process: Option<JoinHandle<ExitIntent>>,
}

impl ServerHandle {
    pub async fn for_config(config: Config) -> ServerHandle {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let coordinator = Arc::new(ShutdownCoordinator::new(
            Lifecycle::new(),
            config.shutdown_timeout.0,
        ));

        let process = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { run(&config, listener, coordinator).await }
        });

        let lifecycle = coordinator.lifecycle();
        for _ in 0..200 {
            if lifecycle.state() != LifecycleState::Starting {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(lifecycle.state(), LifecycleState::Running);

        ServerHandle {
            addr,
            coordinator,
            process: Some(process),
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        self.coordinator.lifecycle()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{:?}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        reqwest::Client::new()
            .get(self.url(path))
            .send()
            .await
            .expect("failed to send request")
    }

    /// Wait for `run` to return after shutdown was triggered.
    pub async fn join(&mut self) -> ExitIntent {
        self.process
            .take()
            .expect("process already joined")
            .await
            .expect("run panicked")
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.coordinator.on_signal(ShutdownSignal::Terminate);
    }
}
