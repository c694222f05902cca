use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::state::{Lifecycle, LifecycleState};

/// Answer to "is the process alive". It does not probe dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Liveness {
    pub ok: bool,
}

/// Answer to "should the process receive new traffic".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: bool,
}

impl IntoResponse for Liveness {
    fn into_response(self) -> Response {
        let status = match self.ok {
            true => StatusCode::OK,
            false => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(self)).into_response()
    }
}

impl IntoResponse for Readiness {
    fn into_response(self) -> Response {
        let status = match self.ready {
            true => StatusCode::OK,
            false => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(self)).into_response()
    }
}

/// Synchronous liveness and readiness checks derived from the lifecycle state.
#[derive(Clone)]
pub struct HealthReporter {
    lifecycle: Lifecycle,
}

impl HealthReporter {
    pub fn new(lifecycle: Lifecycle) -> Self {
        Self { lifecycle }
    }

    pub fn liveness(&self) -> Liveness {
        Liveness {
            ok: self.lifecycle.state() != LifecycleState::Stopped,
        }
    }

    /// Ready only while Running: false during startup and from the moment shutdown begins.
    pub fn readiness(&self) -> Readiness {
        Readiness {
            ready: self.lifecycle.state() == LifecycleState::Running,
        }
    }
}
