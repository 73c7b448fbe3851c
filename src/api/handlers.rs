use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::collections::HashMap;

use crate::core::metrics;
use crate::core::redis::RedisHealth;
use crate::core::state::AppState;
use crate::repositories;
use crate::schemas::{HealthResponse, RootResponse};

const SERVICE_NAME: &str = "exam-assist-api";

pub(crate) async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    let api = state.settings().api();
    Json(RootResponse {
        message: api.project_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        api_prefix: api.api_v1_str.clone(),
    })
}

/// Database failures make the service unhealthy. Redis only degrades it,
/// since rate limits fail open. Storage and AI report their configuration.
pub(crate) async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut health = Health::default();

    match repositories::health::ping(state.db()).await {
        Ok(()) => health.component("database", "healthy"),
        Err(err) => {
            health.component("database", format!("unhealthy: {err}"));
            health.status = Status::Unhealthy;
        }
    }

    match state.redis().health().await {
        RedisHealth::Healthy => health.component("redis", "healthy"),
        RedisHealth::Disconnected => health.component("redis", "disconnected"),
        RedisHealth::Unhealthy(error) => {
            health.component("redis", format!("unhealthy: {error}"));
            health.degrade();
        }
    }

    health.component("storage", if state.storage().is_some() { "configured" } else { "disabled" });
    health.component("ai", if state.ai().is_configured() { "configured" } else { "missing_key" });

    Json(health.into_response_body())
}

pub(crate) async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.settings().telemetry().prometheus_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    match metrics::render() {
        Some(body) => ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Status {
    #[default]
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Default)]
struct Health {
    status: Status,
    components: HashMap<String, String>,
}

impl Health {
    fn component(&mut self, name: &str, value: impl Into<String>) {
        self.components.insert(name.to_string(), value.into());
    }

    fn degrade(&mut self) {
        if self.status == Status::Healthy {
            self.status = Status::Degraded;
        }
    }

    fn into_response_body(self) -> HealthResponse {
        let status = match self.status {
            Status::Healthy => "healthy",
            Status::Degraded => "degraded",
            Status::Unhealthy => "unhealthy",
        };
        HealthResponse {
            service: SERVICE_NAME.to_string(),
            status: status.to_string(),
            components: self.components,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unhealthy_is_not_downgraded_to_degraded() {
        let mut health = Health { status: Status::Unhealthy, ..Health::default() };
        health.degrade();
        assert_eq!(health.status, Status::Unhealthy);

        let mut health = Health::default();
        health.degrade();
        health.component("redis", "unhealthy: timeout");
        let body = health.into_response_body();
        assert_eq!(body.status, "degraded");
        assert_eq!(body.service, "exam-assist-api");
        assert_eq!(body.components["redis"], "unhealthy: timeout");
    }
}
