//! HTTP transport for the controller.
//!
//! # Responsibilities
//! - `POST /v1/services/{service}:check` and `POST /v1/services/{service}:report`
//!   with JSON bodies
//! - `GET /healthz` with the running version and applied config digest
//! - Mount the sub-endpoints exposed by report consumers (e.g. `/metrics`)
//! - Wire up middleware (tracing, timeout, request ID, access log)
//!
//! # Design Decisions
//! - Paths are matched by their `:check` / `:report` suffix in a fallback
//!   handler, since the method is glued to the last path segment
//! - A service name in the path fills an empty `serviceName` in the body
//! - Check always answers 200; denials travel in `checkErrors`

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::adapter::PrefixAndHandler;
use crate::control::{CheckRequest, Controller, ReportRequest};
use crate::http::access_log::access_log_middleware;
use crate::http::request::request_id_middleware;
use crate::reload::ConfigManager;

const CHECK_SUFFIX: &str = ":check";
const REPORT_SUFFIX: &str = ":report";
const SERVICES_PREFIX: &str = "/v1/services/";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: Controller,
    pub config_manager: Option<Arc<ConfigManager>>,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
    config_digest: Option<String>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Wraps a router from [`build_router`].
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    /// Serves until `shutdown` completes.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Builds the router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(state: AppState, extra: Vec<PrefixAndHandler>, request_timeout: Duration) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(health_handler))
        .fallback(rpc_handler)
        .with_state(state);

    for PrefixAndHandler { prefix, handler } in extra {
        tracing::info!(prefix = %prefix, "Mounted consumer endpoint");
        router = router.route(&prefix, handler);
    }

    router
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn(access_log_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
}

async fn health_handler(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        config_digest: state.config_manager.as_ref().and_then(|m| m.current_digest()),
    })
}

enum Rpc {
    Check,
    Report,
}

/// Splits `/v1/services/svc1:check` into `(Check, "svc1")`.
fn parse_rpc_path(path: &str) -> Option<(Rpc, &str)> {
    let (rpc, rest) = if let Some(rest) = path.strip_suffix(CHECK_SUFFIX) {
        (Rpc::Check, rest)
    } else if let Some(rest) = path.strip_suffix(REPORT_SUFFIX) {
        (Rpc::Report, rest)
    } else {
        return None;
    };
    let service = rest.strip_prefix(SERVICES_PREFIX).unwrap_or_default();
    Some((rpc, service))
}

async fn rpc_handler(State(state): State<AppState>, method: Method, uri: Uri, body: Bytes) -> Response {
    let Some((rpc, service)) = parse_rpc_path(uri.path()) else {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    };
    if method != Method::POST {
        return (StatusCode::METHOD_NOT_ALLOWED, "Only POST is supported").into_response();
    }

    match rpc {
        Rpc::Check => {
            let mut request: CheckRequest = match serde_json::from_slice(&body) {
                Ok(r) => r,
                Err(e) => return bad_request(e),
            };
            if request.service_name.is_empty() {
                request.service_name = service.to_string();
            }
            Json(state.controller.check(&request)).into_response()
        }
        Rpc::Report => {
            let mut request: ReportRequest = match serde_json::from_slice(&body) {
                Ok(r) => r,
                Err(e) => return bad_request(e),
            };
            if request.service_name.is_empty() {
                request.service_name = service.to_string();
            }
            match state.controller.report(request).await {
                Ok(response) => Json(response).into_response(),
                Err(e) => {
                    tracing::error!(error = %e, "Report rejected");
                    (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
                }
            }
        }
    }
}

fn bad_request(e: serde_json::Error) -> Response {
    tracing::debug!(error = %e, "Malformed request body");
    (StatusCode::BAD_REQUEST, format!("Malformed request body: {e}")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::config::services::ServicesConfig;
    use crate::control::{report_queue, CheckResponse};
    use crate::dispatch::{CheckerManager, ReportReceiver};

    fn router() -> (Router, ReportReceiver) {
        let manager = Arc::new(CheckerManager::new(Arc::new(ServicesConfig::default())));
        let (tx, rx) = report_queue(8);
        let state = AppState {
            controller: Controller::new(manager, tx),
            config_manager: None,
        };
        let extra = vec![PrefixAndHandler {
            prefix: "/metrics".into(),
            handler: get(|| async { "scrape" }),
        }];
        (build_router(state, extra, Duration::from_secs(5)), rx)
    }

    fn post(path: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
    }

    #[test]
    fn test_parse_rpc_path() {
        assert!(matches!(parse_rpc_path("/v1/services/svc1:check"), Some((Rpc::Check, "svc1"))));
        assert!(matches!(parse_rpc_path("/v1/services/svc1:report"), Some((Rpc::Report, "svc1"))));
        assert!(matches!(parse_rpc_path("/other:check"), Some((Rpc::Check, ""))));
        assert!(parse_rpc_path("/v1/services/svc1").is_none());
    }

    #[tokio::test]
    async fn test_check_fills_service_from_path() {
        let (app, _rx) = router();
        let response = app
            .oneshot(post("/v1/services/svc1:check", r#"{"operation":{"operationId":"op-1"}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        let check: CheckResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(check.operation_id, "op-1");
        assert!(check.check_errors.is_empty());
    }

    #[tokio::test]
    async fn test_report_is_enqueued() {
        let (app, mut rx) = router();
        let response = app
            .oneshot(post("/v1/services/svc1:report", r#"{"operations":[]}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(rx.recv().await.unwrap().service_name, "svc1");
    }

    #[tokio::test]
    async fn test_rejections() {
        let (app, _rx) = router();

        let bad_json = app.clone().oneshot(post("/v1/services/svc1:check", "{")).await.unwrap();
        assert_eq!(bad_json.status(), StatusCode::BAD_REQUEST);

        let get_check = Request::builder()
            .uri("/v1/services/svc1:check")
            .body(Body::empty())
            .unwrap();
        let wrong_method = app.clone().oneshot(get_check).await.unwrap();
        assert_eq!(wrong_method.status(), StatusCode::METHOD_NOT_ALLOWED);

        let unknown = app.oneshot(post("/v1/services/svc1:mutate", "{}")).await.unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_and_consumer_endpoints() {
        let (app, _rx) = router();

        let health = app
            .clone()
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(health).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json["config_digest"].is_null());

        let metrics = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(&body_bytes(metrics).await[..], b"scrape");
    }
}
