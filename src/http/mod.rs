use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Registry, TextEncoder};
use serde_json::json;
use tokio::{net::TcpListener, sync::Mutex};
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;

use crate::lag_collector::{run_lag_collection, CollectionConfig, CollectorError};
use crate::prometheus_metrics::{CollectionMetrics, OUTCOME_SUCCESS};

#[derive(Clone)]
struct HttpServiceState {
    collection_config: Arc<CollectionConfig>,

    /// Only one collection at a time: concurrent members of the same Consumer Group
    /// would trigger rebalances on each other.
    collection_lock: Arc<Mutex<()>>,

    collection_metrics: CollectionMetrics,
    metrics: Arc<Registry>,
}

pub async fn init(
    listen_on: SocketAddr,
    request_timeout: Duration,
    collection_config: CollectionConfig,
    shutdown_token: CancellationToken,
    metrics: Arc<Registry>,
) -> std::io::Result<()> {
    // Assemble the HTTP Service State object, that will be passed to the routes
    let state = HttpServiceState {
        collection_config: Arc::new(collection_config),
        collection_lock: Arc::new(Mutex::new(())),
        collection_metrics: CollectionMetrics::new(&metrics),
        metrics,
    };

    // Setup Router
    let app = Router::new()
        .route("/", get(root))
        .route("/metrics", get(lag_report))
        .route("/internal-metrics", get(prometheus_metrics))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state);

    // Setup Server, with Graceful Shutdown
    let listener = TcpListener::bind(listen_on).await?;
    info!("Begin listening on '{}'...", listen_on);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_token.cancelled_owned()).await
}

async fn root() -> Json<&'static str> {
    Json("OK")
}

async fn lag_report(State(state): State<HttpServiceState>) -> Response {
    // Held by the blocking task: released when the collection is over, even if the request isn't
    let guard = state.collection_lock.clone().lock_owned().await;

    let config = state.collection_config.clone();
    let timer = state.collection_metrics.duration.start_timer();
    let res = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        run_lag_collection(&config)
    })
    .await;
    timer.observe_duration();

    match res {
        Ok(Ok(report)) => {
            state.collection_metrics.observe_outcome(OUTCOME_SUCCESS);
            (StatusCode::OK, Json(report)).into_response()
        },
        Ok(Err(e)) => {
            error!("Lag collection failed: {e}");
            state.collection_metrics.observe_outcome(e.kind());
            error_response(&e)
        },
        Err(e) => {
            error!("Lag collection task failed: {e}");
            state.collection_metrics.observe_outcome("internal");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal", "message": e.to_string() })),
            )
                .into_response()
        },
    }
}

fn error_status(e: &CollectorError) -> StatusCode {
    match e {
        CollectorError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CollectorError::Connection(_)
        | CollectorError::Protocol(_)
        | CollectorError::Query {
            ..
        } => StatusCode::BAD_GATEWAY,
        CollectorError::Timeout {
            ..
        } => StatusCode::GATEWAY_TIMEOUT,
    }
}

fn error_response(e: &CollectorError) -> Response {
    (error_status(e), Json(json!({ "error": e.kind(), "message": e.to_string() }))).into_response()
}

async fn prometheus_metrics(State(state): State<HttpServiceState>) -> impl IntoResponse {
    let mut status = StatusCode::OK;
    let mut headers = HeaderMap::new();

    // As defined by Prometheus: https://github.com/prometheus/docs/blob/main/content/docs/instrumenting/exposition_formats.md#basic-info
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"));

    let mut body = String::new();
    let metrics_family = state.metrics.gather();
    if let Err(e) = TextEncoder.encode_utf8(&metrics_family, &mut body) {
        status = StatusCode::INTERNAL_SERVER_ERROR;
        body = format!("Failed to encode metrics: {e}");
    }

    (status, headers, body)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_kinds_map_to_statuses() {
        assert_eq!(
            error_status(&CollectorError::Configuration("no brokers".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(error_status(&CollectorError::Connection("ssl".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(error_status(&CollectorError::Protocol("rebalance".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(
            error_status(&CollectorError::Timeout {
                operation: "fetching watermarks".into(),
                timeout: Duration::from_secs(1),
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[tokio::test]
    async fn root_is_ok() {
        let Json(body) = root().await;
        assert_eq!(body, "OK");
    }
}
