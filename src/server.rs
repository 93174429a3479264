use crate::server::shutdown::shutdown_signal;
use crate::server::state::AppState;
use axum::Router;
use axum::body::Body;
use axum::http::Request;
use axum::routing::get;
use std::error::Error;
use std::net::ToSocketAddrs;
use tokio::net::TcpListener;
use tower::Layer;
use tower_http::LatencyUnit;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::request_id::{
    MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::Level;

pub mod handler;
pub mod shutdown;
pub mod state;

/// Binds every address the listen address resolves to and serves until a
/// shutdown signal arrives. Failing to bind any of them is an error.
pub async fn start_server(state: AppState) -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = state.configuration.clone();
    let (host, port) = config.http.bind_address()?;
    let router = create_router(state);

    let mut handles = Vec::new();
    for addr in (host, port).to_socket_addrs()? {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| format!("Could not bind to {}: {}", addr, e))?;

        tracing::info!("Accepting Prometheus Requests on {}", listener.local_addr()?);

        let router = router.clone();
        let handle = tokio::task::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await
        });

        handles.push(handle);
    }

    if handles.is_empty() {
        return Err(format!(
            "The listen address [{}] did not resolve to any IP addresses",
            config.http.listen_address
        )
        .into());
    }

    for handle in handles {
        match handle.await {
            Ok(Ok(())) => (),
            Ok(Err(e)) => return Err(format!("Server failed: {}", e).into()),
            Err(e) => return Err(format!("Server task panicked: {}", e).into()),
        }
    }

    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    let telemetry_path = state.configuration.http.telemetry_path.clone();

    let router = Router::new()
        .route("/", get(handler::index))
        .route(&telemetry_path, get(handler::metrics))
        .layer(CatchPanicLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .extensions()
                        .get::<RequestId>()
                        .map(|id| id.header_value().to_str().unwrap_or("unknown"))
                        .unwrap_or("unknown");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::DEBUG)
                        .latency_unit(LatencyUnit::Millis),
                ),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state);

    Router::new().fallback_service(NormalizePathLayer::trim_trailing_slash().layer(router))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::init_collectors;
    use crate::config::Configuration;
    use crate::datasource::tests::{refused_address, serve};
    use crate::metrics::build_info::VERSION;
    use crate::metrics::util::tests::sample;
    use axum::http::StatusCode;
    use prometheus::Registry;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const FAILURES: &str = "nodepool_exporter_scrape_failures_total";

    fn up_series(nodepool: SocketAddr) -> String {
        format!(r#"nodepool_up{{host="{}"}}"#, nodepool.ip())
    }

    /// Starts the exporter against the nodepool server at `nodepool`.
    async fn start_exporter(nodepool: SocketAddr, telemetry_path: &str) -> SocketAddr {
        let mut configuration = Configuration::default();
        configuration.nodepool.host = nodepool.ip().to_string();
        configuration.nodepool.port = nodepool.port().to_string();
        configuration.http.telemetry_path = telemetry_path.to_owned();

        let registry = Registry::new();
        init_collectors(&configuration, &registry).unwrap();

        let state = AppState {
            configuration: Arc::new(configuration),
            registry,
        };

        serve(create_router(state)).await
    }

    async fn scrape(exporter: SocketAddr, path: &str) -> (StatusCode, String) {
        let response = reqwest::get(format!("http://{}{}", exporter, path))
            .await
            .unwrap();
        let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
        (status, response.text().await.unwrap())
    }

    fn nodepool_router(status: StatusCode, body: &'static str) -> Router {
        Router::new().route("/image-list", get(move || async move { (status, body) }))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_landing_page_links_metrics() {
        let nodepool = serve(nodepool_router(StatusCode::OK, "")).await;
        let exporter = start_exporter(nodepool, "/metrics").await;

        let (status, body) = scrape(exporter, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<title>Nodepool Exporter</title>"));
        assert!(body.contains(r#"<a href="/metrics">Metrics</a>"#));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_metrics_when_nodepool_is_healthy() {
        let nodepool = serve(nodepool_router(StatusCode::OK, "")).await;
        let exporter = start_exporter(nodepool, "/metrics").await;

        let response = reqwest::get(format!("http://{}/metrics", exporter))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            prometheus::TEXT_FORMAT
        );

        let body = response.text().await.unwrap();
        assert_eq!(sample(&body, &up_series(nodepool)), Some(1.0));
        assert_eq!(sample(&body, FAILURES), None);

        let build_info = format!(r#"nodepool_exporter_build_info{{version="{}"}}"#, VERSION);
        assert_eq!(sample(&body, &build_info), Some(1.0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_metrics_when_nodepool_refuses_connections() {
        let nodepool = refused_address().await;
        let exporter = start_exporter(nodepool, "/metrics").await;

        let (status, body) = scrape(exporter, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sample(&body, &up_series(nodepool)), Some(0.0));
        assert_eq!(sample(&body, FAILURES), Some(1.0));

        let (_, body) = scrape(exporter, "/metrics").await;
        assert_eq!(sample(&body, FAILURES), Some(2.0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_metrics_when_nodepool_is_overloaded() {
        let nodepool = serve(nodepool_router(
            StatusCode::SERVICE_UNAVAILABLE,
            "overloaded",
        ))
        .await;
        let exporter = start_exporter(nodepool, "/metrics").await;

        let (status, body) = scrape(exporter, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sample(&body, &up_series(nodepool)), Some(1.0));
        assert_eq!(sample(&body, FAILURES), Some(1.0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_scrapes_are_serialized() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));

        let router = {
            let in_flight = in_flight.clone();
            let max_in_flight = max_in_flight.clone();

            Router::new().route(
                "/image-list",
                get(move || {
                    let in_flight = in_flight.clone();
                    let max_in_flight = max_in_flight.clone();

                    async move {
                        let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_in_flight.fetch_max(current, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        "image-a"
                    }
                }),
            )
        };

        let nodepool = serve(router).await;
        let exporter = start_exporter(nodepool, "/metrics").await;

        let (first, second) = tokio::join!(
            scrape(exporter, "/metrics"),
            scrape(exporter, "/metrics")
        );

        for (status, body) in [first, second] {
            assert_eq!(status, StatusCode::OK);
            assert_eq!(sample(&body, &up_series(nodepool)), Some(1.0));
            assert_eq!(sample(&body, FAILURES), None);
        }
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_custom_telemetry_path() {
        let nodepool = serve(nodepool_router(StatusCode::OK, "")).await;
        let exporter = start_exporter(nodepool, "/probe").await;

        let (status, body) = scrape(exporter, "/probe").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sample(&body, &up_series(nodepool)), Some(1.0));

        let (status, _) = scrape(exporter, "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = scrape(exporter, "/").await;
        assert!(body.contains(r#"<a href="/probe">Metrics</a>"#));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_trailing_slash_is_normalized() {
        let nodepool = serve(nodepool_router(StatusCode::OK, "")).await;
        let exporter = start_exporter(nodepool, "/metrics").await;

        let (status, body) = scrape(exporter, "/metrics/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sample(&body, &up_series(nodepool)), Some(1.0));
    }

    #[tokio::test]
    async fn test_start_server_fails_when_the_port_is_taken() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let mut configuration = Configuration::default();
        configuration.http.listen_address = taken.local_addr().unwrap().to_string();

        let state = AppState {
            configuration: Arc::new(configuration),
            registry: Registry::new(),
        };

        let error = start_server(state).await.unwrap_err();
        assert!(error.to_string().contains("Could not bind to"));
    }
}
