use crate::config::Configuration;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{Html, IntoResponse, Response};
use prometheus::Registry;
use std::sync::Arc;

pub async fn index(State(configuration): State<Arc<Configuration>>) -> Html<String> {
    Html(format!(
        r#"<html>
<head><title>Nodepool Exporter</title></head>
<body>
<h1>Nodepool Exporter</h1>
<p><a href="{}">Metrics</a></p>
</body>
</html>
"#,
        configuration.http.telemetry_path
    ))
}

/// Gathers the registry on the blocking pool: collecting scrapes nodepool
/// synchronously and holds the exporter's lock for the whole round trip.
pub async fn metrics(State(registry): State<Registry>) -> Response {
    let encoded = tokio::task::spawn_blocking(move || {
        let metric_families = registry.gather();
        prometheus::TextEncoder::new().encode_to_string(&metric_families)
    })
    .await;

    match encoded {
        Ok(Ok(body)) => ([(CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),

        Ok(Err(error)) => {
            tracing::error!(?error, "Failed to encode the metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }

        Err(error) => {
            tracing::error!(?error, "The metrics collection task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
