use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    Router, error_handling::HandleErrorLayer, extract::ConnectInfo, extract::Request,
    http::StatusCode, response::IntoResponse, routing::get,
};
use tower::BoxError;
use tower::ServiceBuilder;
use tower_surge::{AdmissionConfig, AdmissionLayer, SurgeError};

#[tokio::main]
async fn main() {
    // 1. Admission policy: 5 req/sec with a burst of 10 per client,
    //    4 concurrent handlers, 500ms admission wait.
    let config = AdmissionConfig {
        rate: 5.0,
        burst: 10,
        cache_capacity: 1024,
        workers: 4,
        max_wait: Duration::from_millis(500),
    };
    let admission = AdmissionLayer::from_config(&config, client_key).unwrap();

    // 2. Build the Router
    let app = Router::new()
        .route("/", get(|| async { "Hello, Surge!" }))
        .layer(
            ServiceBuilder::new()
                // The outermost layer: catches BoxError and returns Response
                .layer(HandleErrorLayer::new(handle_surge_error))
                .layer(admission)
                // Converts the Route's Infallible to BoxError so that
                // AdmissionLayer is happy wrapping it.
                .map_err(BoxError::from),
        );

    // 3. Serve; connect info supplies the per-client key.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000")
        .await
        .unwrap();
    println!("📡 Listening on http://127.0.0.1:3000");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}

/// Rate-limit subject: the client's network address.
fn client_key(req: &Request) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// The signature must match BoxError -> IntoResponse
async fn handle_surge_error(err: BoxError) -> impl IntoResponse {
    if let Some(surge_err) = err.downcast_ref::<SurgeError>() {
        surge_err.clone().into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Service Error").into_response()
    }
}
