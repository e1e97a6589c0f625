pub mod error;
pub mod stub;

use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use stub::{StubSettings, COUNTER_FIELD};

/// Single-route target service used as the saturation victim.
pub fn router(settings: StubSettings) -> Router {
    Router::new()
        .route("/", get(stub::simulate_work).post(stub::simulate_work))
        .with_state(settings)
        .layer(
            ServiceBuilder::new()
                .layer(axum::extract::DefaultBodyLimit::max(64 * 1024)),
        )
        .layer(TraceLayer::new_for_http())
}
