//! keepup-api — REST API for keepup.
//!
//! Thin axum layer over a [`Prober`]. Each route maps onto exactly one
//! prober operation; validation beyond URL well-formedness and all JSON
//! field naming live here, not in the prober.
//!
//! Success bodies are the bare payload (a site, a site list, or a small
//! acknowledgement object). Failures are `{ "error": "..." }` with a 4xx/5xx
//! status.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Service info and route table |
//! | GET | `/api/sites` | List targets, ascending by order |
//! | POST | `/api/add-site` | Add a target (probed before responding) |
//! | DELETE | `/api/sites/{id}` | Remove a target (idempotent) |
//! | PUT | `/api/sites/order` | Apply new display orders |

pub mod handlers;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{delete, get, post, put};
use keepup_core::ServerSettings;
use keepup_health::Prober;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub prober: Prober,
    /// Listening port, reported by `GET /`.
    pub port: u16,
    pub environment: String,
}

/// Route table reported by `GET /`.
pub const ROUTES: &[(&str, &str)] = &[
    ("GET", "/"),
    ("GET", "/api/sites"),
    ("POST", "/api/add-site"),
    ("DELETE", "/api/sites/{id}"),
    ("PUT", "/api/sites/order"),
];

/// Build the complete API router with CORS for the configured origins.
pub fn build_router(prober: Prober, server: &ServerSettings) -> Router {
    let state = ApiState {
        prober,
        port: server.port,
        environment: server.environment.clone(),
    };

    Router::new()
        .route("/", get(handlers::service_info))
        .route("/api/sites", get(handlers::list_sites))
        .route("/api/add-site", post(handlers::add_site))
        .route("/api/sites/order", put(handlers::reorder_sites))
        .route("/api/sites/{id}", delete(handlers::delete_site))
        .with_state(state)
        .layer(cors_layer(&server.allowed_origins))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(%origin, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::PUT])
        .allow_headers([header::CONTENT_TYPE])
}
