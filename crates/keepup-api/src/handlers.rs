//! REST API handlers.
//!
//! Each handler calls one `Prober` operation and returns JSON responses.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use keepup_health::ProberError;
use keepup_state::*;

use crate::{ApiState, ROUTES};

/// Body of every failed request.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ErrorBody {
            error: msg.to_string(),
        }),
    )
}

// ── Wire types ─────────────────────────────────────────────────

/// A target as the dashboard sees it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteView {
    pub id: TargetId,
    pub url: String,
    pub order: i64,
    pub status: TargetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
    pub status_history: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
}

impl From<Target> for SiteView {
    fn from(target: Target) -> Self {
        Self {
            id: target.id,
            url: target.url,
            order: target.order,
            status: target.status,
            response_time: target.last_response_time_ms,
            error: target.last_error,
            last_checked: target.last_checked_at,
            status_history: target.history.iter().copied().collect(),
            created_at: target.created_at,
        }
    }
}

/// POST /api/add-site body.
#[derive(Debug, Deserialize)]
pub struct AddSiteRequest {
    pub url: Option<String>,
}

/// PUT /api/sites/order body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderRequest {
    pub site_order: Vec<OrderUpdate>,
}

#[derive(Serialize)]
struct RouteInfo {
    method: &'static str,
    path: &'static str,
}

#[derive(Serialize)]
struct ServerInfo {
    port: u16,
    environment: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceInfo {
    name: &'static str,
    version: &'static str,
    status: &'static str,
    timestamp: DateTime<Utc>,
    targets: usize,
    server_info: ServerInfo,
    available_routes: Vec<RouteInfo>,
}

/// Acknowledgement for DELETE /api/sites/{id}.
#[derive(Debug, Serialize)]
pub struct DeleteAck {
    pub message: &'static str,
    pub id: TargetId,
    pub removed: bool,
}

/// Acknowledgement for PUT /api/sites/order.
#[derive(Debug, Serialize)]
pub struct ReorderAck {
    pub message: &'static str,
    pub updated: usize,
}

// ── Handlers ───────────────────────────────────────────────────

/// GET /
pub async fn service_info(State(state): State<ApiState>) -> impl IntoResponse {
    Json(ServiceInfo {
        name: "keepup",
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
        timestamp: Utc::now(),
        targets: state.prober.target_count(),
        server_info: ServerInfo {
            port: state.port,
            environment: state.environment.clone(),
        },
        available_routes: ROUTES
            .iter()
            .map(|&(method, path)| RouteInfo { method, path })
            .collect(),
    })
}

/// GET /api/sites
pub async fn list_sites(State(state): State<ApiState>) -> impl IntoResponse {
    let sites: Vec<SiteView> = state
        .prober
        .list_targets()
        .into_iter()
        .map(SiteView::from)
        .collect();
    Json(sites)
}

/// POST /api/add-site
pub async fn add_site(
    State(state): State<ApiState>,
    Json(req): Json<AddSiteRequest>,
) -> impl IntoResponse {
    let Some(url) = req.url.filter(|u| !u.trim().is_empty()) else {
        return error_response("URL is required", StatusCode::BAD_REQUEST).into_response();
    };

    match state.prober.add_target(&url).await {
        Ok(target) => Json(SiteView::from(target)).into_response(),
        Err(e @ ProberError::InvalidUrl { .. }) => {
            info!(%url, error = %e, "rejected site");
            error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response()
        }
        Err(e) => {
            error!(%url, error = %e, "failed to add site");
            error_response(
                &format!("failed to add site: {e}"),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
            .into_response()
        }
    }
}

/// DELETE /api/sites/{id}
///
/// Idempotent: deleting an unknown id succeeds.
pub async fn delete_site(
    State(state): State<ApiState>,
    Path(id): Path<TargetId>,
) -> impl IntoResponse {
    let removed = state.prober.remove_target(id);
    Json(DeleteAck {
        message: "Site deleted successfully",
        id,
        removed,
    })
}

/// PUT /api/sites/order
pub async fn reorder_sites(
    State(state): State<ApiState>,
    Json(req): Json<ReorderRequest>,
) -> impl IntoResponse {
    let updated = state.prober.reorder_targets(&req.site_order);
    Json(ReorderAck {
        message: "Order updated successfully",
        updated,
    })
}
