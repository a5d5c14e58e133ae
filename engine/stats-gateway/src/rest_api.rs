//! REST API routes
//!
//! Every data endpoint lives under `GET /api/<resource path>` and answers with
//! the same envelope: `{ ok, data, meta }` on success, `{ ok: false, error }`
//! otherwise.

use crate::error::GatewayError;
use crate::handler::{handle, Page};
use crate::state::ApiState;
use serde::Serialize;
use stats_query::NormalizedRow;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, warn};
use warp::http::StatusCode;
use warp::path::Tail;
use warp::reply::{Json, WithStatus};
use warp::{Filter, Rejection, Reply};

/// Paging details of a successful response
#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub limit: u32,
    pub offset: u32,
    pub count: usize,
    pub aggregated: bool,
}

/// Successful response
#[derive(Debug, Serialize)]
pub struct DataResponse<'a> {
    pub ok: bool,
    pub data: &'a [NormalizedRow],
    pub meta: ResponseMeta,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

impl<'a> From<&'a Page> for DataResponse<'a> {
    fn from(page: &'a Page) -> Self {
        Self {
            ok: true,
            data: &page.rows,
            meta: ResponseMeta {
                limit: page.limit,
                offset: page.offset,
                count: page.rows.len(),
                aggregated: page.aggregated,
            },
        }
    }
}

fn error_reply(status: StatusCode, message: String) -> WithStatus<Json> {
    let body = ErrorResponse { ok: false, error: message };
    warp::reply::with_status(warp::reply::json(&body), status)
}

/// Serve `GET /api/<path>`
pub async fn get_resource(
    tail: Tail,
    params: HashMap<String, String>,
    state: Arc<ApiState>,
) -> Result<WithStatus<Json>, Infallible> {
    let path = tail.as_str().trim_end_matches('/');
    let result = match state.catalog.get(path) {
        Some(resource) => handle(resource, &params, state.store.as_ref()).await,
        None => Err(GatewayError::NotFound(format!("/api/{}", path))),
    };

    Ok(match result {
        Ok(page) => {
            warp::reply::with_status(warp::reply::json(&DataResponse::from(&page)), StatusCode::OK)
        }
        Err(e) => {
            let status = e.status_code();
            if status.is_server_error() {
                error!("/api/{} failed: {}", path, e);
            } else {
                warn!("/api/{} rejected: {}", path, e);
            }
            error_reply(status, e.to_string())
        }
    })
}

/// Envelope for requests no route accepted
async fn handle_rejection(err: Rejection) -> Result<WithStatus<Json>, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        error!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
    };
    Ok(error_reply(status, message))
}

/// Create all REST API routes
pub fn create_routes(
    state: Arc<ApiState>,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let state_filter = warp::any().map(move || state.clone());

    // Data endpoints
    let resources = warp::path("api")
        .and(warp::path::tail())
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(state_filter)
        .and_then(get_resource);

    // Health check endpoint
    let health = warp::path("health").and(warp::path::end()).and(warp::get()).map(|| {
        warp::reply::json(&serde_json::json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))
    });

    resources
        .or(health)
        .with(
            warp::cors()
                .allow_any_origin()
                .allow_headers(vec!["content-type"])
                .allow_methods(vec!["GET", "OPTIONS"]),
        )
        .recover(handle_rejection)
}
