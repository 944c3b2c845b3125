use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Extension,
};
use cyder_tools::log::{debug, error, warn};
use serde::{Deserialize, Serialize};

use crate::{
    database::{request_log::RequestLog, ListResult},
    service::app_state::{create_state_router, AppState, StateRouter},
    utils::{auth::SessionUser, gzip_decompress, HttpResult},
};

use super::error::GatewayError;

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RequestLogQueryPayload {
    page: i64,
    page_size: i64,
}

impl Default for RequestLogQueryPayload {
    fn default() -> Self {
        Self { page: 1, page_size: 20 }
    }
}

#[derive(Debug, Serialize)]
struct RequestLogDetailView {
    log_id: i64,
    request_body: String,
    response_body: String,
    created_at: i64,
}

fn unzip_lossy(data: &[u8]) -> Result<String, GatewayError> {
    gzip_decompress(data)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .map_err(|e| {
            error!("Stored log body is not valid gzip: {}", e);
            GatewayError::Internal("stored body is unreadable".to_string())
        })
}

async fn list_request_log(
    State(app_state): State<Arc<AppState>>,
    Extension(SessionUser(user)): Extension<SessionUser>,
    Query(payload): Query<RequestLogQueryPayload>,
) -> Result<HttpResult<ListResult<RequestLog>>, GatewayError> {
    let user_filter = if user.is_admin() { None } else { Some(user.id) };
    debug!("Listing request logs for {:?}, page {}", user_filter, payload.page);
    let result = app_state
        .store
        .list_logs(user_filter, payload.page, payload.page_size)
        .await?;
    Ok(HttpResult::new(result))
}

async fn get_request_log_detail(
    State(app_state): State<Arc<AppState>>,
    Extension(SessionUser(user)): Extension<SessionUser>,
    Path(id): Path<i64>,
) -> Result<HttpResult<RequestLogDetailView>, GatewayError> {
    let not_found = || GatewayError::NotFound("request log not found".to_string());

    let log = app_state.store.get_log(id).await?.ok_or_else(not_found)?;
    if log.user_id != user.id && !user.is_admin() {
        warn!("User {} asked for log {} of user {}", user.id, id, log.user_id);
        return Err(not_found());
    }
    let detail = app_state
        .store
        .get_log_detail(id)
        .await?
        .ok_or_else(|| GatewayError::NotFound("no details stored for this request".to_string()))?;

    Ok(HttpResult::new(RequestLogDetailView {
        log_id: detail.log_id,
        request_body: unzip_lossy(&detail.request_body)?,
        response_body: unzip_lossy(&detail.response_body)?,
        created_at: detail.created_at,
    }))
}

pub fn create_request_log_router() -> StateRouter {
    create_state_router()
        .route("/logs", get(list_request_log))
        .route("/logs/{id}/detail", get(get_request_log_detail))
}
