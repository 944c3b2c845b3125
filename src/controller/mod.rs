use std::sync::Arc;

use axum::{middleware, response::IntoResponse, Router};

use crate::proxy::{create_proxy_router, no_cache};
use crate::service::app_state::{create_state_router, AppState, StateRouter};
use crate::utils::auth::session_auth_middleware;
use request_log::create_request_log_router;

mod error;
mod request_log;

pub use error::GatewayError;

fn create_manager_router(app_state: Arc<AppState>) -> StateRouter {
    let api_router = create_state_router().nest(
        "/api",
        create_state_router()
            .merge(create_request_log_router())
            .layer(middleware::from_fn_with_state(app_state, session_auth_middleware)),
    );
    create_state_router().nest("/manager", no_cache(api_router))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    create_state_router()
        .merge(create_proxy_router())
        .merge(create_manager_router(app_state.clone()))
        .fallback(handle_404)
        .with_state(app_state)
}

pub async fn handle_404() -> impl IntoResponse {
    GatewayError::NotFound("not found".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::database::request_log::{RequestLog, RequestLogDetail};
    use crate::database::user::User;
    use crate::service::app_state::GatewaySettings;
    use crate::service::store::{GatewayStore, MemorySnapshot, MemoryStore};
    use crate::utils::auth::issue_session_token;
    use crate::utils::gzip_compress;

    fn log(id: i64, user_id: i64) -> RequestLog {
        RequestLog { id, user_id, created_at: id, model_name: "gpt-4".to_string(), ..Default::default() }
    }

    fn state() -> Arc<AppState> {
        let store: Arc<dyn GatewayStore> = Arc::new(MemoryStore::new(MemorySnapshot {
            users: vec![
                User { id: 1, role: "ADMIN".to_string(), ..Default::default() },
                User { id: 2, ..Default::default() },
                User { id: 3, is_disabled: true, ..Default::default() },
            ],
            logs: vec![log(10, 1), log(11, 2), log(12, 2)],
            log_details: vec![RequestLogDetail {
                id: 1,
                log_id: 11,
                request_body: gzip_compress(b"{\"model\":\"gpt-4\"}").unwrap(),
                response_body: gzip_compress(b"{\"ok\":true}").unwrap(),
                created_at: 11,
            }],
            ..Default::default()
        }));
        Arc::new(AppState::new(
            store,
            reqwest::Client::new(),
            GatewaySettings::default(),
            "manager-secret",
        ))
    }

    async fn get(state: &Arc<AppState>, uri: &str, user_id: Option<i64>) -> (StatusCode, Value) {
        let mut request = Request::builder().uri(uri);
        if let Some(user_id) = user_id {
            let token = issue_session_token(&state.session_keys, user_id);
            request = request.header("authorization", format!("Bearer {}", token));
        }
        let response = create_router(state.clone())
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn logs_require_a_session() {
        let state = state();
        assert_eq!(get(&state, "/manager/api/logs", None).await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(get(&state, "/manager/api/logs", Some(3)).await.0, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn users_see_their_own_logs_and_admins_all() {
        let state = state();
        let (status, body) = get(&state, "/manager/api/logs", Some(2)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], 0);
        assert_eq!(body["data"]["total"], 2);
        assert_eq!(body["data"]["list"][0]["id"], 12);

        let (_, body) = get(&state, "/manager/api/logs?page=1&page_size=1", Some(1)).await;
        assert_eq!(body["data"]["total"], 3);
        assert_eq!(body["data"]["list"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn detail_is_decompressed_for_its_owner() {
        let state = state();
        let (status, body) = get(&state, "/manager/api/logs/11/detail", Some(2)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["response_body"], "{\"ok\":true}");

        assert_eq!(get(&state, "/manager/api/logs/10/detail", Some(2)).await.0, StatusCode::NOT_FOUND);
        assert_eq!(get(&state, "/manager/api/logs/11/detail", Some(1)).await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_paths_fall_back_to_404() {
        let (status, body) = get(&state(), "/nowhere", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not found");
    }
}
