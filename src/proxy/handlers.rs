use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::Request,
    http::{header::CONTENT_TYPE, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use cyder_tools::log::{debug, info, warn};
use reqwest::Method;

use super::auth::authenticate;
use super::core::{forward, ForwardBody, ForwardContext, ForwardRequest};
use super::gate::{check_balance, check_permission};
use super::models::{get_accessible_models, ModelListResponse};
use super::resolve::resolve_model;
use super::route::{select_route, select_route_by_pattern};
use super::util::*;
use crate::controller::GatewayError;
use crate::database::api_key::ApiKey;
use crate::service::app_state::{AppState, GatewaySettings};

/// How to pick a model when the request names none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ModelFallback {
    Required,
    Image,
    Audio,
}

impl ModelFallback {
    fn pattern(self, settings: &GatewaySettings) -> Option<&str> {
        match self {
            ModelFallback::Required => None,
            ModelFallback::Image => Some(&settings.image_model_pattern),
            ModelFallback::Audio => Some(&settings.audio_model_pattern),
        }
    }
}

enum ModelTarget<'a> {
    Named(&'a str),
    Pattern(&'a str),
}

fn model_target<'a>(
    requested: Option<&'a str>,
    fallback: Option<&'a str>,
) -> Result<ModelTarget<'a>, GatewayError> {
    match (requested, fallback) {
        (Some(name), _) => Ok(ModelTarget::Named(name)),
        (None, Some(pattern)) => Ok(ModelTarget::Pattern(pattern)),
        (None, None) => Err(GatewayError::BadRequest("'model' field is required".to_string())),
    }
}

/// Runs the gates for an authenticated key: resolve, route, permission, balance.
async fn admit(
    app_state: &Arc<AppState>,
    api_key: ApiKey,
    target: ModelTarget<'_>,
    started_at: i64,
) -> Result<ForwardContext, GatewayError> {
    let store = &app_state.store;
    let selected = match target {
        ModelTarget::Named(name) => {
            let model = resolve_model(store, name).await?;
            select_route(store, model).await?
        }
        ModelTarget::Pattern(pattern) => {
            debug!("No model requested, selecting by pattern {}", pattern);
            select_route_by_pattern(store, pattern).await?
        }
    };
    let scope = check_permission(store, &api_key, selected.model.id).await?;
    check_balance(store, &api_key, &selected.model).await?;

    info!(
        "API key {} admitted for {} via provider {}",
        api_key.id, selected.model.name, selected.provider.name
    );
    Ok(ForwardContext {
        api_key,
        scope,
        selected,
        started_at,
    })
}

/// JSON endpoints: chat completions, embeddings, image generation, responses.
pub(super) async fn json_handler(
    app_state: Arc<AppState>,
    request: Request<Body>,
    endpoint: &'static str,
    fallback: ModelFallback,
) -> Result<Response<Body>, GatewayError> {
    let started_at = Utc::now().timestamp_millis();
    let api_key = authenticate(&app_state.store, request.headers()).await?;

    let body = read_body(request).await?;
    let data = parse_json_body(&body)?;
    let target = model_target(json_model(&data), fallback.pattern(&app_state.settings))?;
    let stream = wants_stream(&data);
    debug!("[{}] stream={} model={:?}", endpoint, stream, json_model(&data));

    let context = admit(&app_state, api_key, target, started_at).await?;
    let body = with_upstream_model(data, &context.selected.model.name)?;
    forward(
        &app_state,
        context,
        ForwardRequest {
            method: Method::POST,
            endpoint: endpoint.to_string(),
            body: ForwardBody::Json(body),
            stream,
        },
    )
    .await
}

/// Multipart endpoints: audio transcription/translation and image edits.
pub(super) async fn form_handler(
    app_state: Arc<AppState>,
    request: Request<Body>,
    endpoint: &'static str,
    fallback: ModelFallback,
) -> Result<Response<Body>, GatewayError> {
    let started_at = Utc::now().timestamp_millis();
    let api_key = authenticate(&app_state.store, request.headers()).await?;

    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .filter(|value| value.to_str().is_ok_and(|ct| ct.starts_with("multipart/form-data")))
        .cloned()
        .ok_or_else(|| {
            warn!("[{}] request is not multipart/form-data", endpoint);
            GatewayError::BadRequest("expected a multipart/form-data body".to_string())
        })?;
    let body = read_body(request).await?;

    let requested = multipart_text_field(content_type.to_str().unwrap_or(""), &body, "model").await;
    let target = model_target(requested.as_deref(), fallback.pattern(&app_state.settings))?;

    let context = admit(&app_state, api_key, target, started_at).await?;
    forward(
        &app_state,
        context,
        ForwardRequest {
            method: Method::POST,
            endpoint: endpoint.to_string(),
            body: ForwardBody::Multipart { content_type, body },
            stream: false,
        },
    )
    .await
}

/// `GET`/`DELETE /v1/responses/{id}`, routed by the `model` query parameter if present.
pub(super) async fn response_object_handler(
    app_state: Arc<AppState>,
    method: Method,
    response_id: String,
    params: HashMap<String, String>,
    headers: HeaderMap,
) -> Result<Response<Body>, GatewayError> {
    let started_at = Utc::now().timestamp_millis();
    let api_key = authenticate(&app_state.store, &headers).await?;

    if response_id.is_empty() || response_id.contains('/') {
        return Err(GatewayError::BadRequest("invalid response id".to_string()));
    }
    let requested = params.get("model").map(String::as_str).filter(|m| !m.is_empty());
    let target = model_target(requested, Some(&app_state.settings.responses_model_pattern))?;

    let context = admit(&app_state, api_key, target, started_at).await?;
    forward(
        &app_state,
        context,
        ForwardRequest {
            method,
            endpoint: format!("responses/{}", response_id),
            body: ForwardBody::Empty,
            stream: false,
        },
    )
    .await
}

pub(super) async fn list_models_handler(
    app_state: Arc<AppState>,
    headers: HeaderMap,
) -> Result<Response<Body>, GatewayError> {
    let api_key = authenticate(&app_state.store, &headers).await?;
    let models = get_accessible_models(&app_state.store, &api_key).await?;
    info!("Listing {} models for API key {}", models.len(), api_key.id);
    Ok(Json(ModelListResponse::from(models)).into_response())
}
