use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    http::HeaderValue,
    response::Response,
};
use chrono::Utc;
use cyder_tools::log::{debug, error, info, warn};
use futures::StreamExt;
use reqwest::{
    header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, TRANSFER_ENCODING},
    Method, NoProxy, Proxy, StatusCode,
};
use serde_json::Value;

use super::gate::KeyScope;
use super::logging::{log_request_and_calculate_cost, UsageRecord};
use super::route::{cool_down_route, SelectedRoute};
use crate::config::{OutboundProxyConfig, TimeoutConfig};
use crate::controller::GatewayError;
use crate::database::api_key::ApiKey;
use crate::service::app_state::AppState;
use crate::utils::decode_body;

const ERROR_MESSAGE_LIMIT: usize = 200;
const TIMEOUT_STATUS: u16 = 504;
const NETWORK_FAILURE_STATUS: u16 = 502;

/// `reqwest::NoProxy` understands `.example.com` but not `*.example.com`.
pub fn normalize_no_proxy(rules: &str) -> String {
    rules
        .split(',')
        .map(str::trim)
        .filter(|rule| !rule.is_empty())
        .map(|rule| match rule.strip_prefix("*.") {
            Some(domain) => format!(".{}", domain),
            None => rule.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// The shared upstream client. Environment proxies are ignored; only the
/// configured ones apply, each with the configured bypass list.
pub fn build_http_client(
    timeouts: &TimeoutConfig,
    outbound: &OutboundProxyConfig,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(timeouts.connect())
        .no_proxy();

    let bypass = outbound.no_proxy.as_deref().map(normalize_no_proxy);
    let bypass = || bypass.as_deref().and_then(NoProxy::from_string);

    if let Some(url) = outbound.http.as_deref().filter(|u| !u.is_empty()) {
        info!("Routing plain HTTP upstream calls through {}", url);
        builder = builder.proxy(Proxy::http(url)?.no_proxy(bypass()));
    }
    if let Some(url) = outbound.https.as_deref().filter(|u| !u.is_empty()) {
        info!("Routing HTTPS upstream calls through {}", url);
        builder = builder.proxy(Proxy::https(url)?.no_proxy(bypass()));
    }
    builder.build()
}

pub enum ForwardBody {
    Json(Bytes),
    /// Raw multipart payload with the client's own `Content-Type` (boundary included).
    Multipart { content_type: HeaderValue, body: Bytes },
    Empty,
}

impl ForwardBody {
    fn bytes(&self) -> &[u8] {
        match self {
            ForwardBody::Json(body) | ForwardBody::Multipart { body, .. } => body,
            ForwardBody::Empty => &[],
        }
    }
}

/// Everything the gates established about a request before it leaves the gateway.
pub struct ForwardContext {
    pub api_key: ApiKey,
    pub scope: KeyScope,
    pub selected: SelectedRoute,
    pub started_at: i64,
}

pub struct ForwardRequest {
    pub method: Method,
    /// Path suffix appended to the provider base URL, e.g. `chat/completions`.
    pub endpoint: String,
    pub body: ForwardBody,
    pub stream: bool,
}

/// Prefers `{"error":{"message":..}}`, then the raw text cut to 200 chars.
pub fn extract_error_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        let message = value.get("error").and_then(|e| match e {
            Value::String(s) => Some(s.as_str()),
            other => other.get("message").and_then(Value::as_str),
        });
        if let Some(message) = message.filter(|m| !m.is_empty()) {
            return message.to_string();
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return format!("upstream request failed with status {}", status.as_u16());
    }
    text.chars().take(ERROR_MESSAGE_LIMIT).collect()
}

fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_ENCODING)
        .map_or(false, |value| value.to_str().unwrap_or("").contains("gzip"))
}

impl ForwardContext {
    async fn log(
        &self,
        app_state: &AppState,
        request: &ForwardRequest,
        status_code: u16,
        is_stream: bool,
        response_body: &[u8],
    ) {
        log_request_and_calculate_cost(
            app_state.store.as_ref(),
            UsageRecord {
                api_key: &self.api_key,
                scope: &self.scope,
                selected: &self.selected,
                endpoint: &request.endpoint,
                status_code,
                is_stream,
                started_at: self.started_at,
                request_body: request.body.bytes(),
                response_body,
            },
        )
        .await;
    }

    fn model_str(&self) -> String {
        format!("{}/{}", self.selected.provider.name, self.selected.model.name)
    }
}

/// Sends the request to the selected provider and relays the outcome.
pub async fn forward(
    app_state: &Arc<AppState>,
    context: ForwardContext,
    request: ForwardRequest,
) -> Result<Response<Body>, GatewayError> {
    let provider = &context.selected.provider;
    let url = provider.endpoint_url(&request.endpoint);
    let model_str = context.model_str();
    info!("{}: forwarding {} {}", model_str, request.method, url);

    let mut builder = app_state
        .http
        .request(request.method.clone(), &url)
        .bearer_auth(&provider.api_key);
    builder = match &request.body {
        ForwardBody::Json(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(body.clone()),
        ForwardBody::Multipart { content_type, body } => {
            builder.header(CONTENT_TYPE, content_type.clone()).body(body.clone())
        }
        ForwardBody::Empty => builder,
    };
    debug!("{}: request body {}", model_str, String::from_utf8_lossy(request.body.bytes()));

    let timeouts = &app_state.settings.timeouts;
    let sent = if request.stream {
        match tokio::time::timeout(timeouts.response(), builder.send()).await {
            Ok(result) => result.map_err(|e| (e.is_timeout(), e.to_string())),
            Err(_) => Err((true, format!("no response within {:?}", timeouts.response()))),
        }
    } else {
        builder
            .timeout(timeouts.total())
            .send()
            .await
            .map_err(|e| (e.is_timeout(), e.to_string()))
    };

    let response = match sent {
        Ok(response) => response,
        Err((timed_out, message)) => {
            error!("{}: upstream request failed: {}", model_str, message);
            let status = if timed_out { TIMEOUT_STATUS } else { NETWORK_FAILURE_STATUS };
            context.log(app_state, &request, status, request.stream, &[]).await;
            return Err(GatewayError::UpstreamUnavailable(message));
        }
    };

    let status = response.status();
    if !status.is_success() {
        return Err(handle_upstream_error(app_state, &context, &request, response).await);
    }

    if request.stream {
        stream_response(app_state, context, request, response).await
    } else {
        buffered_response(app_state, context, request, response).await
    }
}

async fn handle_upstream_error(
    app_state: &Arc<AppState>,
    context: &ForwardContext,
    request: &ForwardRequest,
    response: reqwest::Response,
) -> GatewayError {
    let status = response.status();
    let gzip = is_gzip(response.headers());
    let body = match response.bytes().await {
        Ok(bytes) => decode_body(bytes, gzip),
        Err(e) => {
            warn!("{}: failed to read error body: {}", context.model_str(), e);
            Bytes::new()
        }
    };
    let message = extract_error_message(status, &body);
    error!(
        "{}: upstream returned {}: {}",
        context.model_str(),
        status,
        String::from_utf8_lossy(&body)
    );

    context.log(app_state, request, status.as_u16(), request.stream, &body).await;

    if app_state.settings.triggers_cooldown(status.as_u16()) {
        cool_down_route(&app_state.store, &context.selected.route, app_state.settings.cooldown).await;
    }

    GatewayError::Upstream { status, message }
}

fn response_builder(status: StatusCode, headers: &HeaderMap) -> axum::http::response::Builder {
    let mut builder = Response::builder().status(status);
    for (name, value) in headers.iter() {
        if name != CONTENT_LENGTH && name != CONTENT_ENCODING && name != TRANSFER_ENCODING {
            builder = builder.header(name, value);
        }
    }
    builder
}

async fn buffered_response(
    app_state: &Arc<AppState>,
    context: ForwardContext,
    request: ForwardRequest,
    response: reqwest::Response,
) -> Result<Response<Body>, GatewayError> {
    let status = response.status();
    let headers = response.headers().clone();
    let body = match response.bytes().await {
        Ok(bytes) => decode_body(bytes, is_gzip(&headers)),
        Err(e) => {
            let message = format!("failed to read upstream response: {}", e);
            error!("{}: {}", context.model_str(), message);
            let status = if e.is_timeout() { TIMEOUT_STATUS } else { NETWORK_FAILURE_STATUS };
            context.log(app_state, &request, status, false, &[]).await;
            return Err(GatewayError::UpstreamUnavailable(message));
        }
    };

    context.log(app_state, &request, status.as_u16(), false, &body).await;
    info!("{}: request completed with {}", context.model_str(), status);

    response_builder(status, &headers)
        .body(Body::from(body))
        .map_err(|e| GatewayError::Internal(format!("failed to build response: {}", e)))
}

async fn stream_response(
    app_state: &Arc<AppState>,
    context: ForwardContext,
    request: ForwardRequest,
    response: reqwest::Response,
) -> Result<Response<Body>, GatewayError> {
    let status = response.status();
    // Token counts are not observable mid-stream, so the row is written up front.
    context.log(app_state, &request, status.as_u16(), true, &[]).await;

    let builder = response_builder(status, response.headers());
    let model_str = context.model_str();
    let mut upstream = response.bytes_stream();

    let relayed = async_stream::stream! {
        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(chunk) => yield Ok::<_, std::io::Error>(chunk),
                Err(e) => {
                    error!("{}: upstream stream error: {}", model_str, e);
                    break;
                }
            }
        }
        debug!("{}: stream finished", model_str);
    };

    builder
        .body(Body::from_stream(relayed))
        .map_err(|e| GatewayError::Internal(format!("failed to build response: {}", e)))
}
