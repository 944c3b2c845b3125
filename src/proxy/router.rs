use std::collections::HashMap;

use axum::{
    body::Body,
    extract::{Path, Query, Request, State},
    http::{
        header::{CACHE_CONTROL, EXPIRES, PRAGMA},
        HeaderMap, HeaderValue,
    },
    routing::{get, post},
};
use reqwest::Method;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::service::app_state::{create_state_router, StateRouter};

use super::handlers::{
    form_handler, json_handler, list_models_handler, response_object_handler, ModelFallback,
};

/// Adds the no-cache header set every read endpoint answers with.
pub fn no_cache(router: StateRouter) -> StateRouter {
    router
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store, no-cache, must-revalidate, proxy-revalidate"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            EXPIRES,
            HeaderValue::from_static("0"),
        ))
}

fn create_read_router() -> StateRouter {
    let router = create_state_router()
        .route(
            "/models",
            get(|State(app_state), headers: HeaderMap| async move {
                list_models_handler(app_state, headers).await
            }),
        )
        .route(
            "/responses/{id}",
            get(
                |State(app_state),
                 Path(id): Path<String>,
                 Query(params): Query<HashMap<String, String>>,
                 headers: HeaderMap| async move {
                    response_object_handler(app_state, Method::GET, id, params, headers).await
                },
            )
            .delete(
                |State(app_state),
                 Path(id): Path<String>,
                 Query(params): Query<HashMap<String, String>>,
                 headers: HeaderMap| async move {
                    response_object_handler(app_state, Method::DELETE, id, params, headers).await
                },
            ),
        );
    no_cache(router)
}

fn create_write_router() -> StateRouter {
    create_state_router()
        .route(
            "/chat/completions",
            post(|State(app_state), request: Request<Body>| async move {
                json_handler(app_state, request, "chat/completions", ModelFallback::Required).await
            }),
        )
        .route(
            "/embeddings",
            post(|State(app_state), request: Request<Body>| async move {
                json_handler(app_state, request, "embeddings", ModelFallback::Required).await
            }),
        )
        .route(
            "/images/generations",
            post(|State(app_state), request: Request<Body>| async move {
                json_handler(app_state, request, "images/generations", ModelFallback::Image).await
            }),
        )
        .route(
            "/images/edits",
            post(|State(app_state), request: Request<Body>| async move {
                form_handler(app_state, request, "images/edits", ModelFallback::Image).await
            }),
        )
        .route(
            "/audio/transcriptions",
            post(|State(app_state), request: Request<Body>| async move {
                form_handler(app_state, request, "audio/transcriptions", ModelFallback::Audio).await
            }),
        )
        .route(
            "/audio/translations",
            post(|State(app_state), request: Request<Body>| async move {
                form_handler(app_state, request, "audio/translations", ModelFallback::Audio).await
            }),
        )
        .route(
            "/responses",
            post(|State(app_state), request: Request<Body>| async move {
                json_handler(app_state, request, "responses", ModelFallback::Required).await
            }),
        )
}

pub fn create_proxy_router() -> StateRouter {
    create_state_router().nest(
        "/v1",
        create_write_router().merge(create_read_router()),
    )
}
