use axum::Router;
use config::CONFIG;
use controller::create_router;
use cyder_tools::log::{info, LocalLogger};

use crate::service::app_state::create_app_state;
use crate::service::model_sync::load_provider_models;
use crate::service::retention::spawn_retention_task;

mod config;
mod controller;
mod database;
mod proxy;
mod schema;
mod service;
mod utils;

#[tokio::main]
async fn main() {
    LocalLogger::init(&CONFIG.log_level);
    let app_state = create_app_state(&CONFIG).await;

    tokio::spawn(load_provider_models(app_state.clone()));
    spawn_retention_task(
        app_state.store.clone(),
        app_state.settings.log_detail_retention_days,
    );

    let addr = format!("{}:{}", &CONFIG.host, CONFIG.port);
    info!("server start at {}", &addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", addr, e));

    let base_path = CONFIG.base_path.trim_end_matches('/');
    let app = if base_path.is_empty() {
        create_router(app_state)
    } else {
        Router::new().nest(base_path, create_router(app_state))
    };
    axum::serve(listener, app)
        .await
        .expect("failed to start server");
}
