use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use cyder_tools::log::{debug, error, info};
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::database::model::Model;
use crate::database::model_route::ModelRoute;
use crate::database::provider::Provider;
use crate::schema::enum_def::ProviderType;
use crate::service::app_state::AppState;
use crate::service::store::StoreError;
use crate::utils::ID_GENERATOR;

#[derive(Debug, Error)]
pub enum ModelSyncError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider answered {0}")]
    Status(StatusCode),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Model ids from a provider's model listing. Gemini answers
/// `{"models":[{"name":"models/x"}]}`, everyone else the OpenAI `data[].id` shape.
pub fn parse_model_ids(kind: ProviderType, body: &Value) -> Vec<String> {
    let (list, field) = match kind {
        ProviderType::Gemini => ("models", "name"),
        ProviderType::Openai | ProviderType::Custom => ("data", "id"),
    };
    let mut ids: Vec<String> = body
        .get(list)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(field).and_then(Value::as_str))
                .map(|id| id.strip_prefix("models/").unwrap_or(id).to_string())
                .filter(|id| !id.is_empty())
                .collect()
        })
        .unwrap_or_default();
    ids.sort();
    ids.dedup();
    ids
}

async fn fetch_model_ids(app_state: &AppState, provider: &Provider) -> Result<Vec<String>, ModelSyncError> {
    let response = app_state
        .http
        .get(provider.endpoint_url("models"))
        .bearer_auth(&provider.api_key)
        .timeout(app_state.settings.timeouts.model_load())
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(ModelSyncError::Status(response.status()));
    }
    let body: Value = response.json().await?;
    Ok(parse_model_ids(provider.kind(), &body))
}

/// Registers every model `provider` lists and routes it to the provider.
/// Returns the number of routes added.
pub async fn sync_provider_models(app_state: &AppState, provider: &Provider) -> Result<usize, ModelSyncError> {
    let ids = fetch_model_ids(app_state, provider).await?;
    debug!("Provider {} lists {} models", provider.name, ids.len());
    if ids.is_empty() {
        return Ok(0);
    }

    let store = &app_state.store;
    let mut known: HashMap<String, Model> = store
        .find_models_by_names(&ids)
        .await?
        .into_iter()
        .map(|m| (m.name.clone(), m))
        .collect();
    let routed: HashSet<i64> = store
        .list_provider_routes(provider.id)
        .await?
        .into_iter()
        .map(|r| r.model_id)
        .collect();

    let now = Utc::now().timestamp_millis();
    let mut added = 0;
    for id in ids {
        let model = match known.remove(&id) {
            Some(model) => model,
            None => {
                let model = Model {
                    id: ID_GENERATOR.generate_id(),
                    name: id,
                    user_id: provider.user_id,
                    created_at: now,
                    updated_at: now,
                    ..Default::default()
                };
                store.insert_model(model.clone()).await?;
                info!("Registered model {} from provider {}", model.name, provider.name);
                model
            }
        };
        if routed.contains(&model.id) {
            continue;
        }
        store
            .insert_route(ModelRoute {
                id: ID_GENERATOR.generate_id(),
                model_id: model.id,
                provider_id: provider.id,
                weight: 1,
                created_at: now,
                updated_at: now,
                ..Default::default()
            })
            .await?;
        added += 1;
    }
    Ok(added)
}

/// Start-up pass over every provider flagged for auto-load. Never fails.
pub async fn load_provider_models(app_state: Arc<AppState>) {
    let providers = match app_state.store.list_auto_load_providers().await {
        Ok(providers) => providers,
        Err(e) => {
            error!("Failed to list auto-load providers: {}", e);
            return;
        }
    };
    for provider in providers {
        match sync_provider_models(&app_state, &provider).await {
            Ok(added) => info!("Provider {}: {} new routes", provider.name, added),
            Err(e) => error!("Model auto-load for provider {} failed: {}", provider.name, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::app_state::GatewaySettings;
    use crate::service::store::{GatewayStore, MemorySnapshot, MemoryStore};
    use axum::{routing::get, Json, Router};
    use serde_json::json;

    #[test]
    fn listing_shapes() {
        let openai = json!({"object": "list", "data": [{"id": "gpt-4o"}, {"id": "gpt-4o"}, {"id": "o3"}]});
        assert_eq!(parse_model_ids(ProviderType::Openai, &openai), vec!["gpt-4o", "o3"]);

        let gemini = json!({"models": [{"name": "models/gemini-2.5-pro"}]});
        assert_eq!(parse_model_ids(ProviderType::Gemini, &gemini), vec!["gemini-2.5-pro"]);

        assert!(parse_model_ids(ProviderType::Custom, &json!({"error": "nope"})).is_empty());
    }

    #[tokio::test]
    async fn sync_adds_missing_models_and_routes_once() {
        let router = Router::new().route(
            "/v1/models",
            get(|| async { Json(json!({"data": [{"id": "gpt-4"}, {"id": "llama3"}]})) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/v1", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let provider = Provider {
            id: 3,
            name: "local".to_string(),
            base_url,
            auto_load_models: true,
            is_enabled: true,
            user_id: 2,
            ..Default::default()
        };
        let memory = Arc::new(MemoryStore::new(MemorySnapshot {
            providers: vec![provider.clone()],
            models: vec![Model { id: 1, name: "gpt-4".to_string(), ..Default::default() }],
            ..Default::default()
        }));
        let store: Arc<dyn GatewayStore> = memory.clone();
        let state = AppState::new(store, reqwest::Client::new(), GatewaySettings::default(), "s");

        assert_eq!(sync_provider_models(&state, &provider).await.unwrap(), 2);
        assert_eq!(sync_provider_models(&state, &provider).await.unwrap(), 0);

        let snapshot = memory.snapshot().await;
        assert_eq!(snapshot.models.len(), 2);
        assert_eq!(snapshot.routes.len(), 2);
        let llama = snapshot.models.iter().find(|m| m.name == "llama3").unwrap();
        assert_eq!((llama.user_id, llama.input_token_price), (2, 0));
        assert!(snapshot.routes.iter().all(|r| r.provider_id == 3 && r.weight == 1));
    }
}
