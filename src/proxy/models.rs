use std::sync::Arc;

use cyder_tools::log::{debug, error};
use serde::Serialize;

use super::gate::{key_scope, KeyScope};
use crate::controller::GatewayError;
use crate::database::api_key::ApiKey;
use crate::database::model::Model;
use crate::service::store::GatewayStore;

#[derive(Debug, Serialize)]
pub(super) struct ModelInfo {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub owned_by: &'static str,
}

#[derive(Debug, Serialize)]
pub(super) struct ModelListResponse {
    pub object: &'static str,
    pub data: Vec<ModelInfo>,
}

impl From<Vec<Model>> for ModelListResponse {
    fn from(models: Vec<Model>) -> Self {
        Self {
            object: "list",
            data: models
                .into_iter()
                .map(|m| ModelInfo {
                    id: m.name,
                    object: "model",
                    created: m.created_at / 1000,
                    owned_by: "model-gateway",
                })
                .collect(),
        }
    }
}

/// Models `api_key` may call, ordered by name.
pub(super) async fn get_accessible_models(
    store: &Arc<dyn GatewayStore>,
    api_key: &ApiKey,
) -> Result<Vec<Model>, GatewayError> {
    let models = store.list_models().await.map_err(|e| {
        error!("Failed to list models: {}", e);
        GatewayError::from(e)
    })?;

    let allowed = match key_scope(store, api_key).await? {
        KeyScope::AllChannels => return Ok(models),
        KeyScope::Channels(channel_ids) => store.allowed_model_ids(&channel_ids).await.map_err(|e| {
            error!("Failed to load allowed models of key {}: {}", api_key.id, e);
            GatewayError::from(e)
        })?,
    };
    debug!("API key {} may use {} models", api_key.id, allowed.len());

    Ok(models.into_iter().filter(|m| allowed.contains(&m.id)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::api_key::ApiKeyChannel;
    use crate::database::channel::{Channel, ChannelAllowedModel};
    use crate::service::store::{MemorySnapshot, MemoryStore};

    fn store() -> Arc<dyn GatewayStore> {
        Arc::new(MemoryStore::new(MemorySnapshot {
            models: vec![
                Model { id: 1, name: "gpt-4:latest".to_string(), ..Default::default() },
                Model { id: 2, name: "whisper-1".to_string(), ..Default::default() },
            ],
            channels: vec![Channel { id: 10, is_enabled: true, ..Default::default() }],
            channel_allowed_models: vec![ChannelAllowedModel { id: 1, channel_id: 10, model_id: 2 }],
            api_key_channels: vec![ApiKeyChannel { id: 1, api_key_id: 2, channel_id: 10 }],
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn bound_key_sees_channel_models_only() {
        let store = store();
        let all = ApiKey { id: 1, bind_to_all_channels: true, ..Default::default() };
        let bound = ApiKey { id: 2, ..Default::default() };
        let unbound = ApiKey { id: 3, ..Default::default() };

        assert_eq!(get_accessible_models(&store, &all).await.unwrap().len(), 2);
        let names: Vec<String> = get_accessible_models(&store, &bound)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["whisper-1".to_string()]);
        assert!(get_accessible_models(&store, &unbound).await.unwrap().is_empty());
    }

    #[test]
    fn list_shape() {
        let listed = ModelListResponse::from(vec![Model {
            name: "gpt-4:latest".to_string(),
            created_at: 1_700_000_000_000,
            ..Default::default()
        }]);
        let value = serde_json::to_value(&listed).unwrap();
        assert_eq!(value["object"], "list");
        assert_eq!(value["data"][0]["id"], "gpt-4:latest");
        assert_eq!(value["data"][0]["created"], 1_700_000_000);
    }
}
