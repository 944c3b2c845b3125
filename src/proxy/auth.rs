use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::Utc;
use cyder_tools::log::{debug, error, warn};

use crate::controller::GatewayError;
use crate::database::api_key::ApiKey;
use crate::service::store::GatewayStore;
use crate::utils::auth::bearer_token;

/// Validates the caller's gateway key from `Authorization: Bearer <key>`.
///
/// Store failures surface as `ServiceUnavailable` so they are never confused
/// with a bad credential. The last-used timestamp is written in the background.
pub async fn authenticate(
    store: &Arc<dyn GatewayStore>,
    headers: &HeaderMap,
) -> Result<ApiKey, GatewayError> {
    let token = bearer_token(headers).ok_or_else(|| {
        warn!("Gateway request without a usable Authorization header");
        GatewayError::Unauthenticated("missing or malformed Authorization header".to_string())
    })?;

    let api_key = store.find_api_key(token).await.map_err(|e| {
        error!("API key lookup failed: {}", e);
        GatewayError::from(e)
    })?;

    let api_key = match api_key {
        Some(key) if key.is_enabled => key,
        Some(key) => {
            warn!("Rejected disabled API key {}", key.id);
            return Err(GatewayError::Unauthenticated("invalid API key".to_string()));
        }
        None => {
            warn!("Rejected unknown API key");
            return Err(GatewayError::Unauthenticated("invalid API key".to_string()));
        }
    };
    debug!("Authenticated API key {} for user {}", api_key.id, api_key.user_id);

    let store = Arc::clone(store);
    let api_key_id = api_key.id;
    tokio::spawn(async move {
        if let Err(e) = store.touch_api_key(api_key_id, Utc::now().timestamp_millis()).await {
            warn!("Failed to update last-used time of API key {}: {}", api_key_id, e);
        }
    });

    Ok(api_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::store::{MemorySnapshot, MemoryStore};
    use axum::http::{header::AUTHORIZATION, HeaderValue};

    fn store() -> Arc<dyn GatewayStore> {
        Arc::new(MemoryStore::new(MemorySnapshot {
            api_keys: vec![
                ApiKey { id: 1, api_key: "sk-live".to_string(), is_enabled: true, user_id: 7, ..Default::default() },
                ApiKey { id: 2, api_key: "sk-off".to_string(), is_enabled: false, user_id: 7, ..Default::default() },
            ],
            ..Default::default()
        }))
    }

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[tokio::test]
    async fn accepts_enabled_key() {
        let key = authenticate(&store(), &headers("Bearer sk-live")).await.unwrap();
        assert_eq!(key.user_id, 7);
    }

    #[tokio::test]
    async fn rejects_missing_disabled_and_unknown_keys() {
        let store = store();
        for result in [
            authenticate(&store, &HeaderMap::new()).await,
            authenticate(&store, &headers("Token sk-live")).await,
            authenticate(&store, &headers("Bearer sk-off")).await,
            authenticate(&store, &headers("Bearer sk-nope")).await,
        ] {
            assert!(matches!(result, Err(GatewayError::Unauthenticated(_))));
        }
    }

    #[tokio::test]
    async fn records_last_use_of_accepted_key() {
        let memory = Arc::new(MemoryStore::new(MemorySnapshot {
            api_keys: vec![ApiKey { id: 1, api_key: "sk-live".to_string(), is_enabled: true, ..Default::default() }],
            ..Default::default()
        }));
        let store: Arc<dyn GatewayStore> = memory.clone();
        authenticate(&store, &headers("Bearer sk-live")).await.unwrap();

        let mut last_used_at = None;
        for _ in 0..50 {
            last_used_at = memory.snapshot().await.api_keys[0].last_used_at;
            if last_used_at.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(last_used_at.is_some());
    }
}
