use std::sync::Arc;

use chrono::Utc;
use cyder_tools::log::{error, warn};

use crate::controller::GatewayError;
use crate::database::api_key::ApiKey;
use crate::database::model::Model;
use crate::database::user::User;
use crate::service::store::GatewayStore;

/// Which channels a key can reach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyScope {
    AllChannels,
    Channels(Vec<i64>),
}

impl KeyScope {
    pub fn reaches(&self, channel_id: i64) -> bool {
        match self {
            KeyScope::AllChannels => true,
            KeyScope::Channels(ids) => ids.contains(&channel_id),
        }
    }
}

pub async fn key_scope(store: &Arc<dyn GatewayStore>, api_key: &ApiKey) -> Result<KeyScope, GatewayError> {
    if api_key.bind_to_all_channels {
        return Ok(KeyScope::AllChannels);
    }
    let channel_ids = store.api_key_channel_ids(api_key.id).await.map_err(|e| {
        error!("Loading channel bindings of key {} failed: {}", api_key.id, e);
        GatewayError::from(e)
    })?;
    Ok(KeyScope::Channels(channel_ids))
}

/// Grants `api_key` the use of `model_id`, returning the key's scope for later billing.
pub async fn check_permission(
    store: &Arc<dyn GatewayStore>,
    api_key: &ApiKey,
    model_id: i64,
) -> Result<KeyScope, GatewayError> {
    let scope = key_scope(store, api_key).await?;
    let channel_ids = match &scope {
        KeyScope::AllChannels => return Ok(scope),
        KeyScope::Channels(ids) => ids,
    };
    if channel_ids.is_empty() {
        warn!("API key {} is bound to no channels", api_key.id);
        return Err(GatewayError::Forbidden("key bound to no channels".to_string()));
    }

    let allowed = store.allowed_model_ids(channel_ids).await.map_err(|e| {
        error!("Loading allowed models for key {} failed: {}", api_key.id, e);
        GatewayError::from(e)
    })?;
    if !allowed.contains(&model_id) {
        warn!("API key {} may not use model {}", api_key.id, model_id);
        return Err(GatewayError::Forbidden("model not allowed for this key".to_string()));
    }
    Ok(scope)
}

/// Coarse pre-check that the key's owner may spend on `model`. Reserves nothing.
pub async fn check_balance(
    store: &Arc<dyn GatewayStore>,
    api_key: &ApiKey,
    model: &Model,
) -> Result<User, GatewayError> {
    let user = store
        .get_user(api_key.user_id)
        .await
        .map_err(|e| {
            error!("Loading owner of key {} failed: {}", api_key.id, e);
            GatewayError::from(e)
        })?
        .ok_or_else(|| {
            error!("API key {} references missing user {}", api_key.id, api_key.user_id);
            GatewayError::ServiceUnavailable("API key owner not found".to_string())
        })?;

    if !user.is_active_at(Utc::now().timestamp_millis()) {
        warn!("User {} is disabled or expired", user.id);
        return Err(GatewayError::Forbidden("account disabled or expired".to_string()));
    }
    if !model.is_free() && user.balance <= 0 {
        warn!("User {} has no balance for priced model {}", user.id, model.name);
        return Err(GatewayError::InsufficientBalance);
    }
    Ok(user)
}
