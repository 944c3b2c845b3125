use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{GatewayStore, StoreError, StoreResult};
use crate::database::api_key::{ApiKey, ApiKeyChannel};
use crate::database::channel::{Channel, ChannelAllowedModel};
use crate::database::model::Model;
use crate::database::model_route::ModelRoute;
use crate::database::provider::Provider;
use crate::database::request_log::{page_window, RequestLog, RequestLogDetail};
use crate::database::setting::Setting;
use crate::database::user::User;
use crate::database::ListResult;

/// Full contents of an in-memory store. Also the YAML seed format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySnapshot {
    pub users: Vec<User>,
    pub providers: Vec<Provider>,
    pub channels: Vec<Channel>,
    pub channel_allowed_models: Vec<ChannelAllowedModel>,
    pub models: Vec<Model>,
    pub routes: Vec<ModelRoute>,
    pub api_keys: Vec<ApiKey>,
    pub api_key_channels: Vec<ApiKeyChannel>,
    pub logs: Vec<RequestLog>,
    pub log_details: Vec<RequestLogDetail>,
    pub settings: Vec<Setting>,
}

pub struct MemoryStore {
    tables: RwLock<MemorySnapshot>,
}

impl MemoryStore {
    pub fn new(snapshot: MemorySnapshot) -> Self {
        Self {
            tables: RwLock::new(snapshot),
        }
    }

    pub fn from_yaml_file(path: &Path) -> StoreResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Seed(format!("failed to read {}: {}", path.display(), e)))?;
        let snapshot: MemorySnapshot = serde_yaml::from_str(&content)
            .map_err(|e| StoreError::Seed(format!("failed to parse {}: {}", path.display(), e)))?;
        Ok(Self::new(snapshot))
    }

    pub async fn snapshot(&self) -> MemorySnapshot {
        self.tables.read().await.clone()
    }
}

/// SQL LIKE semantics: `%` matches any run, `_` one character, ASCII case-insensitive.
pub fn like_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();
    let t: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '_' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '%' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '%' {
        pi += 1;
    }
    pi == p.len()
}

#[async_trait]
impl GatewayStore for MemoryStore {
    async fn find_api_key(&self, key: &str) -> StoreResult<Option<ApiKey>> {
        let tables = self.tables.read().await;
        Ok(tables.api_keys.iter().find(|k| k.api_key == key).cloned())
    }

    async fn touch_api_key(&self, api_key_id: i64, now: i64) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(key) = tables.api_keys.iter_mut().find(|k| k.id == api_key_id) {
            key.last_used_at = Some(now);
        }
        Ok(())
    }

    async fn api_key_channel_ids(&self, api_key_id: i64) -> StoreResult<Vec<i64>> {
        let tables = self.tables.read().await;
        let mut ids: Vec<i64> = tables
            .api_key_channels
            .iter()
            .filter(|b| b.api_key_id == api_key_id)
            .map(|b| b.channel_id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn find_models_by_names(&self, names: &[String]) -> StoreResult<Vec<Model>> {
        let tables = self.tables.read().await;
        Ok(tables
            .models
            .iter()
            .filter(|m| names.iter().any(|n| m.matches_name(n)))
            .cloned()
            .collect())
    }

    async fn find_models_like(&self, pattern: &str) -> StoreResult<Vec<Model>> {
        let tables = self.tables.read().await;
        let mut models: Vec<Model> = tables
            .models
            .iter()
            .filter(|m| like_match(pattern, &m.name))
            .cloned()
            .collect();
        models.sort_by_key(|m| m.id);
        Ok(models)
    }

    async fn list_models(&self) -> StoreResult<Vec<Model>> {
        let tables = self.tables.read().await;
        let mut models = tables.models.clone();
        models.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(models)
    }

    async fn count_models(&self) -> StoreResult<i64> {
        Ok(self.tables.read().await.models.len() as i64)
    }

    async fn insert_model(&self, model: Model) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.models.iter().any(|m| m.id == model.id || m.name == model.name) {
            return Err(StoreError::Database(format!("model '{}' already exists", model.name)));
        }
        tables.models.push(model);
        Ok(())
    }

    async fn list_active_routes(&self, model_ids: &[i64]) -> StoreResult<Vec<(ModelRoute, Provider)>> {
        let tables = self.tables.read().await;
        let mut routes: Vec<&ModelRoute> = tables
            .routes
            .iter()
            .filter(|r| model_ids.contains(&r.model_id) && !r.is_disabled)
            .collect();
        routes.sort_by_key(|r| r.id);
        Ok(routes
            .into_iter()
            .filter_map(|route| {
                tables
                    .providers
                    .iter()
                    .find(|p| p.id == route.provider_id && p.is_enabled)
                    .map(|p| (route.clone(), p.clone()))
            })
            .collect())
    }

    async fn list_provider_routes(&self, provider_id: i64) -> StoreResult<Vec<ModelRoute>> {
        let tables = self.tables.read().await;
        Ok(tables
            .routes
            .iter()
            .filter(|r| r.provider_id == provider_id)
            .cloned()
            .collect())
    }

    async fn insert_route(&self, route: ModelRoute) -> StoreResult<()> {
        self.tables.write().await.routes.push(route);
        Ok(())
    }

    async fn set_route_cooldown(&self, route_id: i64, until: i64, now: i64) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(route) = tables.routes.iter_mut().find(|r| r.id == route_id) {
            route.disabled_until = Some(until);
            route.updated_at = now;
        }
        Ok(())
    }

    async fn list_auto_load_providers(&self) -> StoreResult<Vec<Provider>> {
        let tables = self.tables.read().await;
        Ok(tables
            .providers
            .iter()
            .filter(|p| p.auto_load_models && p.is_enabled)
            .cloned()
            .collect())
    }

    async fn channels_allowing_model(&self, model_id: i64) -> StoreResult<Vec<Channel>> {
        let tables = self.tables.read().await;
        let mut channels: Vec<Channel> = tables
            .channels
            .iter()
            .filter(|c| {
                c.is_enabled
                    && tables
                        .channel_allowed_models
                        .iter()
                        .any(|a| a.channel_id == c.id && a.model_id == model_id)
            })
            .cloned()
            .collect();
        channels.sort_by_key(|c| c.id);
        Ok(channels)
    }

    async fn allowed_model_ids(&self, channel_ids: &[i64]) -> StoreResult<Vec<i64>> {
        let tables = self.tables.read().await;
        let mut ids: Vec<i64> = tables
            .channel_allowed_models
            .iter()
            .filter(|a| {
                channel_ids.contains(&a.channel_id)
                    && tables.channels.iter().any(|c| c.id == a.channel_id && c.is_enabled)
            })
            .map(|a| a.model_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn get_user(&self, user_id: i64) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn transfer_balance(&self, payer: Option<i64>, payee: Option<i64>, amount: i64) -> StoreResult<()> {
        let now = Utc::now().timestamp_millis();
        let mut tables = self.tables.write().await;
        for (user_id, delta) in [(payer, -amount), (payee, amount)] {
            let Some(user_id) = user_id else { continue };
            if let Some(user) = tables.users.iter_mut().find(|u| u.id == user_id) {
                user.balance += delta;
                user.updated_at = now;
            }
        }
        Ok(())
    }

    async fn insert_log(&self, log: RequestLog) -> StoreResult<()> {
        self.tables.write().await.logs.push(log);
        Ok(())
    }

    async fn insert_log_detail(&self, detail: RequestLogDetail) -> StoreResult<()> {
        self.tables.write().await.log_details.push(detail);
        Ok(())
    }

    async fn get_log(&self, log_id: i64) -> StoreResult<Option<RequestLog>> {
        let tables = self.tables.read().await;
        Ok(tables.logs.iter().find(|l| l.id == log_id).cloned())
    }

    async fn get_log_detail(&self, log_id: i64) -> StoreResult<Option<RequestLogDetail>> {
        let tables = self.tables.read().await;
        Ok(tables.log_details.iter().find(|d| d.log_id == log_id).cloned())
    }

    async fn list_logs(&self, user_id: Option<i64>, page: i64, page_size: i64) -> StoreResult<ListResult<RequestLog>> {
        let (page, page_size, offset) = page_window(page, page_size);
        let tables = self.tables.read().await;
        let mut rows: Vec<&RequestLog> = tables
            .logs
            .iter()
            .filter(|l| user_id.map_or(true, |uid| l.user_id == uid))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(ListResult {
            total: rows.len() as i64,
            page,
            page_size,
            list: rows
                .into_iter()
                .skip(usize::try_from(offset).unwrap_or(usize::MAX))
                .take(page_size as usize)
                .cloned()
                .collect(),
        })
    }

    async fn delete_log_details_before(&self, cutoff: i64) -> StoreResult<usize> {
        let mut tables = self.tables.write().await;
        let before = tables.log_details.len();
        tables.log_details.retain(|d| d.created_at >= cutoff);
        Ok(before - tables.log_details.len())
    }

    async fn get_setting(&self, key: &str) -> StoreResult<Option<String>> {
        let tables = self.tables.read().await;
        Ok(tables.settings.iter().find(|s| s.key == key).map(|s| s.value.clone()))
    }

    async fn insert_setting_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.settings.iter().any(|s| s.key == key) {
            return Ok(false);
        }
        tables.settings.push(Setting {
            key: key.to_string(),
            value: value.to_string(),
            updated_at: Utc::now().timestamp_millis(),
        });
        Ok(true)
    }
}
