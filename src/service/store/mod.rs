use async_trait::async_trait;
use thiserror::Error;

use crate::database::api_key::ApiKey;
use crate::database::channel::Channel;
use crate::database::model::Model;
use crate::database::model_route::ModelRoute;
use crate::database::provider::Provider;
use crate::database::request_log::{RequestLog, RequestLogDetail};
use crate::database::user::User;
use crate::database::ListResult;

pub mod db;
pub mod memory;

pub use db::DbStore;
pub use memory::{MemorySnapshot, MemoryStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Blocking task failed: {0}")]
    Join(String),

    #[error("Seed file error: {0}")]
    Seed(String),
}

impl From<diesel::result::Error> for StoreError {
    fn from(e: diesel::result::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<diesel::r2d2::PoolError> for StoreError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        StoreError::Pool(e.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Join(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence seen by the gateway pipeline.
///
/// Every query the pipeline issues goes through this trait so that the
/// diesel-backed store and the in-memory catalogue are interchangeable.
#[async_trait]
pub trait GatewayStore: Send + Sync + 'static {
    async fn find_api_key(&self, key: &str) -> StoreResult<Option<ApiKey>>;
    async fn touch_api_key(&self, api_key_id: i64, now: i64) -> StoreResult<()>;
    async fn api_key_channel_ids(&self, api_key_id: i64) -> StoreResult<Vec<i64>>;

    /// Models whose name or alias is one of `names`.
    async fn find_models_by_names(&self, names: &[String]) -> StoreResult<Vec<Model>>;
    /// Models whose name matches a SQL LIKE pattern (`%` and `_` wildcards).
    async fn find_models_like(&self, pattern: &str) -> StoreResult<Vec<Model>>;
    async fn list_models(&self) -> StoreResult<Vec<Model>>;
    async fn count_models(&self) -> StoreResult<i64>;
    async fn insert_model(&self, model: Model) -> StoreResult<()>;

    /// Routes of `model_ids` that are not disabled, paired with their enabled provider.
    /// Cooldown is not applied here.
    async fn list_active_routes(&self, model_ids: &[i64]) -> StoreResult<Vec<(ModelRoute, Provider)>>;
    async fn list_provider_routes(&self, provider_id: i64) -> StoreResult<Vec<ModelRoute>>;
    async fn insert_route(&self, route: ModelRoute) -> StoreResult<()>;
    async fn set_route_cooldown(&self, route_id: i64, until: i64, now: i64) -> StoreResult<()>;
    async fn list_auto_load_providers(&self) -> StoreResult<Vec<Provider>>;

    /// Enabled channels allowing `model_id`, lowest id first.
    async fn channels_allowing_model(&self, model_id: i64) -> StoreResult<Vec<Channel>>;
    /// Models servable through the enabled channels among `channel_ids`.
    async fn allowed_model_ids(&self, channel_ids: &[i64]) -> StoreResult<Vec<i64>>;

    async fn get_user(&self, user_id: i64) -> StoreResult<Option<User>>;
    /// Debits `payer` and credits `payee` by `amount` as one unit.
    async fn transfer_balance(&self, payer: Option<i64>, payee: Option<i64>, amount: i64) -> StoreResult<()>;

    async fn insert_log(&self, log: RequestLog) -> StoreResult<()>;
    async fn insert_log_detail(&self, detail: RequestLogDetail) -> StoreResult<()>;
    async fn get_log(&self, log_id: i64) -> StoreResult<Option<RequestLog>>;
    async fn get_log_detail(&self, log_id: i64) -> StoreResult<Option<RequestLogDetail>>;
    async fn list_logs(&self, user_id: Option<i64>, page: i64, page_size: i64) -> StoreResult<ListResult<RequestLog>>;
    async fn delete_log_details_before(&self, cutoff: i64) -> StoreResult<usize>;

    async fn get_setting(&self, key: &str) -> StoreResult<Option<String>>;
    /// Returns false when the key already held a value.
    async fn insert_setting_if_absent(&self, key: &str, value: &str) -> StoreResult<bool>;
}
