use async_trait::async_trait;
use chrono::Utc;

use super::{GatewayStore, StoreResult};
use crate::database::api_key::{ApiKey, ApiKeyChannel};
use crate::database::channel::{Channel, ChannelAllowedModel};
use crate::database::model::Model;
use crate::database::model_route::ModelRoute;
use crate::database::provider::Provider;
use crate::database::request_log::{RequestLog, RequestLogDetail};
use crate::database::setting::Setting;
use crate::database::user::User;
use crate::database::{DbConnection, DbPool, DbResult, ListResult};

/// Diesel-backed store. Queries run on the blocking pool.
#[derive(Clone)]
pub struct DbStore {
    pool: DbPool,
}

impl DbStore {
    pub fn connect(db_url: &str) -> StoreResult<Self> {
        Ok(Self {
            pool: DbPool::establish(db_url)?,
        })
    }

    async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut DbConnection) -> DbResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await?
    }
}

#[async_trait]
impl GatewayStore for DbStore {
    async fn find_api_key(&self, key: &str) -> StoreResult<Option<ApiKey>> {
        let key = key.to_string();
        self.run(move |conn| ApiKey::get_by_key(conn, &key)).await
    }

    async fn touch_api_key(&self, api_key_id: i64, now: i64) -> StoreResult<()> {
        self.run(move |conn| ApiKey::touch(conn, api_key_id, now)).await
    }

    async fn api_key_channel_ids(&self, api_key_id: i64) -> StoreResult<Vec<i64>> {
        self.run(move |conn| ApiKeyChannel::channel_ids(conn, api_key_id)).await
    }

    async fn find_models_by_names(&self, names: &[String]) -> StoreResult<Vec<Model>> {
        let names = names.to_vec();
        self.run(move |conn| Model::find_by_names(conn, &names)).await
    }

    async fn find_models_like(&self, pattern: &str) -> StoreResult<Vec<Model>> {
        let pattern = pattern.to_string();
        self.run(move |conn| Model::find_like(conn, &pattern)).await
    }

    async fn list_models(&self) -> StoreResult<Vec<Model>> {
        self.run(Model::list_all).await
    }

    async fn count_models(&self) -> StoreResult<i64> {
        self.run(Model::count).await
    }

    async fn insert_model(&self, model: Model) -> StoreResult<()> {
        self.run(move |conn| Model::insert(conn, &model)).await
    }

    async fn list_active_routes(&self, model_ids: &[i64]) -> StoreResult<Vec<(ModelRoute, Provider)>> {
        let model_ids = model_ids.to_vec();
        self.run(move |conn| {
            let routes = ModelRoute::list_enabled_for_models(conn, &model_ids)?;
            let mut provider_ids: Vec<i64> = routes.iter().map(|r| r.provider_id).collect();
            provider_ids.sort_unstable();
            provider_ids.dedup();
            let providers = Provider::list_enabled_by_ids(conn, &provider_ids)?;
            Ok(routes
                .into_iter()
                .filter_map(|route| {
                    providers
                        .iter()
                        .find(|p| p.id == route.provider_id)
                        .cloned()
                        .map(|p| (route, p))
                })
                .collect())
        })
        .await
    }

    async fn list_provider_routes(&self, provider_id: i64) -> StoreResult<Vec<ModelRoute>> {
        self.run(move |conn| ModelRoute::list_by_provider(conn, provider_id)).await
    }

    async fn insert_route(&self, route: ModelRoute) -> StoreResult<()> {
        self.run(move |conn| ModelRoute::insert(conn, &route)).await
    }

    async fn set_route_cooldown(&self, route_id: i64, until: i64, now: i64) -> StoreResult<()> {
        self.run(move |conn| ModelRoute::set_disabled_until(conn, route_id, until, now)).await
    }

    async fn list_auto_load_providers(&self) -> StoreResult<Vec<Provider>> {
        self.run(Provider::list_auto_load).await
    }

    async fn channels_allowing_model(&self, model_id: i64) -> StoreResult<Vec<Channel>> {
        self.run(move |conn| Channel::list_allowing_model(conn, model_id)).await
    }

    async fn allowed_model_ids(&self, channel_ids: &[i64]) -> StoreResult<Vec<i64>> {
        let channel_ids = channel_ids.to_vec();
        self.run(move |conn| ChannelAllowedModel::model_ids_for_channels(conn, &channel_ids)).await
    }

    async fn get_user(&self, user_id: i64) -> StoreResult<Option<User>> {
        self.run(move |conn| User::get_by_id(conn, user_id)).await
    }

    async fn transfer_balance(&self, payer: Option<i64>, payee: Option<i64>, amount: i64) -> StoreResult<()> {
        let now = Utc::now().timestamp_millis();
        self.run(move |conn| User::transfer_balance(conn, payer, payee, amount, now)).await
    }

    async fn insert_log(&self, log: RequestLog) -> StoreResult<()> {
        self.run(move |conn| RequestLog::insert(conn, &log)).await
    }

    async fn insert_log_detail(&self, detail: RequestLogDetail) -> StoreResult<()> {
        self.run(move |conn| RequestLogDetail::insert(conn, &detail)).await
    }

    async fn get_log(&self, log_id: i64) -> StoreResult<Option<RequestLog>> {
        self.run(move |conn| RequestLog::get_by_id(conn, log_id)).await
    }

    async fn get_log_detail(&self, log_id: i64) -> StoreResult<Option<RequestLogDetail>> {
        self.run(move |conn| RequestLogDetail::get_by_log_id(conn, log_id)).await
    }

    async fn list_logs(&self, user_id: Option<i64>, page: i64, page_size: i64) -> StoreResult<ListResult<RequestLog>> {
        self.run(move |conn| RequestLog::list(conn, user_id, page, page_size)).await
    }

    async fn delete_log_details_before(&self, cutoff: i64) -> StoreResult<usize> {
        self.run(move |conn| RequestLogDetail::delete_before(conn, cutoff)).await
    }

    async fn get_setting(&self, key: &str) -> StoreResult<Option<String>> {
        let key = key.to_string();
        self.run(move |conn| Setting::get(conn, &key)).await
    }

    async fn insert_setting_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        let row = Setting {
            key: key.to_string(),
            value: value.to_string(),
            updated_at: Utc::now().timestamp_millis(),
        };
        self.run(move |conn| Setting::insert_if_absent(conn, &row)).await
    }
}
