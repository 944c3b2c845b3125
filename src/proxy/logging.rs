use chrono::Utc;
use cyder_tools::log::{debug, error, info, warn};
use serde_json::Value;

use super::gate::KeyScope;
use super::route::SelectedRoute;
use crate::database::api_key::ApiKey;
use crate::database::channel::Channel;
use crate::database::request_log::{RequestLog, RequestLogDetail};
use crate::service::store::GatewayStore;
use crate::utils::billing::{calculate_cost, parse_usage_info, UsageInfo};
use crate::utils::{gzip_compress, ID_GENERATOR};

/// One finished (or failed) upstream exchange, ready to be metered.
pub struct UsageRecord<'a> {
    pub api_key: &'a ApiKey,
    pub scope: &'a KeyScope,
    pub selected: &'a SelectedRoute,
    pub endpoint: &'a str,
    pub status_code: u16,
    pub is_stream: bool,
    pub started_at: i64,
    pub request_body: &'a [u8],
    pub response_body: &'a [u8],
}

impl UsageRecord<'_> {
    /// Only successful bodies are metered. Error and streamed responses bill nothing.
    fn usage(&self) -> UsageInfo {
        if self.is_stream || !(200..300).contains(&self.status_code) {
            return UsageInfo::default();
        }
        serde_json::from_slice::<Value>(self.response_body)
            .ok()
            .and_then(|body| parse_usage_info(&body))
            .unwrap_or_default()
    }
}

/// First shared channel that allows the model and that the key can reach.
async fn resolve_owner_channel(store: &dyn GatewayStore, record: &UsageRecord<'_>) -> Option<Channel> {
    let model = &record.selected.model;
    match store.channels_allowing_model(model.id).await {
        Ok(channels) => channels
            .into_iter()
            .find(|c| c.is_shared && record.scope.reaches(c.id)),
        Err(e) => {
            error!("Owner channel lookup for model {} failed: {}", model.name, e);
            None
        }
    }
}

async fn settle(store: &dyn GatewayStore, caller_id: i64, owner_user_id: Option<i64>, cost: i64) {
    let balance = match store.get_user(caller_id).await {
        Ok(Some(user)) => user.balance,
        Ok(None) => {
            error!("Billing skipped: user {} not found", caller_id);
            return;
        }
        Err(e) => {
            error!("Billing skipped: loading user {} failed: {}", caller_id, e);
            return;
        }
    };
    if balance < cost {
        warn!(
            "User {} balance {} is below cost {}; logging without deduction",
            caller_id, balance, cost
        );
        return;
    }

    let payer = (owner_user_id != Some(caller_id)).then_some(caller_id);
    let payee = owner_user_id.filter(|owner| *owner != caller_id);
    if payer.is_none() && payee.is_none() {
        debug!("User {} owns the channel, no transfer", caller_id);
        return;
    }
    if let Err(e) = store.transfer_balance(payer, payee, cost).await {
        error!(
            "Balance transfer of {} from {:?} to {:?} failed: {}",
            cost, payer, payee, e
        );
    }
}

/// Meters a request, settles its cost and appends a log row.
///
/// Never fails: every error is logged here. Returns the inserted row, or
/// `None` if the row itself could not be written.
pub async fn log_request_and_calculate_cost(
    store: &dyn GatewayStore,
    record: UsageRecord<'_>,
) -> Option<RequestLog> {
    let now = Utc::now().timestamp_millis();
    let model = &record.selected.model;
    let usage = record.usage();
    let cost = calculate_cost(&usage, model);

    let owner = resolve_owner_channel(store, &record).await;
    let owner_user_id = owner.as_ref().map(|c| c.user_id);

    if cost > 0 {
        settle(store, record.api_key.user_id, owner_user_id, cost).await;
    }

    let log = RequestLog {
        id: ID_GENERATOR.generate_id(),
        api_key_id: record.api_key.id,
        user_id: record.api_key.user_id,
        model_name: model.name.clone(),
        provider_name: record.selected.provider.name.clone(),
        endpoint: record.endpoint.to_string(),
        status_code: record.status_code as i32,
        is_stream: record.is_stream,
        latency_ms: (now - record.started_at).max(0),
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
        cost,
        owner_channel_id: owner.as_ref().map(|c| c.id),
        owner_channel_user_id: owner_user_id,
        created_at: now,
    };
    if let Err(e) = store.insert_log(log.clone()).await {
        error!("Failed to insert request log for key {}: {}", record.api_key.id, e);
        return None;
    }
    info!(
        "Logged {} via {} status {} tokens {}/{} cost {}",
        log.model_name, log.provider_name, log.status_code, log.prompt_tokens, log.completion_tokens, log.cost
    );

    if record.api_key.log_details {
        store_detail(store, &log, record.request_body, record.response_body).await;
    }

    Some(log)
}

async fn store_detail(store: &dyn GatewayStore, log: &RequestLog, request_body: &[u8], response_body: &[u8]) {
    let compressed = gzip_compress(request_body).and_then(|req| Ok((req, gzip_compress(response_body)?)));
    let (request_body, response_body) = match compressed {
        Ok(pair) => pair,
        Err(e) => {
            warn!("Failed to compress bodies for log {}: {}", log.id, e);
            return;
        }
    };
    let detail = RequestLogDetail {
        id: ID_GENERATOR.generate_id(),
        log_id: log.id,
        request_body,
        response_body,
        created_at: log.created_at,
    };
    if let Err(e) = store.insert_log_detail(detail).await {
        warn!("Failed to store detail for log {}: {}", log.id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::channel::ChannelAllowedModel;
    use crate::database::model::Model;
    use crate::database::model_route::ModelRoute;
    use crate::database::provider::Provider;
    use crate::database::user::User;
    use crate::service::store::{MemorySnapshot, MemoryStore};
    use crate::utils::gzip_decompress;

    const USAGE_BODY: &[u8] = br#"{"usage":{"prompt_tokens":100,"completion_tokens":50,"total_tokens":150}}"#;

    fn selected(input: i64, output: i64) -> SelectedRoute {
        SelectedRoute {
            route: ModelRoute { id: 1, model_id: 5, provider_id: 3, weight: 1, ..Default::default() },
            provider: Provider { id: 3, name: "upstream".to_string(), is_enabled: true, ..Default::default() },
            model: Model {
                id: 5,
                name: "gpt-4:latest".to_string(),
                input_token_price: input,
                output_token_price: output,
                ..Default::default()
            },
        }
    }

    fn key(user_id: i64, log_details: bool) -> ApiKey {
        ApiKey { id: 9, user_id, is_enabled: true, log_details, ..Default::default() }
    }

    fn record<'a>(
        api_key: &'a ApiKey,
        scope: &'a KeyScope,
        selected: &'a SelectedRoute,
        status_code: u16,
        response_body: &'a [u8],
    ) -> UsageRecord<'a> {
        UsageRecord {
            api_key,
            scope,
            selected,
            endpoint: "chat/completions",
            status_code,
            is_stream: false,
            started_at: Utc::now().timestamp_millis(),
            request_body: b"{\"model\":\"gpt-4\"}",
            response_body,
        }
    }

    fn store_with(users: Vec<User>, channels: Vec<Channel>) -> MemoryStore {
        let allowed = channels
            .iter()
            .enumerate()
            .map(|(i, c)| ChannelAllowedModel { id: i as i64 + 1, channel_id: c.id, model_id: 5 })
            .collect();
        MemoryStore::new(MemorySnapshot {
            users,
            channels,
            channel_allowed_models: allowed,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn debits_caller_with_rounded_cost() {
        let store = store_with(vec![User { id: 1, balance: 1000, ..Default::default() }], vec![]);
        let (api_key, scope, selected) = (key(1, false), KeyScope::AllChannels, selected(10, 5));

        let log = log_request_and_calculate_cost(&store, record(&api_key, &scope, &selected, 200, USAGE_BODY))
            .await
            .unwrap();
        assert_eq!(log.cost, 1);
        assert_eq!(log.total_tokens, 150);
        assert_eq!(log.owner_channel_id, None);

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.users[0].balance, 999);
        assert_eq!(snapshot.logs.len(), 1);
    }

    #[tokio::test]
    async fn identical_calls_append_two_rows() {
        let store = store_with(vec![User { id: 1, balance: 1000, ..Default::default() }], vec![]);
        let (api_key, scope, selected) = (key(1, false), KeyScope::AllChannels, selected(10, 5));

        let first = log_request_and_calculate_cost(&store, record(&api_key, &scope, &selected, 200, USAGE_BODY)).await;
        let second = log_request_and_calculate_cost(&store, record(&api_key, &scope, &selected, 200, USAGE_BODY)).await;
        assert_ne!(first.unwrap().id, second.unwrap().id);
        assert_eq!(store.snapshot().await.logs.len(), 2);
    }

    #[tokio::test]
    async fn shared_channel_owner_receives_cost() {
        let store = store_with(
            vec![
                User { id: 1, balance: 100, ..Default::default() },
                User { id: 2, balance: 0, ..Default::default() },
            ],
            vec![Channel { id: 40, is_shared: true, is_enabled: true, user_id: 2, ..Default::default() }],
        );
        let (api_key, scope, selected) = (key(1, false), KeyScope::Channels(vec![40]), selected(50, 0));

        let log = log_request_and_calculate_cost(&store, record(&api_key, &scope, &selected, 200, USAGE_BODY))
            .await
            .unwrap();
        assert_eq!(log.cost, 5);
        assert_eq!(log.owner_channel_id, Some(40));
        assert_eq!(log.owner_channel_user_id, Some(2));

        let users = store.snapshot().await.users;
        assert_eq!(users[0].balance, 95);
        assert_eq!(users[1].balance, 5);
    }

    #[tokio::test]
    async fn owner_using_own_channel_pays_nothing() {
        let store = store_with(
            vec![User { id: 2, balance: 100, ..Default::default() }],
            vec![Channel { id: 40, is_shared: true, is_enabled: true, user_id: 2, ..Default::default() }],
        );
        let (api_key, scope, selected) = (key(2, false), KeyScope::AllChannels, selected(50, 0));

        let log = log_request_and_calculate_cost(&store, record(&api_key, &scope, &selected, 200, USAGE_BODY))
            .await
            .unwrap();
        assert_eq!(log.cost, 5);
        assert_eq!(store.snapshot().await.users[0].balance, 100);
    }

    #[tokio::test]
    async fn unreachable_shared_channel_is_not_owner() {
        let store = store_with(
            vec![User { id: 1, balance: 100, ..Default::default() }],
            vec![Channel { id: 40, is_shared: true, is_enabled: true, user_id: 2, ..Default::default() }],
        );
        let (api_key, scope, selected) = (key(1, false), KeyScope::Channels(vec![41]), selected(50, 0));

        let log = log_request_and_calculate_cost(&store, record(&api_key, &scope, &selected, 200, USAGE_BODY))
            .await
            .unwrap();
        assert_eq!(log.owner_channel_id, None);
        assert_eq!(store.snapshot().await.users[0].balance, 95);
    }

    #[tokio::test]
    async fn shortfall_still_logs_full_cost() {
        let store = store_with(vec![User { id: 1, balance: 3, ..Default::default() }], vec![]);
        let (api_key, scope, selected) = (key(1, false), KeyScope::AllChannels, selected(50, 0));

        let log = log_request_and_calculate_cost(&store, record(&api_key, &scope, &selected, 200, USAGE_BODY))
            .await
            .unwrap();
        assert_eq!(log.cost, 5);
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.users[0].balance, 3);
        assert_eq!(snapshot.logs.len(), 1);
    }

    #[tokio::test]
    async fn error_responses_are_logged_free() {
        let store = store_with(vec![User { id: 1, balance: 100, ..Default::default() }], vec![]);
        let (api_key, scope, selected) = (key(1, false), KeyScope::AllChannels, selected(50, 50));

        let log = log_request_and_calculate_cost(&store, record(&api_key, &scope, &selected, 429, USAGE_BODY))
            .await
            .unwrap();
        assert_eq!((log.cost, log.total_tokens, log.status_code), (0, 0, 429));
        assert_eq!(store.snapshot().await.users[0].balance, 100);
    }

    #[tokio::test]
    async fn details_are_gzipped_when_enabled() {
        let store = store_with(vec![User { id: 1, balance: 100, ..Default::default() }], vec![]);
        let (api_key, scope, selected) = (key(1, true), KeyScope::AllChannels, selected(0, 0));

        let log = log_request_and_calculate_cost(&store, record(&api_key, &scope, &selected, 200, USAGE_BODY))
            .await
            .unwrap();
        let detail = store.get_log_detail(log.id).await.unwrap().unwrap();
        assert_eq!(gzip_decompress(&detail.response_body).unwrap(), USAGE_BODY);
        assert_eq!(gzip_decompress(&detail.request_body).unwrap(), b"{\"model\":\"gpt-4\"}");
    }
}
