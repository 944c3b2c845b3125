use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use cyder_tools::log::info;

use crate::config::{FinalConfig, TimeoutConfig};
use crate::proxy::core::build_http_client;
use crate::service::secret::resolve_session_secret;
use crate::service::store::{DbStore, GatewayStore, MemorySnapshot, MemoryStore};
use crate::utils::auth::SessionKeys;

/// Runtime knobs the pipeline reads on every request.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub timeouts: TimeoutConfig,
    pub cooldown_status_codes: Vec<u16>,
    pub cooldown: Duration,
    pub log_detail_retention_days: u32,
    pub image_model_pattern: String,
    pub audio_model_pattern: String,
    pub responses_model_pattern: String,
}

impl GatewaySettings {
    pub fn from_config(config: &FinalConfig) -> Self {
        Self {
            timeouts: config.timeouts.clone(),
            cooldown_status_codes: config.cooldown.status_codes.clone(),
            cooldown: Duration::from_secs(config.cooldown.seconds),
            log_detail_retention_days: config.log_detail_retention_days,
            image_model_pattern: config.image_model_pattern.clone(),
            audio_model_pattern: config.audio_model_pattern.clone(),
            responses_model_pattern: config.responses_model_pattern.clone(),
        }
    }

    pub fn triggers_cooldown(&self, status: u16) -> bool {
        self.cooldown_status_codes.contains(&status)
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self::from_config(&FinalConfig::default())
    }
}

pub struct AppState {
    pub store: Arc<dyn GatewayStore>,
    pub http: reqwest::Client,
    pub settings: GatewaySettings,
    pub session_keys: SessionKeys,
}

impl AppState {
    pub fn new(
        store: Arc<dyn GatewayStore>,
        http: reqwest::Client,
        settings: GatewaySettings,
        session_secret: &str,
    ) -> Self {
        Self {
            store,
            http,
            settings,
            session_keys: SessionKeys::new(session_secret.as_bytes()),
        }
    }
}

fn create_store(config: &FinalConfig) -> Arc<dyn GatewayStore> {
    if config.uses_memory_store() {
        let store = match &config.memory_seed {
            Some(seed) => MemoryStore::from_yaml_file(Path::new(seed))
                .unwrap_or_else(|e| panic!("Failed to load memory seed: {}", e)),
            None => MemoryStore::new(MemorySnapshot::default()),
        };
        info!("Using in-memory store");
        Arc::new(store)
    } else {
        let store = DbStore::connect(&config.db_url)
            .unwrap_or_else(|e| panic!("Failed to initialize database: {}", e));
        info!("Database ready at {}", config.db_url);
        Arc::new(store)
    }
}

/// Builds the process-wide state. Start-up failures abort with a message.
pub async fn create_app_state(config: &FinalConfig) -> Arc<AppState> {
    let store = create_store(config);
    let http = build_http_client(&config.timeouts, &config.outbound_proxy)
        .unwrap_or_else(|e| panic!("Failed to build HTTP client: {}", e));
    let secret = resolve_session_secret(store.as_ref(), config.jwt_secret.as_deref())
        .await
        .unwrap_or_else(|e| panic!("Failed to resolve session secret: {}", e));

    Arc::new(AppState::new(
        store,
        http,
        GatewaySettings::from_config(config),
        &secret,
    ))
}

pub type StateRouter = Router<Arc<AppState>>;

pub fn create_state_router() -> StateRouter {
    Router::<Arc<AppState>>::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_follow_config() {
        let mut config = FinalConfig::default();
        config.log_detail_retention_days = 7;
        config.cooldown.status_codes = vec![429, 503];
        config.cooldown.seconds = 30;

        let settings = GatewaySettings::from_config(&config);
        assert_eq!(settings.log_detail_retention_days, 7);
        assert_eq!(settings.cooldown, Duration::from_secs(30));
        assert!(settings.triggers_cooldown(503));
        assert!(!settings.triggers_cooldown(500));
    }
}
