use cyder_tools::log::info;
use rand::{distr::Alphanumeric, rng, Rng};

use crate::service::store::{GatewayStore, StoreError};

pub const SESSION_SECRET_SETTING: &str = "jwt_secret";

fn generate_random_string(len: usize) -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Resolves the session signing secret.
///
/// An explicitly configured secret wins. Otherwise the value persisted in the
/// store is reused, and on first start a fresh one is generated and persisted.
pub async fn resolve_session_secret(
    store: &dyn GatewayStore,
    configured: Option<&str>,
) -> Result<String, StoreError> {
    if let Some(secret) = configured.map(str::trim).filter(|s| !s.is_empty()) {
        return Ok(secret.to_string());
    }

    if let Some(secret) = store.get_setting(SESSION_SECRET_SETTING).await? {
        return Ok(secret);
    }

    let generated = generate_random_string(48);
    if store.insert_setting_if_absent(SESSION_SECRET_SETTING, &generated).await? {
        info!("Generated and persisted a new session secret");
        return Ok(generated);
    }

    // Another instance persisted one first.
    store
        .get_setting(SESSION_SECRET_SETTING)
        .await?
        .ok_or_else(|| StoreError::Database("session secret vanished after insert conflict".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::store::{MemorySnapshot, MemoryStore};

    #[tokio::test]
    async fn configured_secret_wins() {
        let store = MemoryStore::new(MemorySnapshot::default());
        let secret = resolve_session_secret(&store, Some("from-env")).await.unwrap();
        assert_eq!(secret, "from-env");
        assert_eq!(store.get_setting(SESSION_SECRET_SETTING).await.unwrap(), None);
    }

    #[tokio::test]
    async fn generated_secret_is_persisted_and_reused() {
        let store = MemoryStore::new(MemorySnapshot::default());
        let first = resolve_session_secret(&store, None).await.unwrap();
        assert_eq!(first.len(), 48);
        let second = resolve_session_secret(&store, Some("  ")).await.unwrap();
        assert_eq!(first, second);
    }
}
