use std::sync::Arc;

use cyder_tools::log::{debug, error};

use crate::controller::GatewayError;
use crate::database::model::Model;
use crate::service::store::GatewayStore;

const VERSION_DELIMITER: char = ':';

/// Chooses among candidate rows for a requested model name.
///
/// A versioned name (`gpt-4:0613`) must match a name or alias exactly.
/// A bare name also accepts `<name>:latest`, and versioned rows win over
/// unversioned ones, ties broken by descending name.
pub fn pick_model(requested: &str, candidates: Vec<Model>) -> Option<Model> {
    if requested.contains(VERSION_DELIMITER) {
        return candidates.into_iter().find(|m| m.matches_name(requested));
    }

    let latest = format!("{}{}latest", requested, VERSION_DELIMITER);
    let mut matching: Vec<Model> = candidates
        .into_iter()
        .filter(|m| m.matches_name(requested) || m.matches_name(&latest))
        .collect();
    matching.sort_by(|a, b| {
        let a_versioned = a.name.contains(VERSION_DELIMITER);
        let b_versioned = b.name.contains(VERSION_DELIMITER);
        b_versioned.cmp(&a_versioned).then_with(|| b.name.cmp(&a.name))
    });
    matching.into_iter().next()
}

fn lookup_names(requested: &str) -> Vec<String> {
    if requested.contains(VERSION_DELIMITER) {
        vec![requested.to_string()]
    } else {
        vec![
            requested.to_string(),
            format!("{}{}latest", requested, VERSION_DELIMITER),
        ]
    }
}

/// Maps a client-supplied model name or alias to its canonical row.
pub async fn resolve_model(store: &Arc<dyn GatewayStore>, requested: &str) -> Result<Model, GatewayError> {
    let not_found = || GatewayError::NotFound(format!("model '{}' not found", requested));

    let candidates = match store.find_models_by_names(&lookup_names(requested)).await {
        Ok(rows) => rows,
        Err(e) => {
            // Reported to the caller as not-found; the cause stays in the log.
            error!("Model lookup for '{}' failed: {}", requested, e);
            return Err(not_found());
        }
    };

    let model = pick_model(requested, candidates).ok_or_else(not_found)?;
    debug!("Resolved model '{}' to '{}' ({})", requested, model.name, model.id);
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::store::{MemorySnapshot, MemoryStore};

    fn model(id: i64, name: &str, alias: Option<&str>) -> Model {
        Model {
            id,
            name: name.to_string(),
            alias: alias.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn bare_name_prefers_latest_tag() {
        let picked = pick_model(
            "gpt-4",
            vec![model(1, "gpt-4", None), model(2, "gpt-4:latest", None)],
        )
        .unwrap();
        assert_eq!(picked.name, "gpt-4:latest");
    }

    #[test]
    fn bare_name_falls_back_to_unversioned_row() {
        let picked = pick_model("gpt-4", vec![model(1, "gpt-4", None)]).unwrap();
        assert_eq!(picked.id, 1);
    }

    #[test]
    fn versioned_name_needs_exact_match() {
        let rows = vec![model(1, "gpt-4", None), model(2, "gpt-4:latest", None)];
        assert!(pick_model("gpt-4:0613", rows.clone()).is_none());
        assert_eq!(pick_model("gpt-4:latest", rows).unwrap().id, 2);
    }

    #[test]
    fn alias_matches_like_a_name() {
        let picked = pick_model("fast", vec![model(3, "llama3:8b", Some("fast:latest"))]).unwrap();
        assert_eq!(picked.id, 3);
    }

    #[tokio::test]
    async fn resolves_through_store() {
        let store: Arc<dyn GatewayStore> = Arc::new(MemoryStore::new(MemorySnapshot {
            models: vec![model(1, "gpt-4", None), model(2, "gpt-4:latest", None)],
            ..Default::default()
        }));
        assert_eq!(resolve_model(&store, "gpt-4").await.unwrap().id, 2);
        assert!(matches!(
            resolve_model(&store, "claude").await,
            Err(GatewayError::NotFound(_))
        ));
    }
}
