use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cyder_tools::log::{debug, error, info, warn};
use rand::Rng;

use crate::controller::GatewayError;
use crate::database::model::Model;
use crate::database::model_route::ModelRoute;
use crate::database::provider::Provider;
use crate::service::store::GatewayStore;

/// The route chosen for one request, with everything the forwarder and biller need.
#[derive(Debug, Clone)]
pub struct SelectedRoute {
    pub route: ModelRoute,
    pub provider: Provider,
    pub model: Model,
}

/// Drops routes still cooling down at `now`.
pub fn eligible_routes(routes: Vec<(ModelRoute, Provider)>, now: i64) -> Vec<(ModelRoute, Provider)> {
    routes
        .into_iter()
        .filter(|(route, _)| route.is_eligible_at(now))
        .collect()
}

/// Weighted random choice. Returns the index into `weights`, `None` only when empty.
pub fn pick_weighted<R: Rng + ?Sized>(weights: &[i32], rng: &mut R) -> Option<usize> {
    if weights.is_empty() {
        return None;
    }
    let total: f64 = weights.iter().map(|w| (*w).max(0) as f64).sum();
    if total <= 0.0 {
        return Some(0);
    }
    let mut remainder = rng.random_range(0.0..total);
    for (index, weight) in weights.iter().enumerate() {
        remainder -= (*weight).max(0) as f64;
        if remainder <= 0.0 {
            return Some(index);
        }
    }
    Some(0)
}

fn choose(candidates: Vec<(ModelRoute, Provider)>) -> Option<(ModelRoute, Provider)> {
    let weights: Vec<i32> = candidates.iter().map(|(r, _)| r.weight).collect();
    let index = pick_weighted(&weights, &mut rand::rng())?;
    candidates.into_iter().nth(index)
}

/// Picks one eligible route for `model`.
pub async fn select_route(store: &Arc<dyn GatewayStore>, model: Model) -> Result<SelectedRoute, GatewayError> {
    let routes = store.list_active_routes(&[model.id]).await.map_err(|e| {
        error!("Listing routes for model {} failed: {}", model.name, e);
        GatewayError::from(e)
    })?;
    let candidates = eligible_routes(routes, Utc::now().timestamp_millis());
    debug!("Model {} has {} eligible routes", model.name, candidates.len());

    let (route, provider) = choose(candidates).ok_or_else(|| {
        warn!("No eligible route for model {}", model.name);
        GatewayError::NoEligibleRoute(model.name.clone())
    })?;
    Ok(SelectedRoute { route, provider, model })
}

/// Picks one eligible route across every model whose name matches `pattern`.
pub async fn select_route_by_pattern(
    store: &Arc<dyn GatewayStore>,
    pattern: &str,
) -> Result<SelectedRoute, GatewayError> {
    let mut models = store.find_models_like(pattern).await.map_err(|e| {
        error!("Model pattern lookup '{}' failed: {}", pattern, e);
        GatewayError::from(e)
    })?;
    if models.is_empty() {
        return Err(GatewayError::NotFound(format!("no model matches '{}'", pattern)));
    }

    let model_ids: Vec<i64> = models.iter().map(|m| m.id).collect();
    let routes = store.list_active_routes(&model_ids).await.map_err(|e| {
        error!("Listing routes for pattern '{}' failed: {}", pattern, e);
        GatewayError::from(e)
    })?;
    let candidates = eligible_routes(routes, Utc::now().timestamp_millis());

    let (route, provider) = choose(candidates).ok_or_else(|| {
        warn!("No eligible route for pattern {}", pattern);
        GatewayError::NoEligibleRoute(pattern.to_string())
    })?;
    let position = models
        .iter()
        .position(|m| m.id == route.model_id)
        .ok_or_else(|| GatewayError::Internal(format!("route {} points at an unlisted model", route.id)))?;
    let model = models.swap_remove(position);
    Ok(SelectedRoute { route, provider, model })
}

/// Puts `route` into cooldown unless that could take its model offline.
///
/// Skipped when the catalogue holds at most one model or when the route is
/// the model's last eligible one. Failures are logged and swallowed.
pub async fn cool_down_route(store: &Arc<dyn GatewayStore>, route: &ModelRoute, cooldown: Duration) -> bool {
    let now = Utc::now().timestamp_millis();

    match store.count_models().await {
        Ok(count) if count <= 1 => {
            info!("Route {} kept: only {} model configured", route.id, count);
            return false;
        }
        Ok(_) => {}
        Err(e) => {
            warn!("Cooldown check for route {} failed: {}", route.id, e);
            return false;
        }
    }

    let eligible = match store.list_active_routes(&[route.model_id]).await {
        Ok(routes) => eligible_routes(routes, now).len(),
        Err(e) => {
            warn!("Cooldown check for route {} failed: {}", route.id, e);
            return false;
        }
    };
    if eligible <= 1 {
        info!("Route {} kept: last eligible route of model {}", route.id, route.model_id);
        return false;
    }

    let until = now + cooldown.as_millis() as i64;
    match store.set_route_cooldown(route.id, until, now).await {
        Ok(()) => {
            info!("Route {} cooling down until {}", route.id, until);
            true
        }
        Err(e) => {
            warn!("Failed to persist cooldown for route {}: {}", route.id, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::store::{MemorySnapshot, MemoryStore};
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn heavier_route_wins_most_draws() {
        let mut rng = StdRng::seed_from_u64(7);
        let heavy = (0..100)
            .filter(|_| pick_weighted(&[9, 1], &mut rng) == Some(0))
            .count();
        assert!(heavy > 50, "heavy route picked {} times", heavy);
    }

    #[test]
    fn empty_and_single_route() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pick_weighted(&[], &mut rng), None);
        assert_eq!(pick_weighted(&[5], &mut rng), Some(0));
    }

    fn provider(id: i64) -> Provider {
        Provider { id, name: format!("p{}", id), is_enabled: true, ..Default::default() }
    }

    fn route(id: i64, model_id: i64, provider_id: i64) -> ModelRoute {
        ModelRoute { id, model_id, provider_id, weight: 1, ..Default::default() }
    }

    #[test]
    fn cooling_route_excluded_until_expiry() {
        let mut cooling = route(1, 1, 1);
        cooling.disabled_until = Some(2_000);
        let routes = vec![(cooling, provider(1)), (route(2, 1, 1), provider(1))];

        let ids = |now| -> Vec<i64> { eligible_routes(routes.clone(), now).iter().map(|(r, _)| r.id).collect() };
        assert_eq!(ids(1_000), vec![2]);
        assert_eq!(ids(2_000), vec![1, 2]);
    }

    fn catalogue(models: usize, routes: Vec<ModelRoute>) -> Arc<dyn GatewayStore> {
        Arc::new(MemoryStore::new(MemorySnapshot {
            models: (1..=models as i64)
                .map(|id| Model { id, name: format!("m{}", id), ..Default::default() })
                .collect(),
            providers: vec![provider(1), provider(2)],
            routes,
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn no_cooldown_with_single_model() {
        let store = catalogue(1, vec![route(1, 1, 1), route(2, 1, 2)]);
        assert!(!cool_down_route(&store, &route(1, 1, 1), Duration::from_secs(600)).await);
    }

    #[tokio::test]
    async fn no_cooldown_for_last_eligible_route() {
        let store = catalogue(2, vec![route(1, 1, 1)]);
        assert!(!cool_down_route(&store, &route(1, 1, 1), Duration::from_secs(600)).await);
    }

    #[tokio::test]
    async fn cooldown_removes_route_from_selection() {
        let store = catalogue(2, vec![route(1, 1, 1), route(2, 1, 2)]);
        assert!(cool_down_route(&store, &route(1, 1, 1), Duration::from_secs(600)).await);

        let model = Model { id: 1, name: "m1".to_string(), ..Default::default() };
        for _ in 0..20 {
            let selected = select_route(&store, model.clone()).await.unwrap();
            assert_eq!(selected.route.id, 2);
        }
    }

    #[tokio::test]
    async fn pattern_selection_spans_models() {
        let store = catalogue(2, vec![route(1, 2, 1)]);
        let selected = select_route_by_pattern(&store, "m%").await.unwrap();
        assert_eq!(selected.model.id, 2);
        assert!(matches!(
            select_route_by_pattern(&store, "%dall-e%").await,
            Err(GatewayError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn no_route_is_reported() {
        let store = catalogue(2, vec![]);
        let model = Model { id: 1, name: "m1".to_string(), ..Default::default() };
        assert!(matches!(
            select_route(&store, model).await,
            Err(GatewayError::NoEligibleRoute(_))
        ));
    }
}
