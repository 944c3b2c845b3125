use super::{DbConnection, DbResult};
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Insertable)]
    #[diesel(table_name = model_route)]
    pub struct ModelRoute {
        pub id: i64,
        pub model_id: i64,
        pub provider_id: i64,
        pub weight: i32,
        pub is_disabled: bool,
        pub disabled_until: Option<i64>,
        pub created_at: i64,
        pub updated_at: i64,
    }
}

impl ModelRoute {
    /// A route is eligible when it is not disabled and any cooldown has elapsed.
    pub fn is_eligible_at(&self, now: i64) -> bool {
        !self.is_disabled && self.disabled_until.map_or(true, |until| until <= now)
    }

    /// Routes of `model_ids` that are not administratively disabled. Cooldown is left to the caller.
    pub fn list_enabled_for_models(conn: &mut DbConnection, model_ids: &[i64]) -> DbResult<Vec<ModelRoute>> {
        if model_ids.is_empty() {
            return Ok(Vec::new());
        }
        db_execute!(conn, {
            let rows = model_route::table
                .filter(model_route::dsl::model_id.eq_any(model_ids))
                .filter(model_route::dsl::is_disabled.eq(false))
                .order(model_route::dsl::id.asc())
                .select(ModelRouteDb::as_select())
                .load::<ModelRouteDb>(conn)?;
            Ok(rows.into_iter().map(|r| r.from_db()).collect())
        })
    }

    pub fn list_by_provider(conn: &mut DbConnection, provider_id_value: i64) -> DbResult<Vec<ModelRoute>> {
        db_execute!(conn, {
            let rows = model_route::table
                .filter(model_route::dsl::provider_id.eq(provider_id_value))
                .select(ModelRouteDb::as_select())
                .load::<ModelRouteDb>(conn)?;
            Ok(rows.into_iter().map(|r| r.from_db()).collect())
        })
    }

    pub fn set_disabled_until(
        conn: &mut DbConnection,
        id_value: i64,
        until: i64,
        now: i64,
    ) -> DbResult<()> {
        db_execute!(conn, {
            diesel::update(model_route::table.find(id_value))
                .set((
                    model_route::dsl::disabled_until.eq(Some(until)),
                    model_route::dsl::updated_at.eq(now),
                ))
                .execute(conn)?;
            Ok(())
        })
    }

    pub fn insert(conn: &mut DbConnection, value: &ModelRoute) -> DbResult<()> {
        db_execute!(conn, {
            diesel::insert_into(model_route::table)
                .values(ModelRouteDb::to_db(value))
                .execute(conn)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_expires_without_intervention() {
        let route = ModelRoute {
            weight: 1,
            disabled_until: Some(1_000),
            ..Default::default()
        };
        assert!(!route.is_eligible_at(999));
        assert!(route.is_eligible_at(1_000));
        assert!(route.is_eligible_at(5_000));
    }

    #[test]
    fn disabled_route_never_eligible() {
        let route = ModelRoute {
            weight: 3,
            is_disabled: true,
            ..Default::default()
        };
        assert!(!route.is_eligible_at(0));
        assert!(!route.is_eligible_at(i64::MAX));
    }
}
