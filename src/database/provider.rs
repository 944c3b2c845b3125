use super::{DbConnection, DbResult};
use crate::schema::enum_def::ProviderType;
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Insertable)]
    #[diesel(table_name = provider)]
    pub struct Provider {
        pub id: i64,
        pub name: String,
        pub base_url: String,
        pub api_key: String,
        pub provider_type: String,
        pub auto_load_models: bool,
        pub is_enabled: bool,
        pub user_id: i64,
        pub created_at: i64,
        pub updated_at: i64,
    }
}

impl Provider {
    pub fn kind(&self) -> ProviderType {
        self.provider_type.parse().unwrap_or_default()
    }

    /// Joins `base_url` and an endpoint suffix without doubling the slash.
    pub fn endpoint_url(&self, suffix: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            suffix.trim_start_matches('/')
        )
    }

    /// Enabled providers among `ids`.
    pub fn list_enabled_by_ids(conn: &mut DbConnection, ids: &[i64]) -> DbResult<Vec<Provider>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        db_execute!(conn, {
            let rows = provider::table
                .filter(provider::dsl::id.eq_any(ids))
                .filter(provider::dsl::is_enabled.eq(true))
                .select(ProviderDb::as_select())
                .load::<ProviderDb>(conn)?;
            Ok(rows.into_iter().map(|r| r.from_db()).collect())
        })
    }

    pub fn list_auto_load(conn: &mut DbConnection) -> DbResult<Vec<Provider>> {
        db_execute!(conn, {
            let rows = provider::table
                .filter(provider::dsl::auto_load_models.eq(true))
                .filter(provider::dsl::is_enabled.eq(true))
                .order(provider::dsl::id.asc())
                .select(ProviderDb::as_select())
                .load::<ProviderDb>(conn)?;
            Ok(rows.into_iter().map(|r| r.from_db()).collect())
        })
    }

    pub fn insert(conn: &mut DbConnection, value: &Provider) -> DbResult<()> {
        db_execute!(conn, {
            diesel::insert_into(provider::table)
                .values(ProviderDb::to_db(value))
                .execute(conn)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_joins_single_slash() {
        let p = Provider {
            base_url: "https://api.example.com/v1/".to_string(),
            ..Default::default()
        };
        assert_eq!(p.endpoint_url("/chat/completions"), "https://api.example.com/v1/chat/completions");
        assert_eq!(p.endpoint_url("models"), "https://api.example.com/v1/models");
    }

    #[test]
    fn unknown_provider_type_falls_back_to_openai() {
        let p = Provider {
            provider_type: "GEMINI".to_string(),
            ..Default::default()
        };
        assert_eq!(p.kind(), ProviderType::Gemini);
        let p = Provider {
            provider_type: "bogus".to_string(),
            ..Default::default()
        };
        assert_eq!(p.kind(), ProviderType::Openai);
    }
}
