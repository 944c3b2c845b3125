use super::{DbConnection, DbResult};
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Insertable)]
    #[diesel(table_name = channel)]
    pub struct Channel {
        pub id: i64,
        pub name: String,
        pub is_shared: bool,
        pub is_enabled: bool,
        pub user_id: i64,
        pub created_at: i64,
        pub updated_at: i64,
    }

    #[derive(Queryable, Selectable, Insertable)]
    #[diesel(table_name = channel_allowed_model)]
    pub struct ChannelAllowedModel {
        pub id: i64,
        pub channel_id: i64,
        pub model_id: i64,
    }
}

impl Channel {
    /// Enabled channels that declare `model_id_value` servable, lowest id first.
    pub fn list_allowing_model(conn: &mut DbConnection, model_id_value: i64) -> DbResult<Vec<Channel>> {
        db_execute!(conn, {
            let channel_ids = channel_allowed_model::table
                .filter(channel_allowed_model::dsl::model_id.eq(model_id_value))
                .select(channel_allowed_model::dsl::channel_id)
                .load::<i64>(conn)?;
            if channel_ids.is_empty() {
                return Ok(Vec::new());
            }
            let rows = channel::table
                .filter(channel::dsl::id.eq_any(&channel_ids))
                .filter(channel::dsl::is_enabled.eq(true))
                .order(channel::dsl::id.asc())
                .select(ChannelDb::as_select())
                .load::<ChannelDb>(conn)?;
            Ok(rows.into_iter().map(|r| r.from_db()).collect())
        })
    }

    pub fn insert(conn: &mut DbConnection, value: &Channel) -> DbResult<()> {
        db_execute!(conn, {
            diesel::insert_into(channel::table)
                .values(ChannelDb::to_db(value))
                .execute(conn)?;
            Ok(())
        })
    }
}

impl ChannelAllowedModel {
    /// Model ids servable through the enabled channels among `channel_ids`.
    pub fn model_ids_for_channels(conn: &mut DbConnection, channel_ids: &[i64]) -> DbResult<Vec<i64>> {
        if channel_ids.is_empty() {
            return Ok(Vec::new());
        }
        db_execute!(conn, {
            let enabled = channel::table
                .filter(channel::dsl::id.eq_any(channel_ids))
                .filter(channel::dsl::is_enabled.eq(true))
                .select(channel::dsl::id)
                .load::<i64>(conn)?;
            if enabled.is_empty() {
                return Ok(Vec::new());
            }
            let mut ids = channel_allowed_model::table
                .filter(channel_allowed_model::dsl::channel_id.eq_any(&enabled))
                .select(channel_allowed_model::dsl::model_id)
                .load::<i64>(conn)?;
            ids.sort_unstable();
            ids.dedup();
            Ok(ids)
        })
    }

    pub fn insert(conn: &mut DbConnection, value: &ChannelAllowedModel) -> DbResult<()> {
        db_execute!(conn, {
            diesel::insert_into(channel_allowed_model::table)
                .values(ChannelAllowedModelDb::to_db(value))
                .execute(conn)?;
            Ok(())
        })
    }
}
