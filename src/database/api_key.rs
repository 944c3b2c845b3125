use super::{DbConnection, DbResult};
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Insertable)]
    #[diesel(table_name = gateway_api_key)]
    pub struct ApiKey {
        pub id: i64,
        pub api_key: String,
        pub name: String,
        pub is_enabled: bool,
        pub user_id: i64,
        pub bind_to_all_channels: bool,
        pub log_details: bool,
        pub last_used_at: Option<i64>,
        pub created_at: i64,
        pub updated_at: i64,
    }

    #[derive(Queryable, Selectable, Insertable)]
    #[diesel(table_name = gateway_api_key_channel)]
    pub struct ApiKeyChannel {
        pub id: i64,
        pub api_key_id: i64,
        pub channel_id: i64,
    }
}

impl ApiKey {
    pub fn get_by_key(conn: &mut DbConnection, key_value: &str) -> DbResult<Option<ApiKey>> {
        db_execute!(conn, {
            let row = gateway_api_key::table
                .filter(gateway_api_key::dsl::api_key.eq(key_value))
                .select(ApiKeyDb::as_select())
                .first::<ApiKeyDb>(conn)
                .optional()?;
            Ok(row.map(|r| r.from_db()))
        })
    }

    pub fn touch(conn: &mut DbConnection, id_value: i64, now: i64) -> DbResult<()> {
        db_execute!(conn, {
            diesel::update(gateway_api_key::table.find(id_value))
                .set(gateway_api_key::dsl::last_used_at.eq(Some(now)))
                .execute(conn)?;
            Ok(())
        })
    }

    pub fn insert(conn: &mut DbConnection, value: &ApiKey) -> DbResult<()> {
        db_execute!(conn, {
            diesel::insert_into(gateway_api_key::table)
                .values(ApiKeyDb::to_db(value))
                .execute(conn)?;
            Ok(())
        })
    }
}

impl ApiKeyChannel {
    pub fn channel_ids(conn: &mut DbConnection, api_key_id_value: i64) -> DbResult<Vec<i64>> {
        db_execute!(conn, {
            Ok(gateway_api_key_channel::table
                .filter(gateway_api_key_channel::dsl::api_key_id.eq(api_key_id_value))
                .order(gateway_api_key_channel::dsl::channel_id.asc())
                .select(gateway_api_key_channel::dsl::channel_id)
                .load::<i64>(conn)?)
        })
    }

    pub fn insert(conn: &mut DbConnection, value: &ApiKeyChannel) -> DbResult<()> {
        db_execute!(conn, {
            diesel::insert_into(gateway_api_key_channel::table)
                .values(ApiKeyChannelDb::to_db(value))
                .execute(conn)?;
            Ok(())
        })
    }
}
