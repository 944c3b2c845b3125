use super::{DbConnection, DbResult};
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Insertable)]
    #[diesel(table_name = setting)]
    pub struct Setting {
        pub key: String,
        pub value: String,
        pub updated_at: i64,
    }
}

impl Setting {
    pub fn get(conn: &mut DbConnection, key_value: &str) -> DbResult<Option<String>> {
        db_execute!(conn, {
            Ok(setting::table
                .find(key_value)
                .select(setting::dsl::value)
                .first::<String>(conn)
                .optional()?)
        })
    }

    /// Inserts `key` once. Returns false if the key already existed.
    pub fn insert_if_absent(conn: &mut DbConnection, value: &Setting) -> DbResult<bool> {
        db_execute!(conn, {
            let inserted = diesel::insert_into(setting::table)
                .values(SettingDb::to_db(value))
                .on_conflict_do_nothing()
                .execute(conn)?;
            Ok(inserted > 0)
        })
    }
}
