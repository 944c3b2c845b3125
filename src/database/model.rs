use super::{DbConnection, DbResult};
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Insertable)]
    #[diesel(table_name = model)]
    pub struct Model {
        pub id: i64,
        pub name: String,
        pub alias: Option<String>,
        pub description: Option<String>,
        pub input_token_price: i64,
        pub output_token_price: i64,
        pub user_id: i64,
        pub created_at: i64,
        pub updated_at: i64,
    }
}

impl Model {
    pub fn is_free(&self) -> bool {
        self.input_token_price == 0 && self.output_token_price == 0
    }

    pub fn matches_name(&self, candidate: &str) -> bool {
        self.name == candidate || self.alias.as_deref() == Some(candidate)
    }

    /// Models whose name or alias equals one of `names`.
    pub fn find_by_names(conn: &mut DbConnection, names: &[String]) -> DbResult<Vec<Model>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        db_execute!(conn, {
            let mut rows = model::table
                .filter(model::dsl::name.eq_any(names))
                .select(ModelDb::as_select())
                .load::<ModelDb>(conn)?;
            let by_alias = model::table
                .filter(model::dsl::alias.eq_any(names))
                .select(ModelDb::as_select())
                .load::<ModelDb>(conn)?;
            for row in by_alias {
                if !rows.iter().any(|r| r.id == row.id) {
                    rows.push(row);
                }
            }
            Ok(rows.into_iter().map(|r| r.from_db()).collect())
        })
    }

    /// Models whose name matches a SQL LIKE pattern, ignoring ASCII case on both backends.
    pub fn find_like(conn: &mut DbConnection, pattern: &str) -> DbResult<Vec<Model>> {
        match conn {
            DbConnection::Postgres(conn) => {
                use super::_postgres_schema::*;
                use _postgres_model::*;
                use diesel::prelude::*;

                let rows = model::table
                    .filter(model::dsl::name.ilike(pattern))
                    .order(model::dsl::id.asc())
                    .select(ModelDb::as_select())
                    .load::<ModelDb>(conn)?;
                Ok(rows.into_iter().map(|r| r.from_db()).collect())
            }
            DbConnection::Sqlite(conn) => {
                use super::_sqlite_schema::*;
                use _sqlite_model::*;
                use diesel::prelude::*;

                // SQLite's LIKE already folds ASCII case.
                let rows = model::table
                    .filter(model::dsl::name.like(pattern))
                    .order(model::dsl::id.asc())
                    .select(ModelDb::as_select())
                    .load::<ModelDb>(conn)?;
                Ok(rows.into_iter().map(|r| r.from_db()).collect())
            }
        }
    }

    pub fn list_all(conn: &mut DbConnection) -> DbResult<Vec<Model>> {
        db_execute!(conn, {
            let rows = model::table
                .order(model::dsl::name.asc())
                .select(ModelDb::as_select())
                .load::<ModelDb>(conn)?;
            Ok(rows.into_iter().map(|r| r.from_db()).collect())
        })
    }

    pub fn count(conn: &mut DbConnection) -> DbResult<i64> {
        db_execute!(conn, {
            Ok(model::table.count().get_result::<i64>(conn)?)
        })
    }

    pub fn insert(conn: &mut DbConnection, value: &Model) -> DbResult<()> {
        db_execute!(conn, {
            diesel::insert_into(model::table)
                .values(ModelDb::to_db(value))
                .execute(conn)?;
            Ok(())
        })
    }
}
