use std::fs::File;
use std::path::Path;

use diesel::{
    r2d2::{ConnectionManager, Pool, PooledConnection},
    Connection, PgConnection, SqliteConnection,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use serde::Serialize;

use crate::service::store::StoreError;

pub mod api_key;
pub mod channel;
pub mod model;
pub mod model_route;
pub mod provider;
pub mod request_log;
pub mod setting;
pub mod user;

pub enum DbType {
    Postgres,
    Sqlite,
}

#[derive(Clone)]
pub enum DbPool {
    Postgres(Pool<ConnectionManager<PgConnection>>),
    Sqlite(Pool<ConnectionManager<SqliteConnection>>),
}

pub enum DbConnection {
    Postgres(PooledConnection<ConnectionManager<PgConnection>>),
    Sqlite(PooledConnection<ConnectionManager<SqliteConnection>>),
}

fn parse_db_type(db_url: &str) -> DbType {
    if db_url.starts_with("postgres") {
        DbType::Postgres
    } else {
        DbType::Sqlite
    }
}

impl DbPool {
    /// Opens the pool for `db_url` and brings the schema up to date.
    pub fn establish(db_url: &str) -> Result<Self, StoreError> {
        match parse_db_type(db_url) {
            DbType::Postgres => Ok(DbPool::Postgres(init_pg_pool(db_url)?)),
            DbType::Sqlite => Ok(DbPool::Sqlite(init_sqlite_pool(db_url)?)),
        }
    }

    pub fn get(&self) -> Result<DbConnection, StoreError> {
        match self {
            DbPool::Postgres(pool) => Ok(DbConnection::Postgres(pool.get()?)),
            DbPool::Sqlite(pool) => Ok(DbConnection::Sqlite(pool.get()?)),
        }
    }
}

#[path = "../schema/sqlite.rs"]
pub mod _sqlite_schema;

#[path = "../schema/postgres.rs"]
pub mod _postgres_schema;

#[macro_export]
macro_rules! db_object {
    (
        $(
            $( #[$attr:meta] )*
            pub struct $name:ident {
                $( $( #[$field_attr:meta] )* $vis:vis $field:ident : $typ:ty ),+
                $(,)?
            }
        )+
    ) => {
        $(
            #[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
            #[serde(default)]
            pub struct $name { $( $vis $field : $typ, )+ }
        )+

        pub mod _postgres_model {
            $( $crate::db_object! { @expand postgres |  $( #[$attr] )* | $name |  $( $( #[$field_attr] )* $field : $typ ),+ } )+
        }
        pub mod _sqlite_model {
            $( $crate::db_object! { @expand sqlite |  $( #[$attr] )* | $name |  $( $( #[$field_attr] )* $field : $typ ),+ } )+
        }
    };
    ( @expand $db_type:ident | $( #[$attr:meta] )* | $name:ident | $( $( #[$field_attr:meta] )* $vis:vis $field:ident : $typ:ty),+) => {
        paste::paste! {
            #[allow(unused_imports)] use super::*;
            #[allow(unused_imports)] use $crate::database::[<_ $db_type _schema>]::*;
            #[allow(unused_imports)] use diesel::prelude::*;

            $( #[$attr] )*
            pub struct [<$name Db>] { $(
                $( #[$field_attr] )* pub $field : $typ,
            )+ }

            impl [<$name Db>] {
                #[inline(always)]
                #[allow(dead_code)]
                pub fn from_db(self) -> super::$name {
                    super::$name { $( $field: self.$field, )+ }
                }

                #[inline(always)]
                #[allow(dead_code)]
                pub fn to_db(x: &super::$name) -> Self {
                    Self {
                        $( $field: x.$field.clone(), )+
                    }
                }
            }
        }
    }
}

#[macro_export]
macro_rules! db_execute {
    ($conn:ident, $block:block) => {
        match $conn {
            $crate::database::DbConnection::Postgres($conn) => {
                #[allow(unused_imports)]
                use $crate::database::_postgres_schema::*;
                #[allow(unused_imports)]
                use _postgres_model::*;
                #[allow(unused_imports)]
                use diesel::prelude::*;

                $block
            }
            $crate::database::DbConnection::Sqlite($conn) => {
                #[allow(unused_imports)]
                use $crate::database::_sqlite_schema::*;
                #[allow(unused_imports)]
                use _sqlite_model::*;
                #[allow(unused_imports)]
                use diesel::prelude::*;

                $block
            }
        }
    };
}

const SQLITE_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/sqlite");
const POSTGRES_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/postgres");

fn init_sqlite_pool(db_url: &str) -> Result<Pool<ConnectionManager<SqliteConnection>>, StoreError> {
    let db_path = Path::new(db_url);
    if !db_path.exists() {
        if let Some(parent_dir) = db_path.parent() {
            if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
                std::fs::create_dir_all(parent_dir)
                    .map_err(|e| StoreError::Database(format!("failed to create database directory: {}", e)))?;
            }
        }
        File::create(db_path)
            .map_err(|e| StoreError::Database(format!("failed to create database file: {}", e)))?;
    }

    let mut connection = SqliteConnection::establish(db_url)
        .map_err(|e| StoreError::Database(format!("failed to establish migration connection: {}", e)))?;
    connection
        .run_pending_migrations(SQLITE_MIGRATIONS)
        .map_err(|e| StoreError::Database(format!("failed to run migrations: {}", e)))?;

    let manager = ConnectionManager::<SqliteConnection>::new(db_url);
    Ok(Pool::builder()
        .test_on_check_out(true)
        .max_size(5)
        .build(manager)?)
}

fn init_pg_pool(db_url: &str) -> Result<Pool<ConnectionManager<PgConnection>>, StoreError> {
    let mut connection = PgConnection::establish(db_url)
        .map_err(|e| StoreError::Database(format!("failed to establish migration connection: {}", e)))?;
    connection
        .run_pending_migrations(POSTGRES_MIGRATIONS)
        .map_err(|e| StoreError::Database(format!("failed to run migrations: {}", e)))?;

    let manager = ConnectionManager::<PgConnection>::new(db_url);
    Ok(Pool::builder().max_size(10).build(manager)?)
}

pub type DbResult<T> = Result<T, StoreError>;

#[derive(Debug, Serialize)]
pub struct ListResult<T> {
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub list: Vec<T>,
}
