use super::{DbConnection, DbResult};
use crate::schema::enum_def::UserRole;
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Insertable)]
    #[diesel(table_name = users)]
    pub struct User {
        pub id: i64,
        pub email: String,
        pub password_hash: String,
        pub role: String,
        pub is_disabled: bool,
        pub valid_until: Option<i64>,
        pub balance: i64,
        pub totp_secret: Option<String>,
        pub totp_enabled: bool,
        pub created_at: i64,
        pub updated_at: i64,
    }
}

impl User {
    pub fn user_role(&self) -> UserRole {
        self.role.parse().unwrap_or_default()
    }

    pub fn is_admin(&self) -> bool {
        self.user_role() == UserRole::Admin
    }

    /// Disabled users and users past their `valid_until` may not spend.
    pub fn is_active_at(&self, now: i64) -> bool {
        !self.is_disabled && self.valid_until.map_or(true, |until| until > now)
    }

    pub fn get_by_id(conn: &mut DbConnection, id_value: i64) -> DbResult<Option<User>> {
        db_execute!(conn, {
            let row = users::table
                .find(id_value)
                .select(UserDb::as_select())
                .first::<UserDb>(conn)
                .optional()?;
            Ok(row.map(|r| r.from_db()))
        })
    }

    pub fn insert(conn: &mut DbConnection, user: &User) -> DbResult<()> {
        db_execute!(conn, {
            diesel::insert_into(users::table)
                .values(UserDb::to_db(user))
                .execute(conn)?;
            Ok(())
        })
    }

    /// Moves `amount` from `payer` to `payee` inside one transaction. Either side may be absent.
    pub fn transfer_balance(
        conn: &mut DbConnection,
        payer: Option<i64>,
        payee: Option<i64>,
        amount: i64,
        now: i64,
    ) -> DbResult<()> {
        db_execute!(conn, {
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                if let Some(payer_id) = payer {
                    diesel::update(users::table.find(payer_id))
                        .set((
                            users::dsl::balance.eq(users::dsl::balance - amount),
                            users::dsl::updated_at.eq(now),
                        ))
                        .execute(conn)?;
                }
                if let Some(payee_id) = payee {
                    diesel::update(users::table.find(payee_id))
                        .set((
                            users::dsl::balance.eq(users::dsl::balance + amount),
                            users::dsl::updated_at.eq(now),
                        ))
                        .execute(conn)?;
                }
                Ok(())
            })?;
            Ok(())
        })
    }
}
