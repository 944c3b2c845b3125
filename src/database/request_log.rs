use super::{DbConnection, DbResult, ListResult};
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Insertable)]
    #[diesel(table_name = request_log)]
    pub struct RequestLog {
        pub id: i64,
        pub api_key_id: i64,
        pub user_id: i64,
        pub model_name: String,
        pub provider_name: String,
        pub endpoint: String,
        pub status_code: i32,
        pub is_stream: bool,
        pub latency_ms: i64,
        pub prompt_tokens: i64,
        pub completion_tokens: i64,
        pub total_tokens: i64,
        pub cost: i64,
        pub owner_channel_id: Option<i64>,
        pub owner_channel_user_id: Option<i64>,
        pub created_at: i64,
    }

    #[derive(Queryable, Selectable, Insertable)]
    #[diesel(table_name = request_log_detail)]
    pub struct RequestLogDetail {
        pub id: i64,
        pub log_id: i64,
        pub request_body: Vec<u8>,
        pub response_body: Vec<u8>,
        pub created_at: i64,
    }
}

/// Clamps paging input and returns `(page, page_size, offset)`.
pub fn page_window(page: i64, page_size: i64) -> (i64, i64, i64) {
    let page = page.max(1);
    let page_size = page_size.clamp(1, 200);
    (page, page_size, (page - 1).saturating_mul(page_size))
}

impl RequestLog {
    pub fn insert(conn: &mut DbConnection, value: &RequestLog) -> DbResult<()> {
        db_execute!(conn, {
            diesel::insert_into(request_log::table)
                .values(RequestLogDb::to_db(value))
                .execute(conn)?;
            Ok(())
        })
    }

    pub fn get_by_id(conn: &mut DbConnection, id_value: i64) -> DbResult<Option<RequestLog>> {
        db_execute!(conn, {
            let row = request_log::table
                .find(id_value)
                .select(RequestLogDb::as_select())
                .first::<RequestLogDb>(conn)
                .optional()?;
            Ok(row.map(|r| r.from_db()))
        })
    }

    /// Newest first. `user_id_filter = None` lists every user's rows.
    pub fn list(
        conn: &mut DbConnection,
        user_id_filter: Option<i64>,
        page: i64,
        page_size: i64,
    ) -> DbResult<ListResult<RequestLog>> {
        let (page, page_size, offset) = page_window(page, page_size);

        db_execute!(conn, {
            let mut count_query = request_log::table.into_boxed();
            let mut list_query = request_log::table.into_boxed();
            if let Some(uid) = user_id_filter {
                count_query = count_query.filter(request_log::dsl::user_id.eq(uid));
                list_query = list_query.filter(request_log::dsl::user_id.eq(uid));
            }
            let total = count_query.count().get_result::<i64>(conn)?;
            let rows = list_query
                .order(request_log::dsl::created_at.desc())
                .then_order_by(request_log::dsl::id.desc())
                .limit(page_size)
                .offset(offset)
                .select(RequestLogDb::as_select())
                .load::<RequestLogDb>(conn)?;
            Ok(ListResult {
                total,
                page,
                page_size,
                list: rows.into_iter().map(|r| r.from_db()).collect(),
            })
        })
    }
}

impl RequestLogDetail {
    pub fn insert(conn: &mut DbConnection, value: &RequestLogDetail) -> DbResult<()> {
        db_execute!(conn, {
            diesel::insert_into(request_log_detail::table)
                .values(RequestLogDetailDb::to_db(value))
                .execute(conn)?;
            Ok(())
        })
    }

    pub fn get_by_log_id(conn: &mut DbConnection, log_id_value: i64) -> DbResult<Option<RequestLogDetail>> {
        db_execute!(conn, {
            let row = request_log_detail::table
                .filter(request_log_detail::dsl::log_id.eq(log_id_value))
                .select(RequestLogDetailDb::as_select())
                .first::<RequestLogDetailDb>(conn)
                .optional()?;
            Ok(row.map(|r| r.from_db()))
        })
    }

    pub fn delete_before(conn: &mut DbConnection, cutoff: i64) -> DbResult<usize> {
        db_execute!(conn, {
            Ok(diesel::delete(
                request_log_detail::table.filter(request_log_detail::dsl::created_at.lt(cutoff)),
            )
            .execute(conn)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_window_clamps_input() {
        assert_eq!(page_window(0, 0), (1, 1, 0));
        assert_eq!(page_window(3, 20), (3, 20, 40));
        assert_eq!(page_window(2, 10_000), (2, 200, 200));
        assert_eq!(page_window(i64::MAX, 200), (i64::MAX, 200, i64::MAX));
    }
}
