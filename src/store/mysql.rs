use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, MySqlConnection, MySqlPool};

use super::policy;
use super::{
    ChargeYear, LeaveStore, Page, PendingIncrement, QueuedIncrement, RequestQuery, Resolution,
    StoreError,
};
use crate::auth::context::AuthContext;
use crate::model::leave_balance::{BalanceKey, LeaveBalance};
use crate::model::leave_request::{Decision, LeaveRequest, LeaveStatus, NewLeaveRequest};

const REQUEST_COLUMNS: &str =
    "id, user_id AS requester_id, leave_type, start_date, end_date, reason, status, created_at";

fn db_error(operation: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| {
        tracing::error!(error = %e, operation, "Leave store query failed");
        StoreError::from(e)
    }
}

#[derive(FromRow)]
struct LeaveRequestRow {
    id: u64,
    requester_id: u64,
    leave_type: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    reason: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<LeaveRequestRow> for LeaveRequest {
    type Error = StoreError;

    fn try_from(row: LeaveRequestRow) -> Result<Self, Self::Error> {
        Ok(LeaveRequest {
            id: row.id,
            requester_id: row.requester_id,
            leave_type: row.leave_type.parse().map_err(|_| {
                StoreError::Corrupt(format!("leave {} has leave_type {:?}", row.id, row.leave_type))
            })?,
            start_date: row.start_date,
            end_date: row.end_date,
            reason: row.reason,
            status: row.status.parse().map_err(|_| {
                StoreError::Corrupt(format!("leave {} has status {:?}", row.id, row.status))
            })?,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct LeaveBalanceRow {
    requester_id: u64,
    leave_type: String,
    year: i32,
    total_days: u32,
    used_days: u32,
    is_unlimited: bool,
}

impl TryFrom<LeaveBalanceRow> for LeaveBalance {
    type Error = StoreError;

    fn try_from(row: LeaveBalanceRow) -> Result<Self, Self::Error> {
        Ok(LeaveBalance {
            requester_id: row.requester_id,
            leave_type: row.leave_type.parse().map_err(|_| {
                StoreError::Corrupt(format!("balance has leave_type {:?}", row.leave_type))
            })?,
            year: row.year,
            total_days: row.total_days,
            used_days: row.used_days,
            unlimited: row.is_unlimited,
        })
    }
}

#[derive(FromRow)]
struct OutboxRow {
    id: u64,
    request_id: u64,
    user_id: u64,
    leave_type: String,
    year: i32,
    days: u32,
    attempts: u32,
    last_error: Option<String>,
}

impl TryFrom<OutboxRow> for QueuedIncrement {
    type Error = StoreError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        let leave_type = row.leave_type.parse().map_err(|_| {
            StoreError::Corrupt(format!("outbox {} has leave_type {:?}", row.id, row.leave_type))
        })?;
        Ok(QueuedIncrement {
            id: row.id,
            pending: PendingIncrement {
                request_id: row.request_id,
                key: BalanceKey {
                    requester_id: row.user_id,
                    leave_type,
                    year: row.year,
                },
                days: row.days,
            },
            attempts: row.attempts,
            last_error: row.last_error,
        })
    }
}

// Helper enum for typed SQLx binding
enum FilterValue {
    U64(u64),
    Str(&'static str),
}

/// `LeaveStore` over the MySQL schema in `db/schema.sql`.
#[derive(Clone)]
pub struct MySqlLeaveStore {
    pool: MySqlPool,
}

impl MySqlLeaveStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn fetch_request(&self, id: u64) -> Result<Option<LeaveRequest>, StoreError> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM leave_requests WHERE id = ?");
        let row = sqlx::query_as::<_, LeaveRequestRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("fetch_request"))?;

        row.map(LeaveRequest::try_from).transpose()
    }
}

#[async_trait]
impl LeaveStore for MySqlLeaveStore {
    async fn insert_request(
        &self,
        caller: &AuthContext,
        new: NewLeaveRequest,
    ) -> Result<LeaveRequest, StoreError> {
        policy::may_file_for(caller, new.requester_id)?;

        let result = sqlx::query(
            r#"
            INSERT INTO leave_requests
                (user_id, leave_type, start_date, end_date, reason, status, created_at)
            VALUES (?, ?, ?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(new.requester_id)
        .bind(new.leave_type.as_str())
        .bind(new.start_date)
        .bind(new.end_date)
        .bind(&new.reason)
        .bind(new.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error("insert_request"))?;

        Ok(LeaveRequest {
            id: result.last_insert_id(),
            requester_id: new.requester_id,
            leave_type: new.leave_type,
            start_date: new.start_date,
            end_date: new.end_date,
            reason: new.reason,
            status: LeaveStatus::Pending,
            created_at: new.created_at,
        })
    }

    async fn find_request(
        &self,
        caller: &AuthContext,
        id: u64,
    ) -> Result<Option<LeaveRequest>, StoreError> {
        Ok(self
            .fetch_request(id)
            .await?
            .filter(|request| policy::may_read_owned_by(caller, request.requester_id)))
    }

    async fn select_requests(
        &self,
        caller: &AuthContext,
        query: &RequestQuery,
    ) -> Result<Page<LeaveRequest>, StoreError> {
        let mut where_sql = String::from(" WHERE 1=1");
        let mut args: Vec<FilterValue> = Vec::new();

        if let Some(requester_id) = policy::requester_filter(caller, query.scope())? {
            where_sql.push_str(" AND user_id = ?");
            args.push(FilterValue::U64(requester_id));
        }

        if let Some(status) = query.status {
            where_sql.push_str(" AND status = ?");
            args.push(FilterValue::Str(status.as_str()));
        }

        let count_sql = format!("SELECT COUNT(*) FROM leave_requests{where_sql}");
        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        for arg in &args {
            count_q = match arg {
                FilterValue::U64(v) => count_q.bind(*v),
                FilterValue::Str(s) => count_q.bind(*s),
            };
        }
        let total = count_q
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("count_requests"))?;

        let data_sql = format!(
            r#"
            SELECT {REQUEST_COLUMNS}
            FROM leave_requests
            {where_sql}
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#
        );
        let mut data_q = sqlx::query_as::<_, LeaveRequestRow>(&data_sql);
        for arg in args {
            data_q = match arg {
                FilterValue::U64(v) => data_q.bind(v),
                FilterValue::Str(s) => data_q.bind(s),
            };
        }
        let rows = data_q
            .bind(query.per_page())
            .bind(query.offset())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("select_requests"))?;

        Ok(Page {
            data: rows
                .into_iter()
                .map(LeaveRequest::try_from)
                .collect::<Result<_, _>>()?,
            page: query.page(),
            per_page: query.per_page(),
            total: u64::try_from(total).unwrap_or(0),
        })
    }

    async fn resolve_pending(
        &self,
        caller: &AuthContext,
        id: u64,
        decision: Decision,
        charge_year: &ChargeYear,
    ) -> Result<Resolution, StoreError> {
        policy::may_resolve(caller)?;

        let mut tx = self.pool.begin().await.map_err(db_error("resolve_begin"))?;

        // row lock; every column but status is immutable after insert
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM leave_requests WHERE id = ? FOR UPDATE");
        let request = sqlx::query_as::<_, LeaveRequestRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("resolve_lock"))?
            .map(LeaveRequest::try_from)
            .transpose()?
            .filter(|request| !request.status.is_terminal())
            .ok_or(StoreError::NotFound)?;

        let status = LeaveStatus::from(decision);
        let result = sqlx::query(
            r#"
            UPDATE leave_requests
            SET status = ?
            WHERE id = ?
            AND status = 'pending'
            "#,
        )
        .bind(status.as_str())
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("resolve_pending"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        let request = LeaveRequest { status, ..request };
        let charge = match decision {
            Decision::Rejected => None,
            Decision::Approved => {
                let pending = PendingIncrement {
                    request_id: id,
                    key: BalanceKey {
                        requester_id: request.requester_id,
                        leave_type: request.leave_type,
                        year: charge_year(&request),
                    },
                    days: request.days(),
                };
                let queued_id = enqueue(&mut tx, &pending).await?;
                Some(QueuedIncrement {
                    id: queued_id,
                    pending,
                    attempts: 0,
                    last_error: None,
                })
            }
        };

        tx.commit().await.map_err(db_error("resolve_commit"))?;
        Ok(Resolution { request, charge })
    }

    async fn apply_balance_increment(&self, entry: &QueuedIncrement) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error("apply_begin"))?;

        let claimed = sqlx::query("DELETE FROM balance_increment_outbox WHERE id = ?")
            .bind(entry.id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("apply_claim"))?;
        if claimed.rows_affected() == 0 {
            // applied by an earlier pass
            return Ok(());
        }

        // dropping `tx` on error rolls the claim back
        increment_used_days(&mut tx, &entry.pending.key, entry.pending.days).await?;

        tx.commit().await.map_err(db_error("apply_commit"))?;
        Ok(())
    }

    async fn select_balances(
        &self,
        caller: &AuthContext,
        requester_id: u64,
        year: i32,
    ) -> Result<Vec<LeaveBalance>, StoreError> {
        policy::may_read_balances_of(caller, requester_id)?;

        let rows = sqlx::query_as::<_, LeaveBalanceRow>(
            r#"
            SELECT user_id AS requester_id, leave_type, year, total_days, used_days, is_unlimited
            FROM leave_balances
            WHERE user_id = ? AND year = ?
            ORDER BY leave_type
            "#,
        )
        .bind(requester_id)
        .bind(year)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("select_balances"))?;

        rows.into_iter().map(LeaveBalance::try_from).collect()
    }

    async fn due_balance_retries(
        &self,
        max_attempts: u32,
        limit: u32,
    ) -> Result<Vec<QueuedIncrement>, StoreError> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, request_id, user_id, leave_type, year, days, attempts, last_error
            FROM balance_increment_outbox
            WHERE attempts < ?
            ORDER BY id
            LIMIT ?
            "#,
        )
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("due_balance_retries"))?;

        rows.into_iter().map(QueuedIncrement::try_from).collect()
    }

    async fn fail_balance_retry(&self, id: u64, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE balance_increment_outbox
            SET attempts = attempts + 1, last_error = ?
            WHERE id = ?
            "#,
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_error("fail_balance_retry"))?;
        Ok(())
    }
}

async fn enqueue(conn: &mut MySqlConnection, pending: &PendingIncrement) -> Result<u64, StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO balance_increment_outbox
            (request_id, user_id, leave_type, year, days)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(pending.request_id)
    .bind(pending.key.requester_id)
    .bind(pending.key.leave_type.as_str())
    .bind(pending.key.year)
    .bind(pending.days)
    .execute(&mut *conn)
    .await
    .map_err(db_error("enqueue_balance_increment"))?;

    Ok(result.last_insert_id())
}

/// Bounded increment; unlimited rows have no ceiling.
async fn increment_used_days(
    conn: &mut MySqlConnection,
    key: &BalanceKey,
    days: u32,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE leave_balances
        SET used_days = used_days + ?
        WHERE user_id = ?
        AND leave_type = ?
        AND year = ?
        AND (is_unlimited = TRUE OR used_days + ? <= total_days)
        "#,
    )
    .bind(days)
    .bind(key.requester_id)
    .bind(key.leave_type.as_str())
    .bind(key.year)
    .bind(days)
    .execute(&mut *conn)
    .await
    .map_err(db_error("increment_used_days"))?;

    if result.rows_affected() > 0 {
        return Ok(());
    }

    let exists = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM leave_balances
            WHERE user_id = ? AND leave_type = ? AND year = ?
        )
        "#,
    )
    .bind(key.requester_id)
    .bind(key.leave_type.as_str())
    .bind(key.year)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_error("balance_exists"))?;

    if exists > 0 {
        Err(StoreError::BalanceExceeded)
    } else {
        Err(StoreError::NotFound)
    }
}
