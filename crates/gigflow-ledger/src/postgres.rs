//! # PostgreSQL Ledger
//!
//! SQLx-backed [`LedgerStore`]. Each `transact` call runs in one database
//! transaction that starts by locking the task row with `FOR UPDATE`, so
//! concurrent callers on the same task queue up and each re-reads the rows
//! its predecessor committed. Schema constraints back the same invariants:
//! `payments.task_id` is `UNIQUE`, and partial unique indexes allow one
//! accepted bid and one open dispute per task.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gigflow_core::{DisputeId, Money, TaskId, UserId};
use gigflow_state::BidStatus;
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::types::Json;
use uuid::Uuid;

use crate::aggregate::{ChangeSet, TaskAggregate};
use crate::error::StoreError;
use crate::records::{
    BidRecord, DisputeRecord, FollowUpRecord, PaymentRecord, SubmissionRecord, TaskRecord,
};
use crate::store::LedgerStore;

const TASK_COLUMNS: &str = "id, poster_id, doer_id, title, budget, deadline, status, \
                            accepted_bid_id, created_at, updated_at";
const PAYMENT_COLUMNS: &str = "id, task_id, bid_id, sender_id, receiver_id, amount, status, \
                               correlation_id, verification_payload, captured_at, created_at, updated_at";
const DISPUTE_COLUMNS: &str = "id, task_id, initiator_id, reason, status, pre_dispute_status, \
                               response, response_evidence, responded_by, resolution, resolved_by, \
                               created_at, closed_at";

/// Ledger backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    /// Wrap an existing pool. Migrations are assumed to be applied.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `url` and apply the embedded migrations.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(url)
            .await?;
        tracing::info!("Connected to PostgreSQL");

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Ledger migrations applied");

        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn insert_task(&self, task: TaskRecord) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO tasks ({TASK_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(task.id.0)
        .bind(task.poster_id.0)
        .bind(task.doer_id.map(|u| u.0))
        .bind(&task.title)
        .bind(task.budget.amount())
        .bind(task.deadline)
        .bind(task.status.as_str())
        .bind(task.accepted_bid_id.map(|b| b.0))
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn transact<R, E, F>(&self, task_id: TaskId, decide: F) -> Result<R, E>
    where
        F: FnOnce(&TaskAggregate) -> Result<(ChangeSet, R), E> + Send,
        R: Send,
        E: From<StoreError> + Send,
    {
        let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;
        let aggregate = load_aggregate(&mut tx, task_id, true)
            .await?
            .ok_or(StoreError::TaskNotFound(task_id))?;

        // Dropping `tx` on the error path rolls back.
        let (changes, value) = decide(&aggregate)?;
        if !changes.is_empty() {
            write_changes(&mut tx, &changes).await?;
        }
        tx.commit().await.map_err(StoreError::from_sqlx)?;
        Ok(value)
    }

    async fn aggregate(&self, task_id: TaskId) -> Result<Option<TaskAggregate>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        load_aggregate(&mut conn, task_id, false).await
    }

    async fn task_for_dispute(&self, dispute_id: DisputeId) -> Result<Option<TaskId>, StoreError> {
        let row: Option<(Uuid,)> = sqlx::query_as("SELECT task_id FROM disputes WHERE id = $1")
            .bind(dispute_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id,)| TaskId::from_uuid(id)))
    }

    async fn task_for_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Option<TaskId>, StoreError> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT task_id FROM payments WHERE correlation_id = $1")
                .bind(correlation_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id,)| TaskId::from_uuid(id)))
    }

    async fn dispute(&self, dispute_id: DisputeId) -> Result<Option<DisputeRecord>, StoreError> {
        sqlx::query_as::<_, DisputeRow>(&format!(
            "SELECT {DISPUTE_COLUMNS} FROM disputes WHERE id = $1"
        ))
        .bind(dispute_id.0)
        .fetch_optional(&self.pool)
        .await?
        .map(DisputeRow::into_record)
        .transpose()
    }

    async fn follow_ups(&self, dispute_id: DisputeId) -> Result<Vec<FollowUpRecord>, StoreError> {
        let rows = sqlx::query_as::<_, FollowUpRow>(
            "SELECT id, dispute_id, sender_id, message, evidence, created_at
             FROM dispute_follow_ups WHERE dispute_id = $1 ORDER BY created_at, seq",
        )
        .bind(dispute_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(FollowUpRow::into_record).collect())
    }

    async fn submissions(&self, task_id: TaskId) -> Result<Vec<SubmissionRecord>, StoreError> {
        let rows = sqlx::query_as::<_, SubmissionRow>(
            "SELECT id, task_id, doer_id, payload, created_at
             FROM submissions WHERE task_id = $1 ORDER BY created_at",
        )
        .bind(task_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SubmissionRow::into_record).collect())
    }

    async fn balance(&self, user_id: UserId) -> Result<Money, StoreError> {
        let row: Option<(Decimal,)> =
            sqlx::query_as("SELECT account_balance FROM user_balances WHERE user_id = $1")
                .bind(user_id.0)
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some((value,)) => money(value, "user_balances.account_balance"),
            None => Ok(Money::zero()),
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction helpers
// ---------------------------------------------------------------------------

async fn load_aggregate(
    conn: &mut PgConnection,
    task_id: TaskId,
    for_update: bool,
) -> Result<Option<TaskAggregate>, StoreError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let task = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1{lock}"
    ))
    .bind(task_id.0)
    .fetch_optional(&mut *conn)
    .await?;
    let Some(task) = task else {
        return Ok(None);
    };

    let bids = sqlx::query_as::<_, BidRow>(
        "SELECT id, task_id, user_id, amount, status, created_at, updated_at
         FROM bids WHERE task_id = $1 ORDER BY created_at, id",
    )
    .bind(task_id.0)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(BidRow::into_record)
    .collect::<Result<Vec<_>, _>>()?;

    let payment = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE task_id = $1"
    ))
    .bind(task_id.0)
    .fetch_optional(&mut *conn)
    .await?
    .map(PaymentRow::into_record)
    .transpose()?;

    let dispute = sqlx::query_as::<_, DisputeRow>(&format!(
        "SELECT {DISPUTE_COLUMNS} FROM disputes WHERE task_id = $1
         ORDER BY created_at DESC LIMIT 1"
    ))
    .bind(task_id.0)
    .fetch_optional(&mut *conn)
    .await?
    .map(DisputeRow::into_record)
    .transpose()?;

    Ok(Some(TaskAggregate {
        task: task.into_record()?,
        bids,
        payment,
        dispute,
    }))
}

async fn write_changes(conn: &mut PgConnection, changes: &ChangeSet) -> Result<(), StoreError> {
    if let Some(task) = &changes.task {
        sqlx::query(
            "UPDATE tasks SET doer_id = $2, title = $3, budget = $4, deadline = $5, status = $6,
                accepted_bid_id = $7, updated_at = $8
             WHERE id = $1",
        )
        .bind(task.id.0)
        .bind(task.doer_id.map(|u| u.0))
        .bind(&task.title)
        .bind(task.budget.amount())
        .bind(task.deadline)
        .bind(task.status.as_str())
        .bind(task.accepted_bid_id.map(|b| b.0))
        .bind(task.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(StoreError::from_sqlx)?;
    }

    // Demote before promoting so the one-accepted-bid index never sees two.
    let mut bids: Vec<&BidRecord> = changes.bids.iter().collect();
    bids.sort_by_key(|b| b.status == BidStatus::Accepted);
    for bid in bids {
        sqlx::query(
            "INSERT INTO bids (id, task_id, user_id, amount, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (id) DO UPDATE SET
                amount = EXCLUDED.amount,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(bid.id.0)
        .bind(bid.task_id.0)
        .bind(bid.user_id.0)
        .bind(bid.amount.amount())
        .bind(bid.status.as_str())
        .bind(bid.created_at)
        .bind(bid.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(StoreError::from_sqlx)?;
    }

    if let Some(p) = &changes.payment {
        sqlx::query(&format!(
            "INSERT INTO payments ({PAYMENT_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             ON CONFLICT (id) DO UPDATE SET
                bid_id = EXCLUDED.bid_id,
                receiver_id = EXCLUDED.receiver_id,
                amount = EXCLUDED.amount,
                status = EXCLUDED.status,
                correlation_id = EXCLUDED.correlation_id,
                verification_payload = EXCLUDED.verification_payload,
                captured_at = EXCLUDED.captured_at,
                updated_at = EXCLUDED.updated_at"
        ))
        .bind(p.id.0)
        .bind(p.task_id.0)
        .bind(p.bid_id.0)
        .bind(p.sender_id.0)
        .bind(p.receiver_id.0)
        .bind(p.amount.amount())
        .bind(p.status.as_str())
        .bind(&p.correlation_id)
        .bind(&p.verification_payload)
        .bind(p.captured_at)
        .bind(p.created_at)
        .bind(p.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(StoreError::from_sqlx)?;
    }

    if let Some(d) = &changes.dispute {
        sqlx::query(&format!(
            "INSERT INTO disputes ({DISPUTE_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                response = EXCLUDED.response,
                response_evidence = EXCLUDED.response_evidence,
                responded_by = EXCLUDED.responded_by,
                resolution = EXCLUDED.resolution,
                resolved_by = EXCLUDED.resolved_by,
                closed_at = EXCLUDED.closed_at"
        ))
        .bind(d.id.0)
        .bind(d.task_id.0)
        .bind(d.initiator_id.0)
        .bind(&d.reason)
        .bind(d.status.as_str())
        .bind(d.pre_dispute_status.as_str())
        .bind(&d.response)
        .bind(Json(&d.response_evidence))
        .bind(d.responded_by.map(|u| u.0))
        .bind(&d.resolution)
        .bind(d.resolved_by.map(|u| u.0))
        .bind(d.created_at)
        .bind(d.closed_at)
        .execute(&mut *conn)
        .await
        .map_err(StoreError::from_sqlx)?;
    }

    if let Some(f) = &changes.follow_up {
        sqlx::query(
            "INSERT INTO dispute_follow_ups (id, dispute_id, sender_id, message, evidence, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(f.id.0)
        .bind(f.dispute_id.0)
        .bind(f.sender_id.0)
        .bind(&f.message)
        .bind(Json(&f.evidence))
        .bind(f.created_at)
        .execute(&mut *conn)
        .await
        .map_err(StoreError::from_sqlx)?;
    }

    if let Some(s) = &changes.submission {
        sqlx::query(
            "INSERT INTO submissions (id, task_id, doer_id, payload, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(s.id.0)
        .bind(s.task_id.0)
        .bind(s.doer_id.0)
        .bind(&s.payload)
        .bind(s.created_at)
        .execute(&mut *conn)
        .await
        .map_err(StoreError::from_sqlx)?;
    }

    if let Some(credit) = &changes.credit {
        sqlx::query(
            "INSERT INTO user_balances (user_id, account_balance, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (user_id) DO UPDATE SET
                account_balance = user_balances.account_balance + EXCLUDED.account_balance,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(credit.user_id.0)
        .bind(credit.amount.amount())
        .execute(&mut *conn)
        .await
        .map_err(StoreError::from_sqlx)?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    poster_id: Uuid,
    doer_id: Option<Uuid>,
    title: String,
    budget: Decimal,
    deadline: DateTime<Utc>,
    status: String,
    accepted_bid_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TaskRow {
    fn into_record(self) -> Result<TaskRecord, StoreError> {
        Ok(TaskRecord {
            id: self.id.into(),
            poster_id: self.poster_id.into(),
            doer_id: self.doer_id.map(Into::into),
            title: self.title,
            budget: money(self.budget, "tasks.budget")?,
            deadline: self.deadline,
            status: parse(&self.status, "tasks.status")?,
            accepted_bid_id: self.accepted_bid_id.map(Into::into),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BidRow {
    id: Uuid,
    task_id: Uuid,
    user_id: Uuid,
    amount: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BidRow {
    fn into_record(self) -> Result<BidRecord, StoreError> {
        Ok(BidRecord {
            id: self.id.into(),
            task_id: self.task_id.into(),
            user_id: self.user_id.into(),
            amount: money(self.amount, "bids.amount")?,
            status: parse(&self.status, "bids.status")?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    task_id: Uuid,
    bid_id: Uuid,
    sender_id: Uuid,
    receiver_id: Uuid,
    amount: Decimal,
    status: String,
    correlation_id: String,
    verification_payload: Option<serde_json::Value>,
    captured_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_record(self) -> Result<PaymentRecord, StoreError> {
        Ok(PaymentRecord {
            id: self.id.into(),
            task_id: self.task_id.into(),
            bid_id: self.bid_id.into(),
            sender_id: self.sender_id.into(),
            receiver_id: self.receiver_id.into(),
            amount: money(self.amount, "payments.amount")?,
            status: parse(&self.status, "payments.status")?,
            correlation_id: self.correlation_id,
            verification_payload: self.verification_payload,
            captured_at: self.captured_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DisputeRow {
    id: Uuid,
    task_id: Uuid,
    initiator_id: Uuid,
    reason: String,
    status: String,
    pre_dispute_status: String,
    response: Option<String>,
    response_evidence: Json<Vec<String>>,
    responded_by: Option<Uuid>,
    resolution: Option<String>,
    resolved_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl DisputeRow {
    fn into_record(self) -> Result<DisputeRecord, StoreError> {
        Ok(DisputeRecord {
            id: self.id.into(),
            task_id: self.task_id.into(),
            initiator_id: self.initiator_id.into(),
            reason: self.reason,
            status: parse(&self.status, "disputes.status")?,
            pre_dispute_status: parse(&self.pre_dispute_status, "disputes.pre_dispute_status")?,
            response: self.response,
            response_evidence: self.response_evidence.0,
            responded_by: self.responded_by.map(Into::into),
            resolution: self.resolution,
            resolved_by: self.resolved_by.map(Into::into),
            created_at: self.created_at,
            closed_at: self.closed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FollowUpRow {
    id: Uuid,
    dispute_id: Uuid,
    sender_id: Uuid,
    message: String,
    evidence: Json<Vec<String>>,
    created_at: DateTime<Utc>,
}

impl FollowUpRow {
    fn into_record(self) -> FollowUpRecord {
        FollowUpRecord {
            id: self.id.into(),
            dispute_id: self.dispute_id.into(),
            sender_id: self.sender_id.into(),
            message: self.message,
            evidence: self.evidence.0,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SubmissionRow {
    id: Uuid,
    task_id: Uuid,
    doer_id: Uuid,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl SubmissionRow {
    fn into_record(self) -> SubmissionRecord {
        SubmissionRecord {
            id: self.id.into(),
            task_id: self.task_id.into(),
            doer_id: self.doer_id.into(),
            payload: self.payload,
            created_at: self.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn money(value: Decimal, column: &str) -> Result<Money, StoreError> {
    Money::new(value).map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

fn parse<T>(value: &str, column: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}
