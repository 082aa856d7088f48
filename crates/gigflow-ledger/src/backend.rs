//! Runtime-selected ledger backend.

use async_trait::async_trait;
use gigflow_core::{DisputeId, Money, TaskId, UserId};

use crate::aggregate::{ChangeSet, TaskAggregate};
use crate::error::StoreError;
use crate::memory::MemoryLedger;
use crate::postgres::PgLedger;
use crate::records::{DisputeRecord, FollowUpRecord, SubmissionRecord, TaskRecord};
use crate::store::LedgerStore;

/// Either backend, chosen at startup from configuration.
#[derive(Debug, Clone)]
pub enum Ledger {
    Memory(MemoryLedger),
    Postgres(PgLedger),
}

impl Ledger {
    /// Connect to PostgreSQL when a URL is given, otherwise run in memory.
    pub async fn from_url(database_url: Option<&str>) -> Result<Self, StoreError> {
        match database_url {
            Some(url) => Ok(Self::Postgres(PgLedger::connect(url).await?)),
            None => {
                tracing::warn!(
                    "DATABASE_URL not set, running with an in-memory ledger. \
                     State will not survive restarts."
                );
                Ok(Self::Memory(MemoryLedger::new()))
            }
        }
    }

    /// Short backend name for logs and readiness probes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Postgres(_) => "postgres",
        }
    }

    /// Check that the backend can serve queries.
    pub async fn ping(&self) -> Result<(), StoreError> {
        match self {
            Self::Memory(_) => Ok(()),
            Self::Postgres(pg) => {
                sqlx::query("SELECT 1").execute(pg.pool()).await?;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl LedgerStore for Ledger {
    async fn insert_task(&self, task: TaskRecord) -> Result<(), StoreError> {
        match self {
            Self::Memory(m) => m.insert_task(task).await,
            Self::Postgres(p) => p.insert_task(task).await,
        }
    }

    async fn transact<R, E, F>(&self, task_id: TaskId, decide: F) -> Result<R, E>
    where
        F: FnOnce(&TaskAggregate) -> Result<(ChangeSet, R), E> + Send,
        R: Send,
        E: From<StoreError> + Send,
    {
        match self {
            Self::Memory(m) => m.transact(task_id, decide).await,
            Self::Postgres(p) => p.transact(task_id, decide).await,
        }
    }

    async fn aggregate(&self, task_id: TaskId) -> Result<Option<TaskAggregate>, StoreError> {
        match self {
            Self::Memory(m) => m.aggregate(task_id).await,
            Self::Postgres(p) => p.aggregate(task_id).await,
        }
    }

    async fn task_for_dispute(&self, dispute_id: DisputeId) -> Result<Option<TaskId>, StoreError> {
        match self {
            Self::Memory(m) => m.task_for_dispute(dispute_id).await,
            Self::Postgres(p) => p.task_for_dispute(dispute_id).await,
        }
    }

    async fn task_for_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Option<TaskId>, StoreError> {
        match self {
            Self::Memory(m) => m.task_for_correlation(correlation_id).await,
            Self::Postgres(p) => p.task_for_correlation(correlation_id).await,
        }
    }

    async fn dispute(&self, dispute_id: DisputeId) -> Result<Option<DisputeRecord>, StoreError> {
        match self {
            Self::Memory(m) => m.dispute(dispute_id).await,
            Self::Postgres(p) => p.dispute(dispute_id).await,
        }
    }

    async fn follow_ups(&self, dispute_id: DisputeId) -> Result<Vec<FollowUpRecord>, StoreError> {
        match self {
            Self::Memory(m) => m.follow_ups(dispute_id).await,
            Self::Postgres(p) => p.follow_ups(dispute_id).await,
        }
    }

    async fn submissions(&self, task_id: TaskId) -> Result<Vec<SubmissionRecord>, StoreError> {
        match self {
            Self::Memory(m) => m.submissions(task_id).await,
            Self::Postgres(p) => p.submissions(task_id).await,
        }
    }

    async fn balance(&self, user_id: UserId) -> Result<Money, StoreError> {
        match self {
            Self::Memory(m) => m.balance(user_id).await,
            Self::Postgres(p) => p.balance(user_id).await,
        }
    }
}
