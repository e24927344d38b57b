//! Persistence seam for leave requests and balances.
//!
//! Every implementation applies [`policy`] itself, so the row rules hold no
//! matter which caller reaches the store.

#[cfg(test)]
pub mod memory;
pub mod mysql;
pub mod policy;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::context::AuthContext;
use crate::model::leave_balance::{BalanceKey, LeaveBalance};
use crate::model::leave_request::{Decision, LeaveRequest, LeaveStatus, NewLeaveRequest};

pub const DEFAULT_PER_PAGE: u32 = 10;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("operation not permitted for this identity")]
    Forbidden,
    #[error("balance allotment exceeded")]
    BalanceExceeded,
    #[error("stored record is malformed: {0}")]
    Corrupt(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Corrupt(value.to_string())
            }
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestScope {
    /// Requests filed by the caller.
    #[default]
    Mine,
    /// Every request; reviewers only.
    All,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct RequestQuery {
    /// `mine` (default) or `all`
    pub scope: Option<RequestScope>,
    /// Filter by leave status
    pub status: Option<LeaveStatus>,
    #[schema(example = 1)]
    /// Pagination page number (start with 1)
    pub page: Option<u32>,
    #[schema(example = 10)]
    /// Items per page, at most 100
    pub per_page: Option<u32>,
}

impl RequestQuery {
    pub fn scope(&self) -> RequestScope {
        self.scope.unwrap_or_default()
    }

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.per_page())
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[aliases(LeaveRequestPage = Page<LeaveRequest>)]
pub struct Page<T> {
    pub data: Vec<T>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: u64,
}

/// A balance increment that still has to be applied after an approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingIncrement {
    pub request_id: u64,
    pub key: BalanceKey,
    pub days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedIncrement {
    pub id: u64,
    pub pending: PendingIncrement,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Picks the balance year an approved request is charged to.
pub type ChargeYear = dyn Fn(&LeaveRequest) -> i32 + Send + Sync;

/// A committed status change.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub request: LeaveRequest,
    /// The increment queued with an approval; `None` for rejections.
    pub charge: Option<QueuedIncrement>,
}

#[async_trait]
pub trait LeaveStore: Send + Sync {
    /// Persists a new request with status pending.
    async fn insert_request(
        &self,
        caller: &AuthContext,
        new: NewLeaveRequest,
    ) -> Result<LeaveRequest, StoreError>;

    /// `None` when the row is absent or not visible to `caller`.
    async fn find_request(
        &self,
        caller: &AuthContext,
        id: u64,
    ) -> Result<Option<LeaveRequest>, StoreError>;

    /// Newest first by creation time.
    async fn select_requests(
        &self,
        caller: &AuthContext,
        query: &RequestQuery,
    ) -> Result<Page<LeaveRequest>, StoreError>;

    /// Atomically moves a pending request to `decision`. An approval queues
    /// its balance increment in the same commit. `NotFound` when no pending
    /// row with that id exists.
    async fn resolve_pending(
        &self,
        caller: &AuthContext,
        id: u64,
        decision: Decision,
        charge_year: &ChargeYear,
    ) -> Result<Resolution, StoreError>;

    /// Adds the queued days to the balance and removes the entry in one
    /// commit. An entry that is already gone was applied before and is a
    /// no-op.
    async fn apply_balance_increment(&self, entry: &QueuedIncrement) -> Result<(), StoreError>;

    async fn select_balances(
        &self,
        caller: &AuthContext,
        requester_id: u64,
        year: i32,
    ) -> Result<Vec<LeaveBalance>, StoreError>;

    /// Oldest first, skipping entries that reached `max_attempts`.
    async fn due_balance_retries(
        &self,
        max_attempts: u32,
        limit: u32,
    ) -> Result<Vec<QueuedIncrement>, StoreError>;

    async fn fail_balance_retry(&self, id: u64, error: &str) -> Result<(), StoreError>;
}
