//! Owns a leave request's status and the balance change an approval causes.
//!
//! ```text
//! pending ──approve──▶ approved   (then: used_days += days)
//!    └─────reject────▶ rejected
//! ```
//!
//! An approval commits the status change together with a queued balance
//! increment. The increment is then applied right away; when that fails the
//! approval stands and the queued entry is left for
//! [`BalanceRetryWorker`](super::outbox::BalanceRetryWorker).

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use strum_macros::{Display, EnumString};
use tracing::{error, info, warn};
use utoipa::ToSchema;

use super::clock::Clock;
use super::error::LeaveError;
use super::validator::ValidatedLeave;
use crate::auth::context::AuthContext;
use crate::model::leave_balance::{BalanceKey, LeaveBalance};
use crate::model::leave_request::{Decision, LeaveRequest, NewLeaveRequest};
use crate::store::{LeaveStore, Page, QueuedIncrement, RequestQuery, StoreError};

/// Which year's balance row an approval is charged to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum BalanceYearPolicy {
    /// Year of the leave's first day.
    #[default]
    StartDate,
    /// Calendar year in which the approval happens.
    Reconciliation,
}

impl BalanceYearPolicy {
    pub fn year_for(self, request: &LeaveRequest, now: DateTime<Utc>) -> i32 {
        match self {
            BalanceYearPolicy::StartDate => request.start_date.year(),
            BalanceYearPolicy::Reconciliation => now.year(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeferReason {
    MissingBalance,
    AllotmentExceeded,
    StoreUnavailable,
}

impl From<&StoreError> for DeferReason {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::NotFound => DeferReason::MissingBalance,
            StoreError::BalanceExceeded => DeferReason::AllotmentExceeded,
            _ => DeferReason::StoreUnavailable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BalanceEffect {
    /// Rejections leave balances alone.
    NotApplicable,
    Applied {
        key: BalanceKey,
        days: u32,
    },
    /// The approval stands; the increment stays queued for the retry worker.
    Deferred {
        key: BalanceKey,
        days: u32,
        reason: DeferReason,
    },
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransitionOutcome {
    pub request: LeaveRequest,
    pub balance: BalanceEffect,
}

pub struct LeaveReconciler {
    store: Arc<dyn LeaveStore>,
    clock: Arc<dyn Clock>,
    year_policy: BalanceYearPolicy,
}

impl LeaveReconciler {
    pub fn new(
        store: Arc<dyn LeaveStore>,
        clock: Arc<dyn Clock>,
        year_policy: BalanceYearPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            year_policy,
        }
    }

    pub fn current_year(&self) -> i32 {
        self.clock.now().year()
    }

    pub async fn submit(
        &self,
        caller: &AuthContext,
        requester_id: u64,
        leave: ValidatedLeave,
    ) -> Result<LeaveRequest, LeaveError> {
        let new = NewLeaveRequest {
            requester_id,
            leave_type: leave.leave_type(),
            start_date: leave.start_date(),
            end_date: leave.end_date(),
            created_at: self.clock.now(),
            reason: leave.into_reason(),
        };

        let request = self.store.insert_request(caller, new).await.map_err(|e| {
            warn!(error = %e, caller = caller.user_id, requester_id, "Leave submission refused");
            LeaveError::from_store(e)
        })?;

        info!(
            leave_id = request.id,
            requester_id,
            leave_type = %request.leave_type,
            days = request.days(),
            "Leave request submitted"
        );
        Ok(request)
    }

    pub async fn transition(
        &self,
        caller: &AuthContext,
        request_id: u64,
        decision: Decision,
    ) -> Result<TransitionOutcome, LeaveError> {
        let now = self.clock.now();
        let policy = self.year_policy;
        let charge_year = move |request: &LeaveRequest| policy.year_for(request, now);

        let resolution = self
            .store
            .resolve_pending(caller, request_id, decision, &charge_year)
            .await
            .map_err(|e| {
                info!(error = %e, leave_id = request_id, %decision, "Leave transition refused");
                LeaveError::from_transition(e)
            })?;

        let request = resolution.request;
        info!(
            leave_id = request.id,
            reviewer = caller.user_id,
            status = %request.status,
            "Leave request resolved"
        );

        let balance = match resolution.charge {
            None => BalanceEffect::NotApplicable,
            Some(entry) => self.charge_balance(entry).await,
        };

        Ok(TransitionOutcome { request, balance })
    }

    async fn charge_balance(&self, entry: QueuedIncrement) -> BalanceEffect {
        let err = match self.store.apply_balance_increment(&entry).await {
            Ok(()) => {
                return BalanceEffect::Applied {
                    key: entry.pending.key,
                    days: entry.pending.days,
                };
            }
            Err(err) => err,
        };

        error!(
            error = %err,
            leave_id = entry.pending.request_id,
            requester_id = entry.pending.key.requester_id,
            year = entry.pending.key.year,
            days = entry.pending.days,
            "Balance increment failed, approval kept and increment queued"
        );
        if let Err(e) = self.store.fail_balance_retry(entry.id, &err.to_string()).await {
            warn!(error = %e, outbox_id = entry.id, "Could not record balance retry failure");
        }

        BalanceEffect::Deferred {
            reason: DeferReason::from(&err),
            key: entry.pending.key,
            days: entry.pending.days,
        }
    }

    pub async fn get_request(
        &self,
        caller: &AuthContext,
        request_id: u64,
    ) -> Result<LeaveRequest, LeaveError> {
        self.store
            .find_request(caller, request_id)
            .await
            .map_err(LeaveError::from_store)?
            .ok_or(LeaveError::NotFound)
    }

    pub async fn list_requests(
        &self,
        caller: &AuthContext,
        query: &RequestQuery,
    ) -> Result<Page<LeaveRequest>, LeaveError> {
        self.store
            .select_requests(caller, query)
            .await
            .map_err(LeaveError::from_store)
    }

    pub async fn list_balances(
        &self,
        caller: &AuthContext,
        requester_id: u64,
        year: i32,
    ) -> Result<Vec<LeaveBalance>, LeaveError> {
        self.store
            .select_balances(caller, requester_id, year)
            .await
            .map_err(LeaveError::from_store)
    }
}
