use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::policy;
use super::{
    ChargeYear, LeaveStore, Page, PendingIncrement, QueuedIncrement, RequestQuery, Resolution,
    StoreError,
};
use crate::auth::context::AuthContext;
use crate::model::leave_balance::{BalanceKey, LeaveBalance};
use crate::model::leave_request::{Decision, LeaveRequest, LeaveStatus, NewLeaveRequest};

#[derive(Default)]
struct State {
    next_request_id: u64,
    next_outbox_id: u64,
    requests: BTreeMap<u64, LeaveRequest>,
    balances: HashMap<BalanceKey, LeaveBalance>,
    outbox: BTreeMap<u64, QueuedIncrement>,
}

/// Process-local `LeaveStore`; every operation runs under a single lock so
/// conditional updates and increments are atomic.
#[derive(Default)]
pub struct InMemoryLeaveStore {
    state: Mutex<State>,
    increments_unavailable: AtomicBool,
    resolutions_unavailable: AtomicBool,
    resolution_ack_lost: AtomicBool,
}

impl InMemoryLeaveStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("state lock poisoned".into()))
    }

    pub fn provision_balance(&self, balance: LeaveBalance) {
        if let Ok(mut state) = self.lock() {
            state.balances.insert(balance.key(), balance);
        }
    }

    pub fn balance(&self, key: &BalanceKey) -> Option<LeaveBalance> {
        self.lock().ok()?.balances.get(key).cloned()
    }

    pub fn request(&self, id: u64) -> Option<LeaveRequest> {
        self.lock().ok()?.requests.get(&id).cloned()
    }

    pub fn queued(&self) -> Vec<QueuedIncrement> {
        self.lock()
            .map(|state| state.outbox.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn queue(&self, pending: PendingIncrement) -> u64 {
        match self.lock() {
            Ok(mut state) => state.enqueue(pending).id,
            Err(_) => 0,
        }
    }

    /// Simulates a transport outage for balance increments only.
    pub fn set_increments_unavailable(&self, unavailable: bool) {
        self.increments_unavailable
            .store(unavailable, Ordering::SeqCst);
    }

    /// Status changes fail before anything is written.
    pub fn set_resolutions_unavailable(&self, unavailable: bool) {
        self.resolutions_unavailable
            .store(unavailable, Ordering::SeqCst);
    }

    /// Status changes commit, then the caller sees a transport error.
    pub fn set_resolution_ack_lost(&self, lost: bool) {
        self.resolution_ack_lost.store(lost, Ordering::SeqCst);
    }
}

impl State {
    fn enqueue(&mut self, pending: PendingIncrement) -> QueuedIncrement {
        self.next_outbox_id += 1;
        let entry = QueuedIncrement {
            id: self.next_outbox_id,
            pending,
            attempts: 0,
            last_error: None,
        };
        self.outbox.insert(entry.id, entry.clone());
        entry
    }
}

#[async_trait]
impl LeaveStore for InMemoryLeaveStore {
    async fn insert_request(
        &self,
        caller: &AuthContext,
        new: NewLeaveRequest,
    ) -> Result<LeaveRequest, StoreError> {
        policy::may_file_for(caller, new.requester_id)?;

        let mut state = self.lock()?;
        state.next_request_id += 1;
        let request = LeaveRequest {
            id: state.next_request_id,
            requester_id: new.requester_id,
            leave_type: new.leave_type,
            start_date: new.start_date,
            end_date: new.end_date,
            reason: new.reason,
            status: LeaveStatus::Pending,
            created_at: new.created_at,
        };
        state.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn find_request(
        &self,
        caller: &AuthContext,
        id: u64,
    ) -> Result<Option<LeaveRequest>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .requests
            .get(&id)
            .filter(|request| policy::may_read_owned_by(caller, request.requester_id))
            .cloned())
    }

    async fn select_requests(
        &self,
        caller: &AuthContext,
        query: &RequestQuery,
    ) -> Result<Page<LeaveRequest>, StoreError> {
        let requester = policy::requester_filter(caller, query.scope())?;

        let state = self.lock()?;
        let mut matching: Vec<&LeaveRequest> = state
            .requests
            .values()
            .filter(|r| requester.is_none_or(|id| r.requester_id == id))
            .filter(|r| query.status.is_none_or(|status| r.status == status))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let data = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.per_page() as usize)
            .cloned()
            .collect();

        Ok(Page {
            data,
            page: query.page(),
            per_page: query.per_page(),
            total,
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

        let mut state = self.lock()?;
        let request = match state.requests.get(&id) {
            Some(request) if !request.status.is_terminal() => request.clone(),
            _ => return Err(StoreError::NotFound),
        };
        if self.resolutions_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".into()));
        }

        let request = LeaveRequest {
            status: decision.into(),
            ..request
        };
        let charge = match decision {
            Decision::Rejected => None,
            Decision::Approved => Some(state.enqueue(PendingIncrement {
                request_id: id,
                key: BalanceKey {
                    requester_id: request.requester_id,
                    leave_type: request.leave_type,
                    year: charge_year(&request),
                },
                days: request.days(),
            })),
        };
        state.requests.insert(id, request.clone());

        if self.resolution_ack_lost.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset after commit".into()));
        }
        Ok(Resolution { request, charge })
    }

    async fn apply_balance_increment(&self, entry: &QueuedIncrement) -> Result<(), StoreError> {
        if self.increments_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".into()));
        }

        let mut state = self.lock()?;
        if !state.outbox.contains_key(&entry.id) {
            return Ok(());
        }
        let pending = &entry.pending;
        let balance = state
            .balances
            .get_mut(&pending.key)
            .ok_or(StoreError::NotFound)?;
        if !balance.can_take(pending.days) {
            return Err(StoreError::BalanceExceeded);
        }
        balance.used_days += pending.days;
        state.outbox.remove(&entry.id);
        Ok(())
    }

    async fn select_balances(
        &self,
        caller: &AuthContext,
        requester_id: u64,
        year: i32,
    ) -> Result<Vec<LeaveBalance>, StoreError> {
        policy::may_read_balances_of(caller, requester_id)?;

        let state = self.lock()?;
        let mut rows: Vec<LeaveBalance> = state
            .balances
            .values()
            .filter(|b| b.requester_id == requester_id && b.year == year)
            .cloned()
            .collect();
        rows.sort_by_key(|b| b.leave_type.as_str());
        Ok(rows)
    }

    async fn due_balance_retries(
        &self,
        max_attempts: u32,
        limit: u32,
    ) -> Result<Vec<QueuedIncrement>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .outbox
            .values()
            .filter(|entry| entry.attempts < max_attempts)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn fail_balance_retry(&self, id: u64, error: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let entry = state.outbox.get_mut(&id).ok_or(StoreError::NotFound)?;
        entry.attempts += 1;
        entry.last_error = Some(error.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::leave_request::LeaveType;
    use crate::model::role::Role;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn employee(id: u64) -> AuthContext {
        AuthContext::new(id, format!("emp{id}"), Role::Employee)
    }

    fn new_request(requester_id: u64, day: u32) -> NewLeaveRequest {
        NewLeaveRequest {
            requester_id,
            leave_type: LeaveType::Sick,
            start_date: NaiveDate::from_ymd_opt(2024, 6, 10).expect("date"),
            end_date: NaiveDate::from_ymd_opt(2024, 6, 11).expect("date"),
            reason: "Flu and fever".into(),
            created_at: Utc.with_ymd_and_hms(2024, 6, day, 9, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn listing_is_newest_first_and_paged() {
        let store = InMemoryLeaveStore::new();
        let caller = employee(1);
        for day in [3, 1, 2] {
            store
                .insert_request(&caller, new_request(1, day))
                .await
                .expect("insert");
        }

        let query = RequestQuery {
            per_page: Some(2),
            ..Default::default()
        };
        let page = store.select_requests(&caller, &query).await.expect("page");

        assert_eq!(page.total, 3);
        let days: Vec<u32> = page
            .data
            .iter()
            .map(|r| chrono::Datelike::day(&r.created_at))
            .collect();
        assert_eq!(days, [3, 2]);
    }

    #[tokio::test]
    async fn hidden_requests_are_not_found() {
        let store = InMemoryLeaveStore::new();
        let stored = store
            .insert_request(&employee(1), new_request(1, 1))
            .await
            .expect("insert");

        let seen = store.find_request(&employee(2), stored.id).await.expect("find");
        assert!(seen.is_none());
    }

    #[tokio::test]
    async fn increment_respects_allotment_and_applies_once() {
        let store = InMemoryLeaveStore::new();
        let key = BalanceKey {
            requester_id: 1,
            leave_type: LeaveType::Sick,
            year: 2024,
        };
        store.provision_balance(LeaveBalance {
            requester_id: 1,
            leave_type: LeaveType::Sick,
            year: 2024,
            total_days: 10,
            used_days: 8,
            unlimited: false,
        });
        let pending = |days| PendingIncrement {
            request_id: 1,
            key: key.clone(),
            days,
        };
        let two = store.queue(pending(2));
        let one = store.queue(pending(1));
        let entry = |id| {
            store
                .queued()
                .into_iter()
                .find(|e| e.id == id)
                .expect("queued entry")
        };
        let (two, one) = (entry(two), entry(one));

        assert!(store.apply_balance_increment(&two).await.is_ok());
        assert!(store.apply_balance_increment(&two).await.is_ok());
        assert!(matches!(
            store.apply_balance_increment(&one).await,
            Err(StoreError::BalanceExceeded)
        ));
        assert_eq!(store.balance(&key).map(|b| b.used_days), Some(10));
        assert_eq!(store.queued().len(), 1);
    }
}
