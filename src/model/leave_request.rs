use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};
use utoipa::ToSchema;

#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Hash,
    Ord,
    PartialOrd,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveType {
    Annual,
    Sick,
    Personal,
    Bereavement,
    Unpaid,
}

impl LeaveType {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

impl LeaveStatus {
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, LeaveStatus::Pending)
    }
}

/// A reviewer's resolution of a pending request.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl From<Decision> for LeaveStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => LeaveStatus::Approved,
            Decision::Rejected => LeaveStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "requester_id": 1000,
    "leave_type": "annual",
    "start_date": "2024-06-10",
    "end_date": "2024-06-12",
    "reason": "Family event travel",
    "status": "pending",
    "created_at": "2024-06-01T09:30:00Z"
}))]
pub struct LeaveRequest {
    /// leave application id
    pub id: u64,
    /// identity that filed the request
    pub requester_id: u64,
    pub leave_type: LeaveType,
    #[schema(example = "2024-06-10", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2024-06-12", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    pub reason: String,
    pub status: LeaveStatus,
    #[schema(example = "2024-06-01T09:30:00Z", format = "date-time", value_type = String)]
    pub created_at: DateTime<Utc>,
}

impl LeaveRequest {
    /// Calendar days covered, both endpoints included.
    pub fn days(&self) -> u32 {
        inclusive_days(self.start_date, self.end_date)
    }
}

/// A request as handed to the store; the store assigns `id` and sets
/// `status` to pending.
#[derive(Debug, Clone)]
pub struct NewLeaveRequest {
    pub requester_id: u64,
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

pub fn inclusive_days(start: NaiveDate, end: NaiveDate) -> u32 {
    let span = (end - start).num_days();
    u32::try_from(span + 1).unwrap_or(0)
}
