use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::leave_request::LeaveType;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct BalanceKey {
    pub requester_id: u64,
    pub leave_type: LeaveType,
    #[schema(example = 2024)]
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "requester_id": 1000,
    "leave_type": "annual",
    "year": 2024,
    "total_days": 20,
    "used_days": 5,
    "unlimited": false
}))]
pub struct LeaveBalance {
    pub requester_id: u64,
    pub leave_type: LeaveType,
    pub year: i32,
    pub total_days: u32,
    pub used_days: u32,
    /// Unlimited allotments have no upper bound on `used_days`.
    pub unlimited: bool,
}

#[cfg(test)]
impl LeaveBalance {
    pub fn key(&self) -> BalanceKey {
        BalanceKey {
            requester_id: self.requester_id,
            leave_type: self.leave_type,
            year: self.year,
        }
    }

    /// `None` for unlimited allotments.
    pub fn remaining(&self) -> Option<u32> {
        if self.unlimited {
            None
        } else {
            Some(self.total_days.saturating_sub(self.used_days))
        }
    }

    pub fn can_take(&self, days: u32) -> bool {
        self.unlimited || self.used_days.saturating_add(days) <= self.total_days
    }
}
