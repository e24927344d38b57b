//! Row rules for leave data, evaluated inside the store.
//!
//! - requests are filed only by their own requester
//! - requests and balances are readable by their owner and by reviewers
//! - only reviewers resolve requests or list everyone's

use super::{RequestScope, StoreError};
use crate::auth::context::AuthContext;

pub fn may_file_for(caller: &AuthContext, requester_id: u64) -> Result<(), StoreError> {
    if caller.user_id == requester_id {
        Ok(())
    } else {
        Err(StoreError::Forbidden)
    }
}

pub fn may_read_owned_by(caller: &AuthContext, owner_id: u64) -> bool {
    caller.user_id == owner_id || caller.is_reviewer()
}

pub fn may_resolve(caller: &AuthContext) -> Result<(), StoreError> {
    if caller.is_reviewer() {
        Ok(())
    } else {
        Err(StoreError::Forbidden)
    }
}

/// The requester id a listing is restricted to, `None` for an unrestricted
/// listing.
pub fn requester_filter(
    caller: &AuthContext,
    scope: RequestScope,
) -> Result<Option<u64>, StoreError> {
    match scope {
        RequestScope::Mine => Ok(Some(caller.user_id)),
        RequestScope::All if caller.is_reviewer() => Ok(None),
        RequestScope::All => Err(StoreError::Forbidden),
    }
}

pub fn may_read_balances_of(caller: &AuthContext, requester_id: u64) -> Result<(), StoreError> {
    if may_read_owned_by(caller, requester_id) {
        Ok(())
    } else {
        Err(StoreError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;

    fn employee(id: u64) -> AuthContext {
        AuthContext::new(id, "emp", Role::Employee)
    }

    fn hr(id: u64) -> AuthContext {
        AuthContext::new(id, "hr", Role::Hr)
    }

    #[test]
    fn filing_is_limited_to_self() {
        assert!(may_file_for(&employee(1), 1).is_ok());
        assert!(matches!(may_file_for(&employee(1), 2), Err(StoreError::Forbidden)));
        assert!(matches!(may_file_for(&hr(9), 2), Err(StoreError::Forbidden)));
    }

    #[test]
    fn reviewers_read_and_resolve_everything() {
        assert!(may_read_owned_by(&hr(9), 1));
        assert!(may_resolve(&hr(9)).is_ok());
        assert!(may_read_balances_of(&hr(9), 1).is_ok());
    }

    #[test]
    fn employees_read_only_their_own() {
        assert!(may_read_owned_by(&employee(1), 1));
        assert!(!may_read_owned_by(&employee(1), 2));
        assert!(may_resolve(&employee(1)).is_err());
        assert!(may_read_balances_of(&employee(1), 2).is_err());
    }

    #[test]
    fn scope_all_needs_reviewer() {
        assert_eq!(requester_filter(&employee(4), RequestScope::Mine).ok(), Some(Some(4)));
        assert!(requester_filter(&employee(4), RequestScope::All).is_err());
        assert_eq!(requester_filter(&hr(9), RequestScope::All).ok(), Some(None));
    }
}
