use serde::{Deserialize, Serialize};

use super::role::Role;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub password: String,
    pub role_id: u8,
    pub is_active: bool,
}

/// The parts of a user row that decide whether new tokens may be issued.
#[derive(Debug, sqlx::FromRow)]
pub struct AccountState {
    pub username: String,
    pub role_id: u8,
    pub is_active: bool,
}

impl AccountState {
    /// `None` for deactivated accounts and unknown roles.
    pub fn active_role(&self) -> Option<Role> {
        if self.is_active {
            Role::from_id(self.role_id)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(role_id: u8, is_active: bool) -> AccountState {
        AccountState {
            username: "jdoe".into(),
            role_id,
            is_active,
        }
    }

    #[test]
    fn active_account_keeps_its_current_role() {
        assert_eq!(account(2, true).active_role(), Some(Role::Hr));
    }

    #[test]
    fn deactivated_or_unknown_role_gets_nothing() {
        assert_eq!(account(2, false).active_role(), None);
        assert_eq!(account(9, true).active_role(), None);
    }
}
