//! Leave-request lifecycle: validation, status reconciliation and the
//! balance side effect of approvals.

pub mod clock;
pub mod error;
pub mod outbox;
pub mod reconciler;
pub mod validator;
