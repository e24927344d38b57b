use crate::api::balance::BalanceQuery;
use crate::api::leave_request::CreateLeave;
use crate::auth::handlers::SessionResponse;
use crate::leave::reconciler::{BalanceEffect, DeferReason, TransitionOutcome};
use crate::leave::validator::{LeaveField, ValidationError, ValidationKind};
use crate::model::leave_balance::{BalanceKey, LeaveBalance};
use crate::model::leave_request::{Decision, LeaveRequest, LeaveStatus, LeaveType};
use crate::model::role::Role;
use crate::models::{LoginReqDto, RegisterReqDto, TokenPair};
use crate::store::{LeaveRequestPage, RequestQuery, RequestScope};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HRM Leave API",
        version = "1.0.0",
        description = r#"
## Leave Management

Employees file leave requests; HR and admins approve or reject them.
Approving a request charges the requester's balance for the leave year.

### 🔹 Key Features
- **Leave Requests**
  - File a request, list your own or (reviewers) everyone's, view one
- **Review**
  - Approve or reject a pending request exactly once
- **Balances**
  - Per leave type and year; unpaid leave is unlimited

### 🔐 Security
Everything under `/api` requires a **JWT Bearer** access token.
Only **Admin** and **HR** can review requests or read other people's data.

### 📦 Response Format
- JSON-based RESTful responses
- Validation failures return every field error at once
"#,
    ),
    paths(
        crate::api::leave_request::leave_list,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::create_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave,

        crate::api::balance::list_balances,

        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::session
    ),
    components(
        schemas(
            CreateLeave,
            LeaveRequest,
            LeaveRequestPage,
            LeaveType,
            LeaveStatus,
            Decision,
            RequestQuery,
            RequestScope,
            TransitionOutcome,
            BalanceEffect,
            DeferReason,
            BalanceKey,
            LeaveBalance,
            BalanceQuery,
            ValidationError,
            LeaveField,
            ValidationKind,
            Role,
            SessionResponse,
            TokenPair,
            LoginReqDto,
            RegisterReqDto
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Leave", description = "Leave request lifecycle APIs"),
        (name = "Balance", description = "Leave balance APIs"),
        (name = "Auth", description = "Sign-in and session APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
