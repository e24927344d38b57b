use crate::auth::context::AuthContext;
use crate::leave::error::LeaveError;
use crate::leave::reconciler::LeaveReconciler;
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct BalanceQuery {
    #[schema(example = 1000)]
    /// Whose balances; defaults to the caller
    pub requester_id: Option<u64>,
    #[schema(example = 2024)]
    /// Balance year; defaults to the current year
    pub year: Option<i32>,
}

/// Leave balances of one requester for one year
#[utoipa::path(
    get,
    path = "/api/balances",
    params(BalanceQuery),
    responses(
        (status = 200, description = "Balance rows, one per leave type", body = [crate::model::leave_balance::LeaveBalance]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Balance"
)]
pub async fn list_balances(
    auth: AuthContext,
    leaves: web::Data<LeaveReconciler>,
    query: web::Query<BalanceQuery>,
) -> Result<HttpResponse, LeaveError> {
    let requester_id = query.requester_id.unwrap_or(auth.user_id);
    let year = query.year.unwrap_or_else(|| leaves.current_year());

    let balances = leaves.list_balances(&auth, requester_id, year).await?;
    Ok(HttpResponse::Ok().json(balances))
}
