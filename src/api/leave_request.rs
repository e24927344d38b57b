use crate::auth::context::AuthContext;
use crate::leave::error::LeaveError;
use crate::leave::reconciler::LeaveReconciler;
use crate::leave::validator::{LeaveDraft, validate};
use crate::model::leave_request::Decision;
use crate::store::RequestQuery;
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateLeave {
    /// Defaults to the caller; filing for anyone else is refused
    #[schema(example = 1000, nullable = true)]
    pub requester_id: Option<u64>,
    // any JSON type is accepted here so the validator can report the field
    #[schema(example = "annual", value_type = Option<String>)]
    pub leave_type: Option<Value>,
    #[schema(example = "2024-06-10", format = "date", value_type = Option<String>)]
    pub start_date: Option<Value>,
    #[schema(example = "2024-06-12", format = "date", value_type = Option<String>)]
    pub end_date: Option<Value>,
    #[schema(example = "Family event travel", value_type = Option<String>)]
    pub reason: Option<Value>,
}

/// Non-string values count as missing.
fn text(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

impl CreateLeave {
    fn into_parts(self) -> (Option<u64>, LeaveDraft) {
        let draft = LeaveDraft {
            leave_type: text(self.leave_type),
            start_date: text(self.start_date),
            end_date: text(self.end_date),
            reason: text(self.reason),
        };
        (self.requester_id, draft)
    }
}

/* =========================
Create leave request
========================= */
/// Swagger doc for create_leave endpoint
#[utoipa::path(
    post,
    path = "/api/leave",
    request_body(
        content = CreateLeave,
        description = "Leave request payload",
        content_type = "application/json"
    ),
    responses(
        (status = 201, description = "Leave request submitted", body = crate::model::leave_request::LeaveRequest),
        (status = 400, description = "Invalid leave request", body = Object, example = json!({
            "message": "Invalid leave request",
            "errors": [{
                "field": "end_date",
                "kind": "invalid_range",
                "message": "End date must be after or equal to start date"
            }]
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthContext,
    leaves: web::Data<LeaveReconciler>,
    payload: web::Json<CreateLeave>,
) -> Result<HttpResponse, LeaveError> {
    let (requester_id, draft) = payload.into_inner().into_parts();

    // rejected drafts never reach the store
    let leave = validate(&draft)?;

    let request = leaves
        .submit(&auth, requester_id.unwrap_or(auth.user_id), leave)
        .await?;

    Ok(HttpResponse::Created().json(request))
}

/* =========================
Approve leave (HR/Admin)
========================= */
/// Swagger doc for approve_leave endpoint
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/approve",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to approve")
    ),
    responses(
        (status = 200, description = "Leave approved", body = crate::leave::reconciler::TransitionOutcome),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Leave request already resolved or not accessible", body = Object, example = json!({
            "message": "Leave request already resolved or not accessible"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn approve_leave(
    auth: AuthContext,
    leaves: web::Data<LeaveReconciler>,
    path: web::Path<u64>,
) -> Result<HttpResponse, LeaveError> {
    let outcome = leaves
        .transition(&auth, path.into_inner(), Decision::Approved)
        .await?;

    Ok(HttpResponse::Ok().json(outcome))
}

/* =========================
Reject leave (HR/Admin)
========================= */
/// Swagger doc for reject_leave endpoint
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/reject",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to reject")
    ),
    responses(
        (status = 200, description = "Leave rejected", body = crate::leave::reconciler::TransitionOutcome),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Leave request already resolved or not accessible", body = Object, example = json!({
            "message": "Leave request already resolved or not accessible"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn reject_leave(
    auth: AuthContext,
    leaves: web::Data<LeaveReconciler>,
    path: web::Path<u64>,
) -> Result<HttpResponse, LeaveError> {
    let outcome = leaves
        .transition(&auth, path.into_inner(), Decision::Rejected)
        .await?;

    Ok(HttpResponse::Ok().json(outcome))
}

/// for getting a leave application details endpoint
#[utoipa::path(
    get,
    path = "/api/leave/{leave_id}",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to fetch")
    ),
    responses(
        (status = 200, description = "Leave request found", body = crate::model::leave_request::LeaveRequest),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Leave request not found", body = Object, example = json!({
            "message": "Leave request not found"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthContext,
    leaves: web::Data<LeaveReconciler>,
    path: web::Path<u64>,
) -> Result<HttpResponse, LeaveError> {
    let request = leaves.get_request(&auth, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(request))
}

/// for getting leave applications endpoint
#[utoipa::path(
    get,
    path = "/api/leave",
    params(RequestQuery),
    responses(
        (status = 200, description = "Paginated leave list, newest first", body = crate::store::LeaveRequestPage),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn leave_list(
    auth: AuthContext,
    leaves: web::Data<LeaveReconciler>,
    query: web::Query<RequestQuery>,
) -> Result<HttpResponse, LeaveError> {
    let page = leaves.list_requests(&auth, &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{TestApp, bearer};
    use crate::model::leave_balance::LeaveBalance;
    use crate::model::leave_request::{LeaveRequest, LeaveStatus, LeaveType};
    use crate::model::role::Role;
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use serde_json::{Value, json};

    const ALICE: u64 = 10;
    const HR: u64 = 2;

    fn family_event() -> Value {
        json!({
            "leave_type": "annual",
            "start_date": "2024-06-10",
            "end_date": "2024-06-12",
            "reason": "Family event travel"
        })
    }

    #[actix_web::test]
    async fn submit_then_approve_charges_balance() {
        let app = TestApp::new();
        app.store.provision_balance(LeaveBalance {
            requester_id: ALICE,
            leave_type: LeaveType::Annual,
            year: 2024,
            total_days: 20,
            used_days: 0,
            unlimited: false,
        });
        let service = test::init_service(App::new().configure(|cfg| app.configure(cfg))).await;

        let req = test::TestRequest::post()
            .uri("/api/leave")
            .insert_header(bearer(&app.config, ALICE, Role::Employee))
            .set_json(family_event())
            .to_request();
        let created: LeaveRequest = test::call_and_read_body_json(&service, req).await;
        assert_eq!(created.status, LeaveStatus::Pending);
        assert_eq!(created.requester_id, ALICE);

        let req = test::TestRequest::put()
            .uri(&format!("/api/leave/{}/approve", created.id))
            .insert_header(bearer(&app.config, HR, Role::Hr))
            .to_request();
        let outcome: Value = test::call_and_read_body_json(&service, req).await;
        assert_eq!(outcome["request"]["status"], "approved");
        assert_eq!(outcome["balance"]["outcome"], "applied");
        assert_eq!(outcome["balance"]["days"], 3);

        let req = test::TestRequest::put()
            .uri(&format!("/api/leave/{}/reject", created.id))
            .insert_header(bearer(&app.config, HR, Role::Hr))
            .to_request();
        let resp = test::call_service(&service, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn reversed_dates_are_rejected_before_storage() {
        let app = TestApp::new();
        let service = test::init_service(App::new().configure(|cfg| app.configure(cfg))).await;

        let req = test::TestRequest::post()
            .uri("/api/leave")
            .insert_header(bearer(&app.config, ALICE, Role::Employee))
            .set_json(json!({
                "leave_type": "sick",
                "start_date": "2024-06-12",
                "end_date": "2024-06-10",
                "reason": "Recovering from surgery"
            }))
            .to_request();
        let resp = test::call_service(&service, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["errors"][0]["field"], "end_date");
        assert_eq!(body["errors"][0]["kind"], "invalid_range");
        assert!(app.store.request(1).is_none());
    }

    #[actix_web::test]
    async fn wrongly_typed_fields_are_reported_per_field() {
        let app = TestApp::new();
        let service = test::init_service(App::new().configure(|cfg| app.configure(cfg))).await;

        let req = test::TestRequest::post()
            .uri("/api/leave")
            .insert_header(bearer(&app.config, ALICE, Role::Employee))
            .set_json(json!({
                "leave_type": 5,
                "start_date": "2024-06-10",
                "end_date": "2024-06-12",
                "reason": ["not", "text"]
            }))
            .to_request();
        let resp = test::call_service(&service, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["errors"][0]["field"], "leave_type");
        assert_eq!(body["errors"][0]["kind"], "missing_field");
        assert_eq!(body["errors"][1]["field"], "reason");
        assert!(app.store.request(1).is_none());
    }

    #[actix_web::test]
    async fn client_cannot_preset_status() {
        let app = TestApp::new();
        let service = test::init_service(App::new().configure(|cfg| app.configure(cfg))).await;

        let mut payload = family_event();
        payload["status"] = json!("approved");
        let req = test::TestRequest::post()
            .uri("/api/leave")
            .insert_header(bearer(&app.config, ALICE, Role::Employee))
            .set_json(payload)
            .to_request();
        let resp = test::call_service(&service, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(app.store.request(1).is_none());
    }

    #[actix_web::test]
    async fn filing_for_another_employee_is_forbidden() {
        let app = TestApp::new();
        let service = test::init_service(App::new().configure(|cfg| app.configure(cfg))).await;

        let mut payload = family_event();
        payload["requester_id"] = json!(ALICE + 1);
        let req = test::TestRequest::post()
            .uri("/api/leave")
            .insert_header(bearer(&app.config, ALICE, Role::Employee))
            .set_json(payload)
            .to_request();
        let resp = test::call_service(&service, req).await;

        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn employee_cannot_approve() {
        let app = TestApp::new();
        let service = test::init_service(App::new().configure(|cfg| app.configure(cfg))).await;

        let req = test::TestRequest::post()
            .uri("/api/leave")
            .insert_header(bearer(&app.config, ALICE, Role::Employee))
            .set_json(family_event())
            .to_request();
        let created: LeaveRequest = test::call_and_read_body_json(&service, req).await;

        let req = test::TestRequest::put()
            .uri(&format!("/api/leave/{}/approve", created.id))
            .insert_header(bearer(&app.config, ALICE, Role::Employee))
            .to_request();
        let resp = test::call_service(&service, req).await;

        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            app.store.request(created.id).map(|r| r.status),
            Some(LeaveStatus::Pending)
        );
    }

    #[actix_web::test]
    async fn listing_all_needs_reviewer() {
        let app = TestApp::new();
        let service = test::init_service(App::new().configure(|cfg| app.configure(cfg))).await;

        let req = test::TestRequest::get()
            .uri("/api/leave?scope=all")
            .insert_header(bearer(&app.config, ALICE, Role::Employee))
            .to_request();
        let resp = test::call_service(&service, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::get()
            .uri("/api/leave?scope=all&status=pending&page=1&per_page=5")
            .insert_header(bearer(&app.config, HR, Role::Admin))
            .to_request();
        let page: Value = test::call_and_read_body_json(&service, req).await;
        assert_eq!(page["total"], 0);
        assert_eq!(page["per_page"], 5);
    }

    #[actix_web::test]
    async fn missing_token_is_unauthorized() {
        let app = TestApp::new();
        let service = test::init_service(App::new().configure(|cfg| app.configure(cfg))).await;

        let req = test::TestRequest::get().uri("/api/leave").to_request();
        let resp = test::call_service(&service, req).await;

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
