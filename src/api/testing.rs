//! Shared fixtures for HTTP handler tests.

use std::sync::Arc;

use actix_web::http::header;
use actix_web::middleware::from_fn;
use actix_web::web;
use chrono::{TimeZone, Utc};

use crate::auth::jwt::generate_access_token;
use crate::auth::middleware::auth_middleware;
use crate::config::Config;
use crate::leave::clock::FixedClock;
use crate::leave::reconciler::{BalanceYearPolicy, LeaveReconciler};
use crate::model::role::Role;
use crate::routes;
use crate::store::memory::InMemoryLeaveStore;

pub struct TestApp {
    pub store: Arc<InMemoryLeaveStore>,
    pub config: Config,
    leaves: web::Data<LeaveReconciler>,
}

impl TestApp {
    pub fn new() -> Self {
        let config = Config::from_lookup(|key| match key {
            "SERVER_ADDR" => Some("127.0.0.1:0".into()),
            "DATABASE_URL" => Some("mysql://unused".into()),
            "JWT_SECRET" => Some("handler-test-secret".into()),
            _ => None,
        })
        .expect("test config");

        let store = Arc::new(InMemoryLeaveStore::new());
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
        let leaves = web::Data::new(LeaveReconciler::new(
            store.clone(),
            Arc::new(clock),
            BalanceYearPolicy::StartDate,
        ));

        Self {
            store,
            config,
            leaves,
        }
    }

    /// The protected `/api` scope without rate limiting.
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::new(self.config.clone()))
            .app_data(self.leaves.clone())
            .service(
                web::scope("/api")
                    .wrap(from_fn(auth_middleware))
                    .configure(routes::configure_api),
            );
    }
}

pub fn bearer(config: &Config, user_id: u64, role: Role) -> (header::HeaderName, String) {
    let token = generate_access_token(
        user_id,
        format!("user{user_id}"),
        role.id(),
        &config.jwt_secret,
        config.access_token_ttl,
    )
    .expect("access token");
    (header::AUTHORIZATION, format!("Bearer {token}"))
}
