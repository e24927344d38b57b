use crate::{
    api::{balance, leave_request},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

type Limiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

// Helper to build per-route limiter
fn build_limiter(name: &str, requests_per_min: u32) -> anyhow::Result<Limiter> {
    let per_ms = (60_000 / u64::from(requests_per_min.max(1))).max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow::anyhow!("invalid {name} rate limit: {requests_per_min}/min"))?;
    Ok(Arc::new(Governor::new(&cfg)))
}

/// Per-route limiters, built once and shared by every worker.
#[derive(Clone)]
pub struct RateLimits {
    login: Limiter,
    register: Limiter,
    refresh: Limiter,
    protected: Limiter,
}

impl RateLimits {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            login: build_limiter("login", config.rate_login_per_min)?,
            register: build_limiter("register", config.rate_register_per_min)?,
            refresh: build_limiter("refresh", config.rate_refresh_per_min)?,
            protected: build_limiter("protected", config.rate_protected_per_min)?,
        })
    }
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limits: &RateLimits) {
    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(limits.login.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(limits.register.clone())
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(limits.refresh.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(limits.login.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(limits.protected.clone()) // rate limiting
            .configure(configure_api),
    );
}

/// Routes behind the auth middleware, relative to the API prefix.
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/session").route(web::get().to(handlers::session)))
        .service(
            web::scope("/leave")
                // /leave
                .service(
                    web::resource("")
                        .route(web::get().to(leave_request::leave_list))
                        .route(web::post().to(leave_request::create_leave)),
                )
                // /leave/{id}
                .service(web::resource("/{id}").route(web::get().to(leave_request::get_leave)))
                // /leave/{id}/approve
                .service(
                    web::resource("/{id}/approve").route(web::put().to(leave_request::approve_leave)),
                )
                // /leave/{id}/reject
                .service(
                    web::resource("/{id}/reject").route(web::put().to(leave_request::reject_leave)),
                ),
        )
        // /balances
        .service(web::resource("/balances").route(web::get().to(balance::list_balances)));
}

// LOGIN
//  ├─ access_token
//  └─ refresh_token (stored by jti)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ old refresh token revoked, new pair returned
