use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use std::sync::Arc;
use std::time::Duration;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod leave;
mod model;
mod models;
mod routes;
mod store;

use config::Config;
use db::init_db;

use crate::docs::ApiDoc;
use crate::leave::clock::SystemClock;
use crate::leave::outbox::BalanceRetryWorker;
use crate::leave::reconciler::LeaveReconciler;
use crate::routes::RateLimits;
use crate::store::LeaveStore;
use crate::store::mysql::MySqlLeaveStore;
use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(config.log_level)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!(addr = %config.server_addr, "Server starting...");

    let pool = init_db(&config).await?;
    let limits = RateLimits::from_config(&config)?;

    let store: Arc<dyn LeaveStore> = Arc::new(MySqlLeaveStore::new(pool.clone()));
    let leaves = Data::new(LeaveReconciler::new(
        store.clone(),
        Arc::new(SystemClock),
        config.balance_year_policy,
    ));

    let retry_worker = BalanceRetryWorker::new(
        store,
        config.balance_retry_max_attempts,
        Duration::from_secs(config.balance_retry_interval_secs.max(1)),
    );
    actix_web::rt::spawn(retry_worker.run());

    let server_addr = config.server_addr.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(config.clone()))
            .app_data(leaves.clone())
            // Configure auth + protected routes with rate limiting
            .configure(|cfg| routes::configure(cfg, &config, &limits))
    })
    .bind(server_addr)?
    .run()
    .await?;

    Ok(())
}
