use actix_web::{middleware, web, App, HttpServer};
use chrono::Utc;
use color_eyre::eyre::{Report, WrapErr};
use dotenv::dotenv;
use polls_server::{
    config::Config,
    db::{postgres::PgStore, PollStore},
    log,
    managers::memory::MemoryStore,
    server::{self, AppState},
    services::{admin::AdminService, audit::TracingAuditSink},
};
use std::sync::Arc;
use tracing::info;

async fn open_store(config: &Config) -> Result<Arc<dyn PollStore>, Report> {
    match &config.database_url {
        Some(database_url) => {
            let store = PgStore::connect(database_url, config.max_connections)
                .await
                .wrap_err("Unable to connect to database")?;
            store.migrate().await.wrap_err("Unable to migrate database")?;
            Ok(Arc::new(store))
        }
        None => {
            let store: Arc<dyn PollStore> = Arc::new(MemoryStore::new());
            let seeded = AdminService::new(store.clone())
                .seed_demo(Utc::now())
                .await
                .wrap_err("Unable to seed in-memory store")?;
            if let Some(question) = seeded {
                info!(id = %question.id, "Seeded in-memory store with a demo poll");
            }
            Ok(store)
        }
    }
}

#[actix_rt::main]
async fn main() -> Result<(), Report> {
    dotenv().ok();
    log::init()?;
    let config = Config::from_env()?;
    let store = open_store(&config).await?;
    let state = web::Data::new(AppState::new(
        store,
        Arc::new(TracingAuditSink),
        config.enforce_voting_window,
    ));

    info!(address = config.bind_address.as_str(), "Starting HTTP server");
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(server::configure)
    })
    .bind(&config.bind_address)
    .wrap_err_with(|| format!("Unable to bind {}", config.bind_address))?
    .run()
    .await?;
    Ok(())
}
