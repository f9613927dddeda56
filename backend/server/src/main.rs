mod config;
mod handlers;
mod metrics;
mod middleware;
mod query_validation;
mod routes;
mod webhook;

use std::time::Duration;

use actix_cors::Cors;
use actix_web::middleware::{from_fn, Compress};
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use config::Config;
use handlers::AppState;
use metrics::ApiMetrics;
use migration::MigratorTrait;
use portauthority_services::{clair, create_connection, Datastore};

// Client request bodies are limited to 1 MiB
const MAX_BODY_SIZE: usize = 1_048_576;

async fn health(store: web::Data<Datastore>) -> impl Responder {
    if store.ping().await {
        HttpResponse::Ok().finish()
    } else {
        HttpResponse::InternalServerError().finish()
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::load().expect("Failed to load configuration");

    log::info!(
        "Starting Port Authority on port {} (health port {})",
        config.api.port,
        config.api.healthport
    );
    if !config.api.certfile.is_empty() || !config.api.keyfile.is_empty() {
        log::warn!("TLS termination is delegated to the fronting proxy; certfile/keyfile are ignored");
    }

    let db = create_connection(&config.database.options.source)
        .await
        .expect("Failed to connect to database");

    // Schema init is idempotent and seeds the default policy
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to initialize database schema");
    log::info!("Database initialized");

    let store = Datastore::new(db);

    let clair_client = clair::Client::new(
        &config.api.clairurl,
        Duration::from_secs(config.api.clairtimeout),
    )
    .expect("Failed to create clair client");

    let app_state = web::Data::new(AppState {
        store: store.clone(),
        clair: clair_client,
        image_webhook_default_block: config.api.imagewebhookdefaultblock,
        reg_auth: config.api.k8scrawlcredentials.clone(),
        timeout: Duration::from_secs(config.api.timeout),
        metrics: ApiMetrics::new(),
    });

    let api_server = {
        let app_state = app_state.clone();
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_method()
                .allow_any_origin()
                .allow_any_header();

            App::new()
                .wrap(cors)
                .wrap(Compress::default())
                .wrap(from_fn(middleware::instrument))
                .app_data(app_state.clone())
                .app_data(web::JsonConfig::default().limit(MAX_BODY_SIZE))
                .app_data(web::PayloadConfig::new(MAX_BODY_SIZE))
                .configure(routes::configure)
        })
        .bind(("0.0.0.0", config.api.port))?
        .run()
    };

    let health_server = {
        let health_store = web::Data::new(store);
        HttpServer::new(move || {
            App::new()
                .app_data(health_store.clone())
                .route("/health", web::get().to(health))
        })
        .disable_signals()
        .bind(("0.0.0.0", config.api.healthport))?
        .run()
    };

    // In-flight crawls are not cancelled on shutdown; an interrupted crawl
    // leaves its row in a non-terminal status.
    tokio::select! {
        result = api_server => {
            log::info!("main API stopped");
            result
        }
        result = health_server => {
            log::info!("health API stopped");
            result
        }
    }
}
