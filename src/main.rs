use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use dotenv::dotenv;
use reward_engine::{
    config::Config, database::Database, handlers, metrics, nats::NatsProducer,
    services::RewardService,
};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize tracing
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .json()
        .init();

    info!("Starting Reward Engine...");

    // Load configuration
    let config = Config::from_env().expect("Failed to load configuration");
    config.validate().expect("Invalid configuration");

    info!("Configuration loaded successfully");

    // Initialize database
    let db = Arc::new(
        Database::new(&config.database.url, config.database.max_connections)
            .await
            .expect("Failed to connect to database"),
    );

    info!("Database connected successfully");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(db.pool())
        .await
        .expect("Failed to run database migrations");

    info!("Database migrations applied");

    // Initialize NATS
    let nats = Arc::new(
        NatsProducer::new(&config.nats.url, &config.nats.topic_prefix)
            .await
            .expect("Failed to create NATS producer"),
    );

    info!("NATS producer initialized successfully");

    // Register Prometheus metrics
    metrics::register_metrics(prometheus::default_registry())
        .expect("Failed to register metrics");

    // Initialize service
    let service = Arc::new(RewardService::new(
        db.clone(),
        nats,
        config.registration.forbidden_usernames.clone(),
        config.registration.min_password_length,
    ));

    info!("Reward service initialized successfully");

    // Start HTTP server
    let server_config = config.server.clone();
    let service_data = web::Data::new(service);

    info!(
        "Starting HTTP server on {}:{}",
        server_config.host, server_config.port
    );

    HttpServer::new(move || {
        App::new()
            .app_data(service_data.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(handlers::configure_routes)
    })
    .workers(server_config.workers)
    .bind((server_config.host, server_config.port))?
    .run()
    .await
}
