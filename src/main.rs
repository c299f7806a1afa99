use actix_web::{web, App, HttpServer};
use clap::Parser;
use ragchat::cli::{commands::{Cli, Commands}, run_cli};
use ragchat::config::AppConfig;
use ragchat::db;
use ragchat::gateway::GatewayFactory;
use ragchat::storage::FileStore;
use tracing::{error, info};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Serve) {
        if let Err(e) = run_cli(cli.command, cli.config).await {
            error!("{}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    info!("Starting ragchat server...");

    let config = match AppConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let db_pool = match db::get_connection(&config.database) {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let store = match FileStore::open(&config.storage, db_pool) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open file store: {}", e);
            std::process::exit(1);
        }
    };

    let gateway = match GatewayFactory::create_default(&config) {
        Some(g) => g,
        None => {
            error!(
                "Failed to initialize RAG gateway '{}' from configuration",
                config.gateway.provider
            );
            std::process::exit(1);
        }
    };
    info!("Using {} gateway", gateway.name());

    let host = config.server.host.clone();
    let port = config.server.port;
    let upload_limit = usize::try_from(store.max_bytes()).unwrap_or(usize::MAX);

    info!("Server listening on {}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(gateway.clone()))
            .app_data(ragchat::api::files::multipart_config(upload_limit))
            .configure(ragchat::api::configure)
    })
    .bind((host, port))?
    .run()
    .await
}
