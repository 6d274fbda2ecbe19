use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use clap::Parser;
use log::{info, warn};
use tracing_actix_web::TracingLogger;

use cometgate::config::app::config_services;
use cometgate::config::settings::Settings;
use cometgate::constants;
use cometgate::services::callback::CallbackClient;
use cometgate::services::session_pool::SessionPool;
use cometgate::services::shutdown::ShutdownCoordinator;
use cometgate::services::stats::Stats;
use cometgate::utils::logger::init_logging;
use cometgate::utils::session_key::SessionKeyGen;

#[derive(Parser, Debug)]
#[command(name = "cometgate", version, about = "WebSocket fan-out gateway")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "config.yml")]
    config: PathBuf,

    /// Listen port; overrides the configuration file
    #[arg(long)]
    port: Option<u16>,

    /// Unix-domain socket path; overrides the configuration file
    #[arg(long, conflicts_with = "port")]
    sock: Option<String>,

    /// Log level: debug, info, warn, or error
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let mut settings = Settings::from_file(&cli.config)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    if let Some(port) = cli.port {
        settings.port = port;
        settings.sock = None;
    }
    if let Some(sock) = cli.sock {
        settings.sock = Some(sock);
    }

    let pool = Arc::new(SessionPool::new());
    let stats = Arc::new(Stats::new());
    let keygen = SessionKeyGen::new(
        settings.endpoint(),
        settings.session_key_secret.as_deref(),
    );

    let server = {
        let settings = settings.clone();
        let pool = Arc::clone(&pool);
        let stats = Arc::clone(&stats);
        let keygen = keygen.clone();
        HttpServer::new(move || {
            // awc clients are runtime-local, one per worker
            let client = CallbackClient::new(Arc::new(settings.clone()));
            App::new()
                .wrap(TracingLogger::default())
                .app_data(web::Data::new(settings.clone()))
                .app_data(web::Data::from(Arc::clone(&pool)))
                .app_data(web::Data::from(Arc::clone(&stats)))
                .app_data(web::Data::new(client))
                .app_data(web::Data::new(keygen.clone()))
                .configure(config_services)
        })
        .workers(num_cpus::get())
        .shutdown_timeout(constants::SHUTDOWN_TIMEOUT_SECS)
        .disable_signals()
    };

    let server = match &settings.sock {
        Some(sock) => {
            info!("cometgate starts listen and serve on {}", sock);
            server.bind_uds(sock)?
        }
        None => {
            info!("cometgate starts listen and serve on port {}", settings.port);
            server.bind(("0.0.0.0", settings.port))?
        }
    };
    let server = server.run();
    let server_handle = server.handle();

    let coordinator = ShutdownCoordinator::new(pool, stats);
    actix_web::rt::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received, draining sessions");
        // stop accepting before the drain so no new sessions slip in
        server_handle.pause().await;
        coordinator
            .shutdown(Duration::from_secs(constants::SHUTDOWN_TIMEOUT_SECS))
            .await;
        server_handle.stop(true).await;
    });

    server.await
}

async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!("cannot install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}
