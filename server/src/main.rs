//! Tomato Leaf Prediction Server
//!
//! HTTP API serving the trained tomato leaf classifier. The model artifact is
//! loaded once at start-up; `POST /predict` classifies a multipart `photo`
//! upload and `GET /health` reports liveness and the label set.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use tomato_leaf::backend::{backend_name, default_device, DefaultBackend};
use tomato_leaf::model::artifact::{artifact_exists, metadata_path, weights_path};
use tomato_leaf::utils::logging::{init_logging, LogConfig, LogLevel};
use tomato_leaf::{BurnClassifier, Classifier};

use crate::state::{AppState, ServerConfig};

/// Tomato Leaf Prediction Server
#[derive(Parser, Debug)]
#[command(name = "tomato-server")]
#[command(version)]
#[command(about = "HTTP prediction API for the tomato leaf disease classifier")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "TOMATO_PORT", default_value = "5000")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Model artifact base path (without extension)
    #[arg(short, long, env = "TOMATO_MODEL", default_value = "output/tomato_model")]
    model: PathBuf,

    /// Include internal error messages in 500 responses
    #[arg(long, env = "TOMATO_EXPOSE_ERRORS")]
    expose_errors: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, env = "TOMATO_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig {
        level: LogLevel::parse(&cli.log_level),
        ..LogConfig::production()
    };
    if let Err(e) = init_logging(&log_config) {
        eprintln!("{}", e);
    }

    let config = ServerConfig {
        host: cli.host,
        port: cli.port,
        model_path: cli.model,
        expose_errors: cli.expose_errors,
    };

    info!("Tomato Leaf Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Backend: {}", backend_name());
    info!("Loading model from {:?}", config.model_path);

    if !artifact_exists(&config.model_path) {
        error!(
            "No model artifact at {:?} (expected {:?} and {:?})",
            config.model_path,
            weights_path(&config.model_path),
            metadata_path(&config.model_path)
        );
        error!("Train a model first with: tomato_leaf train");
        std::process::exit(1);
    }

    let classifier = match BurnClassifier::<DefaultBackend>::load(&config.model_path, default_device()) {
        Ok(classifier) => classifier,
        Err(e) => {
            error!("Failed to load model: {}", e);
            error!("Train a model first with: tomato_leaf train");
            std::process::exit(1);
        }
    };
    info!("Model ready: {} classes [{}]", classifier.labels().len(), classifier.labels().join(", "));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = Arc::new(AppState::new(config, Arc::new(classifier)));
    let app = routes::router(state);

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
