use std::{net::SocketAddr, sync::Arc};

use axum::Router;
use common::utils::{logging::init_logging, shutdown::shutdown_signal};
use configs::{AppConfig, StorageBackend};
use dotenvy::dotenv;
use migration::MigratorTrait;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use service::provisioner::HttpProvisioner;
use service::repo::{FileEntityStore, SeaOrmEntityStore};
use service::repository::EntityStore;

use crate::errors::StartupError;
use crate::routes;
use crate::state::ServerState;

fn build_cors() -> CorsLayer {
    CorsLayer::very_permissive()
}

/// `config.toml` (or `CONFIG_PATH`); defaults plus env vars only when that file does not exist.
pub fn load_config() -> Result<AppConfig, StartupError> {
    load_config_from(&configs::config_path())
}

pub fn load_config_from(path: &str) -> Result<AppConfig, StartupError> {
    if !std::path::Path::new(path).exists() {
        warn!(path, "config file not found, using defaults and environment");
    }
    AppConfig::load_from(path).map_err(|e| StartupError::InvalidConfig(e.to_string()))
}

/// Open the configured entity store; Postgres is migrated before use.
pub async fn build_store(cfg: &AppConfig) -> Result<Arc<dyn EntityStore>, StartupError> {
    match cfg.storage.backend {
        StorageBackend::File => {
            common::env::ensure_data_dir(&cfg.storage.data_dir).await?;
            let store = FileEntityStore::open(&cfg.storage.data_dir)
                .await
                .map_err(|e| StartupError::Storage(e.to_string()))?;
            Ok(store)
        }
        StorageBackend::Postgres => {
            let db = models::db::connect_with_config(&cfg.database).await?;
            migration::Migrator::up(&db, None)
                .await
                .map_err(|e| StartupError::Storage(e.to_string()))?;
            Ok(Arc::new(SeaOrmEntityStore::new(db)))
        }
    }
}

/// Public entry: build the app and run the HTTP server until a shutdown signal.
pub async fn run() -> anyhow::Result<()> {
    dotenv().ok();
    let cfg = load_config()?;
    init_logging(&cfg.server.log_format);

    let store = build_store(&cfg).await?;
    let provisioner = Arc::new(HttpProvisioner::from_config(&cfg.provisioner).map_err(|e| StartupError::InvalidConfig(e.to_string()))?);
    let state = ServerState::new(store, provisioner, &cfg.provisioner.environment);

    let app: Router = routes::build_router(state, build_cors());

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port).parse()?;
    info!(%addr, backend = ?cfg.storage.backend, environment = %cfg.provisioner.environment, "starting broker");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    info!("broker stopped");
    Ok(())
}
