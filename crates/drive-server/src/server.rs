use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;

use catalog::{CatalogError, Drive};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

pub mod download;
pub mod error;
pub mod files;
pub mod links;

use error::ApiError;

pub struct Server {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    drive: Arc<Drive>,
}

impl Server {
    /// Builds the drive described by `config`, optionally indexes it, and
    /// starts serving on `config.bind`.
    pub async fn start(config: &ServerConfig) -> ServerResult<Self> {
        let drive = Arc::new(Drive::new(&config.drive_root, &config.scratch_dir));
        if config.scan_on_start {
            let scanning = drive.clone();
            let report = tokio::task::spawn_blocking(move || scanning.scan())
                .await
                .map_err(|error| ServerError::Io(std::io::Error::other(error)))?;
            tracing::info!(
                root = %report.root.display(),
                total = report.total,
                errors = report.errors,
                "initial scan complete"
            );
        }

        let state = Arc::new(ServerState {
            drive: drive.clone(),
        });
        let app = router(state, config.max_upload_bytes);
        let listener = TcpListener::bind(&config.bind)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind.clone(),
                source,
            })?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(error) = result {
                tracing::error!(%error, "server stopped");
            }
        });

        Ok(Server {
            addr,
            shutdown: Some(shutdown_tx),
            drive,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown(&mut self) -> ServerResult<()> {
        if let Some(sender) = self.shutdown.take() {
            sender.send(()).map_err(|_| ServerError::Shutdown)
        } else {
            Ok(())
        }
    }

    pub fn drive(&self) -> &Arc<Drive> {
        &self.drive
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

pub(crate) fn router(state: Arc<ServerState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route(
            "/api/v1/files",
            get(files::list_files)
                .patch(files::rename_file)
                .delete(files::delete_file),
        )
        .route("/api/v1/file", get(files::get_file))
        .route("/api/v1/file/root", get(files::root_files))
        .route("/api/v1/files/children", get(files::child_files))
        .route("/api/v1/files/search/:query", get(files::search_files))
        .route("/api/v1/search", get(files::get_file))
        .route("/api/v1/scan", post(files::scan))
        .route(
            "/api/v1/upload",
            post(files::upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/api/v1/download", get(download::download))
        .route("/api/v1/files/otl", get(links::issue_link))
        .route("/otl", get(links::consume_link))
        .route("/otl/ready", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub message: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        message: "All good!",
    })
}

pub(crate) struct ServerState {
    pub(crate) drive: Arc<Drive>,
}

/// Runs filesystem-bound drive work off the async runtime.
pub(crate) async fn blocking<T, F>(state: &ServerState, work: F) -> Result<T, ApiError>
where
    F: FnOnce(&Drive) -> Result<T, CatalogError> + Send + 'static,
    T: Send + 'static,
{
    let drive = state.drive.clone();
    tokio::task::spawn_blocking(move || work(&drive))
        .await
        .map_err(|error| ApiError::internal(format!("drive task failed: {error}")))?
        .map_err(ApiError::from)
}
