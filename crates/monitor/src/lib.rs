//! Plate Gate Monitor
//!
//! Wires camera workers, the shared dispatch controller, the operator
//! notifier and the control API into one process.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use camera_capture::CameraError;
use dispatch::{DispatchController, DispatchError, HttpBackend};
use metrics_exporter_prometheus::PrometheusHandle;
use notification::{run_announcer, ChannelNotifier, Notifier};
use plate_tracker::{PauseGate, RecognitionError};
use storage::Repository;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tower_governor::GovernorLayer;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

pub mod config;
pub mod events;
pub mod rate_limit;
pub mod replay;
pub mod reporter;
pub mod routes;
pub mod supervisor;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{LogFormat, LoggingConfig, MonitorConfig};
pub use events::{CommandSender, MonitorCommand, MonitorEvent, MonitorStatus};
pub use replay::ReplayManifest;
pub use reporter::Reporter;
pub use routes::{create_router, AppState};
pub use supervisor::Monitor;
pub use worker::{CameraWorker, SnapshotSettings, WorkerContext, WorkerExit};

/// Monitor error types
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Recognizer error: {0}")]
    Recognizer(#[from] RecognitionError),

    #[error("Dispatch setup failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Supervisor is no longer running")]
    ChannelClosed,
}

impl From<::config::ConfigError> for MonitorError {
    fn from(err: ::config::ConfigError) -> Self {
        MonitorError::Config(err.to_string())
    }
}

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) -> Result<(), MonitorError> {
    let level: Level = config
        .level
        .parse()
        .map_err(|_| MonitorError::Config(format!("invalid log level: {}", config.level)))?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    let result = match config.format {
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    };
    result.map_err(|e| MonitorError::Config(format!("failed to set tracing subscriber: {}", e)))
}

/// Run the control API until `shutdown` flips to true
pub async fn run_server(
    addr: &str,
    router: Router,
    rate_limit: &rate_limit::RateLimitConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), MonitorError> {
    let governor = rate_limit::create_governor_config(rate_limit)?;
    let app = router
        .layer(GovernorLayer { config: governor })
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Starting control API on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| MonitorError::Server(format!("bind {}: {}", addr, e)))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
        })
        .await
        .map_err(|e| MonitorError::Server(e.to_string()))
}

/// Start every configured camera and serve until shutdown
pub async fn run(config: MonitorConfig, metrics: Option<PrometheusHandle>) -> Result<(), MonitorError> {
    let backend = HttpBackend::new(&config.api)?;
    info!("Gate backend: {} ({:?})", backend.url(), config.api.request_mode);

    let controller = DispatchController::new(
        backend,
        config.detection.dispatch_config(config.api.timeout()),
    );
    let gate = PauseGate::new();
    let ledger = Arc::new(Repository::default());

    let (notifier, announcements) = ChannelNotifier::new(config.notification.clone());
    tokio::spawn(run_announcer(announcements));
    let notifier: Arc<dyn Notifier> = Arc::new(notifier);

    let (events, event_rx) = mpsc::unbounded_channel();
    tokio::spawn(events::run_event_log(event_rx));

    let (commands, command_rx) = mpsc::channel(32);
    let mut monitor = Monitor::new(controller.clone(), gate.clone(), Arc::clone(&ledger), command_rx)
        .exit_when_idle(!config.server.enabled);

    let context = WorkerContext {
        controller,
        gate: gate.clone(),
        ledger,
        min_dwell: config.detection.min_dwell(),
        snapshot: SnapshotSettings {
            max_side: config.api.image_max_side,
            quality: config.api.image_quality,
        },
    };

    for camera in &config.cameras {
        let manifest = ReplayManifest::load(&camera.manifest)?;
        let frame_interval = manifest
            .frame_interval()
            .unwrap_or_else(|| camera.camera_config().frame_interval());
        let base_dir = camera
            .manifest
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let (source, recognizer) = manifest.into_parts(base_dir, camera.loop_replay);

        let reporter = Reporter::new(
            camera.id.clone(),
            gate.clone(),
            config.review.pause_on_outcome,
            events.clone(),
            Arc::clone(&notifier),
        );
        monitor.spawn_worker(CameraWorker::new(
            camera.panel,
            source,
            recognizer,
            frame_interval,
            context.clone(),
            reporter,
        ));
    }

    if config.cameras.is_empty() {
        warn!("No cameras configured");
    }

    if config.server.enabled {
        let state = Arc::new(AppState {
            commands: commands.clone(),
            metrics,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        });
        let router = create_router(state);
        let addr = config.server.bind_addr.clone();
        let rate_limit = config.server.rate_limit();
        let shutdown = monitor.shutdown_signal();
        tokio::spawn(async move {
            if let Err(e) = run_server(&addr, router, &rate_limit, shutdown).await {
                tracing::error!("Control API stopped: {}", e);
            }
        });
    }

    let ctrl_c_commands = commands.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            let _ = ctrl_c_commands.send(MonitorCommand::Shutdown).await;
        }
    });

    monitor.run().await;
    Ok(())
}
