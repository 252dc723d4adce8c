use crate::annotator::Annotator;
use crate::camera::CameraOpener;
use crate::config::Config;
use crate::prediction::RemoteDetectionService;
use crate::presenter::WatchPresenter;
use crate::server::{HttpServer, SharedState};
use crate::session::{SessionController, SessionSettings};
use crate::telemetry::Metrics;

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::{signal, sync::broadcast};

struct Services {
    controller: Arc<SessionController>,
    presenter: Arc<WatchPresenter>,
    metrics: Arc<Metrics>,
}

async fn build_services(config: &Config) -> anyhow::Result<Services> {
    let metrics = Arc::new(Metrics::new()?);
    let presenter = Arc::new(WatchPresenter::new());
    let annotator = Arc::new(Annotator::from_config(&config.annotator)?);

    let detector = match RemoteDetectionService::connect(&config.detector).await {
        Ok(service) => Arc::new(service),
        Err(e) => {
            tracing::error!("Failed to initialize detection service: {:?}", e);
            return Err(e.into());
        }
    };

    let controller = SessionController::new(
        detector,
        Arc::new(CameraOpener::new(&config.camera)),
        annotator,
        presenter.clone(),
        SessionSettings::from_config(config),
    )
    .with_metrics(metrics.clone());

    Ok(Services {
        controller: Arc::new(controller),
        presenter,
        metrics,
    })
}

/// Detects on a single image, prints the result list and writes the annotated copy.
pub async fn run_image(
    config: Config,
    path: PathBuf,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let services = build_services(&config).await?;
    let output = output.unwrap_or_else(|| annotated_path(&path));

    let controller = services.controller.clone();
    let report = tokio::task::spawn_blocking(move || controller.run(&path)).await??;

    for line in &report.summary {
        println!("{}", line);
    }

    report
        .annotated
        .frame
        .image()
        .save(&output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    tracing::info!("Annotated image written to {}", output.display());

    Ok(())
}

/// Runs the HTTP presenter until a shutdown signal. With `device_index` a camera
/// session is started right away.
pub async fn serve(config: Config, device_index: Option<i32>) -> anyhow::Result<()> {
    let services = build_services(&config).await?;

    let state = SharedState {
        controller: services.controller.clone(),
        presenter: services.presenter.clone(),
        camera_config: config.camera.clone(),
        metrics: services.metrics.clone(),
    };
    let server = HttpServer::new(state, &config.server).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_handle = server.run(shutdown_tx.subscribe()).await?;

    if let Some(device_index) = device_index {
        let controller = services.controller.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || controller.start(device_index)).await? {
            tracing::error!("Camera session not started: {}", e);
        }
    }

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    let controller = services.controller.clone();
    if let Some(end) = tokio::task::spawn_blocking(move || controller.stop_and_wait()).await? {
        tracing::info!("Camera session ended: {:?}", end);
    }
    let _ = server_handle.await;

    Ok(())
}

fn annotated_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    path.with_file_name(format!("{}_annotated.jpg", stem))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
