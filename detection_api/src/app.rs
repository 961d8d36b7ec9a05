use crate::{
    config::Settings,
    detector::PersonDetector,
    model::OrtBackend,
    render::BoxRenderer,
    server::{HttpServer, SharedState},
};
use std::sync::Arc;
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Settings) -> anyhow::Result<()> {
    // A missing model is logged, not fatal; it surfaces per-request as a
    // 500 until the process restarts with the model in place.
    let detector = match OrtBackend::load(&config.model.model_path()) {
        Ok(backend) => {
            tracing::info!(
                model = %config.model.model_path().display(),
                "detection model loaded"
            );
            Some(Arc::new(PersonDetector::new(
                Box::new(backend),
                config.model.input_size,
            )))
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to load detection model, serving without it");
            None
        }
    };

    let state = SharedState {
        detector,
        renderer: Arc::new(BoxRenderer::new()),
        input_size: config.model.input_size,
    };

    let server = HttpServer::new(state, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_handle = server.run(shutdown_tx.subscribe()).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    let _ = server_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
