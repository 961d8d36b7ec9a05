use crate::{
    config::Settings, detector::PersonDetector, render::BoxRenderer, routes::api_routes,
};
use axum::Router;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};

/// Read-only context built once at startup and handed to every request.
/// `detector` is `None` when the model failed to load; requests then get a
/// Modelo-no-cargado error while `/health` keeps answering.
#[derive(Clone)]
pub struct SharedState {
    pub detector: Option<Arc<PersonDetector>>,
    pub renderer: Arc<BoxRenderer>,
    pub input_size: u32,
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(state: SharedState, config: &Settings) -> anyhow::Result<Self> {
        let router = Router::new().merge(api_routes()).with_state(state);
        let listener = TcpListener::bind(config.server.get_address()).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx.resubscribe();
            async move {
                let server = axum::serve(listener, router);
                server
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok(())
            }
        });

        Ok(server_handle)
    }
}
