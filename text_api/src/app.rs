use crate::config::Settings;
use crate::routes::api_routes;
use std::error::Error;
use tokio::net::TcpListener;

pub async fn start_app(config: Settings) -> Result<(), Box<dyn Error>> {
    let app = api_routes().into_make_service();

    let addr = config.app.get_address();
    tracing::info!("starting app on {}", &addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
