use tracing::info;
use tracing_subscriber::EnvFilter;

use ladder_server::{build_app, Config};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    let db_url =
        std::env::var("LADDER_DATABASE_URL").unwrap_or_else(|_| "sqlite:ladder.db?mode=rwc".to_string());

    let (app, _state) = build_app(&db_url, config).await;

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("0.0.0.0:{}", port);
    info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app).await.expect("Server error");
}
