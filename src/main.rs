mod auth;
mod catalog;
mod config;
mod db;
mod error;
mod handlers;
mod models;
mod normalize;

use anyhow::Context;
use tower_http::trace::TraceLayer;

use crate::catalog::Catalog;
use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let conn = db::establish_connection(&config.database_path).with_context(|| {
        format!("open database at {}", config.database_path.display())
    })?;
    let catalog = Catalog::new(conn, config.bcrypt_cost)
        .with_session_ttl(chrono::Duration::hours(config.session_ttl_hours));

    let app = handlers::router(catalog).layer(
        TraceLayer::new_for_http()
            .make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method().clone();
                let uri = req.uri().clone();
                tracing::info_span!("http_request", %method, uri = %uri)
            })
            .on_response(
                |res: &axum::http::Response<_>, _latency: std::time::Duration, _span: &tracing::Span| {
                    let status = res.status();
                    if status.is_server_error() {
                        tracing::error!(%status, "response");
                    } else {
                        tracing::info!(%status, "response");
                    }
                },
            ),
    );

    let addr = config.addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, db = %config.database_path.display(), "tubeshelf listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "tubeshelf=debug,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}
