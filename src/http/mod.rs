pub mod error;
pub mod handlers;
pub mod state;

pub use state::AppState;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use log::info;
use tower_http::cors::{Any, CorsLayer};

// 导入分块的请求体上限（axum 默认只有 2MB）
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/functions/v1/process-excel", post(handlers::process_excel))
        .route("/api/uploads", get(handlers::list_uploads))
        .route("/api/parcels", post(handlers::save_parcel))
        .route(
            "/api/parcels/:block/:sector/:parcel/trees",
            get(handlers::load_trees),
        )
        .route(
            "/api/parcels/:block/:sector/:parcel/export",
            get(handlers::export_trees),
        )
        .route(
            "/api/parcels/:block/:sector/:parcel/trees/:row/:col/report",
            get(handlers::tree_report),
        )
        .route("/api/reports", get(handlers::all_reports))
        .route("/api/workbooks/parse", post(handlers::parse_workbook_upload))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn serve(bind: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    info!("HTTP 服务已启动: {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
