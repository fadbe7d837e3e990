use anyhow::Result;
use record_store::{
    AppConfig, AppState, RecordService, routes,
    services::{backend, object_store},
};
use std::io::ErrorKind;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting record-store with config: {:?}", cfg);

    // --- Open the record backend; the schema is created on the write target ---
    let records = backend::open(&cfg.database).await?;
    let backend_kind = records.kind();

    // --- Handle migration mode ---
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core service ---
    let objects = object_store::open(&cfg.objects).await?;
    let service = RecordService::new(records, objects);
    let state = AppState::new(service, cfg.server_number.as_str(), cfg.port);

    // --- Build router ---
    let app = routes(state, cfg.max_upload_bytes);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!(
        "Server listening on http://{} (server #{}, backend={})",
        listener.local_addr()?,
        cfg.server_number,
        backend_kind
    );
    axum::serve(listener, app).await?;

    Ok(())
}
