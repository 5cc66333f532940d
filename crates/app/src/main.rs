use std::sync::Arc;

use client::RestBackend;
use engine::memory::MemoryBackend;

use crate::config::BackendKind;

mod app;
mod commands;
mod config;
mod demo;
mod error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = config::load()?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(format!(
            "tally={level},engine={level},client={level}",
            level = settings.level
        ))
        .init();

    match settings.backend {
        BackendKind::Rest => {
            tracing::info!(base_url = %settings.base_url, "editing remote ledger");
            let backend = RestBackend::new(
                &settings.base_url,
                &settings.api_key,
                settings.access_token.clone(),
            )?;
            app::App::new(Arc::new(backend)).run().await?;
        }
        BackendKind::Memory => {
            tracing::info!("editing in-memory demo ledger");
            let today = chrono::Local::now().date_naive();
            let backend = MemoryBackend::with_snapshot(demo::snapshot(today));
            app::App::new(Arc::new(backend)).run().await?;
        }
    }

    Ok(())
}
