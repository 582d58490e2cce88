use std::sync::Arc;

use link2video::api::{self, AppState};
use link2video::config::Settings;
use link2video::store::{JsonRecordStore, RecordStore};
use link2video::tools::{Ffmpeg, YtDlp, process};
use link2video::{Error, MediaService, Result, ServiceOptions};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "link2video=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let settings = Settings::from_env();

    for (tool, flag) in [
        (settings.yt_dlp_bin.as_str(), "--version"),
        (settings.ffmpeg_bin.as_str(), "-version"),
    ] {
        if !process::is_available(tool, flag).await {
            warn!("{tool} no responde. Las descargas fallaran hasta que este instalado.");
        }
    }

    let store = Arc::new(JsonRecordStore::open(settings.records_path()).await?);
    let service = MediaService::new(
        Arc::new(YtDlp::new(settings.yt_dlp_bin.clone(), settings.yt_dlp_timeout)),
        Arc::new(Ffmpeg::new(
            settings.ffmpeg_bin.clone(),
            settings.ffmpeg_timeout,
            settings.ffmpeg_preset.clone(),
        )),
        store.clone(),
        ServiceOptions {
            download_dir: settings.download_dir.clone(),
            staging_dir: settings.staging_dir.clone(),
            min_plausible_bytes: settings.min_plausible_bytes,
            max_concurrent_downloads: settings.max_concurrent_downloads,
            stale_staging_after: settings.stale_staging_after,
        },
    );
    service.prepare_dirs().await?;

    let cors = api::build_cors_layer(&settings.allowed_origins)?;
    let app = api::router(
        AppState {
            service: Arc::new(service),
        },
        cors,
    );

    let addr = settings.bind_addr.clone();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| Error::Io {
            operation: "abrir puerto",
            path: addr.clone().into(),
            source,
        })?;

    info!(
        "Backend listo en http://{addr} (descargas en {:?})",
        settings.download_dir
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|source| Error::Io {
            operation: "servidor HTTP",
            path: addr.into(),
            source,
        });

    store.close().await?;
    served
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!("No se pudo escuchar la senal de apagado: {error}");
        std::future::pending::<()>().await;
    }
    info!("Apagando backend");
}
