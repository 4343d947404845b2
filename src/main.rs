use asset_ingest::config::{AdvancePolicy, IngestConfig, ThumbnailPolicy};
use asset_ingest::create_session;
use asset_ingest::models::PendingFile;
use asset_ingest::services::console::OperatorConsole;
use asset_ingest::services::manifest::{BatchDriver, BatchManifest};
use bytes::Bytes;
use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use tokio::signal;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Preview 3D assets one at a time and submit them to the ingestion endpoint
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Model files (.glb / .gltf), processed in the given order
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Ingestion endpoint (overrides INGEST_ENDPOINT)
    #[arg(long)]
    endpoint: Option<String>,

    /// Accept self-signed certificates from the endpoint
    #[arg(long)]
    insecure: bool,

    /// Take metadata from a JSON manifest instead of the console
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Seconds to wait for a submission before moving on
    #[arg(long)]
    gate_timeout: Option<u64>,

    /// manual | fresh | auto
    #[arg(long)]
    thumbnail_policy: Option<ThumbnailPolicy>,

    /// any | accepted
    #[arg(long)]
    advance_on: Option<AdvancePolicy>,

    /// Write every captured thumbnail into this directory
    #[arg(long)]
    preview_dir: Option<PathBuf>,

    /// Write the run report as JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing with EnvFilter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "asset_ingest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("🚀 Starting asset ingestion...");

    let mut config = IngestConfig::from_env()?;
    if let Some(endpoint) = args.endpoint {
        config.endpoint = endpoint;
    }
    if args.insecure {
        config.accept_invalid_certs = true;
    }
    if let Some(secs) = args.gate_timeout {
        config.gate_timeout_secs = (secs > 0).then_some(secs);
    }
    if let Some(policy) = args.thumbnail_policy {
        config.thumbnail_policy = policy;
    }
    if let Some(policy) = args.advance_on {
        config.advance_on = policy;
    }
    info!(
        "🛰️  Endpoint={}, Viewport={}px @ {}fps, Thumbnail={:?}, Advance={:?}, Decode failure={:?}",
        config.endpoint,
        config.viewport_size,
        config.render_fps,
        config.thumbnail_policy,
        config.advance_on,
        config.on_decode_failure
    );

    // Read and validate the selection, keeping its order
    let max_file_size = config.max_file_size;
    let loaded = futures::future::join_all(
        args.files
            .iter()
            .map(|path| PendingFile::from_path(path, max_file_size)),
    )
    .await;
    let mut files = Vec::with_capacity(loaded.len());
    for (path, result) in args.files.iter().zip(loaded) {
        match result {
            Ok(file) => files.push(file),
            Err(e) => warn!("Excluding {}: {}", path.display(), e),
        }
    }
    if files.is_empty() {
        warn!("No usable model files were selected");
    }

    let session = create_session(config)?;

    // Setup Shutdown Channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let render = tokio::spawn(session.render_worker(shutdown_rx).run());

    if let Some(dir) = args.preview_dir {
        tokio::fs::create_dir_all(&dir).await?;
        let mut captures = session.form.subscribe_captures();
        tokio::spawn(async move {
            while let Ok(payload) = captures.recv().await {
                let path = dir.join(format!("frame-{}-{}.png", payload.frame_seq, payload.fingerprint()));
                match tokio::fs::write(&path, &payload.bytes).await {
                    Ok(()) => info!("🖼️  Preview written to {}", path.display()),
                    Err(e) => error!("Failed to write preview {}: {}", path.display(), e),
                }
            }
        });
    }

    let run_cancel = CancellationToken::new();
    let operator_cancel = CancellationToken::new();

    let operator = match args.manifest {
        Some(path) => {
            let manifest = BatchManifest::load(&path).await?;
            let driver = BatchDriver::new(session.form.clone(), manifest);
            let cancel = operator_cancel.clone();
            tokio::spawn(async move { driver.run(cancel).await })
        }
        None => {
            let console =
                OperatorConsole::new(session.form.clone(), stdin_reader(), tokio::io::stdout());
            let cancel = operator_cancel.clone();
            let run_cancel = run_cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = console.run(cancel).await {
                    error!("Console stopped: {}", e);
                }
                // Leaving the console ends the run
                run_cancel.cancel();
            })
        }
    };

    {
        let run_cancel = run_cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            run_cancel.cancel();
        });
    }

    let report = session.pipeline.run(files, run_cancel).await?;

    operator_cancel.cancel();
    let _ = shutdown_tx.send(true);
    let _ = operator.await;
    let _ = render.await;

    if let Some(path) = args.report {
        tokio::fs::write(&path, serde_json::to_vec_pretty(&report)?).await?;
        info!("📝 Report written to {}", path.display());
    }

    info!(
        "🛑 Done: {} accepted, {} processed, {} not processed{}",
        report.accepted(),
        report.files.len(),
        report.not_processed.len(),
        if report.cancelled { " (cancelled)" } else { "" }
    );
    Ok(())
}

/// Stdin on a detached thread, so a pending read never holds up shutdown
fn stdin_reader() -> impl tokio::io::AsyncBufRead + Unpin {
    let (tx, rx) = tokio::sync::mpsc::channel::<std::io::Result<Bytes>>(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let chunk = line.map(|l| Bytes::from(l + "\n"));
            let failed = chunk.is_err();
            if tx.blocking_send(chunk).is_err() || failed {
                break;
            }
        }
    });
    let lines = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });
    StreamReader::new(Box::pin(lines))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, cancelling the run...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, cancelling the run...");
        },
    }
}
