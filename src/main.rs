use std::fs::OpenOptions;
use std::sync::Arc;

use keyspace_syncer::storage::init_sled_db;
use keyspace_syncer::storage::SledStore;
use keyspace_syncer::upstream::RespClient;
use keyspace_syncer::Error;
use keyspace_syncer::LogConfig;
use keyspace_syncer::NetworkError;
use keyspace_syncer::Result;
use keyspace_syncer::Syncer;
use keyspace_syncer::SyncerConfig;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let mut settings = SyncerConfig::new()?;
    if let Some(path) = std::env::args().nth(1) {
        settings = settings.with_override_config(&path)?;
    }
    let settings = settings.validate()?;

    // Initializing Logs
    let _guard = init_observability(&settings.log)?;
    info!(?settings, "configuration loaded");

    // Initializing Shutdown Signal
    let (graceful_tx, mut graceful_rx) = watch::channel(());

    let db = init_sled_db(&settings.storage)?;
    let store = Arc::new(SledStore::new(db)?);

    let syncer = Syncer::start(&settings, store, |c| RespClient::new(c.clone()))
        .await
        .inspect_err(|e| error!("start syncer failed: {:?}", e))?;

    info!("Application started. Waiting for shutdown signal...");
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    if graceful_rx.changed().await.is_err() {
        warn!("signal handler exited without a shutdown request");
    }

    if let Err(e) = syncer.stop().await {
        error!("syncer stop: {:?}", e);
    }

    println!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = listen(SignalKind::interrupt())?;
    let mut sigterm = listen(SignalKind::terminate())?;
    let mut sigquit = listen(SignalKind::quit())?;
    let mut sighup = listen(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("SIGINT detected.");
                break;
            },
            _ = sigterm.recv() => {
                info!("SIGTERM detected.");
                break;
            },
            _ = sigquit.recv() => {
                info!("SIGQUIT detected.");
                break;
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C detected.");
                break;
            },
            _ = sighup.recv() => {
                info!("SIGHUP ignored.");
            },
        }
    }

    info!("Shutdown server..");
    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        NetworkError::SignalSendFailed(format!("Failed to send shutdown signal: {}", e))
    })?;
    Ok(())
}

fn listen(kind: SignalKind) -> Result<tokio::signal::unix::Signal> {
    signal(kind).map_err(|e| Error::Fatal(format!("install signal handler {:?}: {}", kind, e)))
}

pub fn init_observability(log: &LogConfig) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&log.log_dir)
        .map_err(|e| Error::Fatal(format!("create log dir {:?}: {}", log.log_dir, e)))?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log.file_path())
        .map_err(|e| Error::Fatal(format!("open log file {:?}: {}", log.file_path(), e)))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}
