use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use webcontrol_proto::config::Config;
use webcontrol_server::headless::{HeadlessImporter, HeadlessPermissions, HeadlessPlayer};
use webcontrol_server::logging::{log_feed, BroadcastLayer};
use webcontrol_server::{ConnectionServer, ContentRoots, DownloadManager, FrameLoop, Host, TaskQueue};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Log feed first so the broadcast layer can be installed with the others
    let logs = log_feed();

    let data_dir = webcontrol_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(BroadcastLayer::new(logs.clone()))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,webcontrol_server=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let roots = Arc::new(ContentRoots::from_config(&config.content));
    for dir in [&roots.videos, &roots.models] {
        if let Err(e) = std::fs::create_dir_all(dir) {
            error!("Could not create {}: {}", dir.display(), e);
        }
    }
    info!(
        "Content roots: videos={} models={}",
        roots.videos.display(),
        roots.models.display()
    );

    let queue: Arc<TaskQueue<Host>> = Arc::new(TaskQueue::new());
    let downloads = Arc::new(DownloadManager::new(&config.downloads, roots.clone())?);

    // The frame thread owns the collaborators for its whole life
    let stop = Arc::new(AtomicBool::new(false));
    let frame_thread = {
        let queue = queue.clone();
        let stop = stop.clone();
        let tick_hz = config.frame.tick_hz;
        std::thread::Builder::new()
            .name("frame".into())
            .spawn(move || {
                let host = Host::new(
                    Box::new(HeadlessPlayer::new()),
                    Box::new(HeadlessImporter::default()),
                    Box::new(HeadlessPermissions),
                );
                FrameLoop::new(queue, host, tick_hz).run(stop);
            })?
    };

    let mut server = ConnectionServer::new(queue, roots, downloads, logs);
    let started = server.start(&config.server.address()).await;

    match &started {
        Ok(addr) => {
            info!("Daemon ready on {}, waiting for Ctrl-C", addr);
            tokio::signal::ctrl_c().await?;
            info!("Shutdown requested");
        }
        Err(e) => error!("Command server failed to start: {}", e),
    }

    server.stop().await;
    stop.store(true, Ordering::Relaxed);
    if frame_thread.join().is_err() {
        error!("Frame thread panicked");
    }

    started.map(|_| ()).map_err(Into::into)
}
