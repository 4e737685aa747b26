use crystal_capture::display::{DisplaySink, LatestFrame, LogDisplay};
use crystal_capture::recorder::CaptureLoop;
use crystal_capture::scheduler;
use crystal_capture::source::{DirectorySource, FrameSource, HttpSnapshotSource};
use crystal_capture_common::config::{
    CaptureConfig, Config, ConfigError, DirectoryPrompt, SourceConfig,
};
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    let stdin_prompt = StdinPrompt;
    let prompt: Option<&dyn DirectoryPrompt> = if std::io::stdin().is_terminal() {
        Some(&stdin_prompt)
    } else {
        None
    };
    let capture_config = match config
        .resolve_data_location(prompt)
        .and_then(|dir| config.capture_config(dir))
    {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid capture configuration");
            std::process::exit(1);
        }
    };

    info!(
        data_location = %capture_config.data_location.display(),
        capture_interval_secs = capture_config.capture_interval.as_secs_f64(),
        min_change_threshold = capture_config.min_change_threshold,
        fetch_timeout_secs = capture_config.fetch_timeout.as_secs_f64(),
        display_policy = ?capture_config.display_policy,
        exposure_time = ?config.camera.exposure_time,
        gain = ?config.camera.gain,
        "starting crystal-capture"
    );

    let (config_tx, config_rx) = watch::channel(capture_config);
    let latest = Arc::new(LatestFrame::new());
    let sinks: Vec<Box<dyn DisplaySink>> = vec![Box::new(LogDisplay), Box::new(Arc::clone(&latest))];
    let display: Arc<dyn DisplaySink> = Arc::new(sinks);

    #[cfg(unix)]
    tokio::spawn(reload_on_hangup(config_path.clone(), config_tx));
    #[cfg(not(unix))]
    let _config_tx = config_tx;

    let code = match &config.source {
        SourceConfig::Http { url, pixel_format } => {
            run(HttpSnapshotSource::new(url.clone(), *pixel_format), config_rx, display).await
        }
        SourceConfig::Directory { path, pixel_format } => {
            run(DirectorySource::new(path.clone(), *pixel_format), config_rx, display).await
        }
    };

    if let Some(last) = latest.current() {
        info!(
            captured_at = %last.captured_at.format("%Y-%m-%d %H:%M:%S"),
            "last displayed frame"
        );
    }
    std::process::exit(code);
}

async fn run<S: FrameSource + 'static>(
    source: S,
    config: watch::Receiver<CaptureConfig>,
    display: Arc<dyn DisplaySink>,
) -> i32 {
    let mut capture = CaptureLoop::new(source, config, display);
    if let Err(e) = capture.open().await {
        error!(error = %e, "failed to open frame source");
        return 1;
    }

    let mut handle = scheduler::start(capture);
    let result = tokio::select! {
        result = handle.join() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            handle.stop();
            handle.join().await
        }
    };

    match result {
        Ok(_) => 0,
        Err(e) => {
            error!(error = %e, "capture run aborted");
            1
        }
    }
}

/// Re-read the config file on SIGHUP and publish a new snapshot. The running
/// loop picks it up at the start of its next tick; a bad file keeps the
/// current settings, and an unset data_location keeps the current directory.
#[cfg(unix)]
async fn reload_on_hangup(path: PathBuf, config_tx: watch::Sender<CaptureConfig>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGHUP, live reload disabled");
            return;
        }
    };

    while hangups.recv().await.is_some() {
        let current = config_tx.borrow().clone();
        match reload(&path, &current) {
            Ok(snapshot) => {
                info!(
                    data_location = %snapshot.data_location.display(),
                    capture_interval_secs = snapshot.capture_interval.as_secs_f64(),
                    min_change_threshold = snapshot.min_change_threshold,
                    "configuration reloaded"
                );
                config_tx.send_replace(snapshot);
            }
            Err(e) => warn!(error = %e, "config reload failed, keeping current settings"),
        }
    }
}

#[cfg(unix)]
fn reload(path: &std::path::Path, current: &CaptureConfig) -> Result<CaptureConfig, ConfigError> {
    Config::load(path)?.reload_capture_config(current)
}

/// Asks for a capture directory on the terminal.
struct StdinPrompt;

impl DirectoryPrompt for StdinPrompt {
    fn prompt_directory(&self) -> Option<PathBuf> {
        eprint!("No capture directory configured and no Desktop found. Directory to save captures in: ");
        std::io::stderr().flush().ok()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).ok()?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    }
}
