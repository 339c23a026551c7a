mod meter;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use nerdisco_core::{audio::device::list_input_devices, PipelineCoordinator};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};

use settings::{default_settings_path, load_settings, save_settings, AppSettings};

/// Live audio level and octave spectrum meter.
#[derive(Debug, Parser)]
#[command(name = "nerdisco", version, about)]
struct Cli {
    /// Settings file (JSON). Defaults to the user data directory.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Input device name, overriding the settings file.
    #[arg(long)]
    device: Option<String>,

    /// List input devices and exit.
    #[arg(long)]
    list_devices: bool,

    /// Write a settings file with default values and exit.
    #[arg(long)]
    write_default_settings: bool,

    /// Print every level/spectrum event as a JSON line instead of the meter.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("nerdisco=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);

    if cli.write_default_settings {
        save_settings(&settings_path, &AppSettings::default())
            .with_context(|| format!("writing {}", settings_path.display()))?;
        info!(settings_path = %settings_path.display(), "default settings written");
        return Ok(());
    }

    if cli.list_devices {
        for device in list_input_devices() {
            println!(
                "{}{}{}",
                device.name,
                if device.is_default { "  (default)" } else { "" },
                if device.is_loopback_like { "  (loopback)" } else { "" },
            );
        }
        return Ok(());
    }

    let mut app_settings = load_settings(&settings_path);
    if let Some(device) = cli.device {
        app_settings.capture_device = Some(device);
        app_settings.normalize();
    }
    info!(
        settings_path = %settings_path.display(),
        capture_device = ?app_settings.capture_device,
        pipeline = ?app_settings.pipeline,
        "settings loaded"
    );

    // ── Pipeline ──────────────────────────────────────────────────────────
    let coordinator = Arc::new(PipelineCoordinator::new(app_settings.pipeline.clone()));
    spawn_status_logger(coordinator.subscribe_status());

    coordinator.start().context("starting analysis pipeline")?;
    let format = match coordinator.start_capture(app_settings.capture_device.as_deref()) {
        Ok(format) => format,
        Err(e) => {
            let _ = coordinator.stop();
            return Err(e).context("opening capture device");
        }
    };
    info!(?format, "capturing, press Ctrl-C to stop");

    if cli.json {
        spawn_json_forwarder(coordinator.subscribe_levels());
        spawn_json_forwarder(coordinator.subscribe_spectrum());
    } else {
        spawn_meter(
            Arc::clone(&coordinator),
            Duration::from_millis(app_settings.meter_interval_ms),
        );
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("shutting down");

    let stopper = Arc::clone(&coordinator);
    tokio::task::spawn_blocking(move || stopper.stop())
        .await
        .context("joining pipeline shutdown")??;

    let snap = coordinator.diagnostics_snapshot();
    info!(
        buffers_in = snap.buffers_in,
        buffers_dropped = snap.buffers_dropped,
        empty_frames = snap.empty_frames,
        analysis_resets = snap.analysis_resets,
        level_events = snap.level_events,
        spectrum_events = snap.spectrum_events,
        "session summary"
    );
    Ok(())
}

fn spawn_status_logger(mut status_rx: broadcast::Receiver<nerdisco_core::CoordinatorStatusEvent>) {
    tokio::spawn(async move {
        loop {
            match status_rx.recv().await {
                Ok(event) => match event.detail {
                    Some(detail) => warn!(status = ?event.status, %detail, "pipeline status"),
                    None => info!(status = ?event.status, "pipeline status"),
                },
                Err(RecvError::Lagged(n)) => warn!("status receiver lagged by {n} events"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn spawn_json_forwarder<T>(mut rx: broadcast::Receiver<T>)
where
    T: Clone + Serialize + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => error!("serialize event: {e}"),
                },
                Err(RecvError::Lagged(n)) => warn!("event receiver lagged by {n} events"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn spawn_meter(coordinator: Arc<PipelineCoordinator>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        let mut last_seq = None;
        loop {
            ticker.tick().await;
            let latest = coordinator.latest();
            if last_seq == Some(latest.seq) {
                continue;
            }
            if let Some(line) = meter::render_snapshot(&latest) {
                last_seq = Some(latest.seq);
                println!("{line}");
            }
        }
    });
}
