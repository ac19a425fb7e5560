//! CLI command implementations

use crate::output::format_output;
use crate::SourceArgs;
use console::style;
use duet_core::{
    ActivityLifecycleBinder, ContentType, CoordinatorConfig, DrmParams, HttpDrmSessionManager,
    LifecycleBoundary, LifecycleSignal, MediaSourceResolver, PlatformCapabilities,
    PlaybackRequest, RevealState, SecureSurfacePolicy, SimProfile, SimulatedPipelineFactory,
    TracingSurface,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info};
use url::Url;

/// Timeout for license server round trips
const LICENSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Signals a host sends when the activity comes to the foreground
const TO_FOREGROUND: [LifecycleSignal; 2] = [LifecycleSignal::Start, LifecycleSignal::Resume];

/// Signals a host sends when the activity leaves the foreground
const TO_BACKGROUND: [LifecycleSignal; 2] = [LifecycleSignal::Pause, LifecycleSignal::Stop];

/// Options of the `run` command
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub threshold_ms: Option<u64>,
    pub duration: u64,
    pub overlay_stall_after_ms: Option<u64>,
    pub single_window: bool,
    /// (seconds until background, seconds spent in background)
    pub suspend: Option<(u64, u64)>,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    boundary: LifecycleBoundary,
    foreground_intervals: u64,
    reveal_threshold_ms: u64,
    revealed_after_ms: Option<u64>,
    warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ResolveReport {
    locator: String,
    content_type: ContentType,
    drm_scheme: Option<String>,
    drm_system_id: Option<String>,
    license_url: Option<String>,
    lifecycle_boundary: LifecycleBoundary,
    warnings: Vec<String>,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<CoordinatorConfig> {
    match path {
        Some(path) => Ok(CoordinatorConfig::load(path)?),
        None => Ok(CoordinatorConfig::default()),
    }
}

fn capabilities(source: &SourceArgs, multi_window: bool) -> PlatformCapabilities {
    PlatformCapabilities {
        secure_surface: !source.no_secure_surface,
        drm: !source.no_drm,
        multi_window,
    }
}

/// Accept a URL or a path to a local file
fn parse_locator(raw: &str) -> anyhow::Result<Url> {
    if let Ok(url) = Url::parse(raw) {
        return Ok(url);
    }
    let path = std::fs::canonicalize(raw)?;
    Url::from_file_path(&path)
        .map_err(|_| anyhow::anyhow!("Not a URL or local file: {}", raw))
}

fn playback_request(source: &SourceArgs) -> anyhow::Result<PlaybackRequest> {
    let locator = source.locator.as_deref().map(parse_locator).transpose()?;
    let drm = match (&source.drm_scheme, &source.drm_license_url) {
        (Some(scheme), Some(license_url)) => Some(DrmParams::new(scheme.as_str(), license_url.as_str())),
        _ => None,
    };

    Ok(PlaybackRequest {
        locator,
        type_hint: source.extension.clone(),
        drm,
    })
}

/// Play through one or more foreground intervals on the simulated engine
pub async fn run(source: &SourceArgs, options: RunOptions, format: &str) -> anyhow::Result<()> {
    let mut config = load_config(source.config.as_ref())?;
    if let Some(threshold_ms) = options.threshold_ms {
        config.reveal_threshold_ms = threshold_ms;
    }
    let reveal_threshold_ms = config.reveal_threshold_ms;

    let overlay_profile = SimProfile {
        stall_after_ms: options.overlay_stall_after_ms,
        ..SimProfile::clip()
    };
    let factory = Arc::new(SimulatedPipelineFactory::new(SimProfile::default(), overlay_profile));
    let drm = Arc::new(HttpDrmSessionManager::new(LICENSE_TIMEOUT)?);

    let mut binder = ActivityLifecycleBinder::new(
        config,
        capabilities(source, !options.single_window),
        factory,
        drm,
        Box::new(TracingSurface::new()),
    )?
    .with_request(playback_request(source)?);
    let boundary = binder.boundary();

    info!(duration_s = options.duration, ?boundary, suspend = ?options.suspend, "Starting run");
    println!("Running for {}s ({:?} boundary)", options.duration, boundary);

    let (signal_tx, signal_rx) = mpsc::channel(8);
    let (warning_tx, mut warning_rx) = mpsc::unbounded_channel::<duet_core::ResolveWarning>();
    let mut reveal_rx = binder.subscribe_reveal();

    let script = tokio::spawn(drive_signals(signal_tx, options.duration, options.suspend));

    let warnings = tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Some(warning) = warning_rx.recv().await {
            eprintln!("{} {}", style("warning:").yellow().bold(), warning);
            seen.push(warning.to_string());
        }
        seen
    });

    let watcher = tokio::spawn(async move {
        let started = Instant::now();
        let mut revealed_after = None;
        while reveal_rx.changed().await.is_ok() {
            let state = *reveal_rx.borrow_and_update();
            let elapsed = started.elapsed();
            println!(
                "[{:>8.3}s] overlay {}",
                elapsed.as_secs_f64(),
                style(state).cyan()
            );
            if state == RevealState::Revealed && revealed_after.is_none() {
                revealed_after = Some(elapsed.as_millis() as u64);
            }
        }
        revealed_after
    });

    binder.run(signal_rx, warning_tx).await;
    script.await?;

    let foreground_intervals = binder.generation();
    // Closes the reveal channel so the watcher finishes
    drop(binder);

    let summary = RunSummary {
        boundary,
        foreground_intervals,
        reveal_threshold_ms,
        revealed_after_ms: watcher.await?,
        warnings: warnings.await?,
    };

    println!("\nRun Summary:");
    println!("{}", format_output(&summary, format));

    if foreground_intervals == 0 {
        anyhow::bail!("Playback never started");
    }
    Ok(())
}

/// Host stand-in: foreground now, optional round trip to background, then leave
async fn drive_signals(
    tx: mpsc::Sender<LifecycleSignal>,
    duration: u64,
    suspend: Option<(u64, u64)>,
) {
    let deadline = Instant::now() + Duration::from_secs(duration);

    if !send_all(&tx, &TO_FOREGROUND).await {
        return;
    }

    if let Some((at, away)) = suspend {
        if at < duration {
            sleep(Duration::from_secs(at)).await;
            println!("-- background for {}s", away);
            if !send_all(&tx, &TO_BACKGROUND).await {
                return;
            }
            sleep(Duration::from_secs(away)).await;
            println!("-- foreground");
            if !send_all(&tx, &TO_FOREGROUND).await {
                return;
            }
        }
    }

    sleep_until(deadline).await;
    send_all(&tx, &TO_BACKGROUND).await;
}

async fn send_all(tx: &mpsc::Sender<LifecycleSignal>, signals: &[LifecycleSignal]) -> bool {
    for signal in signals {
        debug!(?signal, "Sending lifecycle signal");
        if tx.send(*signal).await.is_err() {
            return false;
        }
    }
    true
}

/// Resolve a locator without creating any session
pub fn resolve(source: &SourceArgs, strict: bool, format: &str) -> anyhow::Result<()> {
    let config = load_config(source.config.as_ref())?;
    let capabilities = capabilities(source, true);
    let policy = if strict {
        SecureSurfacePolicy::Fail
    } else {
        config.secure_surface_policy
    };

    let request = playback_request(source)?;
    let locator = request
        .locator
        .clone()
        .unwrap_or_else(|| config.default_primary_locator.clone());

    let resolver = MediaSourceResolver::new(capabilities, policy);
    let resolved = resolver.resolve(&locator, request.type_hint.as_deref(), request.drm.as_ref())?;

    let drm = resolved.config.drm.as_ref();
    let report = ResolveReport {
        locator: locator.to_string(),
        content_type: resolved.config.content_type,
        drm_scheme: drm.map(|d| d.scheme.to_string()),
        drm_system_id: drm.map(|d| d.scheme.system_id().to_string()),
        license_url: drm.map(|d| d.license_url.to_string()),
        lifecycle_boundary: capabilities.lifecycle_boundary(),
        warnings: resolved.warnings.iter().map(|w| w.to_string()).collect(),
    };

    for warning in &report.warnings {
        eprintln!("{} {}", style("warning:").yellow().bold(), warning);
    }
    println!("{}", format_output(&report, format));
    Ok(())
}

/// Print the configuration that `run` would use
pub fn config(path: Option<PathBuf>, format: &str) -> anyhow::Result<()> {
    let config = load_config(path.as_ref())?;
    config.validate()?;

    match format {
        "text" => println!("{}", config.to_json()?),
        other => println!("{}", format_output(&config, other)),
    }
    Ok(())
}
