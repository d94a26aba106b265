//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{DeviceConfig, MatcherSpec, SessionConfig, StreamId};
use serde::Serialize;
use sync_engine::PresetMatcherFactory;
use tracing::info;

use crate::cli::InfoArgs;

/// Session info for JSON output
#[derive(Serialize)]
struct SessionInfo {
    version: String,
    preset: String,
    duration_ms: f64,
    devices: Vec<DeviceInfo>,
    sync_settings: SyncInfo,
}

#[derive(Serialize)]
struct DeviceInfo {
    id: String,
    stream_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    streams: Vec<StreamInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    topology: Option<String>,
}

#[derive(Serialize)]
struct StreamInfo {
    stream: String,
    fps: u32,
    start_ms: f64,
    #[serde(skip_serializing_if = "is_zero")]
    drop_every: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    silence: Vec<(f64, f64)>,
}

#[derive(Serialize)]
struct SyncInfo {
    staleness_ms: f64,
    fallback_fps: u32,
    queue_capacity: usize,
    log_frames: bool,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading session info");

    if !args.config.exists() {
        anyhow::bail!("Session file not found: {}", args.config.display());
    }

    let session = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load session from {}", args.config.display()))?;

    if args.json {
        let info = build_session_info(&session, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize session info")?;
        println!("{}", json);
    } else {
        print_session_info(&session, args);
    }

    Ok(())
}

fn build_session_info(session: &SessionConfig, args: &InfoArgs) -> SessionInfo {
    let devices = session
        .devices
        .iter()
        .map(|device| DeviceInfo {
            id: device.id.to_string(),
            stream_count: device.streams.len(),
            streams: if args.streams {
                device
                    .streams
                    .iter()
                    .map(|s| StreamInfo {
                        stream: StreamId::new(device.id.clone(), s.stream_type, s.index)
                            .to_string(),
                        fps: s.fps,
                        start_ms: s.start_ms,
                        drop_every: s.drop_every,
                        silence: s.silence.iter().map(|w| (w.from_ms, w.to_ms)).collect(),
                    })
                    .collect()
            } else {
                Vec::new()
            },
            topology: args
                .topology
                .then(|| device_topology(session, device)),
        })
        .collect();

    let sync = &session.sync;
    SessionInfo {
        version: format!("{:?}", session.version),
        preset: session.preset.as_str().to_string(),
        duration_ms: session.duration_ms,
        devices,
        sync_settings: SyncInfo {
            staleness_ms: sync.staleness_ms,
            fallback_fps: sync.fallback_fps,
            queue_capacity: sync.queue_capacity,
            log_frames: sync.log_frames,
        },
    }
}

/// Matcher sub-tree the preset builds for the device
fn device_topology(session: &SessionConfig, device: &DeviceConfig) -> String {
    let streams = device
        .streams
        .iter()
        .map(|s| StreamId::new(device.id.clone(), s.stream_type, s.index));
    PresetMatcherFactory::new(session.preset, streams)
        .build()
        .map_or_else(|| "(unsynchronized)".to_string(), |spec| render(&spec))
}

fn render(spec: &MatcherSpec) -> String {
    let (tag, children) = match spec {
        MatcherSpec::Identity(id) => return format!("{}#{}", id.stream_type, id.index),
        MatcherSpec::FrameNumber(children) => ("FN", children),
        MatcherSpec::Timestamp(children) => ("TS", children),
    };
    let inner: Vec<String> = children.iter().map(render).collect();
    format!("{tag}[{}]", inner.join(", "))
}

fn print_session_info(session: &SessionConfig, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                     Sync Sim Session                         ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📍 Session");
    println!("   ├─ Version: {:?}", session.version);
    println!("   ├─ Preset: {}", session.preset.as_str());
    println!("   └─ Duration: {} ms", session.duration_ms);

    println!("\n📷 Devices ({})", session.devices.len());
    for (i, device) in session.devices.iter().enumerate() {
        let is_last = i == session.devices.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        println!("   {} {} ({} streams)", prefix, device.id, device.streams.len());

        if args.streams {
            for (j, stream) in device.streams.iter().enumerate() {
                let stream_is_last = j == device.streams.len() - 1 && !args.topology;
                let stream_prefix = if stream_is_last { "└─" } else { "├─" };
                println!(
                    "   {}  {} {}#{} ({} fps, start {} ms)",
                    child_prefix, stream_prefix, stream.stream_type, stream.index, stream.fps, stream.start_ms
                );
            }
        }
        if args.topology {
            println!("   {}  └─ {}", child_prefix, device_topology(session, device));
        }
    }

    let sync = &session.sync;
    println!("\n⚙️  Sync Settings");
    println!("   ├─ Staleness: {} ms", sync.staleness_ms);
    println!("   ├─ Fallback fps: {}", sync.fallback_fps);
    println!("   ├─ Queue capacity: {}", sync.queue_capacity);
    println!("   └─ Log frames: {}", sync.log_frames);

    println!();
}
