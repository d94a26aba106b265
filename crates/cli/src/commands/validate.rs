//! `validate` command implementation.

use std::collections::HashSet;

use anyhow::{Context, Result};
use contracts::{SessionConfig, StreamId};
use serde::Serialize;
use sync_engine::PresetMatcherFactory;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<SessionSummary>,
}

#[derive(Serialize)]
struct SessionSummary {
    version: String,
    preset: String,
    device_count: usize,
    stream_count: usize,
    duration_ms: f64,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating session");

    let result = validate_session(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Session validation failed")
    }
}

fn validate_session(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(session) => {
            let warnings = collect_warnings(&session);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(SessionSummary {
                    version: format!("{:?}", session.version),
                    preset: session.preset.as_str().to_string(),
                    device_count: session.devices.len(),
                    stream_count: session.stream_count(),
                    duration_ms: session.duration_ms,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Non-fatal issues
fn collect_warnings(session: &SessionConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    for device in &session.devices {
        let streams: Vec<StreamId> = device
            .streams
            .iter()
            .map(|s| StreamId::new(device.id.clone(), s.stream_type, s.index))
            .collect();

        let matched: HashSet<StreamId> = PresetMatcherFactory::new(session.preset, streams.clone())
            .build()
            .map(|spec| spec.streams().into_iter().collect())
            .unwrap_or_default();

        if matched.is_empty() {
            warnings.push(format!(
                "Device '{}' has no stream matched by preset '{}' - every frame is passed through",
                device.id,
                session.preset.as_str()
            ));
            continue;
        }

        for stream in streams.iter().filter(|s| !matched.contains(*s)) {
            warnings.push(format!("Stream {stream} is not part of the preset and is passed through"));
        }

        for config in &device.streams {
            for window in &config.silence {
                if window.from_ms >= session.duration_ms {
                    warnings.push(format!(
                        "Silence window [{}, {}) of {}/{}#{} starts after the session ends",
                        window.from_ms, window.to_ms, device.id, config.stream_type, config.index
                    ));
                } else if window.to_ms - window.from_ms >= session.sync.staleness_ms {
                    warnings.push(format!(
                        "Silence window [{}, {}) of {}/{}#{} outlasts the staleness budget - the stream will be pruned",
                        window.from_ms, window.to_ms, device.id, config.stream_type, config.index
                    ));
                }
            }
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Session is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Preset: {}", summary.preset);
            println!("  Devices: {}", summary.device_count);
            println!("  Streams: {}", summary.stream_count);
            println!("  Duration: {} ms", summary.duration_ms);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Session is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
