//! 配置校验模块
//!
//! 校验规则：
//! - 至少一个设备，device id 唯一
//! - 同一设备内 (stream_type, index) 唯一
//! - fps > 0
//! - 静默区间非空且有序
//! - sync.staleness_ms > 0，sync.queue_capacity > 0
//! - duration_ms > 0

use std::collections::HashSet;

use contracts::{ContractError, SessionConfig};

/// Validate a parsed session
///
/// Returns the first error encountered.
pub fn validate(session: &SessionConfig) -> Result<(), ContractError> {
    validate_devices(session)?;
    validate_streams(session)?;
    validate_sync_config(session)?;
    Ok(())
}

fn validate_devices(session: &SessionConfig) -> Result<(), ContractError> {
    if session.devices.is_empty() {
        return Err(ContractError::config_validation(
            "devices",
            "at least one device is required",
        ));
    }

    let mut seen = HashSet::new();
    for device in &session.devices {
        if device.id.is_empty() {
            return Err(ContractError::config_validation(
                "devices[].id",
                "device id cannot be empty",
            ));
        }
        if !seen.insert(&device.id) {
            return Err(ContractError::config_validation(
                format!("devices[id={}]", device.id),
                "duplicate device id",
            ));
        }
    }
    Ok(())
}

fn validate_streams(session: &SessionConfig) -> Result<(), ContractError> {
    for device in &session.devices {
        let mut seen = HashSet::new();
        for stream in &device.streams {
            let field = format!(
                "devices[{}].streams[{}#{}]",
                device.id, stream.stream_type, stream.index
            );

            if !seen.insert((stream.stream_type, stream.index)) {
                return Err(ContractError::config_validation(field, "duplicate stream"));
            }
            if stream.fps == 0 {
                return Err(ContractError::config_validation(
                    format!("{field}.fps"),
                    "fps must be > 0",
                ));
            }

            let mut previous_end = f64::MIN;
            for window in &stream.silence {
                if window.from_ms >= window.to_ms {
                    return Err(ContractError::config_validation(
                        format!("{field}.silence"),
                        format!("window [{}, {}) is empty", window.from_ms, window.to_ms),
                    ));
                }
                if window.from_ms < previous_end {
                    return Err(ContractError::config_validation(
                        format!("{field}.silence"),
                        "windows must be ordered and non-overlapping",
                    ));
                }
                previous_end = window.to_ms;
            }
        }
    }
    Ok(())
}

fn validate_sync_config(session: &SessionConfig) -> Result<(), ContractError> {
    let sync = &session.sync;

    if sync.staleness_ms.is_nan() || sync.staleness_ms <= 0.0 {
        return Err(ContractError::config_validation(
            "sync.staleness_ms",
            format!("staleness_ms must be > 0, got {}", sync.staleness_ms),
        ));
    }
    if sync.queue_capacity == 0 {
        return Err(ContractError::config_validation(
            "sync.queue_capacity",
            "queue_capacity must be > 0",
        ));
    }
    if session.duration_ms.is_nan() || session.duration_ms <= 0.0 {
        return Err(ContractError::config_validation(
            "duration_ms",
            format!("duration_ms must be > 0, got {}", session.duration_ms),
        ));
    }
    Ok(())
}
