//! # Config Loader
//!
//! Session configuration loading.
//!
//! Responsibilities:
//! - Parse TOML/JSON session files
//! - Validate them
//! - Produce a `SessionConfig` (synchronizer settings, preset, simulated devices)
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let session = ConfigLoader::load_from_path(Path::new("session.toml")).unwrap();
//! println!("streams: {}", session.stream_count());
//! ```

mod parser;
mod validator;

pub use contracts::SessionConfig;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a session file
    ///
    /// The format is taken from the extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<SessionConfig, ContractError> {
        let format = Self::detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load a session from a string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<SessionConfig, ContractError> {
        let session = parser::parse(content, format)?;
        validator::validate(&session)?;
        Ok(session)
    }

    /// Run the validation rules on an already built session
    pub fn validate(session: &SessionConfig) -> Result<(), ContractError> {
        validator::validate(session)
    }

    pub fn to_toml(session: &SessionConfig) -> Result<String, ContractError> {
        toml::to_string_pretty(session)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    pub fn to_json(session: &SessionConfig) -> Result<String, ContractError> {
        serde_json::to_string_pretty(session)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }

    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use contracts::MatcherPreset;

    const SESSION_TOML: &str = r#"
preset = "di_c"
duration_ms = 3000.0

[sync]
staleness_ms = 1000.0
queue_capacity = 4

[[devices]]
id = "cam"

[[devices.streams]]
stream_type = "depth"
fps = 30

[[devices.streams]]
stream_type = "infrared"
index = 1
fps = 30

[[devices.streams]]
stream_type = "color"
fps = 30
start_ms = 5.0

[[devices.streams.silence]]
from_ms = 1000.0
to_ms = 2200.0
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(SESSION_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let session = result.unwrap();
        assert_eq!(session.preset, MatcherPreset::DiC);
        assert_eq!(session.sync.queue_capacity, 4);
        assert_eq!(session.stream_count(), 3);
        assert_eq!(session.devices[0].streams[2].silence.len(), 1);
    }

    #[test]
    fn test_round_trip_toml() {
        let session = ConfigLoader::load_from_str(SESSION_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&session).unwrap();
        let reloaded = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(reloaded.preset, session.preset);
        assert_eq!(reloaded.sync, session.sync);
        assert_eq!(reloaded.stream_count(), session.stream_count());
    }

    #[test]
    fn test_round_trip_json() {
        let session = ConfigLoader::load_from_str(SESSION_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&session).unwrap();
        let reloaded = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(reloaded.devices[0].id, session.devices[0].id);
        assert_eq!(reloaded.duration_ms, 3000.0);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
[[devices]]
id = "cam"

[[devices.streams]]
stream_type = "depth"
fps = 30

[[devices.streams]]
stream_type = "depth"
fps = 60
"#;
        let result = ConfigLoader::load_from_str(content, ConfigFormat::Toml);
        assert!(result.unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(SESSION_TOML.as_bytes()).unwrap();

        let session = ConfigLoader::load_from_path(file.path()).unwrap();
        assert_eq!(session.devices[0].id, "cam");
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        let err = ConfigLoader::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::load_from_path(Path::new("/nonexistent/session.toml")).unwrap_err();
        assert!(matches!(err, ContractError::Io(_)));
    }
}
