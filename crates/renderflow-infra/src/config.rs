//! Engine configuration loader.
//!
//! Reads `renderflow.toml` from the given directory and deserializes it
//! into [`EngineConfig`]. Falls back to defaults when the file is missing
//! or malformed, so a bare checkout always runs.

use std::path::Path;

use renderflow_types::config::EngineConfig;

/// Load engine configuration from `{dir}/renderflow.toml`.
///
/// - Missing file: returns `EngineConfig::default()`.
/// - Unreadable or unparseable file: logs a warning and returns defaults.
pub async fn load_engine_config(dir: &Path) -> EngineConfig {
    let config_path = dir.join("renderflow.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("no renderflow.toml at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            EngineConfig::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
