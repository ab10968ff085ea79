//! Engine configuration loader.
//!
//! Reads an `engine.toml` and deserializes it into [`EngineConfig`]. The
//! lenient loader falls back to defaults when the file is missing or
//! malformed; the strict one reports why.

use std::path::Path;

use chainflow_types::config::EngineConfig;
use chainflow_types::error::ConfigError;

/// Load the engine configuration from `path`.
///
/// - Missing file: returns [`EngineConfig::default()`].
/// - Unreadable or malformed file: logs a warning and returns the default.
pub async fn load_engine_config(path: &Path) -> EngineConfig {
    match load_engine_config_strict(path).await {
        Ok(config) => config,
        Err(ConfigError::Read { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            EngineConfig::default()
        }
        Err(err) => {
            tracing::warn!("{err}, using defaults");
            EngineConfig::default()
        }
    }
}

/// Load the engine configuration from `path`, failing on any problem.
pub async fn load_engine_config_strict(path: &Path) -> Result<EngineConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

    toml::from_str::<EngineConfig>(&content).map_err(|err| ConfigError::Parse {
        path: path.display().to_string(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_engine_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_engine_config(&tmp.path().join("engine.toml")).await;
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.log.filter, "info");
    }

    #[tokio::test]
    async fn load_engine_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("engine.toml");
        tokio::fs::write(
            &config_path,
            r#"
default_expiration_ms = 30000
event_wait_timeout_ms = 60000

[log]
filter = "chainflow_core=debug"
json = true
"#,
        )
        .await
        .unwrap();

        let config = load_engine_config(&config_path).await;
        assert_eq!(config.default_expiration_ms, Some(30_000));
        assert_eq!(config.event_wait_timeout_ms, Some(60_000));
        assert_eq!(config.log.filter, "chainflow_core=debug");
        assert!(config.log.json);
        assert!(!config.log.otel);
    }

    #[tokio::test]
    async fn load_engine_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("engine.toml");
        tokio::fs::write(&config_path, "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_engine_config(&config_path).await;
        assert_eq!(config, EngineConfig::default());
    }

    #[tokio::test]
    async fn strict_loader_reports_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = load_engine_config_strict(&tmp.path().join("absent.toml"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[tokio::test]
    async fn strict_loader_reports_parse_errors() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("engine.toml");
        tokio::fs::write(&config_path, "default_expiration_ms = \"soon\"")
            .await
            .unwrap();

        let err = load_engine_config_strict(&config_path).await.unwrap_err();
        match err {
            ConfigError::Parse { path, .. } => assert_eq!(path, config_path.display().to_string()),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
