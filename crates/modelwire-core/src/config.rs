use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

// --- Config ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP shell listens on.
    pub bind: String,
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub max_body_bytes: usize,
    pub layout: LayoutConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "127.0.0.1:58321".to_string(),
            log_filter: "info,tower_http=debug".to_string(),
            max_body_bytes: 1024 * 1024,
            layout: LayoutConfig::default(),
        }
    }
}

/// Request-scoped geometry defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayoutConfig {
    pub frame_margin: f64,
    pub frame_width: f64,
    pub frame_height: f64,
    pub node_width: f64,
    pub node_height: f64,
    pub lane_height: f64,
    pub grid_columns: usize,
    pub grid_spacing_x: f64,
    pub grid_spacing_y: f64,
    pub grid_origin_x: f64,
    pub grid_origin_y: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig {
            frame_margin: 30.0,
            frame_width: 800.0,
            frame_height: 600.0,
            node_width: 160.0,
            node_height: 80.0,
            lane_height: 100.0,
            grid_columns: 4,
            grid_spacing_x: 250.0,
            grid_spacing_y: 220.0,
            grid_origin_x: 100.0,
            grid_origin_y: 100.0,
        }
    }
}

impl LayoutConfig {
    /// Top-left of the `index`-th cell of the auto-layout grid.
    pub fn grid_position(&self, index: usize) -> (f64, f64) {
        let columns = self.grid_columns.max(1);
        (
            (index % columns) as f64 * self.grid_spacing_x + self.grid_origin_x,
            (index / columns) as f64 * self.grid_spacing_y + self.grid_origin_y,
        )
    }
}

// --- Storage ---

/// Resolve the per-user directory (~/.modelwire/).
pub fn modelwire_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".modelwire")
}

/// `$MODELWIRE_CONFIG`, else `~/.modelwire/config.toml`.
pub fn config_path() -> PathBuf {
    match std::env::var_os("MODELWIRE_CONFIG") {
        Some(path) => PathBuf::from(path),
        None => modelwire_dir().join("config.toml"),
    }
}

pub fn parse_config(text: &str, origin: &str) -> Result<Config, ConfigError> {
    toml_edit::de::from_str(text).map_err(|e| ConfigError::Parse {
        path: origin.to_string(),
        message: e.to_string(),
    })
}

/// Load the config file; a missing file yields the defaults.
pub fn read_config() -> Result<Config, ConfigError> {
    let path = config_path();
    if !path.exists() {
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&text, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = parse_config(
            "bind = \"0.0.0.0:9000\"\n[layout]\nframe_margin = 12.5\n",
            "inline",
        )
        .unwrap();
        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.max_body_bytes, 1024 * 1024);
        assert_approx_eq!(f64, config.layout.frame_margin, 12.5);
        assert_eq!(config.layout.grid_columns, 4);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let err = parse_config("bind = [", "broken.toml").unwrap_err();
        assert!(err.to_string().starts_with("malformed config broken.toml"));
    }

    #[test]
    fn grid_wraps_after_configured_columns() {
        let layout = LayoutConfig::default();
        assert_eq!(layout.grid_position(0), (100.0, 100.0));
        assert_eq!(layout.grid_position(3), (850.0, 100.0));
        assert_eq!(layout.grid_position(4), (100.0, 320.0));
    }
}
