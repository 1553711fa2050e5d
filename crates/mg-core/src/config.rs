//! Configuration structures for the model graph.
//!
//! - [`GraphConfig`] - Behaviour of a `ModelGraph` (suspension, validation)
//! - [`LogConfig`] - Logging settings used by the CLI subscriber
//! - [`Config`] - Root configuration combining all settings
//!
//! All configuration types implement [`Default`] and deserialize with
//! `#[serde(default)]`, so partial documents are accepted.

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// What happens to events suppressed by a suspension scope once the last
/// scope on a source is released.
///
/// # Examples
///
/// ```
/// use mg_core::SuspensionMode;
///
/// assert_eq!(SuspensionMode::default(), SuspensionMode::Collapse);
/// assert!(SuspensionMode::Collapse.replays());
/// assert!(!SuspensionMode::Silent.replays());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum SuspensionMode {
    /// Replay a single aggregate `Refreshed` event per source if anything
    /// was suppressed.
    #[default]
    Collapse,
    /// Drop suppressed events.
    Silent,
}

impl SuspensionMode {
    /// Returns `true` if suppressed events are replayed on release.
    #[inline]
    #[must_use]
    pub const fn replays(self) -> bool {
        matches!(self, Self::Collapse)
    }
}

/// Behaviour settings for a model graph.
///
/// # Examples
///
/// ```
/// use mg_core::{GraphConfig, SuspensionMode};
///
/// let config = GraphConfig::default();
/// assert_eq!(config.suspension_mode, SuspensionMode::Collapse);
/// assert!(!config.auto_validate);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Mode used by suspension scopes that do not name one explicitly.
    pub suspension_mode: SuspensionMode,

    /// Run the node's validators after every successful property set.
    pub auto_validate: bool,

    /// Number of node slots reserved up front.
    pub initial_capacity: usize,

    /// Deepest nesting of inlined models a snapshot writes before failing.
    pub max_snapshot_depth: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            suspension_mode: SuspensionMode::Collapse,
            auto_validate: false,
            initial_capacity: 64,
            max_snapshot_depth: 256,
        }
    }
}

/// Logging settings.
///
/// Only binaries install a subscriber; library crates emit `tracing` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub filter: String,

    /// Emit ANSI colors.
    pub ansi: bool,

    /// Include the event target (module path) in each line.
    pub target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            ansi: true,
            target: false,
        }
    }
}

/// Root configuration.
///
/// # Examples
///
/// ```
/// use mg_core::Config;
///
/// let config = Config::from_json_str(r#"{"graph": {"auto_validate": true}}"#)?;
/// assert!(config.graph.auto_validate);
/// assert_eq!(config.log.filter, "info");
/// # Ok::<(), mg_core::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Graph behaviour.
    pub graph: GraphConfig,

    /// Logging.
    pub log: LogConfig,
}

/// Upper bound for [`GraphConfig::initial_capacity`]; handles index with `u32`.
const MAX_INITIAL_CAPACITY: usize = 1 << 24;

/// Upper bound for [`GraphConfig::max_snapshot_depth`]; snapshots recurse per level.
const MAX_SNAPSHOT_DEPTH: usize = 4096;

impl Config {
    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a JSON configuration file.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read(path, e))?;
        Self::from_json_str(&contents)
    }

    /// Checks option values that deserialization alone cannot enforce.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log.filter.trim().is_empty() {
            return Err(ConfigError::invalid_option("log.filter", "must not be empty"));
        }
        if self.graph.initial_capacity > MAX_INITIAL_CAPACITY {
            return Err(ConfigError::invalid_option(
                "graph.initial_capacity",
                format!("must be at most {MAX_INITIAL_CAPACITY}"),
            ));
        }
        if self.graph.max_snapshot_depth == 0 || self.graph.max_snapshot_depth > MAX_SNAPSHOT_DEPTH {
            return Err(ConfigError::invalid_option(
                "graph.max_snapshot_depth",
                format!("must be between 1 and {MAX_SNAPSHOT_DEPTH}"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_config_defaults() {
        let config = GraphConfig::default();
        assert_eq!(config.suspension_mode, SuspensionMode::Collapse);
        assert!(!config.auto_validate);
        assert_eq!(config.initial_capacity, 64);
        assert_eq!(config.max_snapshot_depth, 256);
    }

    #[test]
    fn test_log_config_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.filter, "info");
        assert!(config.ansi);
        assert!(!config.target);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed = Config::from_json_str(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config = Config::from_json_str(r#"{"graph": {"suspension_mode": "silent"}}"#).unwrap();
        assert_eq!(config.graph.suspension_mode, SuspensionMode::Silent);
        assert_eq!(config.graph.initial_capacity, 64);
        assert_eq!(config.log, LogConfig::default());
    }

    #[test]
    fn test_empty_filter_rejected() {
        let err = Config::from_json_str(r#"{"log": {"filter": "  "}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { ref option, .. } if option == "log.filter"));
    }

    #[test]
    fn test_oversized_capacity_rejected() {
        let json = format!(r#"{{"graph": {{"initial_capacity": {}}}}}"#, MAX_INITIAL_CAPACITY + 1);
        assert!(Config::from_json_str(&json).is_err());
    }

    #[test]
    fn test_snapshot_depth_bounds() {
        assert!(Config::from_json_str(r#"{"graph": {"max_snapshot_depth": 0}}"#).is_err());
        let json = format!(r#"{{"graph": {{"max_snapshot_depth": {}}}}}"#, MAX_SNAPSHOT_DEPTH + 1);
        assert!(Config::from_json_str(&json).is_err());
        let config = Config::from_json_str(r#"{"graph": {"max_snapshot_depth": 32}}"#).unwrap();
        assert_eq!(config.graph.max_snapshot_depth, 32);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Utf8Path::new("/nonexistent/model-graph.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_default_config_snapshot() {
        insta::assert_json_snapshot!(GraphConfig::default(), @r#"
        {
          "suspension_mode": "collapse",
          "auto_validate": false,
          "initial_capacity": 64,
          "max_snapshot_depth": 256
        }
        "#);
    }
}
