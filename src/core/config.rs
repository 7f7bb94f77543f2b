//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{ClbError, Result};
use crate::core::paths::resolve_absolute_path;

/// Full column-buffer configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub scroll: ScrollConfig,
    pub column: ColumnConfig,
    pub backoff: BackoffConfig,
    pub logging: LoggingConfig,
    pub paths: PathsConfig,
}

/// Tuning for the tiered, viewport-aware scroll buffer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScrollConfig {
    /// Multiple of the viewport fill amount always exposed at tier 0.
    pub base_ratio: f64,
    /// Multiple of the viewport fill amount added per tier.
    pub tier_ratio: f64,
    /// Scroll progress fraction (bottom edge / scene height) that ascends a tier.
    pub ascend_threshold: f64,
    /// Lower bound on the estimated rendered height of one item, in pixels.
    pub minimum_item_height: f64,
    /// Floor on the number of items any visible slice exposes.
    pub min_take: usize,
    /// Viewport height assumed before the first real measurement arrives.
    pub assumed_viewport_height: f64,
    /// Fraction of the current offset kept on each return-to-top step.
    pub return_step_ratio: f64,
    /// Hard cap on return-to-top animation steps.
    pub max_return_steps: u32,
}

/// Per-column sizing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ColumnConfig {
    /// Committed-region capacity of each column's buffer.
    pub capacity: usize,
    /// Number of recent notices kept per column for display.
    pub notice_history: usize,
}

/// Exponential backoff between empty or failed polls of one source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_secs: u64,
    pub max_secs: u64,
}

/// JSONL activity log settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub jsonl_path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
    pub fsync_interval_secs: u64,
    pub channel_capacity: usize,
}

/// Filesystem paths used by clb.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub store_dir: PathBuf,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            base_ratio: 2.0,
            tier_ratio: 1.0,
            ascend_threshold: 0.8,
            minimum_item_height: 40.0,
            min_take: 10,
            assumed_viewport_height: 1_200.0,
            return_step_ratio: 0.5,
            max_return_steps: 12,
        }
    }
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            capacity: 2_000,
            notice_history: 16,
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_secs: 5,
            max_secs: 6 * 60 * 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let data = data_dir();
        Self {
            enabled: true,
            jsonl_path: data.join("activity.jsonl"),
            fallback_path: Some(env::temp_dir().join("column-buffer-activity.jsonl")),
            max_size_bytes: 32 * 1024 * 1024,
            max_rotated_files: 4,
            fsync_interval_secs: 10,
            channel_capacity: 1_024,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_file: home_dir()
                .join(".config")
                .join("column-buffer")
                .join("config.toml"),
            store_dir: data_dir().join("columns"),
        }
    }
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[CLB-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

fn data_dir() -> PathBuf {
    home_dir().join(".local").join("share").join("column-buffer")
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| ClbError::io(&path_buf, source))?;
            toml::from_str::<Self>(&raw)?
        } else if path.is_some() {
            return Err(ClbError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a over canonical JSON so the value is stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut f64_slot = |name: &str, slot: &mut f64| -> Result<()> {
            if let Some(raw) = lookup(name) {
                *slot = parse_env(name, &raw)?;
            }
            Ok(())
        };
        f64_slot("CLB_SCROLL_BASE_RATIO", &mut self.scroll.base_ratio)?;
        f64_slot("CLB_SCROLL_TIER_RATIO", &mut self.scroll.tier_ratio)?;
        f64_slot(
            "CLB_SCROLL_ASCEND_THRESHOLD",
            &mut self.scroll.ascend_threshold,
        )?;
        f64_slot(
            "CLB_SCROLL_MINIMUM_ITEM_HEIGHT",
            &mut self.scroll.minimum_item_height,
        )?;
        f64_slot(
            "CLB_SCROLL_ASSUMED_VIEWPORT_HEIGHT",
            &mut self.scroll.assumed_viewport_height,
        )?;
        f64_slot(
            "CLB_SCROLL_RETURN_STEP_RATIO",
            &mut self.scroll.return_step_ratio,
        )?;

        if let Some(raw) = lookup("CLB_SCROLL_MIN_TAKE") {
            self.scroll.min_take = parse_env("CLB_SCROLL_MIN_TAKE", &raw)?;
        }
        if let Some(raw) = lookup("CLB_SCROLL_MAX_RETURN_STEPS") {
            self.scroll.max_return_steps = parse_env("CLB_SCROLL_MAX_RETURN_STEPS", &raw)?;
        }
        if let Some(raw) = lookup("CLB_COLUMN_CAPACITY") {
            self.column.capacity = parse_env("CLB_COLUMN_CAPACITY", &raw)?;
        }
        if let Some(raw) = lookup("CLB_COLUMN_NOTICE_HISTORY") {
            self.column.notice_history = parse_env("CLB_COLUMN_NOTICE_HISTORY", &raw)?;
        }
        if let Some(raw) = lookup("CLB_BACKOFF_BASE_SECS") {
            self.backoff.base_secs = parse_env("CLB_BACKOFF_BASE_SECS", &raw)?;
        }
        if let Some(raw) = lookup("CLB_BACKOFF_MAX_SECS") {
            self.backoff.max_secs = parse_env("CLB_BACKOFF_MAX_SECS", &raw)?;
        }
        if let Some(raw) = lookup("CLB_LOGGING_ENABLED") {
            self.logging.enabled = parse_env("CLB_LOGGING_ENABLED", &raw)?;
        }
        if let Some(raw) = lookup("CLB_LOGGING_JSONL_PATH") {
            self.logging.jsonl_path = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("CLB_PATHS_STORE_DIR") {
            self.paths.store_dir = PathBuf::from(raw);
        }

        Ok(())
    }

    fn normalize_paths(&mut self) {
        self.paths.store_dir = resolve_absolute_path(&self.paths.store_dir);
        self.logging.jsonl_path = resolve_absolute_path(&self.logging.jsonl_path);
    }

    /// Check every tunable against its valid range.
    pub fn validate(&self) -> Result<()> {
        let scroll = &self.scroll;
        for (name, val) in [
            ("base_ratio", scroll.base_ratio),
            ("tier_ratio", scroll.tier_ratio),
            ("minimum_item_height", scroll.minimum_item_height),
            ("assumed_viewport_height", scroll.assumed_viewport_height),
        ] {
            if !(val.is_finite() && val > 0.0) {
                return Err(ClbError::InvalidConfig {
                    details: format!("scroll.{name} must be a positive number, got {val}"),
                });
            }
        }

        if !(scroll.ascend_threshold > 0.0 && scroll.ascend_threshold <= 1.0) {
            return Err(ClbError::InvalidConfig {
                details: format!(
                    "scroll.ascend_threshold must be in (0, 1], got {}",
                    scroll.ascend_threshold
                ),
            });
        }

        if !(0.0..1.0).contains(&scroll.return_step_ratio) {
            return Err(ClbError::InvalidConfig {
                details: format!(
                    "scroll.return_step_ratio must be in [0, 1), got {}",
                    scroll.return_step_ratio
                ),
            });
        }

        if scroll.min_take == 0 {
            return Err(ClbError::InvalidConfig {
                details: "scroll.min_take must be >= 1".to_string(),
            });
        }
        if scroll.max_return_steps == 0 {
            return Err(ClbError::InvalidConfig {
                details: "scroll.max_return_steps must be >= 1".to_string(),
            });
        }

        if self.column.capacity == 0 {
            return Err(ClbError::InvalidConfig {
                details: "column.capacity must be >= 1".to_string(),
            });
        }

        if self.backoff.base_secs == 0 || self.backoff.max_secs < self.backoff.base_secs {
            return Err(ClbError::InvalidConfig {
                details: format!(
                    "backoff must satisfy 0 < base_secs <= max_secs, got base={} max={}",
                    self.backoff.base_secs, self.backoff.max_secs
                ),
            });
        }

        if self.logging.channel_capacity == 0 {
            return Err(ClbError::InvalidConfig {
                details: "logging.channel_capacity must be >= 1".to_string(),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| ClbError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

#[cfg(test)]
mod tests {
    use super::{ClbError, Config};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn default_backoff_caps_at_six_hours() {
        let cfg = Config::default();
        assert_eq!(cfg.backoff.base_secs, 5);
        assert_eq!(cfg.backoff.max_secs, 21_600);
    }

    #[test]
    fn ascend_threshold_out_of_range_rejected() {
        let mut cfg = Config::default();
        cfg.scroll.ascend_threshold = 1.5;
        let err = cfg.validate().expect_err("expected threshold error");
        assert!(err.to_string().contains("ascend_threshold"));
    }

    #[test]
    fn non_positive_ratio_rejected() {
        let mut cfg = Config::default();
        cfg.scroll.tier_ratio = 0.0;
        let err = cfg.validate().expect_err("expected ratio error");
        assert!(err.to_string().contains("tier_ratio"));
    }

    #[test]
    fn zero_capacity_rejected() {
        let mut cfg = Config::default();
        cfg.column.capacity = 0;
        let err = cfg.validate().expect_err("expected capacity error");
        assert!(err.to_string().contains("capacity"));
    }

    #[test]
    fn backoff_max_below_base_rejected() {
        let mut cfg = Config::default();
        cfg.backoff.base_secs = 60;
        cfg.backoff.max_secs = 30;
        let err = cfg.validate().expect_err("expected backoff error");
        assert!(err.to_string().contains("backoff"));
    }

    #[test]
    fn return_step_ratio_of_one_rejected() {
        let mut cfg = Config::default();
        cfg.scroll.return_step_ratio = 1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        let overrides = vars(&[
            ("CLB_SCROLL_BASE_RATIO", "3.5"),
            ("CLB_COLUMN_CAPACITY", "250"),
            ("CLB_BACKOFF_MAX_SECS", "600"),
            ("CLB_PATHS_STORE_DIR", "/tmp/clb-store"),
        ]);
        cfg.apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect("overrides should parse");

        assert!((cfg.scroll.base_ratio - 3.5).abs() < f64::EPSILON);
        assert_eq!(cfg.column.capacity, 250);
        assert_eq!(cfg.backoff.max_secs, 600);
        assert_eq!(cfg.paths.store_dir, PathBuf::from("/tmp/clb-store"));
    }

    #[test]
    fn env_invalid_number_rejected() {
        let mut cfg = Config::default();
        let overrides = vars(&[("CLB_COLUMN_CAPACITY", "lots")]);
        let err = cfg
            .apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect_err("invalid usize should fail");
        match err {
            ClbError::ConfigParse { context, details } => {
                assert_eq!(context, "env");
                assert!(details.contains("CLB_COLUMN_CAPACITY"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn toml_sections_parse_with_defaults() {
        let raw = r"
            [scroll]
            base_ratio = 4.0

            [backoff]
            base_secs = 10
        ";
        let cfg: Config = toml::from_str(raw).expect("parse");
        assert!((cfg.scroll.base_ratio - 4.0).abs() < f64::EPSILON);
        assert!((cfg.scroll.tier_ratio - 1.0).abs() < f64::EPSILON);
        assert_eq!(cfg.backoff.base_secs, 10);
        assert_eq!(cfg.backoff.max_secs, 21_600);
    }

    #[test]
    fn load_returns_error_for_explicit_missing_path() {
        let err = Config::load(Some(Path::new("/nonexistent/clb/config.toml")))
            .expect_err("explicit missing path must fail");
        assert!(matches!(err, ClbError::MissingConfig { .. }));
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[column]\ncapacity = 42\n").expect("write config");
        let cfg = Config::load(Some(&path)).expect("load");
        assert_eq!(cfg.column.capacity, 42);
        assert_eq!(cfg.paths.config_file, path);
    }

    #[test]
    fn stable_hash_changes_when_config_changes() {
        let before = Config::default().stable_hash().expect("hash");
        let mut modified = Config::default();
        modified.column.capacity += 1;
        let after = modified.stable_hash().expect("hash");
        assert_ne!(before, after);
        assert_eq!(before, Config::default().stable_hash().expect("hash"));
    }
}
