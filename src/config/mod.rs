// src/config/mod.rs
//! Startup configuration: rule tables + tuning, loaded once from TOML.
//!
//! Path resolution: `NEWS_RULES_PATH`, else `config/news_rules.toml`.
//! Threshold overrides: `NEWS_SIM_THRESHOLD`, `NEWS_LEX_THRESHOLD`.

pub mod rules;
pub mod tuning;

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::error::{CoreError, CoreResult};

pub use rules::RuleTables;
pub use tuning::Tuning;

pub const DEFAULT_RULES_PATH: &str = "config/news_rules.toml";
pub const ENV_RULES_PATH: &str = "NEWS_RULES_PATH";

const BUILTIN_RULES: &str = include_str!("../../config/news_rules.toml");

#[derive(Debug, Deserialize)]
struct NewsConfigFile {
    #[serde(default)]
    tuning: Tuning,
    #[serde(flatten)]
    tables: rules::RuleTablesCfg,
}

/// Immutable process-wide configuration. Cheap to clone.
#[derive(Debug, Clone)]
pub struct NewsConfig {
    pub tuning: Arc<Tuning>,
    pub tables: Arc<RuleTables>,
}

impl NewsConfig {
    pub fn from_toml_str(s: &str) -> CoreResult<Self> {
        let file: NewsConfigFile =
            toml::from_str(s).map_err(|e| CoreError::config(format!("news rules: {e}")))?;
        Self::assemble(file.tuning, file.tables)
    }

    /// Load from an explicit path; env threshold overrides are applied.
    pub fn from_path(path: &Path) -> CoreResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CoreError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        let file: NewsConfigFile = toml::from_str(&content)
            .map_err(|e| CoreError::config(format!("{}: {e}", path.display())))?;
        let mut tuning = file.tuning;
        tuning.apply_env_overrides();
        let cfg = Self::assemble(tuning, file.tables)?;
        info!(
            target: "config",
            path = %path.display(),
            sim_threshold = cfg.tuning.sim_threshold,
            lex_threshold = cfg.tuning.lex_threshold,
            "news rules loaded"
        );
        Ok(cfg)
    }

    /// Load using `NEWS_RULES_PATH` or the default location.
    pub fn from_env() -> CoreResult<Self> {
        let path = std::env::var(ENV_RULES_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_RULES_PATH));
        Self::from_path(&path)
    }

    /// Tables bundled into the binary; used by tests and the demo.
    pub fn builtin() -> CoreResult<Self> {
        Self::from_toml_str(BUILTIN_RULES)
    }

    fn assemble(tuning: Tuning, tables: rules::RuleTablesCfg) -> CoreResult<Self> {
        tuning.validate()?;
        let tables = RuleTables::from_cfg(tables)?;
        Ok(Self {
            tuning: Arc::new(tuning),
            tables: Arc::new(tables),
        })
    }

    /// Same tables, different tuning (validated).
    pub fn with_tuning(&self, tuning: Tuning) -> CoreResult<Self> {
        tuning.validate()?;
        Ok(Self {
            tuning: Arc::new(tuning),
            tables: Arc::clone(&self.tables),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Create a unique temporary directory in std::env::temp_dir().
    fn unique_tmp_dir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        dir.push(format!("news_rules_test_{}", nanos));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn builtin_rules_are_valid() {
        let cfg = NewsConfig::builtin().expect("bundled rules");
        assert_eq!(cfg.tables.resolve_company("HDFC Bank"), Some("HDFCBANK"));
        assert_eq!(cfg.tables.resolve_regulator("RBI"), Some("RBI"));
        assert_eq!(cfg.tuning.entity_weight, 0.6);
    }

    #[test]
    fn bad_weights_reject_whole_config() {
        let bad = BUILTIN_RULES.replace("semantic_weight = 0.4", "semantic_weight = 0.5");
        let err = NewsConfig::from_toml_str(&bad).unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }

    #[serial_test::serial]
    #[test]
    fn from_path_applies_env_override() {
        let dir = unique_tmp_dir();
        let path = dir.join("rules.toml");
        {
            let mut f = fs::File::create(&path).unwrap();
            f.write_all(BUILTIN_RULES.as_bytes()).unwrap();
        }

        std::env::set_var(tuning::ENV_SIM_THRESHOLD, "0.9");
        let cfg = NewsConfig::from_path(&path).expect("load from file");
        std::env::remove_var(tuning::ENV_SIM_THRESHOLD);

        assert!((cfg.tuning.sim_threshold - 0.9).abs() < f32::EPSILON);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let err = NewsConfig::from_path(Path::new("__no_such_rules__.toml")).unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }
}
