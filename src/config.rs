//! Pipeline Configuration
//!
//! One immutable value carrying every tunable of the index and search
//! pipeline. Built from defaults, an optional JSON file and `LAKEJOIN_*`
//! environment overrides, then handed by reference to every component.

use crate::error::{JoinError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Maximum Euclidean distance between two unit-normalized vectors
pub const MAX_UNIT_DISTANCE: f64 = 2.0;

/// How pivot directions are chosen from the corpus sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PivotStrategyKind {
    /// Principal directions of the sample (default)
    Pca,
    /// Seeded draw of corpus vectors
    Random,
}

impl FromStr for PivotStrategyKind {
    type Err = JoinError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pca" => Ok(PivotStrategyKind::Pca),
            "random" => Ok(PivotStrategyKind::Random),
            other => Err(JoinError::InvalidConfig(format!(
                "Unknown pivot strategy: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of pivots |P| (recommended 3..7)
    pub pivots_k: usize,
    /// Grid levels m (recommended 3..8)
    pub grid_levels: usize,
    /// τ as a fraction of the maximum unit-vector distance
    pub tau_ratio: f64,
    /// Joinability threshold T as a fraction of the query column size
    #[serde(rename = "T_ratio", alias = "t_ratio")]
    pub t_ratio: f64,
    /// Columns shorter than this are neither indexed nor queried
    pub min_col_len: usize,
    /// Key-column detection drops columns with more `__EMPTY__` than this
    pub empty_ratio_max: f64,
    /// Optional key-column filter on distinct values / rows
    pub distinct_ratio_min: Option<f64>,
    pub seed: u64,
    /// Width of every embedding vector
    pub embedding_dim: usize,
    /// Upper bound on the rows used to fit pivots
    pub pivot_sample_size: usize,
    pub pivot_strategy: PivotStrategyKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pivots_k: 3,
            grid_levels: 3,
            tau_ratio: 0.06,
            t_ratio: 0.60,
            min_col_len: 5,
            empty_ratio_max: 0.9,
            distinct_ratio_min: None,
            seed: 42,
            embedding_dim: 300,
            pivot_sample_size: 20_000,
            pivot_strategy: PivotStrategyKind::Pca,
        }
    }
}

impl Config {
    /// Load from an optional JSON file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)?;
                serde_json::from_str(&raw)?
            }
            None => Config::default(),
        };

        let config = base.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `LAKEJOIN_*` environment variables on top of `self`
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LAKEJOIN_PIVOTS_K") {
            self.pivots_k = parse_var("LAKEJOIN_PIVOTS_K", &v)?;
        }
        if let Some(v) = lookup("LAKEJOIN_GRID_LEVELS") {
            self.grid_levels = parse_var("LAKEJOIN_GRID_LEVELS", &v)?;
        }
        if let Some(v) = lookup("LAKEJOIN_TAU_RATIO") {
            self.tau_ratio = parse_var("LAKEJOIN_TAU_RATIO", &v)?;
        }
        if let Some(v) = lookup("LAKEJOIN_T_RATIO") {
            self.t_ratio = parse_var("LAKEJOIN_T_RATIO", &v)?;
        }
        if let Some(v) = lookup("LAKEJOIN_MIN_COL_LEN") {
            self.min_col_len = parse_var("LAKEJOIN_MIN_COL_LEN", &v)?;
        }
        if let Some(v) = lookup("LAKEJOIN_EMPTY_RATIO_MAX") {
            self.empty_ratio_max = parse_var("LAKEJOIN_EMPTY_RATIO_MAX", &v)?;
        }
        if let Some(v) = lookup("LAKEJOIN_DISTINCT_RATIO_MIN") {
            self.distinct_ratio_min = Some(parse_var("LAKEJOIN_DISTINCT_RATIO_MIN", &v)?);
        }
        if let Some(v) = lookup("LAKEJOIN_SEED") {
            self.seed = parse_var("LAKEJOIN_SEED", &v)?;
        }
        if let Some(v) = lookup("LAKEJOIN_EMBEDDING_DIM") {
            self.embedding_dim = parse_var("LAKEJOIN_EMBEDDING_DIM", &v)?;
        }
        if let Some(v) = lookup("LAKEJOIN_PIVOT_SAMPLE_SIZE") {
            self.pivot_sample_size = parse_var("LAKEJOIN_PIVOT_SAMPLE_SIZE", &v)?;
        }
        if let Some(v) = lookup("LAKEJOIN_PIVOT_STRATEGY") {
            self.pivot_strategy = v.parse()?;
        }
        Ok(self)
    }

    /// Reject values no component can work with
    pub fn validate(&self) -> Result<()> {
        if self.pivots_k == 0 {
            return Err(JoinError::InvalidConfig("pivots_k must be at least 1".to_string()));
        }
        if !(1..=16).contains(&self.grid_levels) {
            return Err(JoinError::InvalidConfig(format!(
                "grid_levels must be in 1..=16, got {}",
                self.grid_levels
            )));
        }
        if !(0.0..=1.0).contains(&self.tau_ratio) {
            return Err(JoinError::InvalidConfig(format!(
                "tau_ratio must be in [0, 1], got {}",
                self.tau_ratio
            )));
        }
        if !(0.0..=1.0).contains(&self.t_ratio) {
            return Err(JoinError::InvalidConfig(format!(
                "T_ratio must be in [0, 1], got {}",
                self.t_ratio
            )));
        }
        if !(0.0..=1.0).contains(&self.empty_ratio_max) {
            return Err(JoinError::InvalidConfig(format!(
                "empty_ratio_max must be in [0, 1], got {}",
                self.empty_ratio_max
            )));
        }
        if let Some(ratio) = self.distinct_ratio_min {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(JoinError::InvalidConfig(format!(
                    "distinct_ratio_min must be in [0, 1], got {}",
                    ratio
                )));
            }
        }
        if self.embedding_dim == 0 {
            return Err(JoinError::InvalidConfig("embedding_dim must be at least 1".to_string()));
        }
        if self.pivot_sample_size == 0 {
            return Err(JoinError::InvalidConfig(
                "pivot_sample_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Absolute blocking distance threshold τ
    pub fn tau_threshold(&self) -> f32 {
        (self.tau_ratio * MAX_UNIT_DISTANCE) as f32
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| JoinError::InvalidConfig(format!("{} has an invalid value: {}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!((config.tau_threshold() - 0.12).abs() < 1e-6);
    }

    #[test]
    fn test_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("LAKEJOIN_PIVOTS_K", "5"),
            ("LAKEJOIN_T_RATIO", "0.5"),
            ("LAKEJOIN_PIVOT_STRATEGY", "random"),
        ]
        .into_iter()
        .collect();

        let config = Config::default()
            .with_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.pivots_k, 5);
        assert_eq!(config.t_ratio, 0.5);
        assert_eq!(config.pivot_strategy, PivotStrategyKind::Random);
        assert_eq!(config.grid_levels, 3);
    }

    #[test]
    fn test_key_filter_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("LAKEJOIN_EMPTY_RATIO_MAX", "0.5"),
            ("LAKEJOIN_DISTINCT_RATIO_MIN", "0.25"),
        ]
        .into_iter()
        .collect();

        let config = Config::default()
            .with_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.empty_ratio_max, 0.5);
        assert_eq!(config.distinct_ratio_min, Some(0.25));

        let unset = Config::default().with_overrides(|_| None).unwrap();
        assert_eq!(unset.empty_ratio_max, 0.9);
        assert_eq!(unset.distinct_ratio_min, None);
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let result = Config::default().with_overrides(|k| {
            (k == "LAKEJOIN_SEED").then(|| "not-a-number".to_string())
        });
        assert!(matches!(result, Err(JoinError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = Config::default();
        config.tau_ratio = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.grid_levels = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pivots_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_uses_t_ratio_name() {
        let config: Config =
            serde_json::from_str(r#"{"T_ratio": 0.25, "min_col_len": 2}"#).unwrap();
        assert_eq!(config.t_ratio, 0.25);
        assert_eq!(config.min_col_len, 2);
        assert_eq!(config.pivots_k, 3);
    }
}
