use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::food::labels::LabelTable;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(String),
    #[error("Invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub url: String,
    pub timeout: Duration,
    pub min_confidence: f32,
    pub labels: LabelTable,
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    /// 1 maximizes used ingredients, 2 minimizes missing ones.
    pub ranking: u8,
    pub ignore_pantry: bool,
}

#[derive(Debug, Clone)]
pub struct FoodConfig {
    pub detector: DetectorConfig,
    pub catalog: CatalogConfig,
    /// Result bound for the primary recipe match.
    pub max_results: usize,
    /// Attempts per network call, first try included.
    pub max_attempts: u32,
}

pub const MAX_NETWORK_ATTEMPTS: u32 = 3;

impl FoodConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let detector_url = lookup("DETECTOR_URL")
            .unwrap_or_else(|| "http://localhost:4000/detect".to_string());
        validate_url("DETECTOR_URL", &detector_url)?;

        let label_version = lookup("LABEL_TABLE")
            .unwrap_or_else(|| LabelTable::default().version().to_string());
        let labels = LabelTable::by_version(&label_version).ok_or_else(|| ConfigError::Invalid {
            var: "LABEL_TABLE".to_string(),
            value: label_version.clone(),
            reason: "unknown label table".to_string(),
        })?;

        let min_confidence: f32 = parse_or(&lookup, "DETECTOR_MIN_CONFIDENCE", 0.20)?;
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(invalid("DETECTOR_MIN_CONFIDENCE", min_confidence, "must be within 0..=1"));
        }

        let api_key = lookup("SPOONACULAR_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing("SPOONACULAR_API_KEY".to_string()))?;

        let base_url = lookup("SPOONACULAR_API_URL")
            .unwrap_or_else(|| "https://api.spoonacular.com".to_string());
        validate_url("SPOONACULAR_API_URL", &base_url)?;

        let ranking: u8 = parse_or(&lookup, "CATALOG_RANKING", 1)?;
        if !(1..=2).contains(&ranking) {
            return Err(invalid("CATALOG_RANKING", ranking, "must be 1 or 2"));
        }

        let max_results: usize = parse_or(&lookup, "RECIPE_MAX_RESULTS", 3)?;
        if !(1..=100).contains(&max_results) {
            return Err(invalid("RECIPE_MAX_RESULTS", max_results, "must be within 1..=100"));
        }

        let max_attempts: u32 = parse_or(&lookup, "NETWORK_MAX_ATTEMPTS", 2)?;
        if !(1..=MAX_NETWORK_ATTEMPTS).contains(&max_attempts) {
            return Err(invalid("NETWORK_MAX_ATTEMPTS", max_attempts, "must be within 1..=3"));
        }

        let detector_timeout = timeout_secs(&lookup, "DETECTOR_TIMEOUT_SECS", 30)?;
        let catalog_timeout = timeout_secs(&lookup, "CATALOG_TIMEOUT_SECS", 15)?;

        Ok(Self {
            detector: DetectorConfig {
                url: detector_url,
                timeout: detector_timeout,
                min_confidence,
                labels,
            },
            catalog: CatalogConfig {
                api_key,
                base_url: base_url.trim_end_matches('/').to_string(),
                timeout: catalog_timeout,
                ranking,
                ignore_pantry: parse_or(&lookup, "CATALOG_IGNORE_PANTRY", true)?,
            },
            max_results,
            max_attempts,
        })
    }
}

fn parse_or<F, T>(lookup: &F, var: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var: var.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn timeout_secs<F>(lookup: &F, var: &str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_or(lookup, var, default)? {
        0 => Err(invalid(var, 0, "must be at least 1 second")),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn validate_url(var: &str, value: &str) -> Result<(), ConfigError> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|e| invalid(var, value, &e.to_string()))
}

fn invalid(var: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var: var.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_only_api_key() {
        let config = FoodConfig::from_lookup(lookup_from(&[("SPOONACULAR_API_KEY", "k")])).unwrap();
        assert_eq!(config.detector.url, "http://localhost:4000/detect");
        assert_eq!(config.detector.timeout, Duration::from_secs(30));
        assert!((config.detector.min_confidence - 0.20).abs() < f32::EPSILON);
        assert_eq!(config.detector.labels, LabelTable::default());
        assert_eq!(config.catalog.base_url, "https://api.spoonacular.com");
        assert_eq!(config.catalog.ranking, 1);
        assert!(config.catalog.ignore_pantry);
        assert_eq!(config.max_results, 3);
        assert_eq!(config.max_attempts, 2);
    }

    #[test]
    fn test_missing_api_key() {
        let err = FoodConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("SPOONACULAR_API_KEY".to_string()));
    }

    #[test]
    fn test_overrides_and_trailing_slash() {
        let config = FoodConfig::from_lookup(lookup_from(&[
            ("SPOONACULAR_API_KEY", "k"),
            ("SPOONACULAR_API_URL", "http://localhost:8080/"),
            ("RECIPE_MAX_RESULTS", "5"),
            ("CATALOG_IGNORE_PANTRY", "false"),
            ("NETWORK_MAX_ATTEMPTS", "1"),
        ]))
        .unwrap();
        assert_eq!(config.catalog.base_url, "http://localhost:8080");
        assert_eq!(config.max_results, 5);
        assert!(!config.catalog.ignore_pantry);
        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        for (var, value) in [
            ("NETWORK_MAX_ATTEMPTS", "10"),
            ("RECIPE_MAX_RESULTS", "0"),
            ("DETECTOR_MIN_CONFIDENCE", "1.5"),
            ("CATALOG_RANKING", "3"),
            ("DETECTOR_URL", "not a url"),
            ("LABEL_TABLE", "yolov9"),
            ("CATALOG_TIMEOUT_SECS", "soon"),
            ("CATALOG_TIMEOUT_SECS", "0"),
            ("DETECTOR_TIMEOUT_SECS", "0"),
        ] {
            let result = FoodConfig::from_lookup(lookup_from(&[("SPOONACULAR_API_KEY", "k"), (var, value)]));
            assert!(
                matches!(result, Err(ConfigError::Invalid { var: ref v, .. }) if v == var),
                "{var}={value} should be rejected"
            );
        }
    }
}
