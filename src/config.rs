//! Configuration loading and management.

use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::error::{LoadTestError, LoadTestResult};

/// Which protocol the target endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceMode {
    Wms,
    Wmts,
}

/// Main test configuration, loaded from a YAML scenario file or built
/// directly from CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub base_url: String,
    pub mode: ServiceMode,
    pub duration_secs: u64,
    pub concurrency: u32,
    #[serde(default)]
    pub requests_per_second: Option<f64>,
    #[serde(default)]
    pub warmup_secs: u64,
    /// Seed for the request streams. Fixed by default so runs are
    /// reproducible; vary it to defeat caches warmed by a previous run.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Layer to benchmark; defaults to the first the service advertises.
    #[serde(default)]
    pub layer: Option<String>,
    /// Sample area in square kilometers (WMS only).
    #[serde(default = "default_bbox_area")]
    pub bbox_area_km2: f64,
    /// Sample width/height ratio (WMS only).
    #[serde(default = "default_bbox_ratio")]
    pub bbox_ratio: f64,
    /// Tile matrix set identifier (WMTS only); defaults to the first one
    /// the chosen layer links.
    #[serde(default)]
    pub tile_matrix_set: Option<String>,
    /// Tile matrix identifier (WMTS only); defaults to the middle entry
    /// of the set's pyramid.
    #[serde(default)]
    pub tile_matrix: Option<String>,
    /// Image format override; defaults to the first advertised format.
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub log_requests: bool,
}

fn default_seed() -> u64 {
    1640
}

fn default_bbox_area() -> f64 {
    100.0
}

fn default_bbox_ratio() -> f64 {
    1.0
}

impl TestConfig {
    /// Load configuration from a YAML scenario file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TestConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Parsed endpoint URL, with any pre-existing query string intact.
    pub fn endpoint(&self) -> LoadTestResult<Url> {
        Url::parse(&self.base_url)
            .map_err(|e| LoadTestError::Configuration(format!("invalid base URL '{}': {e}", self.base_url)))
    }

    /// Validate configuration before any session starts.
    pub fn validate(&self) -> LoadTestResult<()> {
        if self.duration_secs == 0 {
            return Err(LoadTestError::Configuration(
                "duration_secs must be > 0".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(LoadTestError::Configuration(
                "concurrency must be > 0".to_string(),
            ));
        }
        if self.bbox_area_km2 <= 0.0 {
            return Err(LoadTestError::Configuration(
                "bbox_area_km2 must be > 0".to_string(),
            ));
        }
        if self.bbox_ratio <= 0.0 {
            return Err(LoadTestError::Configuration(
                "bbox_ratio must be > 0".to_string(),
            ));
        }
        if let Some(rps) = self.requests_per_second {
            if rps <= 0.0 {
                return Err(LoadTestError::Configuration(
                    "requests_per_second must be > 0".to_string(),
                ));
            }
        }
        self.endpoint()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn base_config() -> TestConfig {
        TestConfig {
            name: "test".to_string(),
            description: String::new(),
            base_url: "https://host/wms".to_string(),
            mode: ServiceMode::Wms,
            duration_secs: 10,
            concurrency: 2,
            requests_per_second: None,
            warmup_secs: 0,
            seed: default_seed(),
            layer: None,
            bbox_area_km2: default_bbox_area(),
            bbox_ratio: default_bbox_ratio(),
            tile_matrix_set: None,
            tile_matrix: None,
            format: None,
            log_requests: false,
        }
    }

    #[test]
    fn test_load_scenario_file_with_defaults() {
        let yaml = r#"
name: smoke
base_url: "https://host/cgi?map=/a/b.map"
mode: wms
duration_secs: 30
concurrency: 4
layer: ortoSat2023
"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = TestConfig::from_file(file.path()).unwrap();
        assert_eq!(config.name, "smoke");
        assert_eq!(config.seed, 1640);
        assert_eq!(config.bbox_area_km2, 100.0);
        assert_eq!(config.bbox_ratio, 1.0);
        assert_eq!(config.layer.as_deref(), Some("ortoSat2023"));
        assert_eq!(config.mode, ServiceMode::Wms);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_duration() {
        let mut config = base_config();
        config.duration_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = base_config();
        config.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_nonpositive_area() {
        let mut config = base_config();
        config.bbox_area_km2 = -5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = base_config();
        config.base_url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(LoadTestError::Configuration(_))
        ));
    }

    #[test]
    fn test_endpoint_keeps_existing_query() {
        let mut config = base_config();
        config.base_url = "https://host/cgi?map=/a/b.map".to_string();
        let url = config.endpoint().unwrap();
        assert_eq!(url.query(), Some("map=/a/b.map"));
    }
}
