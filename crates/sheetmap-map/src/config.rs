//! Engine configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sheetmap_model::ConfidenceThresholds;

use crate::aggregate::AggregatorConfig;
use crate::error::{EngineError, Result};
use crate::historical::HistoricalConfig;
use crate::normalize::NormalizerConfig;
use crate::selector::SelectorConfig;

/// Tunables for every mapping stage. Missing JSON fields take defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub normalizer: NormalizerConfig,
    pub selector: SelectorConfig,
    pub historical: HistoricalConfig,
    pub aggregator: AggregatorConfig,
    pub thresholds: ConfidenceThresholds,
}

impl EngineConfig {
    /// Fewer fuzzy matches, stricter sheet acceptance and tiers.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            selector: SelectorConfig {
                acceptance: 0.8,
                ..SelectorConfig::default()
            },
            historical: HistoricalConfig {
                fuzzy_threshold: 0.92,
                ..HistoricalConfig::default()
            },
            aggregator: AggregatorConfig {
                override_delta: 0.25,
            },
            thresholds: ConfidenceThresholds::strict(),
            ..Self::default()
        }
    }

    /// More fuzzy matches and lower sheet acceptance.
    #[must_use]
    pub fn relaxed() -> Self {
        Self {
            selector: SelectorConfig {
                acceptance: 0.34,
                ..SelectorConfig::default()
            },
            historical: HistoricalConfig {
                fuzzy_threshold: 0.75,
                ..HistoricalConfig::default()
            },
            aggregator: AggregatorConfig {
                override_delta: 0.1,
            },
            thresholds: ConfidenceThresholds::relaxed(),
            ..Self::default()
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| EngineError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| EngineError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"historical": {"fuzzy_threshold": 0.9}}"#).unwrap();
        assert_eq!(config.historical.fuzzy_threshold, 0.9);
        assert_eq!(config.historical.prior, 2.0);
        assert_eq!(config.aggregator.override_delta, 0.15);
        assert_eq!(config.thresholds, ConfidenceThresholds::default());
    }

    #[test]
    fn presets_order_fuzzy_thresholds() {
        assert!(EngineConfig::strict().historical.fuzzy_threshold > EngineConfig::default().historical.fuzzy_threshold);
        assert!(EngineConfig::relaxed().historical.fuzzy_threshold < EngineConfig::default().historical.fuzzy_threshold);
    }
}
