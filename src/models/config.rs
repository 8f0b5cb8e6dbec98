//! Runtime configuration for the extraction job.

use crate::models::DemoProfile;
use crate::utils::{KycError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration, loadable from a JSON file. Every section falls
/// back to its defaults when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KycConfig {
    pub extraction: ExtractionConfig,
    pub fallback: FallbackConfig,
    pub ocr: OcrConfig,
    pub output: OutputConfig,
}

impl KycConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| KycError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: KycConfig = serde_json::from_str(&raw)
            .map_err(|e| KycError::Config(format!("Invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let e = &self.extraction;
        let scores = [
            ("high_confidence_threshold", e.high_confidence_threshold),
            ("mrz_confidence", e.mrz_confidence),
            ("pattern_confidence", e.pattern_confidence),
            ("country_confidence", e.country_confidence),
            ("fallback_confidence", e.fallback_confidence),
            ("min_confidence", self.fallback.min_confidence),
        ];
        for (name, value) in scores {
            if !(0.0..=1.0).contains(&value) {
                return Err(KycError::Config(format!("{} must be within [0, 1], got {}", name, value)));
            }
        }
        if self.ocr.timeout_secs == 0 {
            return Err(KycError::Config("ocr.timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}

/// Confidence assigned by each extraction tier, and the detection filter cut.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Detections strictly above this confidence form the first pass.
    pub high_confidence_threshold: f32,
    pub mrz_confidence: f32,
    pub pattern_confidence: f32,
    pub country_confidence: f32,
    pub fallback_confidence: f32,
    /// Re-run the tiers over every detection when the filtered pass finds nothing.
    pub retry_unfiltered: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            high_confidence_threshold: 0.5,
            mrz_confidence: 0.9,
            pattern_confidence: 0.7,
            country_confidence: 0.6,
            fallback_confidence: 0.4,
            retry_unfiltered: true,
        }
    }
}

/// How a demo profile is picked when the catalogue is consulted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum DemoSelection {
    /// Always the profile at `index` (modulo catalogue length).
    Fixed { index: usize },
    /// Cycles through the catalogue, one step per reconciliation.
    RoundRobin,
    /// Derived from the SHA-256 of the input image, stable per input.
    #[default]
    InputDigest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Force `verified = true` and backfill missing fields from the catalogue.
    pub guaranteed_output_mode: bool,
    /// Confidence floor applied whenever the catalogue is used.
    pub min_confidence: f32,
    pub selection: DemoSelection,
    pub profiles: Vec<DemoProfile>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            guaranteed_output_mode: true,
            min_confidence: 0.8,
            selection: DemoSelection::default(),
            profiles: default_profiles(),
        }
    }
}

/// ICAO Doc 9303 and national specimen documents.
pub fn default_profiles() -> Vec<DemoProfile> {
    vec![
        DemoProfile {
            document_number: "L898902C".to_string(),
            country: "DEU".to_string(),
            name: "MUSTERMANN, ERIKA".to_string(),
        },
        DemoProfile {
            document_number: "L898902C3".to_string(),
            country: "UTO".to_string(),
            name: "ERIKSSON, ANNA MARIA".to_string(),
        },
        DemoProfile {
            document_number: "C01X00T47".to_string(),
            country: "DEU".to_string(),
            name: "MUSTERMANN, ERIKA".to_string(),
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract language pack.
    pub language: String,
    pub timeout_secs: u64,
    /// Upper bound on image edge length handed to the engine.
    pub max_image_size: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            timeout_secs: 60,
            max_image_size: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Number of raw detection texts copied into the metadata.
    pub raw_text_limit: usize,
    /// Each copied text is cut to this many characters.
    pub raw_text_max_chars: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            raw_text_limit: 20,
            raw_text_max_chars: 64,
        }
    }
}
