use serde::{Deserialize, Serialize};

/// Pixel-space bounding box reported by the OCR engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// One text fragment reported by the OCR engine, in scan order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub text: String,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
}

impl Detection {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Detection {
            text: text.into(),
            confidence,
            region: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    DocumentNumber,
    Country,
    Name,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::DocumentNumber => "document_number",
            Field::Country => "country",
            Field::Name => "name",
        }
    }
}

/// Which tier produced the aggregate confidence of a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    #[default]
    None,
    Mrz,
    PatternMatch,
    CountryDetection,
    FallbackPattern,
    DemoMode,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::None => "none",
            ExtractionMethod::Mrz => "mrz",
            ExtractionMethod::PatternMatch => "pattern_match",
            ExtractionMethod::CountryDetection => "country_detection",
            ExtractionMethod::FallbackPattern => "fallback_pattern",
            ExtractionMethod::DemoMode => "demo_mode",
        }
    }
}

/// Which rule filled a field, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEvidence {
    pub field: Field,
    pub rule: String,
    pub weight: f32,
}

/// Fields gathered by the extraction tiers. Each field is written at most once;
/// the method and confidence are only set while the method is still `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionResult {
    pub document_number: Option<String>,
    pub country: Option<String>,
    pub name: Option<String>,
    pub confidence_score: f32,
    pub extraction_method: ExtractionMethod,
    pub evidence: Vec<FieldEvidence>,
}

impl ExtractionResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Writes `value` into `field` unless it is already populated.
    /// Returns whether the write happened.
    pub fn fill(&mut self, field: Field, value: String, rule: &str, weight: f32) -> bool {
        let slot = match field {
            Field::DocumentNumber => &mut self.document_number,
            Field::Country => &mut self.country,
            Field::Name => &mut self.name,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        self.evidence.push(FieldEvidence {
            field,
            rule: rule.to_string(),
            weight,
        });
        true
    }

    /// Records the tier that first produced data. Later calls are ignored.
    pub fn upgrade(&mut self, method: ExtractionMethod, confidence: f32) {
        if self.extraction_method == ExtractionMethod::None {
            self.extraction_method = method;
            self.confidence_score = confidence;
        }
    }

    pub fn is_verified(&self) -> bool {
        self.document_number.is_some() && self.country.is_some()
    }
}

/// Entry of the demo catalogue used to backfill missing fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoProfile {
    pub document_number: String,
    pub country: String,
    pub name: String,
}

/// Protected-data dataset descriptors copied into the output when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    #[serde(default, rename = "datasetType", skip_serializing_if = "Option::is_none")]
    pub dataset_type: Option<String>,
    #[serde(default, rename = "primaryFileName", skip_serializing_if = "Option::is_none")]
    pub primary_file_name: Option<String>,
    #[serde(default, rename = "primaryFileType", skip_serializing_if = "Option::is_none")]
    pub primary_file_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub total_detections: usize,
    pub high_confidence_detections: usize,
    pub extraction_passes: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<DatasetInfo>,
    pub matched_rules: Vec<String>,
    pub raw_texts: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files_seen: Vec<String>,
}

/// The reconciled field set before run metadata is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledRecord {
    pub document_number: Option<String>,
    pub country: Option<String>,
    pub name: Option<String>,
    pub verified: bool,
    pub confidence_score: f32,
    pub extraction_method: ExtractionMethod,
    pub fallback_applied: bool,
    pub demo_fields: Vec<Field>,
    pub evidence: Vec<FieldEvidence>,
    pub error: Option<String>,
    pub error_kind: Option<String>,
}

/// The single JSON artifact written for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalRecord {
    pub document_number: Option<String>,
    pub country: Option<String>,
    pub name: Option<String>,
    pub verified: bool,
    pub confidence_score: f32,
    pub extraction_method: ExtractionMethod,
    pub processing_time: f64,
    pub timestamp: String,
    pub fallback_applied: bool,
    pub demo_fields: Vec<Field>,
    pub source_metadata: SourceMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_is_first_writer_wins() {
        let mut result = ExtractionResult::empty();
        assert!(result.fill(Field::Country, "DEU".into(), "mrz_holder", 0.9));
        assert!(!result.fill(Field::Country, "FRA".into(), "country_alias", 0.6));
        assert_eq!(result.country.as_deref(), Some("DEU"));
        assert_eq!(result.evidence.len(), 1);
    }

    #[test]
    fn test_upgrade_only_from_none() {
        let mut result = ExtractionResult::empty();
        result.upgrade(ExtractionMethod::PatternMatch, 0.7);
        result.upgrade(ExtractionMethod::FallbackPattern, 0.4);
        assert_eq!(result.extraction_method, ExtractionMethod::PatternMatch);
        assert_eq!(result.confidence_score, 0.7);
    }

    #[test]
    fn test_method_serializes_snake_case() {
        let json = serde_json::to_string(&ExtractionMethod::CountryDetection).unwrap();
        assert_eq!(json, "\"country_detection\"");
        assert_eq!(ExtractionMethod::DemoMode.as_str(), "demo_mode");
    }

    #[test]
    fn test_detection_without_region_deserializes() {
        let detection: Detection =
            serde_json::from_str(r#"{"text": "GERMANY", "confidence": 0.93}"#).unwrap();
        assert_eq!(detection, Detection::new("GERMANY", 0.93));
    }
}
