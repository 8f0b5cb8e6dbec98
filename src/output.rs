//! Final record assembly and the two files every run leaves behind.

use crate::models::{DatasetInfo, Detection, FinalRecord, OutputConfig, ReconciledRecord, SourceMetadata};
use crate::utils::Result;
use log::{error, info};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const RESULT_FILE: &str = "result.json";
pub const COMPLETION_FILE: &str = "computed.json";

/// What the pipeline learned about its input along the way. Every field is
/// optional because a run can stop at any stage.
#[derive(Debug, Clone, Default)]
pub struct RunTrace {
    pub input: Option<String>,
    pub input_sha256: Option<String>,
    /// Drives `input_digest` demo selection; zero when no image was read.
    pub seed: u64,
    pub dataset: Option<DatasetInfo>,
    pub detections: Vec<Detection>,
    pub high_confidence_detections: usize,
    pub extraction_passes: u8,
    pub args: Vec<String>,
    pub files_seen: Vec<String>,
}

pub struct ResultAssembler {
    config: OutputConfig,
    started: Instant,
}

impl ResultAssembler {
    /// Starts the run clock.
    pub fn start(config: OutputConfig) -> Self {
        ResultAssembler {
            config,
            started: Instant::now(),
        }
    }

    pub fn assemble(&self, record: ReconciledRecord, trace: RunTrace) -> FinalRecord {
        let mut matched_rules: Vec<String> = Vec::new();
        for evidence in &record.evidence {
            if !matched_rules.contains(&evidence.rule) {
                matched_rules.push(evidence.rule.clone());
            }
        }

        let raw_texts = trace
            .detections
            .iter()
            .take(self.config.raw_text_limit)
            .map(|d| d.text.chars().take(self.config.raw_text_max_chars).collect())
            .collect();

        FinalRecord {
            document_number: record.document_number,
            country: record.country,
            name: record.name,
            verified: record.verified,
            confidence_score: record.confidence_score,
            extraction_method: record.extraction_method,
            processing_time: self.started.elapsed().as_secs_f64(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            fallback_applied: record.fallback_applied,
            demo_fields: record.demo_fields,
            source_metadata: SourceMetadata {
                total_detections: trace.detections.len(),
                high_confidence_detections: trace.high_confidence_detections,
                extraction_passes: trace.extraction_passes,
                input: trace.input,
                input_sha256: trace.input_sha256,
                dataset: trace.dataset,
                matched_rules,
                raw_texts,
                args: trace.args,
                files_seen: trace.files_seen,
            },
            error: record.error,
            error_kind: record.error_kind,
        }
    }
}

/// Writes `result.json` into `out_dir` and returns its path.
pub fn write_result(out_dir: &Path, record: &FinalRecord) -> Result<PathBuf> {
    let path = out_dir.join(RESULT_FILE);
    std::fs::write(&path, serde_json::to_string_pretty(record)?)?;
    info!("Result written to {}", path.display());
    Ok(path)
}

/// Writes `computed.json` when dropped, so the marker exists on every exit
/// path including unwinding.
pub struct CompletionMarker {
    out_dir: PathBuf,
    error: Option<String>,
}

impl CompletionMarker {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        CompletionMarker {
            out_dir: out_dir.into(),
            error: None,
        }
    }

    /// Records the failure reported alongside the output path. The first
    /// failure is kept.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(message.into());
        }
    }

    pub fn write(&self) -> Result<PathBuf> {
        let result_path = self.out_dir.join(RESULT_FILE);
        let mut marker = json!({
            "deterministic-output-path": result_path.display().to_string(),
        });
        if let Some(message) = &self.error {
            marker["error-message"] = json!(message);
        }
        let path = self.out_dir.join(COMPLETION_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(&marker)?)?;
        Ok(path)
    }
}

impl Drop for CompletionMarker {
    fn drop(&mut self) {
        match self.write() {
            Ok(path) => info!("Completion marker written to {}", path.display()),
            Err(e) => error!("Failed to write completion marker: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractionMethod, Field, FieldEvidence};
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn reconciled() -> ReconciledRecord {
        let evidence = |field, rule: &str| FieldEvidence {
            field,
            rule: rule.to_string(),
            weight: 0.9,
        };
        ReconciledRecord {
            document_number: Some("L898902C".to_string()),
            country: Some("DEU".to_string()),
            name: Some("MUSTERMANN, ERIKA".to_string()),
            verified: true,
            confidence_score: 0.9,
            extraction_method: ExtractionMethod::Mrz,
            fallback_applied: true,
            demo_fields: vec![Field::DocumentNumber],
            evidence: vec![
                evidence(Field::Country, "mrz_holder"),
                evidence(Field::Name, "mrz_holder"),
            ],
            error: None,
            error_kind: None,
        }
    }

    #[test]
    fn test_assemble_metadata() {
        let assembler = ResultAssembler::start(OutputConfig {
            raw_text_limit: 2,
            raw_text_max_chars: 5,
        });
        let trace = RunTrace {
            input: Some("input/scan.png".to_string()),
            detections: vec![
                Detection::new("P<DEUMUSTERMANN", 0.9),
                Detection::new("GERMANY", 0.3),
                Detection::new("IGNORED", 0.9),
            ],
            high_confidence_detections: 2,
            extraction_passes: 1,
            ..RunTrace::default()
        };
        let record = assembler.assemble(reconciled(), trace);

        let meta = &record.source_metadata;
        assert_eq!(meta.total_detections, 3);
        assert_eq!(meta.high_confidence_detections, 2);
        assert_eq!(meta.raw_texts, vec!["P<DEU".to_string(), "GERMA".to_string()]);
        assert_eq!(meta.matched_rules, vec!["mrz_holder".to_string()]);
        assert!(record.processing_time >= 0.0);
        assert!(chrono::DateTime::parse_from_rfc3339(&record.timestamp).is_ok());
    }

    #[test]
    fn test_result_json_shape() {
        let dir = tempfile::tempdir().unwrap();
        let record = ResultAssembler::start(OutputConfig::default()).assemble(reconciled(), RunTrace::default());
        let path = write_result(dir.path(), &record).unwrap();

        let json: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["extraction_method"], "mrz");
        assert_eq!(json["demo_fields"], json!(["document_number"]));
        assert_eq!(json["verified"], true);
        assert!(json.get("error").is_none());
        assert!(json["source_metadata"].get("files_seen").is_none());
    }

    #[test]
    fn test_marker_written_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _marker = CompletionMarker::new(dir.path());
        }
        let json: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(COMPLETION_FILE)).unwrap()).unwrap();
        assert!(json["deterministic-output-path"].as_str().unwrap().ends_with(RESULT_FILE));
        assert!(json.get("error-message").is_none());
    }

    #[test]
    fn test_marker_keeps_first_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut marker = CompletionMarker::new(dir.path());
        marker.fail("OCR timed out");
        marker.fail("later failure");
        let path = marker.write().unwrap();
        let json: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["error-message"], "OCR timed out");
    }
}
