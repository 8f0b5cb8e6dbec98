use crate::models::{ExtractionResult, FinalRecord, KycConfig};
use crate::output::{ResultAssembler, RunTrace};
use crate::processing::extractors::Extractor;
use crate::processing::input::InputLocator;
use crate::processing::ocr::{detect_with_timeout, DetectionSource};
use crate::utils::{KycError, Result};
use crate::validation::Reconciler;
use log::info;
use std::sync::Arc;
use std::time::Duration;

/// Runs one document through input resolution, detection, extraction and
/// reconciliation. `process` always returns a complete record.
pub struct KycProcessor {
    config: KycConfig,
    source: Arc<dyn DetectionSource>,
    reconciler: Reconciler,
}

impl KycProcessor {
    pub fn new(config: KycConfig, source: Arc<dyn DetectionSource>) -> Self {
        let reconciler = Reconciler::new(config.fallback.clone());
        KycProcessor {
            config,
            source,
            reconciler,
        }
    }

    pub fn process(&self, locator: &InputLocator, args: Vec<String>) -> FinalRecord {
        let assembler = ResultAssembler::start(self.config.output.clone());
        if !args.is_empty() {
            info!("Job arguments: {:?}", args);
        }
        let mut trace = RunTrace {
            args,
            ..RunTrace::default()
        };

        let outcome = self.extract(locator, &mut trace);
        let record = self.reconciler.reconcile_outcome(outcome, trace.seed);
        info!(
            "Run finished: method={} verified={} fallback={}",
            record.extraction_method.as_str(),
            record.verified,
            record.fallback_applied
        );
        assembler.assemble(record, trace)
    }

    /// Record for a run that failed before any stage could start.
    pub fn error_record(&self, err: KycError, args: Vec<String>) -> FinalRecord {
        let assembler = ResultAssembler::start(self.config.output.clone());
        let record = self.reconciler.reconcile_outcome(Err(err), 0);
        assembler.assemble(
            record,
            RunTrace {
                args,
                ..RunTrace::default()
            },
        )
    }

    /// Record for a run that panicked.
    pub fn panic_record(&self, message: String, args: Vec<String>) -> FinalRecord {
        let assembler = ResultAssembler::start(self.config.output.clone());
        let mut record = self.reconciler.reconcile(ExtractionResult::empty(), 0);
        record.error = Some(message);
        record.error_kind = Some("panic".to_string());
        assembler.assemble(
            record,
            RunTrace {
                args,
                ..RunTrace::default()
            },
        )
    }

    fn extract(&self, locator: &InputLocator, trace: &mut RunTrace) -> Result<ExtractionResult> {
        let resolved = match locator.resolve() {
            Ok(resolved) => resolved,
            Err(e) => {
                trace.input = Some(locator.effective_dir().display().to_string());
                trace.files_seen = locator.files_seen();
                return Err(e);
            }
        };

        let image = resolved.image;
        info!(
            "Processing {} ({}x{}, {:?})",
            image.source, image.width, image.height, image.format
        );
        trace.input = Some(image.source.clone());
        trace.input_sha256 = Some(image.sha256_hex());
        trace.seed = image.seed();
        trace.dataset = resolved.dataset;

        let timeout = Duration::from_secs(self.config.ocr.timeout_secs);
        let detections = detect_with_timeout(self.source.clone(), Arc::new(image), timeout)?;
        info!("{} returned {} detections", self.source.name(), detections.len());

        let report = Extractor::new(self.config.extraction.clone()).run(&detections);
        trace.high_confidence_detections = report.high_confidence_detections;
        trace.extraction_passes = report.passes;
        trace.detections = detections;
        Ok(report.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Detection, ExtractionMethod};
    use crate::processing::image::tests::png_bytes;
    use crate::processing::image::InputImage;
    use crate::processing::ocr::UnavailableDetector;

    struct Fixed(Vec<Detection>);

    impl DetectionSource for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn detect(&self, _image: &InputImage) -> Result<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    fn locator_with_image() -> (tempfile::TempDir, InputLocator) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scan.png"), png_bytes(4, 4)).unwrap();
        let locator = InputLocator::new(dir.path());
        (dir, locator)
    }

    #[test]
    fn test_process_records_trace() {
        let (_dir, locator) = locator_with_image();
        let source = Fixed(vec![
            Detection::new("PASSPORT", 0.9),
            Detection::new("NO A1234567", 0.9),
            Detection::new("GERMANY", 0.4),
        ]);
        let processor = KycProcessor::new(KycConfig::default(), Arc::new(source));
        let record = processor.process(&locator, vec!["process_passport".to_string()]);

        assert_eq!(record.document_number.as_deref(), Some("A1234567"));
        assert_eq!(record.extraction_method, ExtractionMethod::PatternMatch);
        let meta = &record.source_metadata;
        assert_eq!(meta.total_detections, 3);
        assert_eq!(meta.high_confidence_detections, 2);
        assert_eq!(meta.input_sha256.as_ref().map(String::len), Some(64));
        assert_eq!(meta.args, vec!["process_passport".to_string()]);
    }

    #[test]
    fn test_ocr_failure_becomes_demo_record() {
        let (_dir, locator) = locator_with_image();
        let processor = KycProcessor::new(KycConfig::default(), Arc::new(UnavailableDetector));
        let record = processor.process(&locator, Vec::new());

        assert!(record.verified);
        assert_eq!(record.extraction_method, ExtractionMethod::DemoMode);
        assert_eq!(record.error_kind.as_deref(), Some("ocr_error"));
        assert!(record.source_metadata.input_sha256.is_some());
    }

    #[test]
    fn test_panic_record() {
        let processor = KycProcessor::new(KycConfig::default(), Arc::new(UnavailableDetector));
        let record = processor.panic_record("boom".to_string(), Vec::new());
        assert!(record.verified);
        assert_eq!(record.error_kind.as_deref(), Some("panic"));
        assert!(record.document_number.is_some());
    }
}
