use crate::models::config::default_profiles;
use crate::models::{
    DemoProfile, DemoSelection, ExtractionMethod, ExtractionResult, FallbackConfig, Field, ReconciledRecord,
};
use crate::utils::{KycError, Result};
use log::{error, info, warn};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Decides whether an extraction is verified and, under the guaranteed-output
/// policy, backfills what is missing from the demo catalogue.
pub struct Reconciler {
    config: FallbackConfig,
    cursor: AtomicUsize,
}

impl Reconciler {
    pub fn new(config: FallbackConfig) -> Self {
        Reconciler {
            config,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Reconciles the outcome of the upstream stages. A failed stage still
    /// produces a complete record, tagged with the error that caused it.
    pub fn reconcile_outcome(&self, outcome: Result<ExtractionResult>, seed: u64) -> ReconciledRecord {
        let err = match outcome {
            Ok(result) => return self.reconcile(result, seed),
            Err(err) => err,
        };

        match &err {
            KycError::NoInputFound(_) | KycError::NotFound(_) => {
                info!("No usable input ({}), producing demo record", err)
            }
            KycError::Ocr(_) | KycError::OcrTimeout(_) => {
                warn!("Detection failed ({}), producing demo record", err)
            }
            KycError::ImageUnreadable(_) | KycError::Deserialization(_) => {
                warn!("Input rejected ({}), producing demo record", err)
            }
            KycError::Config(_) | KycError::Io(_) => error!("Run failed ({}), producing demo record", err),
        }

        let mut record = self.reconcile(ExtractionResult::empty(), seed);
        record.error_kind = Some(err.kind().to_string());
        record.error = Some(err.to_string());
        record
    }

    pub fn reconcile(&self, result: ExtractionResult, seed: u64) -> ReconciledRecord {
        let verified = result.is_verified();
        if verified || !self.config.guaranteed_output_mode {
            return ReconciledRecord {
                document_number: result.document_number,
                country: result.country,
                name: result.name,
                verified,
                confidence_score: result.confidence_score,
                extraction_method: result.extraction_method,
                fallback_applied: false,
                demo_fields: Vec::new(),
                evidence: result.evidence,
                error: None,
                error_kind: None,
            };
        }

        let profile = self.select_profile(seed);
        let mut demo_fields = Vec::new();
        let document_number = backfill(
            result.document_number,
            &profile.document_number,
            Field::DocumentNumber,
            &mut demo_fields,
        );
        let country = backfill(result.country, &profile.country, Field::Country, &mut demo_fields);
        let name = backfill(result.name, &profile.name, Field::Name, &mut demo_fields);

        let extraction_method = match result.extraction_method {
            ExtractionMethod::None => ExtractionMethod::DemoMode,
            method => method,
        };
        info!(
            "Demo profile {} backfilled {:?}",
            profile.document_number,
            demo_fields.iter().map(Field::as_str).collect::<Vec<_>>()
        );

        ReconciledRecord {
            document_number,
            country,
            name,
            verified: true,
            confidence_score: result.confidence_score.max(self.config.min_confidence),
            extraction_method,
            fallback_applied: true,
            demo_fields,
            evidence: result.evidence,
            error: None,
            error_kind: None,
        }
    }

    fn select_profile(&self, seed: u64) -> DemoProfile {
        let profiles = if self.config.profiles.is_empty() {
            default_profiles()
        } else {
            self.config.profiles.clone()
        };
        let index = match self.config.selection {
            DemoSelection::Fixed { index } => index,
            DemoSelection::RoundRobin => self.cursor.fetch_add(1, Ordering::Relaxed),
            DemoSelection::InputDigest => (seed % profiles.len() as u64) as usize,
        } % profiles.len();
        profiles[index].clone()
    }
}

fn backfill(extracted: Option<String>, demo: &str, field: Field, demo_fields: &mut Vec<Field>) -> Option<String> {
    match extracted {
        Some(value) => Some(value),
        None => {
            demo_fields.push(field);
            Some(demo.to_string())
        }
    }
}
