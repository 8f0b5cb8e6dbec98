// Tiered field extraction over OCR detections
use crate::models::{Detection, ExtractionConfig, ExtractionMethod, ExtractionResult, Field};
use crate::processing::patterns::PatternLibrary;
use log::{debug, info};

/// Uppercased detection texts, individually and joined one per line.
struct Corpus {
    texts: Vec<String>,
    joined: String,
}

impl Corpus {
    fn new<'d, I>(detections: I) -> Self
    where
        I: IntoIterator<Item = &'d Detection>,
    {
        let texts: Vec<String> = detections
            .into_iter()
            .map(|d| d.text.trim().to_uppercase())
            .filter(|text| !text.is_empty())
            .collect();
        let joined = texts.join("\n");
        Corpus { texts, joined }
    }
}

/// Outcome of a full extraction run, with the counters the output reports.
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub result: ExtractionResult,
    pub passes: u8,
    pub high_confidence_detections: usize,
}

/// Applies the pattern library tier by tier. Fields are first-writer-wins and
/// the method/confidence pair is fixed by the first tier that finds anything.
pub struct Extractor<'a> {
    library: &'a PatternLibrary,
    config: ExtractionConfig,
}

impl Extractor<'static> {
    pub fn new(config: ExtractionConfig) -> Self {
        Extractor::with_library(PatternLibrary::standard(), config)
    }
}

impl<'a> Extractor<'a> {
    pub fn with_library(library: &'a PatternLibrary, config: ExtractionConfig) -> Self {
        Extractor { library, config }
    }

    pub fn extract(&self, detections: &[Detection]) -> ExtractionResult {
        self.run(detections).result
    }

    pub fn run(&self, detections: &[Detection]) -> ExtractionReport {
        let threshold = self.config.high_confidence_threshold;
        let confident: Vec<&Detection> = detections
            .iter()
            .filter(|d| d.confidence > threshold)
            .collect();
        debug!(
            "{} of {} detections above confidence {}",
            confident.len(),
            detections.len(),
            threshold
        );

        let mut passes = 1;
        let mut result = self.run_tiers(&Corpus::new(confident.iter().copied()));

        // A single retry over everything, only when the filter dropped something.
        if result.extraction_method == ExtractionMethod::None
            && self.config.retry_unfiltered
            && confident.len() < detections.len()
        {
            info!("Filtered pass found nothing, retrying over all {} detections", detections.len());
            passes = 2;
            result = self.run_tiers(&Corpus::new(detections));
        }

        if result.document_number.is_none() {
            self.fallback_tier(&Corpus::new(detections), &mut result);
        }

        info!(
            "Extraction finished: method={} confidence={:.2} document_number={:?} country={:?}",
            result.extraction_method.as_str(),
            result.confidence_score,
            result.document_number,
            result.country
        );

        ExtractionReport {
            result,
            passes,
            high_confidence_detections: confident.len(),
        }
    }

    fn run_tiers(&self, corpus: &Corpus) -> ExtractionResult {
        let mut result = ExtractionResult::empty();
        self.mrz_tier(corpus, &mut result);
        self.document_number_tier(corpus, &mut result);
        if result.country.is_none() {
            self.country_tier(corpus, &mut result);
        }
        if result.name.is_none() {
            self.name_tier(corpus, &mut result);
        }
        result
    }

    fn mrz_tier(&self, corpus: &Corpus, result: &mut ExtractionResult) {
        for rule in &self.library.mrz {
            if let Some(holder) = rule.find(&corpus.joined) {
                debug!("MRZ rule {} matched: {:?}", rule.label, holder);
                result.fill(Field::Country, holder.country, rule.label, rule.weight);
                if let Some(name) = holder.name {
                    result.fill(Field::Name, name, rule.label, rule.weight);
                }
                result.upgrade(ExtractionMethod::Mrz, self.config.mrz_confidence);
                return;
            }
        }
    }

    // Detections in scan order, rules in priority order; the first accepted value wins.
    fn document_number_tier(&self, corpus: &Corpus, result: &mut ExtractionResult) {
        for text in &corpus.texts {
            for rule in &self.library.document_number {
                if let Some(number) = rule.find(text) {
                    debug!("Document number {} from rule {} in {:?}", number, rule.label, text);
                    result.fill(Field::DocumentNumber, number, rule.label, rule.weight);
                    result.upgrade(ExtractionMethod::PatternMatch, self.config.pattern_confidence);
                    return;
                }
            }
        }
    }

    fn country_tier(&self, corpus: &Corpus, result: &mut ExtractionResult) {
        for rule in &self.library.country {
            if let Some(country) = rule.find(&corpus.joined) {
                debug!("Country {} from rule {}", country, rule.label);
                result.fill(Field::Country, country, rule.label, rule.weight);
                result.upgrade(ExtractionMethod::CountryDetection, self.config.country_confidence);
                return;
            }
        }
    }

    fn name_tier(&self, corpus: &Corpus, result: &mut ExtractionResult) {
        for matcher in &self.library.name {
            if let Some(name) = matcher.find(&corpus.joined) {
                debug!("Name {:?} from rule {}", name, matcher.label());
                result.fill(Field::Name, name, matcher.label(), matcher.weight());
                return;
            }
        }
    }

    fn fallback_tier(&self, corpus: &Corpus, result: &mut ExtractionResult) {
        for rule in &self.library.fallback {
            if let Some(number) = rule.find(&corpus.joined) {
                info!("Using fallback document number {} from rule {}", number, rule.label);
                result.fill(Field::DocumentNumber, number, rule.label, rule.weight);
                result.upgrade(ExtractionMethod::FallbackPattern, self.config.fallback_confidence);
                return;
            }
        }
    }
}
