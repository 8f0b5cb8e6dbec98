use crate::models::Field;
use regex::{Captures, Regex};

/// How a rule's exclusion terms are compared against a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    /// Reject when any term occurs anywhere in the matched text.
    Substring,
    /// Reject when any term equals one of the matched words.
    Word,
}

/// A single matcher of the pattern library: a regex, a weight, and the terms
/// that mark a match as a label rather than a value.
pub struct FieldRule {
    pub field: Field,
    pub label: &'static str,
    pub weight: f32,
    pattern: Regex,
    exclusions: &'static [&'static str],
    exclusion_mode: Exclusion,
    resolve: fn(&Captures) -> Option<String>,
}

impl FieldRule {
    pub fn new(
        field: Field,
        label: &'static str,
        pattern: Regex,
        weight: f32,
        exclusions: &'static [&'static str],
        exclusion_mode: Exclusion,
        resolve: fn(&Captures) -> Option<String>,
    ) -> Self {
        FieldRule {
            field,
            label,
            weight,
            pattern,
            exclusions,
            exclusion_mode,
            resolve,
        }
    }

    /// First accepted value in `text`, scanning matches left to right.
    pub fn find(&self, text: &str) -> Option<String> {
        self.pattern
            .captures_iter(text)
            .filter_map(|caps| (self.resolve)(&caps))
            .find(|value| !self.is_excluded(value))
    }

    pub fn is_excluded(&self, candidate: &str) -> bool {
        let upper = candidate.to_uppercase();
        match self.exclusion_mode {
            Exclusion::Substring => self.exclusions.iter().any(|term| upper.contains(term)),
            Exclusion::Word => upper
                .split(|c: char| !c.is_ascii_alphabetic())
                .filter(|word| !word.is_empty())
                .any(|word| self.exclusions.contains(&word)),
        }
    }
}

impl std::fmt::Debug for FieldRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldRule")
            .field("field", &self.field)
            .field("label", &self.label)
            .field("weight", &self.weight)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

/// Country names and abbreviations seen on documents, mapped to ISO alpha-3.
pub const COUNTRY_ALIASES: &[(&str, &str)] = &[
    ("BUNDESREPUBLIK DEUTSCHLAND", "DEU"),
    ("DEUTSCHLAND", "DEU"),
    ("GERMANY", "DEU"),
    ("GER", "DEU"),
    ("UNITED STATES OF AMERICA", "USA"),
    ("UNITED STATES", "USA"),
    ("UNITED KINGDOM", "GBR"),
    ("GREAT BRITAIN", "GBR"),
    ("FRANCE", "FRA"),
    ("REPUBLIQUE FRANCAISE", "FRA"),
    ("CANADA", "CAN"),
    ("AUSTRALIA", "AUS"),
    ("ITALY", "ITA"),
    ("ITALIA", "ITA"),
    ("SPAIN", "ESP"),
    ("ESPANA", "ESP"),
    ("NETHERLANDS", "NLD"),
];

/// Bare three-letter codes accepted without further context.
pub const COUNTRY_CODES: &[&str] = &[
    "USA", "GBR", "DEU", "FRA", "CAN", "AUS", "ITA", "ESP", "NLD", "BEL", "CHE", "AUT", "SWE",
    "NOR", "DNK", "FIN",
];

pub fn country_for_alias(alias: &str) -> Option<&'static str> {
    let alias = alias.trim().to_uppercase();
    COUNTRY_ALIASES
        .iter()
        .find(|(name, _)| *name == alias)
        .map(|(_, code)| *code)
}

/// Normalizes an MRZ issuing-state field. Germany is encoded as `D<<`.
pub fn country_from_mrz(raw: &str) -> Option<String> {
    let code = raw.trim_end_matches('<');
    match code.len() {
        1 if code == "D" => Some("DEU".to_string()),
        3 if code.chars().all(|c| c.is_ascii_uppercase()) => Some(code.to_string()),
        _ => None,
    }
}

/// Turns MRZ name groups (`VON<DER<LEYEN`, `ANNA<MARIA`) into `SURNAME, GIVEN`.
pub fn holder_name(surname: &str, given_names: Option<&str>) -> Option<String> {
    let surname = mrz_words(surname);
    if surname.is_empty() {
        return None;
    }
    match given_names.map(mrz_words).filter(|g| !g.is_empty()) {
        Some(given) => Some(format!("{}, {}", surname, given)),
        None => Some(surname),
    }
}

fn mrz_words(raw: &str) -> String {
    raw.split(|c: char| c == '<' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
