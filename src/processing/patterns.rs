//! The static catalogue of field matchers, in priority order per field.

use crate::models::rules::{country_for_alias, country_from_mrz, holder_name, COUNTRY_ALIASES, COUNTRY_CODES};
use crate::models::{Exclusion, Field, FieldRule};
use lazy_static::lazy_static;
use regex::{Captures, Regex};

/// Keywords that show a number candidate sits on a field header.
pub const DOCUMENT_NUMBER_GUARD: &[&str] = &[
    "DOB", "SEX", "ISS", "EXP", "CLASS", "TYPE", "DATE", "BIRTH", "HEIGHT", "WEIGHT",
];

/// Words printed as field labels on the data page.
pub const LABEL_WORDS: &[&str] = &[
    "SURNAME", "SURNAMES", "GIVEN", "NAME", "NAMES", "FIRST", "LAST", "FAMILY", "FORENAME",
    "FORENAMES", "PASSPORT", "NATIONALITY", "SEX", "DATE", "BIRTH", "PLACE", "TYPE", "CODE",
    "NO", "AUTHORITY", "ISSUE", "EXPIRY", "SIGNATURE", "HOLDER",
];

/// Country and holder name read from an MRZ.
#[derive(Debug, Clone, PartialEq)]
pub struct MrzHolder {
    pub country: String,
    pub name: Option<String>,
}

/// Tier-one matcher over the whole corpus.
pub struct MrzRule {
    pub label: &'static str,
    pub weight: f32,
    pattern: Regex,
    parse: fn(&Captures, &str) -> Option<MrzHolder>,
}

impl MrzRule {
    pub fn find(&self, corpus: &str) -> Option<MrzHolder> {
        self.pattern
            .captures_iter(corpus)
            .find_map(|caps| (self.parse)(&caps, corpus))
    }
}

/// Name matchers either read one pattern or combine two labeled fields.
pub enum NameMatcher {
    Single(FieldRule),
    Labeled { surname: FieldRule, given: FieldRule },
}

impl NameMatcher {
    pub fn label(&self) -> &'static str {
        match self {
            NameMatcher::Single(rule) => rule.label,
            NameMatcher::Labeled { surname, .. } => surname.label,
        }
    }

    pub fn weight(&self) -> f32 {
        match self {
            NameMatcher::Single(rule) => rule.weight,
            NameMatcher::Labeled { surname, .. } => surname.weight,
        }
    }

    pub fn find(&self, text: &str) -> Option<String> {
        match self {
            NameMatcher::Single(rule) => rule.find(text),
            NameMatcher::Labeled { surname, given } => match (surname.find(text), given.find(text)) {
                (Some(s), Some(g)) => Some(format!("{}, {}", s, g)),
                (Some(s), None) => Some(s),
                (None, Some(g)) => Some(g),
                (None, None) => None,
            },
        }
    }
}

pub struct PatternLibrary {
    pub mrz: Vec<MrzRule>,
    pub document_number: Vec<FieldRule>,
    pub country: Vec<FieldRule>,
    pub name: Vec<NameMatcher>,
    pub fallback: Vec<FieldRule>,
}

lazy_static! {
    static ref STANDARD: PatternLibrary = PatternLibrary::build();

    static ref MRZ_NAMES_LINE: Regex =
        Regex::new(r"(?m)^([A-Z]+(?:<[A-Z]+)*)<<([A-Z]+(?:<[A-Z]+)*)<*$").unwrap();

    // First line of a TD1 card, a whole 30-character detection:
    // type, state, document number, check digit, optional data.
    static ref TD1_HEADER_LINE: Regex =
        Regex::new(r"(?m)^[IAC][A-Z<]([A-Z]{3}|D<<)([A-Z0-9<]{9})\d[A-Z0-9<]{15}$").unwrap();
}

/// A TD1 header pads its unused positions with `<`.
fn is_filled_mrz_line(caps: &Captures) -> bool {
    caps.get(0).map_or(false, |line| line.as_str().contains('<'))
}

impl PatternLibrary {
    /// The process-wide library, built on first use.
    pub fn standard() -> &'static PatternLibrary {
        &STANDARD
    }

    fn build() -> Self {
        PatternLibrary {
            mrz: vec![
                // TD3 passports and TD2 cards: P<UTOERIKSSON<<ANNA<MARIA<<<
                MrzRule {
                    label: "mrz_holder_line",
                    weight: 0.9,
                    pattern: Regex::new(
                        r"\b[PIAC][A-Z<]([A-Z]{3}|D<<)([A-Z]+(?:<[A-Z]+)*)<<([A-Z]+(?:<[A-Z]+)*)?",
                    )
                    .unwrap(),
                    parse: |caps, _| {
                        Some(MrzHolder {
                            country: country_from_mrz(caps.get(1)?.as_str())?,
                            name: holder_name(caps.get(2)?.as_str(), caps.get(3).map(|m| m.as_str())),
                        })
                    },
                },
                // TD1 cards carry the names on their third line.
                MrzRule {
                    label: "mrz_td1_header",
                    weight: 0.85,
                    pattern: TD1_HEADER_LINE.clone(),
                    parse: |caps, corpus| {
                        if !is_filled_mrz_line(caps) {
                            return None;
                        }
                        let name = MRZ_NAMES_LINE
                            .captures(corpus)
                            .and_then(|names| holder_name(names.get(1)?.as_str(), names.get(2).map(|m| m.as_str())));
                        Some(MrzHolder {
                            country: country_from_mrz(caps.get(1)?.as_str())?,
                            name,
                        })
                    },
                },
            ],
            document_number: vec![
                number_rule(
                    "mrz_document_number",
                    r"([A-Z0-9<]{9})[0-9<](?:[A-Z]{3}|D<<)\d{6}\d[MF<]",
                    1.0,
                ),
                FieldRule::new(
                    Field::DocumentNumber,
                    "mrz_td1_document_number",
                    TD1_HEADER_LINE.clone(),
                    1.0,
                    DOCUMENT_NUMBER_GUARD,
                    Exclusion::Substring,
                    |caps| {
                        if !is_filled_mrz_line(caps) {
                            return None;
                        }
                        clean_number(caps.get(2)?.as_str())
                    },
                ),
                number_rule(
                    "passport_no_anchor",
                    r"(?:PASSPORT\s*(?:NO|NUMBER|NR|#)\.?|\bNO\.)\s*[:#]?\s*([A-Z0-9]{6,9})\b",
                    0.9,
                ),
                number_rule("letters_digits", r"\b([A-Z]{1,2}\d{6,8})\b", 0.8),
                number_rule("digits_only", r"\b(\d{8,9})\b", 0.7),
                number_rule("letter_seven_digits", r"\b([A-Z]\d{7})\b", 0.7),
            ],
            country: vec![
                FieldRule::new(
                    Field::Country,
                    "mrz_country_prefix",
                    Regex::new(r"\bP<([A-Z]{3}|D<<)").unwrap(),
                    0.9,
                    &[],
                    Exclusion::Substring,
                    |caps| country_from_mrz(caps.get(1)?.as_str()),
                ),
                FieldRule::new(
                    Field::Country,
                    "country_alias",
                    alias_pattern(),
                    0.6,
                    &[],
                    Exclusion::Substring,
                    |caps| {
                        let alias = collapse_whitespace(caps.get(1)?.as_str());
                        country_for_alias(&alias).map(str::to_string)
                    },
                ),
                // Whole-detection codes only, so prose like "CAN" inside a sentence is ignored.
                FieldRule::new(
                    Field::Country,
                    "country_code",
                    Regex::new(r"(?m)^[ \t]*([A-Z]{3})[ \t]*$").unwrap(),
                    0.5,
                    &[],
                    Exclusion::Substring,
                    |caps| {
                        let code = caps.get(1)?.as_str();
                        COUNTRY_CODES.contains(&code).then(|| code.to_string())
                    },
                ),
            ],
            name: vec![
                NameMatcher::Single(FieldRule::new(
                    Field::Name,
                    "mrz_names_line",
                    MRZ_NAMES_LINE.clone(),
                    0.9,
                    LABEL_WORDS,
                    Exclusion::Word,
                    |caps| holder_name(caps.get(1)?.as_str(), caps.get(2).map(|m| m.as_str())),
                )),
                NameMatcher::Labeled {
                    surname: labeled_name_rule(
                        "labeled_surname",
                        r"\b(?:SURNAME|LAST\s+NAME|FAMILY\s+NAME)S?\b[ \t]*[:/.]?\s*([A-Z][A-Z' -]*[A-Z])",
                    ),
                    given: labeled_name_rule(
                        "labeled_given_names",
                        r"\b(?:GIVEN\s+NAMES?|FIRST\s+NAMES?|FORENAMES?)\b[ \t]*[:/.]?\s*([A-Z][A-Z' -]*[A-Z])",
                    ),
                },
                NameMatcher::Single(FieldRule::new(
                    Field::Name,
                    "comma_name",
                    Regex::new(r"(?m)^[ \t]*([A-Z][A-Z'-]+(?: [A-Z][A-Z'-]+)?)[ \t]*,[ \t]*([A-Z][A-Z'-]+(?: [A-Z][A-Z'-]+)*)[ \t]*$")
                        .unwrap(),
                    0.5,
                    LABEL_WORDS,
                    Exclusion::Word,
                    |caps| {
                        let surname = caps.get(1)?.as_str();
                        let given = caps.get(2)?.as_str();
                        // "BERLIN, GERMANY" is a place, not a holder.
                        if country_for_alias(surname).is_some() || country_for_alias(given).is_some() {
                            return None;
                        }
                        Some(format!("{}, {}", surname, given))
                    },
                )),
            ],
            fallback: vec![FieldRule::new(
                Field::DocumentNumber,
                "fallback_token",
                Regex::new(r"\b([A-Z0-9]{6,10})\b").unwrap(),
                0.4,
                DOCUMENT_NUMBER_GUARD,
                Exclusion::Substring,
                |caps| {
                    let token = caps.get(1)?.as_str();
                    token.chars().any(|c| c.is_ascii_digit()).then(|| token.to_string())
                },
            )],
        }
    }
}

fn number_rule(label: &'static str, pattern: &str, weight: f32) -> FieldRule {
    FieldRule::new(
        Field::DocumentNumber,
        label,
        Regex::new(pattern).unwrap(),
        weight,
        DOCUMENT_NUMBER_GUARD,
        Exclusion::Substring,
        |caps| clean_number(caps.get(1)?.as_str()),
    )
}

fn clean_number(raw: &str) -> Option<String> {
    let value = raw.trim_matches('<').replace('<', "");
    (value.len() >= 6).then_some(value)
}

fn labeled_name_rule(label: &'static str, pattern: &str) -> FieldRule {
    FieldRule::new(
        Field::Name,
        label,
        Regex::new(pattern).unwrap(),
        0.7,
        LABEL_WORDS,
        Exclusion::Word,
        |caps| {
            // The value runs until the next label printed on the same line.
            let words: Vec<&str> = caps
                .get(1)?
                .as_str()
                .split_whitespace()
                .take_while(|word| !LABEL_WORDS.contains(word))
                .collect();
            (!words.is_empty()).then(|| words.join(" "))
        },
    )
}

fn alias_pattern() -> Regex {
    let alternatives = COUNTRY_ALIASES
        .iter()
        .map(|(alias, _)| alias.replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b({})\b", alternatives)).unwrap()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_number(text: &str) -> Option<(String, &'static str)> {
        PatternLibrary::standard()
            .document_number
            .iter()
            .find_map(|rule| rule.find(text).map(|value| (value, rule.label)))
    }

    #[test]
    fn test_mrz_holder_line() {
        let lib = PatternLibrary::standard();
        let holder = lib.mrz[0].find("P<DEUMUSTERMANN<<ERIKA<<<<<<<<<<<<<<<<<<<<<").unwrap();
        assert_eq!(holder.country, "DEU");
        assert_eq!(holder.name.as_deref(), Some("MUSTERMANN, ERIKA"));
    }

    #[test]
    fn test_mrz_holder_german_short_code() {
        let holder = PatternLibrary::standard().mrz[0]
            .find("P<D<<MUSTERMANN<<ERIKA<<<<<<<<<<<<<<<<<<<<<<<")
            .unwrap();
        assert_eq!(holder.country, "DEU");
    }

    #[test]
    fn test_plain_words_are_not_mrz() {
        let lib = PatternLibrary::standard();
        assert!(lib.mrz.iter().all(|rule| rule.find("PASSPORT\nPASSEPORT\nREISEPASS").is_none()));
    }

    #[test]
    fn test_td1_header_with_names_line() {
        let corpus = "I<UTOD231458907<<<<<<<<<<<<<<<\n7408122F1204159UTO<<<<<<<<<<<6\nERIKSSON<<ANNA<MARIA<<<<<<<<<<";
        let holder = PatternLibrary::standard().mrz[1].find(corpus).unwrap();
        assert_eq!(holder.country, "UTO");
        assert_eq!(holder.name.as_deref(), Some("ERIKSSON, ANNA MARIA"));
    }

    #[test]
    fn test_td1_requires_a_padded_header_line() {
        let lib = PatternLibrary::standard();
        for text in ["CARDNO123456789", "IDUTOD231458907ABCDEFGHIJKLMNO", "SEE I<UTOD231458907<<<<<<<<<<<<<<<"] {
            assert!(lib.mrz.iter().all(|rule| rule.find(text).is_none()), "{}", text);
            assert_ne!(first_number(text).map(|(_, rule)| rule), Some("mrz_td1_document_number"));
        }
        assert_eq!(
            first_number("I<UTOD231458907<<<<<<<<<<<<<<<"),
            Some(("D23145890".to_string(), "mrz_td1_document_number"))
        );
    }

    #[test]
    fn test_mrz_second_line_number() {
        let (value, rule) = first_number("L898902C<3UTO6908061F9406236ZE184226B<<<<<10").unwrap();
        assert_eq!(value, "L898902C");
        assert_eq!(rule, "mrz_document_number");
    }

    #[test]
    fn test_number_priority() {
        assert_eq!(first_number("PASSPORT NO. X9876543").unwrap().1, "passport_no_anchor");
        assert_eq!(first_number("NO A1234567").unwrap(), ("A1234567".to_string(), "letters_digits"));
        assert_eq!(first_number("123456789").unwrap().1, "digits_only");
        assert_eq!(first_number("L898902C"), None);
    }

    #[test]
    fn test_guarded_keywords_rejected() {
        assert_eq!(first_number("DOB 1990"), None);
        let fallback = &PatternLibrary::standard().fallback[0];
        assert_eq!(fallback.find("DOB 1990"), None);
        assert_eq!(fallback.find("DOB1990"), None);
        assert_eq!(fallback.find("EXP2030 L898902C"), Some("L898902C".to_string()));
    }

    #[test]
    fn test_fallback_requires_a_digit() {
        let fallback = &PatternLibrary::standard().fallback[0];
        assert_eq!(fallback.find("PASSPORT\nGERMANY"), None);
        assert_eq!(fallback.find("L898902C"), Some("L898902C".to_string()));
    }

    #[test]
    fn test_country_rules() {
        let country = &PatternLibrary::standard().country;
        assert_eq!(country[1].find("REPUBLIC OF\nGERMANY"), Some("DEU".to_string()));
        assert_eq!(country[1].find("UNITED  KINGDOM"), Some("GBR".to_string()));
        assert_eq!(country[2].find("TYPE P\nUSA\nX"), Some("USA".to_string()));
        assert_eq!(country[2].find("YOU CAN DO IT"), None);
        assert_eq!(country[2].find("XYZ"), None);
    }

    #[test]
    fn test_labeled_names_across_detections() {
        let labeled = &PatternLibrary::standard().name[1];
        assert_eq!(
            labeled.find("SURNAME\nMUSTERMANN\nGIVEN NAMES\nERIKA"),
            Some("MUSTERMANN, ERIKA".to_string())
        );
        assert_eq!(
            labeled.find("SURNAME: DOE GIVEN NAMES: JOHN"),
            Some("DOE, JOHN".to_string())
        );
    }

    #[test]
    fn test_comma_name_skips_places() {
        let comma = &PatternLibrary::standard().name[2];
        assert_eq!(comma.find("BERLIN, GERMANY"), None);
        assert_eq!(comma.find("SMITH, JOHN"), Some("SMITH, JOHN".to_string()));
    }
}
