use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::record::{AccumulatedRow, ExtractedRecord};

/// Everything up to the last "attention of" / "represented by" marker.
static ATTENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*\b(?:Attn\b[:.]?|represented by\b)\s*").unwrap());
/// "on behalf of" tail; the leftmost marker wins so the longest tail goes.
static ON_BEHALF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\s+(?:obo|o\.b\.o\.?)(?:\s.*)?|\s*\(o\.b\.o.*)$").unwrap());
static HONORIFIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:Mrs|Mr|Ms|Dr|Ing|Fr|Rev)(?:\.\s*|\s+))+").unwrap()
});
static ARCHITECT_TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:Dr|Perit)\b\.?").unwrap());

/// Mis-decoded UTF-8 (read as cp1252) and typographic quotes.
const PUNCTUATION_FIXES: &[(&str, &str)] = &[
    ("â€™", "'"),
    ("â€˜", "'"),
    ("â€œ", "\""),
    ("â€\u{9d}", "\""),
    ("â€“", "-"),
    ("\u{2019}", "'"),
    ("\u{2018}", "'"),
];

pub fn fix_punctuation(s: &str) -> String {
    PUNCTUATION_FIXES
        .iter()
        .fold(s.to_string(), |acc, (bad, good)| acc.replace(bad, good))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Python-style title case: a letter is upper-cased when it starts a run of
/// letters, lower-cased otherwise.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

pub fn clean_applicant(s: &str) -> String {
    let s = ATTENTION_RE.replace(s, "");
    let s = ON_BEHALF_RE.replace(&s, "");
    let s = HONORIFIC_RE.replace(&s, "");
    title_case(&collapse_whitespace(&s))
}

pub fn clean_architect(s: &str) -> String {
    collapse_whitespace(&ARCHITECT_TITLE_RE.replace_all(s, ""))
}

/// Split a `TYPE/NUMBER/YEAR` case identifier.
pub fn split_case_number(case: &str) -> Option<(&str, &str, &str)> {
    let mut parts = case.split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(t), Some(n), Some(y), None) => Some((t.trim(), n.trim(), y.trim())),
        _ => None,
    }
}

/// Field cleanup applied to freshly scraped rows before they are merged.
pub struct Normalizer {
    exemptions: HashSet<String>,
}

impl Normalizer {
    pub fn new(exemptions: &[String]) -> Self {
        Normalizer {
            exemptions: exemptions.iter().cloned().collect(),
        }
    }

    /// "Surname, Given" → "Given Surname", unless the value is exempt or
    /// does not split into exactly two parts.
    pub fn reverse_name(&self, name: &str) -> String {
        if self.exemptions.contains(name) {
            return name.to_string();
        }
        match name.split(',').collect::<Vec<_>>().as_slice() {
            [surname, given] if !surname.trim().is_empty() && !given.trim().is_empty() => {
                format!("{} {}", given.trim(), surname.trim())
            }
            _ => name.to_string(),
        }
    }

    /// Exempt names are matched as scraped and kept verbatim; everything
    /// else is cleaned and then reversed.
    fn clean_name(&self, name: String, clean: fn(&str) -> String) -> String {
        if self.exemptions.contains(name.trim()) {
            return name.trim().to_string();
        }
        self.reverse_name(&clean(&name))
    }

    /// `None` for rows that have no case number to key on.
    pub fn normalize(&self, record: ExtractedRecord) -> Option<AccumulatedRow> {
        let case_number = record.case_number.trim().to_string();
        if case_number.is_empty() {
            return None;
        }

        let fix = |v: Option<String>| v.map(|s| fix_punctuation(&s));
        let non_empty = |s: String| if s.is_empty() { None } else { Some(s) };

        let applicant = fix(record.applicant)
            .map(|s| self.clean_name(s, clean_applicant))
            .and_then(non_empty);
        let architect = fix(record.architect)
            .map(|s| self.clean_name(s, clean_architect))
            .and_then(non_empty);

        let split = split_case_number(&case_number);
        let mut row = AccumulatedRow::from(ExtractedRecord {
            location: fix(record.location),
            description: fix(record.description),
            applicant,
            architect,
            case_number: case_number.clone(),
            ..record
        });
        if let Some((t, n, y)) = split {
            row.application_type = Some(t.to_string());
            row.application_number = Some(n.to_string());
            row.application_year = Some(y.to_string());
        }
        Some(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> Normalizer {
        Normalizer::new(&["Mangion, Mangion & Partners".to_string()])
    }

    #[test]
    fn strips_attention_prefix() {
        assert_eq!(clean_applicant("Attn: Smith, John"), "Smith, John");
        assert_eq!(clean_applicant("ABC Ltd Attn. Mary Vella"), "Mary Vella");
        assert_eq!(clean_applicant("XYZ Co represented by Paul Azzopardi"), "Paul Azzopardi");
    }

    #[test]
    fn strips_longest_on_behalf_tail() {
        assert_eq!(clean_applicant("Joseph Vella obo Vella Holdings Ltd"), "Joseph Vella");
        assert_eq!(clean_applicant("Joseph Vella o.b.o. Holdings obo Other"), "Joseph Vella");
        assert_eq!(clean_applicant("Joseph Vella (o.b.o Holdings)"), "Joseph Vella");
        assert_eq!(clean_applicant("Roberto Caruana"), "Roberto Caruana");
    }

    #[test]
    fn strips_honorifics_and_title_cases() {
        assert_eq!(clean_applicant("Mr. JOSEPH VELLA"), "Joseph Vella");
        assert_eq!(clean_applicant("Rev. Dr. anthony o'brien"), "Anthony O'Brien");
        assert_eq!(clean_applicant("Frank Borg"), "Frank Borg");
    }

    #[test]
    fn architect_titles_removed_as_words() {
        assert_eq!(clean_architect("Perit Borg, Maria"), "Borg, Maria");
        assert_eq!(clean_architect("Dr. Drake Micallef"), "Drake Micallef");
    }

    #[test]
    fn fixes_mis_encoded_punctuation() {
        assert_eq!(fix_punctuation("Tal-Qroqq â€™s and D’Amato"), "Tal-Qroqq 's and D'Amato");
    }

    #[test]
    fn reverses_two_part_names_unless_exempt() {
        let n = normalizer();
        assert_eq!(n.reverse_name("Smith, John"), "John Smith");
        assert_eq!(n.reverse_name("Mangion, Mangion & Partners"), "Mangion, Mangion & Partners");
        assert_eq!(n.reverse_name("A, B, C"), "A, B, C");
        assert_eq!(n.reverse_name("Plain Name"), "Plain Name");
    }

    #[test]
    fn normalize_derives_case_parts() {
        let rec = ExtractedRecord {
            case_number: "PA/00010/20".into(),
            applicant: Some("Attn: Smith, John".into()),
            architect: Some("Perit Borg, Maria".into()),
            application_type: Some("Full Development Permission".into()),
            ..Default::default()
        };
        let row = normalizer().normalize(rec).unwrap();
        assert_eq!(row.applicant.as_deref(), Some("John Smith"));
        assert_eq!(row.architect.as_deref(), Some("Maria Borg"));
        assert_eq!(row.application_type.as_deref(), Some("PA"));
        assert_eq!(row.application_number.as_deref(), Some("00010"));
        assert_eq!(row.application_year.as_deref(), Some("20"));
    }

    #[test]
    fn rows_without_case_number_dropped() {
        assert!(normalizer().normalize(ExtractedRecord::default()).is_none());
    }

    #[test]
    fn default_exemptions_survive_cleaning() {
        let defaults: Vec<String> = crate::config::DEFAULT_NAME_EXEMPTIONS
            .iter()
            .map(|s| s.to_string())
            .collect();
        let n = Normalizer::new(&defaults);
        for exempt in &defaults {
            let row = n
                .normalize(ExtractedRecord {
                    case_number: "PA/00001/20".into(),
                    applicant: Some(exempt.clone()),
                    architect: Some(format!(" {exempt} ")),
                    ..Default::default()
                })
                .unwrap();
            assert_eq!(row.applicant.as_deref(), Some(exempt.as_str()));
            assert_eq!(row.architect.as_deref(), Some(exempt.as_str()));
        }
    }
}
