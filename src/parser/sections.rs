use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::trace;

use super::{element_text, FieldMap};

static FORM_TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table.formTable").unwrap());
static TH: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th").unwrap());
static TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

/// A `formTable` identified by a phrase in one of its header cells.
#[derive(Debug, Clone, Copy)]
pub struct SectionLookup {
    pub name: &'static str,
    pub heading: &'static str,
    /// Only these labels are taken from the section; `None` takes all.
    pub labels: Option<&'static [&'static str]>,
}

/// Lookup order. Earlier sections win when two contribute the same label.
pub const LOOKUPS: &[SectionLookup] = &[
    SectionLookup {
        name: "status",
        heading: "Application Status (Does not reflect any appeal decisions on the case)",
        labels: None,
    },
    SectionLookup {
        name: "status_alt",
        heading: "Application Status Application Status (Does not reflect any Appeals Decisions on the case)",
        labels: None,
    },
    SectionLookup {
        name: "details",
        heading: "Application Details",
        labels: None,
    },
    SectionLookup {
        name: "processing",
        heading: "Initial Processing",
        labels: Some(&["Application Type:", "Case Category:"]),
    },
];

impl SectionLookup {
    /// Label/value pairs of the first matching table, `None` when the page
    /// has no such section.
    pub fn find(&self, doc: &Html) -> Option<FieldMap> {
        let table = doc.select(&FORM_TABLE).find(|t| {
            t.select(&TH)
                .any(|th| element_text(th).contains(self.heading))
        })?;

        let mut fields = FieldMap::new();
        for row in table.select(&TR) {
            let cells: Vec<_> = row.select(&TD).collect();
            let [label, value] = cells.as_slice() else {
                continue;
            };
            let label = element_text(*label);
            if let Some(allowed) = self.labels {
                if !allowed.contains(&label.as_str()) {
                    continue;
                }
            }
            fields.insert(label, element_text(*value));
        }
        Some(fields)
    }
}

/// Merge every lookup left to right; a missing section contributes nothing.
pub fn extract(doc: &Html) -> FieldMap {
    let mut fields = FieldMap::new();
    for lookup in LOOKUPS {
        match lookup.find(doc) {
            Some(partial) => {
                trace!(section = lookup.name, labels = partial.len(), "section found");
                for (label, value) in partial {
                    fields.entry(label).or_insert(value);
                }
            }
            None => trace!(section = lookup.name, "section missing"),
        }
    }
    fields
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::extract_fields;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn full_record_page() {
        let f = extract_fields(&fixture("record"));
        assert_eq!(f.get("Case Status:").map(String::as_str), Some("Decided - Approved"));
        assert_eq!(f.get("Case Number:").map(String::as_str), Some("PA/00010/20"));
        assert_eq!(
            f.get("Location of development:").map(String::as_str),
            Some("12, Triq il-Kbira, Ħal Qormi")
        );
        assert_eq!(f.get("Current Applicant:").map(String::as_str), Some("Attn: Smith, John"));
        assert_eq!(f.get("Application Type:").map(String::as_str), Some("Full Development Permission"));
        assert_eq!(f.get("Case Category:").map(String::as_str), Some("Summary"));
    }

    #[test]
    fn processing_section_only_contributes_type_and_category() {
        let f = extract_fields(&fixture("record"));
        assert!(!f.contains_key("Processing Officer:"));
    }

    #[test]
    fn earlier_section_wins_on_shared_label() {
        // details repeats "Case Number:" with a different value
        let f = extract_fields(&fixture("record"));
        assert_eq!(f.get("Case Number:").map(String::as_str), Some("PA/00010/20"));
    }

    #[test]
    fn alternate_status_phrasing() {
        let f = extract_fields(&fixture("record_alt"));
        assert_eq!(f.get("Case Status").map(String::as_str), Some("Under Evaluation"));
        assert_eq!(f.get("Description of works:").map(String::as_str), Some("To sanction minor alterations’ to façade"));
        assert!(!f.contains_key("Application Type:"));
    }

    #[test]
    fn rows_without_two_cells_are_skipped() {
        let f = extract_fields(&fixture("record_alt"));
        assert!(f.keys().all(|k| !k.is_empty()));
        assert!(!f.contains_key("Notes"));
    }

    #[test]
    fn no_sections_gives_empty_map() {
        assert!(extract_fields(&fixture("empty")).is_empty());
        assert!(extract_fields("").is_empty());
    }

    #[test]
    fn lookup_reports_missing_section() {
        let doc = Html::parse_document(&fixture("record_alt"));
        assert!(LOOKUPS[0].find(&doc).is_none());
        assert!(LOOKUPS[1].find(&doc).is_some());
    }
}
