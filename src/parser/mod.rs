pub mod notice;
pub mod sections;

use std::collections::BTreeMap;

use scraper::{ElementRef, Html};

pub use notice::Notice;

/// Label → value pairs read off a detail page, labels kept verbatim
/// (including any trailing colon).
pub type FieldMap = BTreeMap<String, String>;

/// Run every section lookup over a detail page body.
pub fn extract_fields(html: &str) -> FieldMap {
    let doc = Html::parse_document(html);
    sections::extract(&doc)
}

/// Classify a body into a closed outcome notice, if it carries one.
pub fn detect_notice(html: &str) -> Option<Notice> {
    let doc = Html::parse_document(html);
    notice::detect(&doc)
}

/// Rendered text of an element with whitespace runs collapsed.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
