use std::sync::LazyLock;

use scraper::{Html, Selector};

use super::element_text;

pub const NOT_FOUND_TEXT: &str = "This Application Number does not exist";
pub const NOT_SUBMITTED_TEXT: &str = "The application has not yet been fully submitted. Once the application is considered complete, all relevant details will be made available online.";

/// Where the site prints its notices, newer layout first.
static LOCATORS: LazyLock<[Selector; 2]> = LazyLock::new(|| {
    [
        Selector::parse("#main-content > div.clear-both.container > div").unwrap(),
        Selector::parse("#Table1 > tbody > tr > td > div").unwrap(),
    ]
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    NotFound,
    NotYetSubmitted,
}

pub fn detect(doc: &Html) -> Option<Notice> {
    LOCATORS
        .iter()
        .flat_map(|sel| doc.select(sel))
        .find_map(|el| match element_text(el).as_str() {
            NOT_FOUND_TEXT => Some(Notice::NotFound),
            NOT_SUBMITTED_TEXT => Some(Notice::NotYetSubmitted),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::detect_notice;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn not_found_in_main_content() {
        assert_eq!(detect_notice(&fixture("not_found")), Some(Notice::NotFound));
    }

    #[test]
    fn not_submitted_in_legacy_table() {
        assert_eq!(detect_notice(&fixture("not_submitted")), Some(Notice::NotYetSubmitted));
    }

    #[test]
    fn record_pages_carry_no_notice() {
        assert_eq!(detect_notice(&fixture("record")), None);
        assert_eq!(detect_notice(&fixture("empty")), None);
    }

    #[test]
    fn wording_must_match_exactly() {
        let html = r#"<div id="main-content"><div class="clear-both container"><div>This application number does not exist</div></div></div>"#;
        assert_eq!(detect_notice(html), None);
    }
}
