use serde::{Deserialize, Serialize};

use crate::key::RecordKey;
use crate::parser::FieldMap;

/// One row of the raw dataset. Field order is the CSV column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedRecord {
    #[serde(rename = "case_status")]
    pub status: Option<String>,
    pub case_number: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub applicant: Option<String>,
    pub architect: Option<String>,
    pub reception_date: Option<String>,
    pub application_type: Option<String>,
    #[serde(rename = "case_category")]
    pub category: Option<String>,
}

impl ExtractedRecord {
    /// Map page labels onto record fields. The case number always comes
    /// from the key so the dataset identifier is canonical.
    pub fn from_fields(key: &RecordKey, fields: &FieldMap) -> Self {
        let get = |labels: &[&str]| -> Option<String> {
            labels
                .iter()
                .find_map(|l| fields.get(*l))
                .filter(|v| !v.is_empty())
                .cloned()
        };

        ExtractedRecord {
            status: get(&["Case Status", "Case Status:"]),
            case_number: key.to_string(),
            location: get(&["Location of development:"]),
            description: get(&["Description of works:"]),
            applicant: get(&["Current Applicant:"]),
            architect: get(&["Current Architect:"]),
            reception_date: get(&["Reception date:"]),
            application_type: get(&["Application Type:"]),
            category: get(&["Case Category:"]),
        }
    }
}

/// One row of the accumulated dataset: the raw columns plus the parts of
/// the split case number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccumulatedRow {
    pub case_status: Option<String>,
    pub case_number: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub applicant: Option<String>,
    pub architect: Option<String>,
    pub reception_date: Option<String>,
    pub application_type: Option<String>,
    pub case_category: Option<String>,
    pub application_number: Option<String>,
    pub application_year: Option<String>,
}

impl From<ExtractedRecord> for AccumulatedRow {
    fn from(r: ExtractedRecord) -> Self {
        AccumulatedRow {
            case_status: r.status,
            case_number: r.case_number,
            location: r.location,
            description: r.description,
            applicant: r.applicant,
            architect: r.architect,
            reception_date: r.reception_date,
            application_type: r.application_type,
            case_category: r.category,
            application_number: None,
            application_year: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_fields_uses_canonical_case_number() {
        let key: RecordKey = "PA/00010/20".parse().unwrap();
        let mut fields = FieldMap::new();
        fields.insert("Case Number:".into(), "PA/10/20".into());
        fields.insert("Case Status:".into(), "Decided".into());
        fields.insert("Current Applicant:".into(), "".into());
        let r = ExtractedRecord::from_fields(&key, &fields);
        assert_eq!(r.case_number, "PA/00010/20");
        assert_eq!(r.status.as_deref(), Some("Decided"));
        assert_eq!(r.applicant, None);
    }
}
