use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Application case prefixes published by the planning authority.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum RecordType {
    PA,
    RG,
    DN,
    DS,
    PC,
}

impl RecordType {
    pub const ALL: [RecordType; 5] = [
        RecordType::PA,
        RecordType::RG,
        RecordType::DN,
        RecordType::DS,
        RecordType::PC,
    ];

    pub fn code(self) -> &'static str {
        match self {
            RecordType::PA => "PA",
            RecordType::RG => "RG",
            RecordType::DN => "DN",
            RecordType::DS => "DS",
            RecordType::PC => "PC",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim().to_ascii_uppercase();
        RecordType::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .ok_or_else(|| Error::InvalidKey(s.to_string()))
    }
}

impl TryFrom<String> for RecordType {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Two-digit year as it appears in case numbers ("20" for 2020).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub struct Year(u8);

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

impl FromStr for Year {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let t = s.trim();
        if t.is_empty() || t.len() > 2 || !t.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidKey(s.to_string()));
        }
        t.parse::<u8>()
            .map(Year)
            .map_err(|_| Error::InvalidKey(s.to_string()))
    }
}

impl TryFrom<String> for Year {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// One record in the enumerated space. Canonical form: `PA/00010/20`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub record_type: RecordType,
    pub sequence: u32,
    pub year: Year,
}

impl RecordKey {
    pub fn new(record_type: RecordType, sequence: u32, year: Year) -> Self {
        debug_assert!(sequence >= 1, "sequence numbers start at 1");
        RecordKey {
            record_type,
            sequence,
            year,
        }
    }

    /// The following key in the same range, `None` past `u32::MAX`.
    pub fn next(self) -> Option<Self> {
        let sequence = self.sequence.checked_add(1)?;
        Some(RecordKey { sequence, ..self })
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:05}/{}", self.record_type, self.sequence, self.year)
    }
}

impl FromStr for RecordKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidKey(s.to_string());
        let mut parts = s.trim().split('/');
        let (Some(t), Some(n), Some(y), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        let sequence: u32 = n.trim().parse().map_err(|_| invalid())?;
        if sequence == 0 {
            return Err(invalid());
        }
        Ok(RecordKey {
            record_type: t.parse().map_err(|_| invalid())?,
            sequence,
            year: y.parse().map_err(|_| invalid())?,
        })
    }
}

/// The declared enumeration space: years outer, record types inner,
/// each in configuration order.
#[derive(Debug, Clone)]
pub struct KeySpace {
    years: Vec<Year>,
    record_types: Vec<RecordType>,
}

impl KeySpace {
    pub fn new(years: Vec<Year>, record_types: Vec<RecordType>) -> Result<Self> {
        if years.is_empty() || record_types.is_empty() {
            return Err(Error::Config(
                "key space needs at least one year and one record type".into(),
            ));
        }
        Ok(KeySpace {
            years,
            record_types,
        })
    }

    pub fn record_types(&self) -> &[RecordType] {
        &self.record_types
    }

    /// (year, record_type) pairs in walk order.
    pub fn pairs(&self) -> Vec<(Year, RecordType)> {
        self.years
            .iter()
            .flat_map(|&y| self.record_types.iter().map(move |&t| (y, t)))
            .collect()
    }

    pub fn pair_index(&self, record_type: RecordType, year: Year) -> Option<usize> {
        let yi = self.years.iter().position(|&y| y == year)?;
        let ti = self.record_types.iter().position(|&t| t == record_type)?;
        Some(yi * self.record_types.len() + ti)
    }

    /// Position of `key` in the total order, `None` when outside the space.
    pub fn ordinal(&self, key: &RecordKey) -> Option<(usize, u32)> {
        self.pair_index(key.record_type, key.year)
            .map(|i| (i, key.sequence))
    }

    /// Rank used when sorting merged rows; undeclared types sort last.
    pub fn type_rank(&self, record_type: RecordType) -> usize {
        self.record_types
            .iter()
            .position(|&t| t == record_type)
            .unwrap_or(self.record_types.len())
    }
}

// ── Tests ──
