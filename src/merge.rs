use std::collections::HashSet;
use std::fs::{self, File};
use std::path::Path;

use rayon::prelude::*;
use tracing::info;

use crate::checkpoint;
use crate::error::{Error, Result};
use crate::key::{KeySpace, RecordType};
use crate::normalize::{split_case_number, Normalizer};
use crate::record::{AccumulatedRow, ExtractedRecord};
use crate::sink;

const ACCUMULATED_HEADER: [&str; 11] = [
    "case_status",
    "case_number",
    "location",
    "description",
    "applicant",
    "architect",
    "reception_date",
    "application_type",
    "case_category",
    "application_number",
    "application_year",
];

#[derive(Debug, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub accumulated: usize,
    pub incoming: usize,
    pub dropped: usize,
    pub output: usize,
}

/// Reconciles the accumulated dataset with a fresh scrape: normalize the
/// fresh rows, append them, keep the last row per case number, sort.
pub struct MergeProcessor {
    space: KeySpace,
    normalizer: Normalizer,
}

/// (unparsable, year, type rank, type code, number)
type SortKey = (bool, u8, usize, String, u32);

impl MergeProcessor {
    pub fn new(space: KeySpace, name_exemptions: &[String]) -> Self {
        MergeProcessor {
            space,
            normalizer: Normalizer::new(name_exemptions),
        }
    }

    pub fn merge(
        &self,
        accumulated: Vec<AccumulatedRow>,
        incoming: Vec<ExtractedRecord>,
    ) -> (Vec<AccumulatedRow>, MergeSummary) {
        let mut summary = MergeSummary {
            accumulated: accumulated.len(),
            incoming: incoming.len(),
            ..Default::default()
        };

        let normalized: Vec<AccumulatedRow> = incoming
            .into_par_iter()
            .map(|r| self.normalizer.normalize(r))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect();
        summary.dropped = summary.incoming - normalized.len();

        // Later rows are fresher: walk backwards keeping the first sighting.
        let mut seen = HashSet::new();
        let mut rows: Vec<AccumulatedRow> = accumulated
            .into_iter()
            .chain(normalized)
            .rev()
            .filter(|r| seen.insert(r.case_number.clone()))
            .collect();
        rows.reverse();

        rows.sort_by_cached_key(|r| self.sort_key(&r.case_number));
        summary.output = rows.len();
        (rows, summary)
    }

    fn sort_key(&self, case_number: &str) -> SortKey {
        let parsed = split_case_number(case_number).and_then(|(t, n, y)| {
            let year = y.parse::<u8>().ok()?;
            let number = n.parse::<u32>().ok()?;
            let rank = t
                .parse::<RecordType>()
                .map(|rt| self.space.type_rank(rt))
                .unwrap_or(self.space.record_types().len());
            Some((false, year, rank, t.to_string(), number))
        });
        parsed.unwrap_or((true, 0, 0, case_number.to_string(), 0))
    }

    /// Merge `incoming_path` into `accumulated_path`, overwriting it.
    pub fn run(&self, accumulated_path: &Path, incoming_path: &Path) -> Result<MergeSummary> {
        let accumulated = read_accumulated(accumulated_path)?;
        let incoming = sink::read_all(incoming_path)?;
        info!(
            accumulated = accumulated.len(),
            incoming = incoming.len(),
            "Merging datasets"
        );

        let (rows, summary) = self.merge(accumulated, incoming);
        write_accumulated(accumulated_path, &rows)?;
        Ok(summary)
    }
}

pub fn read_accumulated(path: &Path) -> Result<Vec<AccumulatedRow>> {
    if !path.exists() {
        info!("No accumulated dataset at {:?}; starting from empty", path);
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(path).map_err(|e| Error::merge(path, e))?;
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<AccumulatedRow>, _>>()
        .map_err(|e| Error::merge(path, e))
}

/// Full overwrite through a temp file so a failed merge keeps the old data.
pub fn write_accumulated(path: &Path, rows: &[AccumulatedRow]) -> Result<()> {
    let tmp = path.with_extension("csv.tmp");
    let write = || -> std::result::Result<(), csv::Error> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let file = File::create(&tmp)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(ACCUMULATED_HEADER)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        checkpoint::replace_file(&tmp, path)?;
        Ok(())
    };
    write().map_err(|e| Error::merge(path, e))
}
