use std::fs;
use std::path::Path;

use chrono::Local;
use indicatif::ProgressBar;
use tracing::{debug, info, warn};

use crate::checkpoint::{Checkpoint, CheckpointState};
use crate::client::{PageClient, PageOutcome};
use crate::error::{Error, Result};
use crate::key::{KeySpace, RecordKey, RecordType, Year};
use crate::parser;
use crate::record::ExtractedRecord;
use crate::sink::{self, RecordSink};

/// Result of processing a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Recorded,
    NotFound,
    NotYetSubmitted,
    /// Page loaded but none of the known sections were on it.
    Unrecognized,
}

/// Consecutive not-found results within one (type, year) range. The site has
/// no end-of-range marker and single gaps are common, so only a run of
/// misses ends a range.
#[derive(Debug, Clone, Copy)]
pub struct FailureCounter {
    consecutive: u32,
    threshold: u32,
}

impl FailureCounter {
    pub fn new(threshold: u32) -> Self {
        FailureCounter {
            consecutive: 0,
            threshold,
        }
    }

    pub fn observe(&mut self, outcome: KeyOutcome) {
        match outcome {
            KeyOutcome::Recorded | KeyOutcome::NotYetSubmitted => self.consecutive = 0,
            KeyOutcome::NotFound => self.consecutive += 1,
            KeyOutcome::Unrecognized => {}
        }
    }

    pub fn count(&self) -> u32 {
        self.consecutive
    }

    pub fn exhausted(&self) -> bool {
        self.consecutive >= self.threshold
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub records: usize,
    pub not_found: usize,
    pub not_yet_submitted: usize,
    pub unrecognized: usize,
}

impl Tally {
    fn add(&mut self, outcome: KeyOutcome) {
        match outcome {
            KeyOutcome::Recorded => self.records += 1,
            KeyOutcome::NotFound => self.not_found += 1,
            KeyOutcome::NotYetSubmitted => self.not_yet_submitted += 1,
            KeyOutcome::Unrecognized => self.unrecognized += 1,
        }
    }

    fn absorb(&mut self, other: Tally) {
        self.records += other.records;
        self.not_found += other.not_found;
        self.not_yet_submitted += other.not_yet_submitted;
        self.unrecognized += other.unrecognized;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSummary {
    pub tally: Tally,
    /// Sequence of the key that exhausted the range.
    pub last_sequence: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CrawlSummary {
    pub ranges: usize,
    pub tally: Tally,
    pub last_key: Option<RecordKey>,
}

/// Walks the key space in order, one key at a time, persisting every
/// outcome before moving on.
pub struct CrawlEngine<C> {
    client: C,
    space: KeySpace,
    threshold: u32,
    checkpoint: Checkpoint,
    sink: RecordSink,
    progress: ProgressBar,
}

impl<C: PageClient> CrawlEngine<C> {
    pub fn new(
        client: C,
        space: KeySpace,
        threshold: u32,
        checkpoint: Checkpoint,
        sink: RecordSink,
    ) -> Self {
        CrawlEngine {
            client,
            space,
            threshold: threshold.max(1),
            checkpoint,
            sink,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run(&mut self) -> Result<CrawlSummary> {
        let (first_pair, mut start_sequence) = self.resume_point()?;
        let pairs = self.space.pairs();
        let mut summary = CrawlSummary::default();

        for &(year, record_type) in &pairs[first_pair..] {
            let range = self.process_range(record_type, year, start_sequence).await?;
            summary.ranges += 1;
            summary.tally.absorb(range.tally);
            summary.last_key = Some(RecordKey::new(record_type, range.last_sequence, year));
            start_sequence = 1;
        }

        self.progress.finish_and_clear();
        info!(
            ranges = summary.ranges,
            records = summary.tally.records,
            not_found = summary.tally.not_found,
            "Crawl complete"
        );
        Ok(summary)
    }

    /// Index of the pair to start with and the first sequence to fetch in it.
    fn resume_point(&self) -> Result<(usize, u32)> {
        let state = self.reconcile(self.checkpoint.load())?;
        let CheckpointState::At(key) = state else {
            return Ok((0, 1));
        };
        match self.space.pair_index(key.record_type, key.year) {
            Some(i) => match key.next() {
                Some(next) => Ok((i, next.sequence)),
                None => {
                    warn!(%key, "Checkpoint sequence has no successor. Starting from the beginning.");
                    Ok((0, 1))
                }
            },
            None => {
                warn!(
                    %key,
                    "Checkpoint is outside the configured key space. Starting from the beginning."
                );
                Ok((0, 1))
            }
        }
    }

    /// A crash between appending a record and saving the checkpoint leaves
    /// the dataset one key ahead; move the checkpoint up to it.
    fn reconcile(&self, state: CheckpointState) -> Result<CheckpointState> {
        let Some(tail) = sink::last_case_number(self.sink.path())?
            .and_then(|c| c.parse::<RecordKey>().ok())
        else {
            return Ok(state);
        };
        let Some(tail_pos) = self.space.ordinal(&tail) else {
            return Ok(state);
        };
        let ahead = match state {
            CheckpointState::Start => true,
            CheckpointState::At(key) => self.space.ordinal(&key).map_or(true, |pos| tail_pos > pos),
        };
        if !ahead {
            return Ok(state);
        }
        info!(%tail, "Checkpoint behind dataset; advancing to last recorded key");
        self.checkpoint.save(&tail)?;
        Ok(CheckpointState::At(tail))
    }

    /// Walk one (type, year) range from `start_sequence` until the failure
    /// threshold is hit.
    pub async fn process_range(
        &mut self,
        record_type: RecordType,
        year: Year,
        start_sequence: u32,
    ) -> Result<RangeSummary> {
        info!(%record_type, %year, start_sequence, "Walking range");
        let mut failures = FailureCounter::new(self.threshold);
        let mut tally = Tally::default();
        let mut key = RecordKey::new(record_type, start_sequence.max(1), year);

        loop {
            let outcome = self.process_one(&key).await?;
            tally.add(outcome);
            failures.observe(outcome);
            if failures.exhausted() {
                break;
            }
            match key.next() {
                Some(next) => key = next,
                None => {
                    warn!(%key, "Sequence ceiling reached");
                    break;
                }
            }
        }

        info!(
            %record_type,
            %year,
            records = tally.records,
            last = key.sequence,
            "Range exhausted after {} consecutive misses",
            failures.count()
        );
        Ok(RangeSummary {
            tally,
            last_sequence: key.sequence,
        })
    }

    /// Fetch, extract and persist one key. The checkpoint only moves after the
    /// outcome (and its record, if any) is on disk.
    pub async fn process_one(&mut self, key: &RecordKey) -> Result<KeyOutcome> {
        self.progress.set_message(key.to_string());

        let outcome = match self.client.load(key).await? {
            PageOutcome::Loaded(page) => {
                let fields = parser::extract_fields(&page.html);
                if fields.is_empty() {
                    KeyOutcome::Unrecognized
                } else {
                    let record = ExtractedRecord::from_fields(&page.key, &fields);
                    self.sink.append(&record)?;
                    KeyOutcome::Recorded
                }
            }
            PageOutcome::NotFound => KeyOutcome::NotFound,
            PageOutcome::NotYetSubmitted => KeyOutcome::NotYetSubmitted,
        };

        self.checkpoint.save(key)?;
        debug!(%key, ?outcome, "processed");
        self.progress.inc(1);
        Ok(outcome)
    }
}

/// Stamp the date of the last completed crawl, `dd/mm/YYYY`.
pub fn write_extraction_date(path: &Path) -> Result<String> {
    let formatted = Local::now().format("%d/%m/%Y").to_string();
    fs::write(path, &formatted).map_err(|source| Error::Output {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(formatted)
}

// ── Tests ──
