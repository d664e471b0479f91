use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::record::ExtractedRecord;

/// Append-only CSV of extracted records. Each `append` is on disk before it
/// returns.
pub struct RecordSink {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl RecordSink {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = open_for_append(&path).map_err(|e| Error::sink(&path, e))?;
        let empty = file.metadata().map_err(|e| Error::sink(&path, e))?.len() == 0;
        if empty {
            info!("Creating record dataset {:?}", path);
        }
        let writer = WriterBuilder::new().has_headers(empty).from_writer(file);
        Ok(RecordSink { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, record: &ExtractedRecord) -> Result<()> {
        self.writer
            .serialize(record)
            .map_err(|e| Error::sink(&self.path, e))?;
        self.writer.flush().map_err(|e| Error::sink(&self.path, e))?;
        self.writer
            .get_ref()
            .sync_data()
            .map_err(|e| Error::sink(&self.path, e))
    }
}

fn open_for_append(path: &Path) -> io::Result<File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)?;
    drop_partial_row(&mut file, path)?;
    Ok(file)
}

/// A crash mid-write can leave a row without its terminator; cut the file
/// back to the last complete line.
fn drop_partial_row(file: &mut File, path: &Path) -> io::Result<()> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(());
    }

    let mut content = Vec::with_capacity(len as usize);
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut content)?;
    let keep = content
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1);
    warn!(
        "Dropping {} bytes of incomplete row at the end of {:?}",
        len as usize - keep,
        path
    );
    file.set_len(keep as u64)?;
    file.sync_data()
}

/// Every record in a dataset; a missing file is empty.
pub fn read_all(path: &Path) -> Result<Vec<ExtractedRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(path).map_err(|e| Error::sink(path, e))?;
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<ExtractedRecord>, _>>()
        .map_err(|e| Error::sink(path, e))
}

/// Case number of the final row, used to reconcile a checkpoint that lags
/// the dataset after a crash.
pub fn last_case_number(path: &Path) -> Result<Option<String>> {
    Ok(read_all(path)?
        .into_iter()
        .rev()
        .map(|r| r.case_number)
        .find(|c| !c.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(case: &str, applicant: &str) -> ExtractedRecord {
        ExtractedRecord {
            case_number: case.to_string(),
            applicant: Some(applicant.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn header_written_once_across_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");

        let mut sink = RecordSink::open(&path).unwrap();
        sink.append(&record("PA/00001/20", "John Smith")).unwrap();
        drop(sink);
        let mut sink = RecordSink::open(&path).unwrap();
        sink.append(&record("PA/00002/20", "Maria Borg")).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "case_status,case_number,location,description,applicant,architect,reception_date,application_type,case_category"
        );
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], ",PA/00001/20,,,John Smith,,,,");
    }

    #[test]
    fn preserves_non_ascii_punctuation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        let mut sink = RecordSink::open(&path).unwrap();
        sink.append(&record("PA/00003/20", "Ġużeppi D’Amato, “Ħamrun”")).unwrap();

        let rows = read_all(&path).unwrap();
        assert_eq!(rows[0].applicant.as_deref(), Some("Ġużeppi D’Amato, “Ħamrun”"));
    }

    #[test]
    fn partial_trailing_row_is_dropped_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        let mut sink = RecordSink::open(&path).unwrap();
        sink.append(&record("PA/00001/20", "A")).unwrap();
        drop(sink);

        let mut text = std::fs::read_to_string(&path).unwrap();
        text.push_str(",PA/00002/2");
        std::fs::write(&path, text).unwrap();

        let mut sink = RecordSink::open(&path).unwrap();
        sink.append(&record("PA/00002/20", "B")).unwrap();
        let cases: Vec<String> = read_all(&path).unwrap().into_iter().map(|r| r.case_number).collect();
        assert_eq!(cases, ["PA/00001/20", "PA/00002/20"]);
    }

    #[test]
    fn last_case_number_of_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        assert_eq!(last_case_number(&path).unwrap(), None);
        let mut sink = RecordSink::open(&path).unwrap();
        sink.append(&record("DN/00007/18", "x")).unwrap();
        assert_eq!(last_case_number(&path).unwrap().as_deref(), Some("DN/00007/18"));
    }
}
