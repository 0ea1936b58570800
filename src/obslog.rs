//! Observation log.
//!
//! One plain-text file per run, named after the start time
//! (`PCU_20230612_031502.log`). The first line is a header and every captured
//! frame appends one row of seven right-aligned columns. A field is never
//! blank and never contains whitespace, so every row splits into exactly
//! seven fields. Rows are flushed as
//! they are written, so an aborted run leaves a log that is complete up to the
//! last frame taken.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::info;

use crate::error::AppResult;

/// Width of every log column
pub const COLUMN_WIDTH: usize = 10;

const HEADER: [&str; 7] = ["Filename", "x", "y", "z", "r", "itime", "type"];

/// Written in place of an empty field
const EMPTY_FIELD: &str = "-";

/// What a logged frame shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    /// Lamp-illuminated pinhole mask
    Pinhole,
    /// Blanked-off dark
    Dark,
}

impl FrameKind {
    /// Name written in the `type` column
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Pinhole => "pinhole",
            FrameKind::Dark => "dark",
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One captured frame with the stage readback at exposure time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameRecord {
    /// Frame file name, possibly shortened
    pub filename: String,
    /// X readback in mm
    pub x: f64,
    /// Y readback in mm
    pub y: f64,
    /// Z readback in mm
    pub z: f64,
    /// Rotator readback in degrees
    pub r: f64,
    /// Integration time in seconds
    pub integration_time: f64,
    /// Pinhole or dark
    pub kind: FrameKind,
}

impl FrameRecord {
    fn columns(&self) -> [String; 7] {
        [
            log_field(&self.filename),
            self.x.to_string(),
            self.y.to_string(),
            self.z.to_string(),
            self.r.to_string(),
            self.integration_time.to_string(),
            self.kind.to_string(),
        ]
    }
}

/// Log file name for a run started at `started_at`
pub fn log_file_name(started_at: NaiveDateTime) -> String {
    format!("PCU_{}.log", started_at.format("%Y%m%d_%H%M%S"))
}

fn log_field(value: &str) -> String {
    let field: String = value
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    if field.is_empty() {
        EMPTY_FIELD.to_string()
    } else {
        field
    }
}

fn format_row<S: AsRef<str>>(columns: &[S]) -> String {
    columns
        .iter()
        .map(|c| format!("{:>width$}", c.as_ref(), width = COLUMN_WIDTH))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Append-only observation log
pub struct ObservationLog {
    path: PathBuf,
    writer: BufWriter<File>,
    rows: usize,
}

impl ObservationLog {
    /// Create the log in `dir` and write the header.
    ///
    /// Fails if a log with the same name already exists; an earlier run is
    /// never overwritten.
    pub fn create(dir: impl AsRef<Path>, started_at: NaiveDateTime) -> AppResult<Self> {
        let path = dir.as_ref().join(log_file_name(started_at));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;

        let mut log = Self {
            path,
            writer: BufWriter::new(file),
            rows: 0,
        };
        log.write_line(&format_row(&HEADER))?;
        info!(path = %log.path.display(), "Observation log created");
        Ok(log)
    }

    /// Append one frame and flush it to disk
    pub fn append(&mut self, record: &FrameRecord) -> AppResult<()> {
        self.write_line(&format_row(&record.columns()))?;
        self.rows += 1;
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> AppResult<()> {
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Data rows written, header excluded
    pub fn rows_written(&self) -> usize {
        self.rows
    }

    /// Location of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn started() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 6, 12)
            .and_then(|d| d.and_hms_opt(3, 15, 2))
            .unwrap()
    }

    fn record(kind: FrameKind) -> FrameRecord {
        FrameRecord {
            filename: "i230612_a004002.fits".to_string(),
            x: 83.4,
            y: 178.4,
            z: 99.32,
            r: 65.7,
            integration_time: 10.0,
            kind,
        }
    }

    #[test]
    fn test_file_name_from_start_time() {
        assert_eq!(log_file_name(started()), "PCU_20230612_031502.log");
    }

    #[test]
    fn test_header_and_rows() {
        let dir = tempdir().unwrap();
        let mut log = ObservationLog::create(dir.path(), started()).unwrap();
        log.append(&record(FrameKind::Pinhole)).unwrap();
        log.append(&record(FrameKind::Dark)).unwrap();
        assert_eq!(log.rows_written(), 2);

        let contents = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0].split_whitespace().collect::<Vec<_>>(),
            HEADER.to_vec()
        );
        assert_eq!(lines[0].len(), 7 * COLUMN_WIDTH + 6);
        assert!(lines[0].starts_with("  Filename"));

        for line in &lines[1..] {
            assert_eq!(line.split_whitespace().count(), 7);
        }
        assert!(lines[1].ends_with("   pinhole"));
        assert!(lines[2].ends_with("      dark"));
        assert!(lines[1].contains("      83.4"));
    }

    #[test]
    fn test_rows_are_flushed_immediately() {
        let dir = tempdir().unwrap();
        let mut log = ObservationLog::create(dir.path(), started()).unwrap();
        log.append(&record(FrameKind::Pinhole)).unwrap();

        // read while the log is still open
        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_wide_field_is_not_truncated() {
        let dir = tempdir().unwrap();
        let mut log = ObservationLog::create(dir.path(), started()).unwrap();
        let mut wide = record(FrameKind::Pinhole);
        wide.filename = "/data/raw/i230612_a004002.fits".to_string();
        log.append(&wide).unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert!(contents.contains("/data/raw/i230612_a004002.fits "));
    }

    #[test]
    fn test_blank_or_spaced_filename_keeps_seven_columns() {
        let dir = tempdir().unwrap();
        let mut log = ObservationLog::create(dir.path(), started()).unwrap();
        for name in ["", "   ", "frame 12.fits"] {
            let mut row = record(FrameKind::Pinhole);
            row.filename = name.to_string();
            log.append(&row).unwrap();
        }

        let contents = std::fs::read_to_string(log.path()).unwrap();
        let rows: Vec<Vec<&str>> = contents
            .lines()
            .skip(1)
            .map(|line| line.split_whitespace().collect())
            .collect();
        assert_eq!(rows.len(), 3);
        for row in &rows {
            assert_eq!(row.len(), 7, "row {:?}", row);
        }
        assert_eq!(rows[0][0], "-");
        assert_eq!(rows[1][0], "-");
        assert_eq!(rows[2][0], "frame_12.fits");
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let _first = ObservationLog::create(dir.path(), started()).unwrap();
        assert!(ObservationLog::create(dir.path(), started()).is_err());
    }
}
