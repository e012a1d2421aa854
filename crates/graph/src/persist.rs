//! Append-only on-disk container for the graph.
//!
//! One JSON row per line: `{kind, key, properties_json, updated_at}`.
//! Replay is idempotent (last write per key wins), so crash recovery is
//! just re-opening the file. Every append is flushed before the upsert
//! acknowledges.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    Node,
    Edge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    pub kind: RowKind,
    pub key: String,
    pub properties_json: String,
    pub updated_at: DateTime<Utc>,
}

pub struct Container {
    path: PathBuf,
    writer: BufWriter<File>,
    rows_written: u64,
}

impl Container {
    /// Open the container, replaying existing rows. Creates the file (and
    /// parent directory) with mode 0600 when absent.
    pub fn open(path: &Path) -> Result<(Self, Vec<Row>), StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let rows = if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let mut rows = Vec::new();
            for (lineno, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Row>(&line) {
                    Ok(row) => rows.push(row),
                    // A torn tail line from a crash is expected; anything
                    // mid-file is worth a warning.
                    Err(e) => warn!(lineno, error = %e, "skipping bad container row"),
                }
            }
            rows
        } else {
            Vec::new()
        };

        let file = Self::open_for_append(path)?;
        let rows_written = rows.len() as u64;
        Ok((
            Self {
                path: path.to_path_buf(),
                writer: BufWriter::new(file),
                rows_written,
            },
            rows,
        ))
    }

    #[cfg(unix)]
    fn open_for_append(path: &Path) -> Result<File, StoreError> {
        use std::os::unix::fs::OpenOptionsExt;
        Ok(OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o600)
            .open(path)?)
    }

    #[cfg(not(unix))]
    fn open_for_append(path: &Path) -> Result<File, StoreError> {
        Ok(OpenOptions::new().create(true).append(true).open(path)?)
    }

    /// Append one row and flush. The caller only acknowledges its upsert
    /// after this returns.
    pub fn append(&mut self, row: &Row) -> Result<(), StoreError> {
        serde_json::to_writer(&mut self.writer, row)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Replace the log with exactly `rows` (compaction).
    pub fn rewrite(&mut self, rows: &[Row]) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("db.tmp");
        {
            let mut w = BufWriter::new(Self::open_truncated(&tmp)?);
            for row in rows {
                serde_json::to_writer(&mut w, row)?;
                w.write_all(b"\n")?;
            }
            w.flush()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        self.writer = BufWriter::new(Self::open_for_append(&self.path)?);
        self.rows_written = rows.len() as u64;
        Ok(())
    }

    /// Drop every row (graph reset).
    pub fn truncate(&mut self) -> Result<(), StoreError> {
        self.writer = BufWriter::new(Self::open_truncated(&self.path)?);
        self.rows_written = 0;
        Ok(())
    }

    #[cfg(unix)]
    fn open_truncated(path: &Path) -> Result<File, StoreError> {
        use std::os::unix::fs::OpenOptionsExt;
        Ok(OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?)
    }

    #[cfg(not(unix))]
    fn open_truncated(path: &Path) -> Result<File, StoreError> {
        Ok(OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(key: &str, json: &str) -> Row {
        Row {
            kind: RowKind::Node,
            key: key.to_string(),
            properties_json: json.to_string(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn append_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");

        {
            let (mut c, rows) = Container::open(&path).unwrap();
            assert!(rows.is_empty());
            c.append(&row("a", "{}")).unwrap();
            c.append(&row("b", "{}")).unwrap();
        }

        let (_c, rows) = Container::open(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, "a");
    }

    #[test]
    fn torn_tail_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");

        {
            let (mut c, _) = Container::open(&path).unwrap();
            c.append(&row("a", "{}")).unwrap();
        }
        // Simulate a crash mid-append.
        {
            use std::io::Write as _;
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(b"{\"kind\":\"node\",\"key\":\"tor").unwrap();
        }

        let (_c, rows) = Container::open(&path).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn container_mode_is_0600() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        let (_c, _) = Container::open(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
