//! Where run artifacts go: JSON records and CSV tables, keyed by file name.

use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{ReportCardError, Result};

/// A rectangular table of pre-formatted cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row; it must have one cell per header.
    pub fn push_row(&mut self, row: Vec<String>) -> Result<()> {
        if row.len() != self.headers.len() {
            return Err(ReportCardError::length_mismatch(
                "table row cells",
                self.headers.len(),
                row.len(),
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Cells of the named column, if present.
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.headers.iter().position(|h| h == name)?;
        Some(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }
}

pub trait ArtifactSink {
    fn put_record(&mut self, name: &str, record: &serde_json::Value) -> Result<()>;

    fn put_table(&mut self, name: &str, table: &Table) -> Result<()>;
}

/// Writes each artifact as a file under a root directory.
///
/// Files are written to a temporary file in the same directory and renamed
/// into place, so readers never see a partial artifact and reruns overwrite.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    /// Create the directory (and parents) if needed.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| ReportCardError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn write_atomic(&self, name: &str, write: impl FnOnce(&mut NamedTempFile) -> Result<()>) -> Result<()> {
        let target = self.root.join(name);
        let mut tmp = NamedTempFile::new_in(&self.root).map_err(|e| ReportCardError::io(&self.root, e))?;
        write(&mut tmp)?;
        tmp.as_file_mut()
            .sync_all()
            .map_err(|e| ReportCardError::io(tmp.path(), e))?;
        tmp.persist(&target)
            .map_err(|e| ReportCardError::io(&target, e.error))?;
        debug!(path = %target.display(), "Wrote artifact");
        Ok(())
    }
}

impl ArtifactSink for DirectorySink {
    fn put_record(&mut self, name: &str, record: &serde_json::Value) -> Result<()> {
        self.write_atomic(name, |file| {
            serde_json::to_writer_pretty(&mut *file, record)?;
            writeln!(file).map_err(|e| ReportCardError::io(file.path(), e))
        })
    }

    fn put_table(&mut self, name: &str, table: &Table) -> Result<()> {
        self.write_atomic(name, |file| {
            let mut writer = csv::Writer::from_writer(&mut *file);
            writer.write_record(table.headers())?;
            for row in table.rows() {
                writer.write_record(row)?;
            }
            writer
                .flush()
                .map_err(|e| ReportCardError::io(self.root.join(name), e))
        })
    }
}

/// Keeps artifacts in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: BTreeMap<String, serde_json::Value>,
    tables: BTreeMap<String, Table>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str) -> Option<&serde_json::Value> {
        self.records.get(name)
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Names of everything stored, records and tables together.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .records
            .keys()
            .chain(self.tables.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names
    }
}

impl ArtifactSink for MemorySink {
    fn put_record(&mut self, name: &str, record: &serde_json::Value) -> Result<()> {
        self.records.insert(name.to_owned(), record.clone());
        Ok(())
    }

    fn put_table(&mut self, name: &str, table: &Table) -> Result<()> {
        self.tables.insert(name.to_owned(), table.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn table() -> Table {
        let mut table = Table::new(["text", "label"]);
        table
            .push_row(vec!["hello, world".to_owned(), "human".to_owned()])
            .unwrap();
        table
    }

    #[test]
    fn test_row_width_is_checked() {
        let mut table = Table::new(["a", "b"]);
        assert!(table.push_row(vec!["1".to_owned()]).is_err());
        assert_eq!(table.n_rows(), 0);
    }

    #[test]
    fn test_directory_sink_writes_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::create(dir.path().join("nested/out")).unwrap();

        sink.put_record("policy.json", &json!({"threshold": 0.5})).unwrap();
        sink.put_record("policy.json", &json!({"threshold": 0.6})).unwrap();
        sink.put_table("rows.csv", &table()).unwrap();

        let record: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(sink.root().join("policy.json")).unwrap())
                .unwrap();
        assert_eq!(record["threshold"], 0.6);

        let csv = fs::read_to_string(sink.root().join("rows.csv")).unwrap();
        assert_eq!(csv, "text,label\n\"hello, world\",human\n");

        // only the two artifacts remain, no temporary files
        assert_eq!(fs::read_dir(sink.root()).unwrap().count(), 2);
    }

    #[test]
    fn test_memory_sink() {
        let mut sink = MemorySink::new();
        sink.put_record("a.json", &json!([1, 2])).unwrap();
        sink.put_table("b.csv", &table()).unwrap();
        assert_eq!(sink.names(), vec!["a.json", "b.csv"]);
        assert_eq!(sink.table("b.csv").unwrap().column("label"), Some(vec!["human"]));
        assert_eq!(sink.record("a.json"), Some(&json!([1, 2])));
    }
}
