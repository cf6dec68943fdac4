//! Labeled text ingestion: CSV reading, column detection and cleaning, and
//! train/val/test splitting.

mod clean;
mod split;

use std::{collections::BTreeMap, io, path::Path};

use tracing::info;

pub use clean::{clean_table, detect_columns, ColumnSelection};
pub use split::{split_dataset, Splits, SplitsSummary};

use crate::error::{ReportCardError, Result};

/// A CSV file as headers plus string cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Build from headers and rows; short rows read as empty cells.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);
        let headers = reader.headers()?.iter().map(str::to_owned).collect();
        let rows = reader
            .records()
            .map(|record| record.map(|r| r.iter().map(str::to_owned).collect()))
            .collect::<Result<Vec<Vec<String>>, csv::Error>>()?;
        Ok(Self { headers, rows })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| ReportCardError::io(path, e))?;
        Self::from_reader(io::BufReader::new(file))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Cell value, empty when the row is shorter than the header.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map_or("", String::as_str)
    }

    /// All cells of one column, in row order.
    pub fn column(&self, column: usize) -> impl Iterator<Item = &str> + '_ {
        (0..self.rows.len()).map(move |row| self.cell(row, column))
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// Cleaned `(text, label)` rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledDataset {
    texts: Vec<String>,
    labels: Vec<String>,
}

impl LabeledDataset {
    pub fn new(texts: Vec<String>, labels: Vec<String>) -> Result<Self> {
        if texts.len() != labels.len() {
            return Err(ReportCardError::length_mismatch(
                "dataset labels",
                texts.len(),
                labels.len(),
            ));
        }
        Ok(Self { texts, labels })
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Rows at `indices`, in that order.
    #[must_use]
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            texts: indices.iter().map(|&i| self.texts[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i].clone()).collect(),
        }
    }

    pub fn label_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for label in &self.labels {
            *counts.entry(label.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Read a CSV file, detect its text and label columns and clean the rows.
pub fn load_dataset(
    path: impl AsRef<Path>,
    text_column: Option<&str>,
    label_column: Option<&str>,
) -> Result<LabeledDataset> {
    let path = path.as_ref();
    let table = RawTable::from_path(path)?;
    let columns = detect_columns(&table, text_column, label_column)?;
    let dataset = clean_table(&table, &columns);
    info!(
        path = %path.display(),
        text_column = %columns.text_name,
        label_column = %columns.label_name,
        n_raw = table.n_rows(),
        n_clean = dataset.len(),
        "Loaded dataset"
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_reads_flexible_csv() {
        let csv = "content,label,extra\n\"Hello, world\",human,1\nshort row,ai\n";
        let table = RawTable::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.headers(), &["content", "label", "extra"]);
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.cell(0, 0), "Hello, world");
        assert_eq!(table.cell(1, 2), "");
        assert_eq!(table.column(1).collect::<Vec<_>>(), vec!["human", "ai"]);
    }

    #[test]
    fn test_load_dataset_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id,Text,Class").unwrap();
        writeln!(file, "1,  An essay about rivers.  ,Human").unwrap();
        writeln!(file, "2,   ,ai").unwrap();
        writeln!(file, "3,A generated summary.,AI ").unwrap();
        file.flush().unwrap();

        let dataset = load_dataset(file.path(), None, None).unwrap();
        assert_eq!(dataset.texts(), &["An essay about rivers.", "A generated summary."]);
        assert_eq!(dataset.labels(), &["human", "ai"]);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_dataset("/definitely/not/here.csv", None, None).unwrap_err();
        assert!(matches!(err, ReportCardError::Io { .. }));
    }

    #[test]
    fn test_select_and_counts() {
        let dataset = LabeledDataset::new(
            vec!["a".into(), "b".into(), "c".into()],
            vec!["ai".into(), "human".into(), "ai".into()],
        )
        .unwrap();
        let picked = dataset.select(&[2, 1]);
        assert_eq!(picked.texts(), &["c", "b"]);
        assert_eq!(dataset.label_counts().get("ai"), Some(&2));
        assert!(LabeledDataset::new(vec!["a".into()], vec![]).is_err());
    }
}
