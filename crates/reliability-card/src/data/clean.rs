use std::{collections::HashSet, ops::RangeInclusive};

use tracing::{debug, warn};

use super::{LabeledDataset, RawTable};
use crate::error::{ReportCardError, Result};

const TEXT_COLUMN_NAMES: [&str; 3] = ["text", "content", "sentence"];
const LABEL_COLUMN_NAMES: [&str; 4] = ["label", "class", "human_or_ai", "target"];
/// Distinct-value range for a column to pass as a label column by content.
const LABEL_CARDINALITY: RangeInclusive<usize> = 2..=6;

/// The text and label columns chosen from a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSelection {
    pub text: usize,
    pub text_name: String,
    pub label: usize,
    pub label_name: String,
}

fn named_column(table: &RawTable, candidates: &[&str]) -> Option<usize> {
    table
        .headers()
        .iter()
        .position(|h| candidates.contains(&h.to_lowercase().as_str()))
}

fn explicit_column(table: &RawTable, name: &str) -> Result<usize> {
    table
        .column_index(name)
        .ok_or_else(|| ReportCardError::MissingColumn(name.to_owned()))
}

/// A column holds free text if any non-empty cell is not a number.
fn is_textual(table: &RawTable, column: usize) -> bool {
    table
        .column(column)
        .map(str::trim)
        .any(|cell| !cell.is_empty() && cell.parse::<f64>().is_err())
}

fn mean_length(table: &RawTable, column: usize) -> f64 {
    if table.n_rows() == 0 {
        return 0.0;
    }
    let total: usize = table.column(column).map(|cell| cell.chars().count()).sum();
    total as f64 / table.n_rows() as f64
}

fn distinct_values(table: &RawTable, column: usize) -> usize {
    table
        .column(column)
        .filter(|cell| !cell.is_empty())
        .collect::<HashSet<_>>()
        .len()
}

/// Pick the text and label columns.
///
/// Explicit names win. Otherwise a header named like a text column (`text`,
/// `content`, `sentence`) is used, falling back to the textual column with the
/// longest mean cell length. The label column is a header named `label`,
/// `class`, `human_or_ai` or `target`, falling back to the first other textual
/// column with 2 to 6 distinct values.
pub fn detect_columns(
    table: &RawTable,
    text_column: Option<&str>,
    label_column: Option<&str>,
) -> Result<ColumnSelection> {
    let n_columns = table.headers().len();

    let text = match text_column {
        Some(name) => explicit_column(table, name)?,
        None => named_column(table, &TEXT_COLUMN_NAMES)
            .or_else(|| {
                (0..n_columns)
                    .filter(|&c| is_textual(table, c))
                    .map(|c| (c, mean_length(table, c)))
                    .fold(None, |best: Option<(usize, f64)>, (c, len)| match best {
                        Some((_, best_len)) if best_len >= len => best,
                        _ => Some((c, len)),
                    })
                    .map(|(c, _)| c)
            })
            .ok_or_else(|| ReportCardError::NoTextColumn {
                columns: table.headers().to_vec(),
            })?,
    };

    let label = match label_column {
        Some(name) => explicit_column(table, name)?,
        None => named_column(table, &LABEL_COLUMN_NAMES)
            .filter(|&c| c != text)
            .or_else(|| {
                (0..n_columns).find(|&c| {
                    c != text
                        && is_textual(table, c)
                        && LABEL_CARDINALITY.contains(&distinct_values(table, c))
                })
            })
            .ok_or(ReportCardError::NoLabelColumn)?,
    };

    let selection = ColumnSelection {
        text,
        text_name: table.headers()[text].clone(),
        label,
        label_name: table.headers()[label].clone(),
    };
    debug!(?selection, "Detected columns");
    Ok(selection)
}

/// Strip text, strip and lowercase labels, drop rows with an empty text or label.
pub fn clean_table(table: &RawTable, columns: &ColumnSelection) -> LabeledDataset {
    let mut texts = Vec::with_capacity(table.n_rows());
    let mut labels = Vec::with_capacity(table.n_rows());
    let mut dropped = 0usize;

    for row in 0..table.n_rows() {
        let text = table.cell(row, columns.text).trim();
        let label = table.cell(row, columns.label).trim().to_lowercase();
        if text.is_empty() || label.is_empty() {
            dropped += 1;
            continue;
        }
        texts.push(text.to_owned());
        labels.push(label);
    }

    if dropped > 0 {
        warn!(dropped, "Dropped rows with empty text or label");
    }
    LabeledDataset { texts, labels }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            headers.iter().map(|h| (*h).to_owned()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| (*c).to_owned()).collect())
                .collect(),
        )
    }

    #[test]
    fn test_named_columns_are_case_insensitive() {
        let t = table(&["ID", "Sentence", "Human_or_AI"], &[&["1", "hello there", "human"]]);
        let cols = detect_columns(&t, None, None).unwrap();
        assert_eq!((cols.text, cols.label), (1, 2));
        assert_eq!(cols.text_name, "Sentence");
    }

    #[test]
    fn test_falls_back_to_longest_textual_column() {
        let t = table(
            &["id", "body", "kind", "score"],
            &[
                &["1", "a fairly long passage of prose", "ai", "0.5"],
                &["2", "another long passage of prose", "human", "0.7"],
                &["3", "yet another passage", "edited", "0.1"],
            ],
        );
        let cols = detect_columns(&t, None, None).unwrap();
        assert_eq!(cols.text_name, "body");
        assert_eq!(cols.label_name, "kind");
    }

    #[test]
    fn test_numeric_only_table_has_no_text_column() {
        let t = table(&["a", "b"], &[&["1", "2.5"], &["3", "4"]]);
        assert!(matches!(
            detect_columns(&t, None, None),
            Err(ReportCardError::NoTextColumn { .. })
        ));
    }

    #[test]
    fn test_no_label_column() {
        // single textual column with too many distinct values for a label
        let t = table(
            &["body"],
            &[&["one"], &["two"], &["three"], &["four"], &["five"], &["six"], &["seven"]],
        );
        assert!(matches!(
            detect_columns(&t, None, None),
            Err(ReportCardError::NoLabelColumn)
        ));
    }

    #[test]
    fn test_explicit_columns_override_detection() {
        let t = table(&["text", "label", "alt"], &[&["x", "ai", "human"]]);
        let cols = detect_columns(&t, Some("text"), Some("alt")).unwrap();
        assert_eq!(cols.label_name, "alt");
        assert!(matches!(
            detect_columns(&t, Some("missing"), None),
            Err(ReportCardError::MissingColumn(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_clean_strips_and_lowercases() {
        let t = table(
            &["text", "label"],
            &[&["  keep me  ", " Human "], &["   ", "ai"], &["no label", ""], &["ok", "AI"]],
        );
        let cols = detect_columns(&t, None, None).unwrap();
        let dataset = clean_table(&t, &cols);
        assert_eq!(dataset.texts(), &["keep me", "ok"]);
        assert_eq!(dataset.labels(), &["human", "ai"]);
    }
}
