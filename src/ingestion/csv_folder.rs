//! CSV Folder Source - Loads every `.csv` / `.tsv` file in a directory

use crate::error::{JoinError, Result};
use crate::ingestion::{IngestionFailure, RawColumn, SourceScan, Table, TableSource};
use crate::types::{ColumnId, TableId};
use csv::ReaderBuilder;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Tables are named by file name; files load in name order.
pub struct CsvFolderSource {
    folder: PathBuf,
    delimiter: u8,
}

impl CsvFolderSource {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            delimiter: b',',
        }
    }

    /// Delimiter for `.csv` files (`.tsv` files always use tabs)
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn table_files(&self) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.folder)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && delimiter_for(p, self.delimiter).is_some())
            .collect();
        files.sort();
        Ok(files)
    }

    fn read_table(&self, path: &Path) -> Result<Table> {
        let delimiter = delimiter_for(path, self.delimiter).ok_or_else(|| {
            JoinError::Ingestion(format!("{} is not a CSV/TSV file", path.display()))
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(delimiter)
            .from_path(path)?;

        let headers = dedup_headers(rdr.headers()?.iter().map(|h| h.trim().to_string()));
        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(JoinError::Ingestion(format!("{} has no header row", name)));
        }

        let mut values: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
        for record in rdr.records() {
            let record = record?;
            if record.len() > headers.len() {
                return Err(JoinError::Ingestion(format!(
                    "{} line {}: expected {} fields, saw {}",
                    name,
                    record.position().map(|p| p.line()).unwrap_or(0),
                    headers.len(),
                    record.len()
                )));
            }
            for (idx, column) in values.iter_mut().enumerate() {
                let cell = record.get(idx).map(str::trim).filter(|c| !c.is_empty());
                column.push(cell.map(str::to_string));
            }
        }

        Ok(Table {
            id: TableId::new(name),
            columns: headers
                .into_iter()
                .zip(values)
                .map(|(header, values)| RawColumn {
                    name: ColumnId::new(header),
                    values,
                })
                .collect(),
        })
    }
}

impl TableSource for CsvFolderSource {
    fn scan(&self) -> Result<SourceScan> {
        let mut scan = SourceScan::default();

        for path in self.table_files()? {
            match self.read_table(&path) {
                Ok(table) => {
                    info!(
                        "Loaded table {} ({} columns, {} rows)",
                        table.id,
                        table.columns.len(),
                        table.row_count()
                    );
                    scan.tables.push(table);
                }
                Err(e) => {
                    warn!("Could not load {}: {}", path.display(), e);
                    scan.failures.push(IngestionFailure {
                        source: path.display().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(scan)
    }
}

fn delimiter_for(path: &Path, csv_delimiter: u8) -> Option<u8> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => Some(csv_delimiter),
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => Some(b'\t'),
        _ => None,
    }
}

/// Repeated header names get the first `.1`, `.2`, ... suffix that is not
/// already a header of the file
fn dedup_headers(headers: impl Iterator<Item = String>) -> Vec<String> {
    let headers: Vec<String> = headers.collect();
    let original: HashSet<&str> = headers.iter().map(String::as_str).collect();
    let mut used: HashSet<String> = HashSet::new();
    let mut suffixes: HashMap<&str, usize> = HashMap::new();

    let mut out = Vec::with_capacity(headers.len());
    for h in &headers {
        if used.insert(h.clone()) {
            out.push(h.clone());
            continue;
        }
        let suffix = suffixes.entry(h.as_str()).or_insert(0);
        let name = loop {
            *suffix += 1;
            let candidate = format!("{}.{}", h, suffix);
            if !original.contains(candidate.as_str()) && !used.contains(&candidate) {
                break candidate;
            }
        };
        used.insert(name.clone());
        out.push(name);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;
    use std::fs;

    #[test]
    fn test_scan_reads_csv_and_tsv_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.csv"), "name,city\nAlice,Paris\nBob,\n").unwrap();
        fs::write(dir.path().join("a.tsv"), "id\tcode\n1\tx\n2\ty\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let scan = CsvFolderSource::new(dir.path()).scan().unwrap();
        assert!(scan.failures.is_empty());
        let names: Vec<&str> = scan.tables.iter().map(|t| t.id.name()).collect();
        assert_eq!(names, vec!["a.tsv", "b.csv"]);

        let people = &scan.tables[1];
        assert_eq!(people.columns[1].name, ColumnId::new("city"));
        assert_eq!(people.columns[1].values, vec![Some("Paris".to_string()), None]);
    }

    #[test]
    fn test_malformed_file_is_reported_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("good.csv"), "a\n1\n2\n").unwrap();
        fs::write(dir.path().join("bad.csv"), "a,b\n1,2,3,4\n").unwrap();
        fs::write(dir.path().join("empty.csv"), "").unwrap();

        let scan = CsvFolderSource::new(dir.path()).scan().unwrap();
        assert_eq!(scan.tables.len(), 1);
        assert_eq!(scan.tables[0].id.name(), "good.csv");
        assert_eq!(scan.failures.len(), 2);
    }

    #[test]
    fn test_missing_folder_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = CsvFolderSource::new(dir.path().join("nope")).scan();
        assert!(matches!(result, Err(JoinError::Io(_))));
    }

    #[test]
    fn test_duplicate_headers_are_suffixed() {
        let headers = dedup_headers(["x", "y", "x", "x"].iter().map(|s| s.to_string()));
        assert_eq!(headers, vec!["x", "y", "x.1", "x.2"]);
    }

    #[test]
    fn test_suffixes_skip_names_already_in_the_header() {
        let headers = dedup_headers(["a", "a", "a.1"].iter().map(|s| s.to_string()));
        assert_eq!(headers, vec!["a", "a.2", "a.1"]);

        let headers = dedup_headers(["a.1", "a", "a", "a.1"].iter().map(|s| s.to_string()));
        assert_eq!(headers.iter().unique().count(), 4);
    }

    #[test]
    fn test_colliding_headers_keep_every_column() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("t.csv"), "a,a,a.1
1,2,3
4,5,6
").unwrap();

        let scan = CsvFolderSource::new(dir.path()).scan().unwrap();
        let table = &scan.tables[0];
        let names: Vec<&str> = table.columns.iter().map(|c| c.name.name()).collect();
        assert_eq!(names, vec!["a", "a.2", "a.1"]);
        assert_eq!(table.columns[1].values, vec![Some("2".to_string()), Some("5".to_string())]);
    }
}
