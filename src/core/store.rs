//! Append-only CSV store of generated sentence rows.
//!
//! The header lists eleven columns; every data row carries a twelfth column
//! with the image reference. Readers must therefore be flexible about record
//! length, and existing files are kept that way for compatibility with
//! deck-import tooling that addresses columns by position.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const HEADER: [&str; 11] = [
    "ID",
    "Ranking",
    "Surface",
    "Gloss",
    "Annotated",
    "Pronunciation",
    "SentenceTarget",
    "SentenceEN",
    "SentenceRomaji",
    "SentencePronunciation",
    "Explanation",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SentenceRecord {
    pub id: u64,
    pub rank: usize,
    pub surface: String,
    pub gloss: String,
    pub annotated: String,
    pub pronunciation: String,
    pub sentence: String,
    pub translation: String,
    pub romaji: String,
    pub sentence_pronunciation: String,
    pub explanation: String,
    pub image: String,
}

impl SentenceRecord {
    fn to_row(&self) -> [String; 12] {
        [
            self.id.to_string(),
            self.rank.to_string(),
            self.surface.clone(),
            self.gloss.clone(),
            self.annotated.clone(),
            self.pronunciation.clone(),
            self.sentence.clone(),
            self.translation.clone(),
            self.romaji.clone(),
            self.sentence_pronunciation.clone(),
            self.explanation.clone(),
            self.image.clone(),
        ]
    }

    fn from_row(row: &csv::StringRecord) -> Option<Self> {
        let get = |i: usize| row.get(i).unwrap_or("").to_string();
        Some(Self {
            id: row.get(0)?.trim().parse().ok()?,
            rank: row.get(1).and_then(|r| r.trim().parse().ok()).unwrap_or(0),
            surface: get(2),
            gloss: get(3),
            annotated: get(4),
            pronunciation: get(5),
            sentence: get(6),
            translation: get(7),
            romaji: get(8),
            sentence_pronunciation: get(9),
            explanation: get(10),
            image: get(11),
        })
    }
}

/// Image reference written into the trailing column of each row.
pub fn image_reference(id: u64, ext: &str) -> String {
    format!("<img src=\"{}.{}\">", id, ext)
}

fn reader_for(path: &Path) -> Result<csv::Reader<File>> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open sentence store {}", path.display()))
}

fn is_blank(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(true);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sentence store {}", path.display()))?;
    Ok(text.trim().is_empty())
}

/// Number of data rows already persisted. Absent or blank files have none.
pub fn count_rows(path: &Path) -> Result<usize> {
    if is_blank(path)? {
        return Ok(0);
    }
    let mut reader = reader_for(path)?;
    let mut count = 0;
    for row in reader.records() {
        let row = row.with_context(|| format!("Malformed row in {}", path.display()))?;
        if row.iter().any(|f| !f.trim().is_empty()) {
            count += 1;
        }
    }
    Ok(count)
}

/// All rows whose id column parses. Rows without an id are skipped.
pub fn read_records(path: &Path) -> Result<Vec<SentenceRecord>> {
    if is_blank(path)? {
        return Ok(Vec::new());
    }
    let mut reader = reader_for(path)?;
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.with_context(|| format!("Malformed row in {}", path.display()))?;
        if let Some(record) = SentenceRecord::from_row(&row) {
            records.push(record);
        }
    }
    Ok(records)
}

pub struct SentenceStore {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl SentenceStore {
    /// Open for appending, writing the header first when the file is absent
    /// or blank.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let fresh = is_blank(path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(!fresh)
            .write(true)
            .truncate(fresh)
            .open(path)
            .with_context(|| format!("Failed to open sentence store {}", path.display()))?;

        if !fresh && !ends_with_newline(&mut file)? {
            file.write_all(b"\n")?;
        }

        let mut writer = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Always)
            .flexible(true)
            .from_writer(file);
        if fresh {
            writer.write_record(HEADER)?;
            writer.flush()?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    /// Append one row and flush it to disk before returning.
    pub fn append(&mut self, record: &SentenceRecord) -> Result<()> {
        self.writer
            .write_record(record.to_row())
            .with_context(|| format!("Failed to append row {} to {}", record.id, self.path.display()))?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

fn ends_with_newline(file: &mut File) -> Result<bool> {
    let len = file.seek(SeekFrom::End(0))?;
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    file.seek(SeekFrom::End(0))?;
    Ok(last[0] == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: u64) -> SentenceRecord {
        SentenceRecord {
            id,
            rank: id as usize,
            surface: "猫".to_string(),
            gloss: "cat, \"feline\"".to_string(),
            annotated: "猫[ねこ]".to_string(),
            pronunciation: "ねこ".to_string(),
            sentence: "猫[ねこ]です。".to_string(),
            translation: "It's a cat.".to_string(),
            romaji: "neko desu.".to_string(),
            sentence_pronunciation: "ねこです。".to_string(),
            explanation: String::new(),
            image: image_reference(id, "png"),
        }
    }

    #[test]
    fn missing_file_counts_zero_rows() {
        let dir = TempDir::new().unwrap();
        assert_eq!(count_rows(&dir.path().join("none.csv")).unwrap(), 0);
        assert!(read_records(&dir.path().join("none.csv")).unwrap().is_empty());
    }

    #[test]
    fn fresh_store_gets_header_and_quoted_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let mut store = SentenceStore::open(&path).unwrap();
        store.append(&record(1)).unwrap();
        store.close().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "\"ID\",\"Ranking\",\"Surface\",\"Gloss\",\"Annotated\",\"Pronunciation\",\"SentenceTarget\",\"SentenceEN\",\"SentenceRomaji\",\"SentencePronunciation\",\"Explanation\""
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("\"1\",\"1\",\"猫\""));
        assert!(row.ends_with("\"<img src=\"\"1.png\"\">\""));
    }

    #[test]
    fn rows_are_visible_before_close() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let mut store = SentenceStore::open(&path).unwrap();
        store.append(&record(1)).unwrap();
        assert_eq!(count_rows(&path).unwrap(), 1);
        store.close().unwrap();
    }

    #[test]
    fn reopening_appends_without_second_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let mut store = SentenceStore::open(&path).unwrap();
        store.append(&record(1)).unwrap();
        store.close().unwrap();

        let mut store = SentenceStore::open(&path).unwrap();
        store.append(&record(2)).unwrap();
        store.close().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("\"ID\"").count(), 1);
        let ids: Vec<u64> = read_records(&path).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn whitespace_only_file_is_bootstrapped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "  \n\n").unwrap();
        assert_eq!(count_rows(&path).unwrap(), 0);
        let mut store = SentenceStore::open(&path).unwrap();
        store.append(&record(1)).unwrap();
        store.close().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("\"ID\""));
        assert_eq!(count_rows(&path).unwrap(), 1);
    }

    #[test]
    fn missing_trailing_newline_is_repaired() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "ID,Ranking\n\"1\",\"1\",\"猫\"").unwrap();
        let mut store = SentenceStore::open(&path).unwrap();
        store.append(&record(2)).unwrap();
        store.close().unwrap();
        let ids: Vec<u64> = read_records(&path).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn records_round_trip_including_image_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let mut store = SentenceStore::open(&path).unwrap();
        store.append(&record(1)).unwrap();
        store.close().unwrap();
        assert_eq!(read_records(&path).unwrap(), vec![record(1)]);
    }
}
