//! Raw entity archive on disk.
//!
//! The archive is a JSON Lines file at `{output_dir}/{index}-entities.jsonl`.
//! The first line is an `ArchiveHeader`; every further line is one
//! `ArchiveRecord`. Records are appended as documents finish and flushed
//! once per page, so memory use does not grow with the index and a run that
//! dies halfway leaves everything written up to its last page. The pipeline
//! never reads the archive back.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};

use crate::annotation::AnnotatedSentence;

/// Path of the archive for an index inside `output_dir`.
///
/// Characters that are unsafe in file names are replaced with `_`.
pub fn archive_path(output_dir: &Path, index: &str) -> PathBuf {
    let safe: String = index
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    output_dir.join(format!("{}-entities.jsonl", safe))
}

/// First line of an archive: what produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveHeader {
    pub index: String,
    pub source_field: String,
    pub model: String,
    pub generated_at: DateTime<Utc>,
}

impl ArchiveHeader {
    pub fn new(index: &str, source_field: &str, model: &str) -> Self {
        Self {
            index: index.to_string(),
            source_field: source_field.to_string(),
            model: model.to_string(),
            generated_at: Utc::now(),
        }
    }
}

/// One document's sentences that had entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub document_id: String,
    pub sentences: Vec<AnnotatedSentence>,
}

/// Appends records to an archive file as a run progresses.
pub struct EntityArchiveWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    records: usize,
}

impl EntityArchiveWriter {
    /// Create (or truncate) the archive for `header.index` in `output_dir`
    /// and write the header line.
    pub async fn create(output_dir: &Path, header: &ArchiveHeader) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;

        let path = archive_path(output_dir, &header.index);
        let file = File::create(&path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;

        let mut archive = Self {
            path,
            writer: BufWriter::new(file),
            records: 0,
        };
        archive.write_line(header).await?;
        archive.flush().await?;
        Ok(archive)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended so far.
    pub fn len(&self) -> usize {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Append a document's entities. Documents without entities are kept
    /// with an empty list so the archive shows what was processed.
    pub async fn append(
        &mut self,
        document_id: &str,
        sentences: &[AnnotatedSentence],
    ) -> anyhow::Result<()> {
        let record = ArchiveRecord {
            document_id: document_id.to_string(),
            sentences: sentences.to_vec(),
        };
        self.write_line(&record).await?;
        self.records += 1;
        Ok(())
    }

    /// Push buffered records to disk.
    pub async fn flush(&mut self) -> anyhow::Result<()> {
        self.writer
            .flush()
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    /// Flush and close the archive, returning its path.
    pub async fn finish(mut self) -> anyhow::Result<PathBuf> {
        self.flush().await?;
        Ok(self.path)
    }

    async fn write_line<T: Serialize>(&mut self, value: &T) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

/// An archive read back into memory, for tools and tests.
#[derive(Debug, Clone)]
pub struct EntityArchive {
    pub header: ArchiveHeader,
    /// Document id to the sentences that had entities.
    pub documents: BTreeMap<String, Vec<AnnotatedSentence>>,
}

impl EntityArchive {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub async fn read(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut lines = BufReader::new(file).lines();

        let first = lines
            .next_line()
            .await?
            .with_context(|| format!("{} is empty", path.display()))?;
        let header: ArchiveHeader = serde_json::from_str(&first)
            .with_context(|| format!("Invalid archive header in {}", path.display()))?;

        let mut documents = BTreeMap::new();
        let mut line_no = 1;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let record: ArchiveRecord = serde_json::from_str(&line)
                .with_context(|| format!("Invalid record at {}:{}", path.display(), line_no))?;
            documents.insert(record.document_id, record.sentences);
        }

        Ok(Self { header, documents })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntitySpan, Label};
    use tempfile::tempdir;

    fn london() -> AnnotatedSentence {
        AnnotatedSentence {
            text: "Mortimer is from London.".to_string(),
            entities: vec![EntitySpan::new(
                "London",
                17,
                23,
                vec![Label::new("LOC", 0.9)],
            )],
        }
    }

    #[test]
    fn test_archive_path() {
        let dir = Path::new("/tmp/out");
        assert_eq!(
            archive_path(dir, "letters-1901"),
            PathBuf::from("/tmp/out/letters-1901-entities.jsonl")
        );
        assert_eq!(
            archive_path(dir, "../etc"),
            PathBuf::from("/tmp/out/.._etc-entities.jsonl")
        );
    }

    #[tokio::test]
    async fn test_create_makes_directory() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("nested").join("archives");

        let header = ArchiveHeader::new("letters", "text", "pattern");
        let mut archive = EntityArchiveWriter::create(&output, &header).await.unwrap();
        archive.append("1", &[london()]).await.unwrap();
        archive.append("2", &[]).await.unwrap();
        assert_eq!(archive.len(), 2);

        let path = archive.finish().await.unwrap();
        assert_eq!(path, output.join("letters-entities.jsonl"));

        let read = EntityArchive::read(&path).await.unwrap();
        assert_eq!(read.header, header);
        assert_eq!(read.len(), 2);
        assert_eq!(read.documents["1"][0].entities[0].text, "London");
        assert!(read.documents["2"].is_empty());
    }

    #[tokio::test]
    async fn test_flushed_records_survive_without_finish() {
        let dir = tempdir().unwrap();
        let header = ArchiveHeader::new("letters", "text", "pattern");

        let mut archive = EntityArchiveWriter::create(dir.path(), &header)
            .await
            .unwrap();
        archive.append("1", &[london()]).await.unwrap();
        archive.flush().await.unwrap();
        let path = archive.path().to_path_buf();

        let read = EntityArchive::read(&path).await.unwrap();
        assert_eq!(read.len(), 1);
    }

    #[tokio::test]
    async fn test_one_record_per_line() {
        let dir = tempdir().unwrap();
        let header = ArchiveHeader::new("letters", "text", "pattern");

        let mut archive = EntityArchiveWriter::create(dir.path(), &header)
            .await
            .unwrap();
        for id in ["a", "b", "c"] {
            archive.append(id, &[london()]).await.unwrap();
        }
        let path = archive.finish().await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 4);
        let record: ArchiveRecord = serde_json::from_str(lines[3]).unwrap();
        assert_eq!(record.document_id, "c");
    }

    #[tokio::test]
    async fn test_read_rejects_corrupt_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("letters-entities.jsonl");
        let header = serde_json::to_string(&ArchiveHeader::new("letters", "text", "pattern"))
            .unwrap();
        tokio::fs::write(&path, format!("{}\n{{not json\n", header))
            .await
            .unwrap();

        let err = EntityArchive::read(&path).await.unwrap_err();
        assert!(err.to_string().contains(":2"));
    }
}
