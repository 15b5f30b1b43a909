//! Annotation manager: walks an index and annotates every document.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::annotator::{annotated_field_name, DocumentAnnotation, DocumentAnnotator};
use super::filters::FilterCategoryMap;
use super::types::{AnnotatedSentence, AnnotationEvent, DocumentError, RunSummary};
use crate::config::{ConfigError, ANNOTATED_FIELD_TYPE};
use crate::context::CancelFlag;
use crate::index::{
    ensure_mappings, plan_mappings, IndexClient, IndexError, MappingOutcome, ScrollRequest,
    ScrollTraversal, TraversalState,
};
use crate::models::IndexedDocument;
use crate::storage::{ArchiveHeader, EntityArchiveWriter};

/// Parameters of one annotation run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub index: String,
    /// Source field holding the text to annotate.
    pub source_field: String,
    pub page_size: usize,
    /// Scroll cursor lease, renewed on every page fetch.
    pub lease: Duration,
    /// Stop after this many documents. 0 means no limit.
    pub limit: usize,
    /// Do everything except writing mappings and documents.
    pub dry_run: bool,
    /// Append the raw entities of every document to an archive in this
    /// directory.
    pub archive_dir: Option<PathBuf>,
}

impl RunOptions {
    pub fn new(index: &str, source_field: &str) -> Self {
        Self {
            index: index.to_string(),
            source_field: source_field.to_string(),
            page_size: 100,
            lease: Duration::from_secs(300),
            limit: 0,
            dry_run: false,
            archive_dir: None,
        }
    }

    pub fn annotated_field(&self) -> String {
        annotated_field_name(&self.source_field)
    }

    fn limit_reached(&self, processed: usize) -> bool {
        self.limit > 0 && processed >= self.limit
    }
}

/// Orchestrates schema setup and the traversal loop.
pub struct AnnotationManager {
    client: Arc<dyn IndexClient>,
}

impl AnnotationManager {
    pub fn new(client: Arc<dyn IndexClient>) -> Self {
        Self { client }
    }

    /// Declare the annotated field and every filter field.
    ///
    /// Runs once before traversal. In dry-run mode conflicts are still
    /// reported but nothing is written.
    pub async fn prepare_schema(
        &self,
        options: &RunOptions,
        categories: &FilterCategoryMap,
    ) -> Result<MappingOutcome, ConfigError> {
        let mut wanted = categories.mappings();
        wanted.insert(options.annotated_field(), ANNOTATED_FIELD_TYPE.to_string());

        if options.dry_run {
            let (outcome, missing) = plan_mappings(self.client.as_ref(), &options.index, &wanted).await?;
            for field in missing.keys() {
                info!("Dry run: would declare {}.{}", options.index, field);
            }
            return Ok(outcome);
        }

        ensure_mappings(self.client.as_ref(), &options.index, &wanted).await
    }

    /// Annotate every document of the index, emitting events for progress
    /// tracking.
    ///
    /// Per-document failures are counted and never stop the run. A failure
    /// to fetch a later page ends the traversal early and is reported in the
    /// summary. Only failing to create the archive, or to open the
    /// traversal, is an error. The cursor is released on every path.
    pub async fn run(
        &self,
        annotator: &DocumentAnnotator,
        options: &RunOptions,
        cancel: &CancelFlag,
        event_tx: mpsc::Sender<AnnotationEvent>,
    ) -> anyhow::Result<RunSummary> {
        let archive = match options.archive_dir.as_deref() {
            Some(dir) => {
                let header = ArchiveHeader::new(
                    &options.index,
                    &options.source_field,
                    annotator.recognizer().model_id(),
                );
                let archive = EntityArchiveWriter::create(dir, &header)
                    .await
                    .context("Failed to create entity archive")?;
                Some(archive)
            }
            None => None,
        };

        let request = ScrollRequest::new(options.page_size, options.lease)
            .with_source_field(&options.source_field);
        let mut traversal = ScrollTraversal::new(self.client.as_ref(), &options.index, request);

        let mut run = Run {
            client: self.client.as_ref(),
            annotator,
            options,
            cancel,
            event_tx: &event_tx,
            annotated_field: options.annotated_field(),
            summary: RunSummary::default(),
            archive,
        };

        let walked = run.walk(&mut traversal).await;
        if let Err(e) = traversal.close().await {
            warn!("Failed to release cursor for {}: {}", options.index, e);
        }

        let Run {
            mut summary,
            archive,
            ..
        } = run;

        if let Err(e) = walked {
            let _ = event_tx
                .send(AnnotationEvent::Complete {
                    summary: summary.clone(),
                })
                .await;
            return Err(anyhow::Error::new(e)
                .context(format!("Failed to open traversal of {}", options.index)));
        }

        if let Some(archive) = archive {
            let records = archive.len();
            match archive.finish().await {
                Ok(path) => {
                    info!("Archived {} documents to {}", records, path.display());
                    summary.archive_path = Some(path);
                }
                Err(e) => warn!("Entity archive incomplete: {:#}", e),
            }
        }

        info!(
            "Annotation of {} finished: {} succeeded, {} failed, {} skipped",
            options.index, summary.succeeded, summary.failed, summary.skipped
        );
        let _ = event_tx
            .send(AnnotationEvent::Complete {
                summary: summary.clone(),
            })
            .await;

        Ok(summary)
    }
}

/// State of a run in progress.
struct Run<'a> {
    client: &'a dyn IndexClient,
    annotator: &'a DocumentAnnotator,
    options: &'a RunOptions,
    cancel: &'a CancelFlag,
    event_tx: &'a mpsc::Sender<AnnotationEvent>,
    annotated_field: String,
    summary: RunSummary,
    /// Dropped after the first write failure.
    archive: Option<EntityArchiveWriter>,
}

impl Run<'_> {
    /// Page through the index. Only an error opening the traversal escapes.
    async fn walk(&mut self, traversal: &mut ScrollTraversal<'_>) -> Result<(), IndexError> {
        let mut page = traversal.open().await?;
        self.summary.total_expected = traversal.total_expected();

        let total_documents = match self.options.limit {
            0 => self.summary.total_expected,
            limit => self.summary.total_expected.min(limit as u64),
        };
        let _ = self
            .event_tx
            .send(AnnotationEvent::Started { total_documents })
            .await;

        loop {
            for doc in &page {
                if self.should_stop() {
                    return Ok(());
                }
                self.process_document(doc).await;
            }

            self.flush_archive().await;

            if self.should_stop() && traversal.state() == TraversalState::More {
                return Ok(());
            }

            match traversal.next_page().await {
                Ok(Some(next)) => page = next,
                Ok(None) => {
                    self.summary.traversal_complete = true;
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Traversal of {} stopped after {} of {} documents: {}",
                        self.options.index,
                        traversal.documents_seen(),
                        traversal.total_expected(),
                        e
                    );
                    return Ok(());
                }
            }
        }
    }

    fn should_stop(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            if !self.summary.cancelled {
                info!("Run cancelled after {} documents", self.summary.processed());
            }
            self.summary.cancelled = true;
            return true;
        }
        self.options.limit_reached(self.summary.processed())
    }

    async fn process_document(&mut self, doc: &IndexedDocument) {
        let _ = self
            .event_tx
            .send(AnnotationEvent::DocumentStarted {
                document_id: doc.id.clone(),
            })
            .await;

        let text = match doc.field_text(&self.options.source_field) {
            Some(text) if !text.trim().is_empty() => text,
            Some(_) => return self.skip(doc, "field is empty").await,
            None => return self.skip(doc, "field is missing or not text").await,
        };

        match self.annotate(doc, text).await {
            Ok(annotation) => {
                let entities = annotation.entity_count();
                self.archive_document(&doc.id, &annotation.sentences).await;
                self.summary.succeeded += 1;
                let _ = self
                    .event_tx
                    .send(AnnotationEvent::DocumentCompleted {
                        document_id: doc.id.clone(),
                        entities,
                    })
                    .await;
            }
            Err(e) => {
                warn!(
                    "Failed to annotate document {} in {}: {}",
                    doc.id, self.options.index, e
                );
                self.summary.failed += 1;
                let _ = self
                    .event_tx
                    .send(AnnotationEvent::DocumentFailed {
                        document_id: doc.id.clone(),
                        error: e.to_string(),
                    })
                    .await;
            }
        }
    }

    /// Annotate and write back. Nothing is written unless annotation of the
    /// whole document succeeded.
    async fn annotate(
        &self,
        doc: &IndexedDocument,
        text: &str,
    ) -> Result<DocumentAnnotation, DocumentError> {
        let annotation = self.annotator.annotate_text(text).await?;

        if self.options.dry_run {
            debug!("Dry run: not updating {}", doc.id);
        } else {
            let update = annotation.to_update_doc(&self.annotated_field);
            self.client
                .update_document(&self.options.index, &doc.id, &update)
                .await
                .map_err(DocumentError::Update)?;
        }

        Ok(annotation)
    }

    async fn archive_document(&mut self, document_id: &str, sentences: &[AnnotatedSentence]) {
        if let Some(archive) = self.archive.as_mut() {
            if let Err(e) = archive.append(document_id, sentences).await {
                warn!("Stopped archiving entities: {:#}", e);
                self.archive = None;
            }
        }
    }

    async fn flush_archive(&mut self) {
        if let Some(archive) = self.archive.as_mut() {
            if let Err(e) = archive.flush().await {
                warn!("Stopped archiving entities: {:#}", e);
                self.archive = None;
            }
        }
    }

    async fn skip(&mut self, doc: &IndexedDocument, reason: &str) {
        debug!("Skipping document {}: {}", doc.id, reason);
        self.summary.skipped += 1;
        let _ = self
            .event_tx
            .send(AnnotationEvent::DocumentSkipped {
                document_id: doc.id.clone(),
                reason: reason.to_string(),
            })
            .await;
    }
}
