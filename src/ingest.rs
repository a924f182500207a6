//! Ingestion Orchestrator: submits each scanned file to the store exactly once.
//!
//! A run has two phases:
//!   - Setup (once): optional login, optional collection creation. Any failure
//!     here aborts the run before a single file is touched.
//!   - Per file: dedup search → create → optional extraction. Failures are
//!     recorded as [`IngestionOutcome`]s and never stop the batch.
//!
//! # Ordering
//! Dedup check and creation are two separate remote calls, so two workers
//! handling the same file name could both see "not found" and both create.
//! Files sharing a name therefore take a per-name lock, acquired in input
//! order; different names may overlap up to `IngestConfig::concurrency`.
//!
//! # Cancellation
//! Once the token is cancelled no new file is started, including files
//! already buffered and waiting on their name lock. Files past that point
//! complete (or time out) and their outcomes are kept.

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{CallPolicy, IngestConfig, IngestionMode};
use crate::contract::{IngestObserver, NewDocument, SearchQuery, StoreClient, TracingObserver};
use crate::error::{IngestError, SetupError, StoreError};

/// Which remote step a per-file failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum FailureStage {
    DedupCheck,
    Create,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestionOutcome {
    SkippedDuplicate,
    Ingested {
        document_id: Uuid,
    },
    /// Creation succeeded; only the follow-up extraction failed.
    IngestedExtractionFailed {
        document_id: Uuid,
        reason: String,
    },
    Failed {
        stage: FailureStage,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub outcome: IngestionOutcome,
}

/// Per-file request. Owns its own metadata snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionRequest {
    pub document: NewDocument,
    pub extract: bool,
}

impl IngestionRequest {
    pub fn new(
        path: &Path,
        collection_ids: &[Uuid],
        base_metadata: &serde_json::Map<String, serde_json::Value>,
        ingestion_mode: IngestionMode,
        extract: bool,
    ) -> Self {
        let mut metadata = base_metadata.clone();
        metadata.insert(
            "file_path".to_string(),
            serde_json::Value::String(path.to_string_lossy().into_owned()),
        );
        Self {
            document: NewDocument {
                file_path: path.to_path_buf(),
                collection_ids: collection_ids.to_vec(),
                metadata,
                ingestion_mode,
            },
            extract,
        }
    }

    pub fn file_name(&self) -> String {
        file_name(&self.document.file_path)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub skipped: usize,
    pub ingested: usize,
    pub extraction_failed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    /// Collections targeted by this run; empty means the store default.
    pub collection_ids: Vec<Uuid>,
    /// One entry per attempted file, in input order.
    pub outcomes: Vec<FileOutcome>,
    /// True when the run stopped early; `outcomes` then covers only the files
    /// that were started, still in input order.
    pub cancelled: bool,
}

impl IngestReport {
    pub fn summary(&self) -> IngestSummary {
        let mut summary = IngestSummary::default();
        for o in &self.outcomes {
            match o.outcome {
                IngestionOutcome::SkippedDuplicate => summary.skipped += 1,
                IngestionOutcome::Ingested { .. } => summary.ingested += 1,
                IngestionOutcome::IngestedExtractionFailed { .. } => {
                    summary.extraction_failed += 1
                }
                IngestionOutcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }

    /// Files that were not ingested, with stage and reason.
    pub fn failures(&self) -> impl Iterator<Item = (&Path, FailureStage, &str)> {
        self.outcomes.iter().filter_map(|o| match &o.outcome {
            IngestionOutcome::Failed { stage, reason } => {
                Some((o.path.as_path(), *stage, reason.as_str()))
            }
            _ => None,
        })
    }
}

/// Ingest `files` with the default tracing observer and no external cancellation.
pub async fn ingest<C>(
    client: &C,
    files: &[PathBuf],
    config: &IngestConfig,
    policy: &CallPolicy,
) -> Result<IngestReport, IngestError>
where
    C: StoreClient + ?Sized,
{
    ingest_with(
        client,
        files,
        config,
        policy,
        &TracingObserver,
        &CancellationToken::new(),
    )
    .await
}

pub async fn ingest_with<C, O>(
    client: &C,
    files: &[PathBuf],
    config: &IngestConfig,
    policy: &CallPolicy,
    observer: &O,
    cancel: &CancellationToken,
) -> Result<IngestReport, IngestError>
where
    C: StoreClient + ?Sized,
    O: IngestObserver + ?Sized,
{
    info!(files = files.len(), "[INGEST] Starting ingestion run");

    let collection_ids = setup(client, config, policy).await?;
    if collection_ids.is_empty() {
        observer.on_warning(
            "No collection ID provided. Files will be added to the default collection.",
        );
    }

    let locks = name_locks(files);
    let concurrency = config.concurrency.max(1);

    let outcomes: Vec<FileOutcome> = stream::iter(files.iter())
        .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
        .map(|path| {
            let request = IngestionRequest::new(
                path,
                &collection_ids,
                &config.metadata,
                config.ingestion_mode,
                config.extract,
            );
            let lock = locks.get(&request.file_name()).cloned();
            async move {
                let _guard = match &lock {
                    Some(lock) => Some(lock.lock().await),
                    None => None,
                };
                if cancel.is_cancelled() {
                    debug!(file = %request.document.file_path.display(), "Not started, run cancelled");
                    return None;
                }
                let outcome = ingest_one(client, &request, policy).await;
                let outcome = FileOutcome {
                    path: request.document.file_path,
                    outcome,
                };
                observer.on_outcome(&outcome);
                Some(outcome)
            }
        })
        .buffered(concurrency)
        .filter_map(futures::future::ready)
        .collect()
        .await;

    let cancelled = outcomes.len() < files.len();
    let report = IngestReport {
        collection_ids,
        outcomes,
        cancelled,
    };
    let summary = report.summary();
    if cancelled {
        warn!(
            attempted = report.outcomes.len(),
            total = files.len(),
            "[INGEST] Run cancelled before all files were attempted"
        );
    }
    info!(
        skipped = summary.skipped,
        ingested = summary.ingested,
        extraction_failed = summary.extraction_failed,
        failed = summary.failed,
        "[INGEST] Ingestion run complete"
    );
    Ok(report)
}

/// Login and collection resolution. Returns the collection ids to target.
async fn setup<C>(
    client: &C,
    config: &IngestConfig,
    policy: &CallPolicy,
) -> Result<Vec<Uuid>, SetupError>
where
    C: StoreClient + ?Sized,
{
    if let Some(creds) = &config.credentials {
        if !creds.email.is_empty() && !creds.password.is_empty() {
            call(policy, || client.login(&creds.email, &creds.password))
                .await
                .map_err(|source| {
                    error!(email = %creds.email, error = %source, "[INGEST][SETUP] Login failed");
                    SetupError::Login {
                        email: creds.email.clone(),
                        source,
                    }
                })?;
            info!(email = %creds.email, "[INGEST][SETUP] Logged in");
        }
    }

    if let Some(new) = &config.create_collection {
        let collection = call(policy, || client.create_collection(&new.name, &new.description))
            .await
            .map_err(|source| {
                error!(name = %new.name, error = %source, "[INGEST][SETUP] Collection creation failed");
                SetupError::CreateCollection {
                    name: new.name.clone(),
                    source,
                }
            })?;
        info!(collection_id = %collection.id, "[INGEST][SETUP] New collection created");
        return Ok(vec![collection.id]);
    }

    Ok(config.collection_ids.clone())
}

/// Dedup check, create, optional extraction for a single file.
async fn ingest_one<C>(client: &C, request: &IngestionRequest, policy: &CallPolicy) -> IngestionOutcome
where
    C: StoreClient + ?Sized,
{
    let doc = &request.document;
    let query = SearchQuery {
        query: request.file_name(),
        collection_ids: doc.collection_ids.clone(),
    };

    match call(policy, || client.search(&query)).await {
        Ok(found) if found.has_matches() => {
            debug!(file = %doc.file_path.display(), "Duplicate found by search");
            return IngestionOutcome::SkippedDuplicate;
        }
        Ok(_) => {}
        Err(e) => {
            return IngestionOutcome::Failed {
                stage: FailureStage::DedupCheck,
                reason: e.to_string(),
            };
        }
    }

    let created = match call(policy, || client.create_document(doc)).await {
        Ok(created) => created,
        Err(e) => {
            return IngestionOutcome::Failed {
                stage: FailureStage::Create,
                reason: e.to_string(),
            };
        }
    };
    let document_id = created.document_id;

    if request.extract {
        if let Err(e) = call(policy, || client.extract_document(document_id)).await {
            return IngestionOutcome::IngestedExtractionFailed {
                document_id,
                reason: e.to_string(),
            };
        }
        debug!(%document_id, "Extraction triggered");
    }

    IngestionOutcome::Ingested { document_id }
}

/// Run one remote call with the per-call timeout, retrying connection failures.
pub async fn call<T, F, Fut>(policy: &CallPolicy, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        let result = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(policy.timeout)),
        };
        match result {
            Err(e) if e.is_unavailable() && attempt < policy.max_retries => {
                let delay = policy.backoff(attempt);
                warn!(attempt = attempt + 1, ?delay, error = %e, "Store unavailable, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// One lock per file name that occurs more than once in the batch.
fn name_locks(files: &[PathBuf]) -> HashMap<String, Arc<Mutex<()>>> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for path in files {
        *counts.entry(file_name(path)).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(name, _)| (name, Arc::new(Mutex::new(()))))
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
