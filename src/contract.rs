//! # contract: interface to the remote document store
//!
//! This module defines the [`StoreClient`] trait, the capability the
//! orchestrator and the admin commands consume, together with the plain data
//! types it exchanges. The real HTTP implementation lives in
//! [`crate::client`]; tests use the `mockall`-generated `MockStoreClient`.
//!
//! It also defines [`IngestObserver`], through which the orchestrator reports
//! warnings and per-file outcomes instead of writing to global state.

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::config::IngestionMode;
use crate::error::StoreError;
use crate::ingest::FileOutcome;

/// Authenticated context returned by a successful login.
#[derive(Clone, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub is_superuser: bool,
}

/// Full-text search used for duplicate detection.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub query: String,
    /// Restrict the search to these collections; empty means no restriction.
    pub collection_ids: Vec<Uuid>,
}

impl SearchQuery {
    /// Store filter expression for the collection scope, if any.
    pub fn filters(&self) -> Option<serde_json::Value> {
        match self.collection_ids.as_slice() {
            [] => None,
            [single] => Some(serde_json::json!({ "collection_id": { "$eq": single } })),
            many => Some(serde_json::json!({ "collection_id": { "$in": many } })),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub chunk_search_results: Vec<serde_json::Value>,
}

impl SearchResult {
    pub fn has_matches(&self) -> bool {
        !self.chunk_search_results.is_empty()
    }
}

/// A document submission. Each file gets its own metadata map.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub file_path: PathBuf,
    pub collection_ids: Vec<Uuid>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub ingestion_mode: IngestionMode,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreatedDocument {
    pub document_id: Uuid,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExtractionResult {
    #[serde(default)]
    pub message: Option<String>,
}

/// Remote document/collection store.
///
/// Every method may fail; callers must handle the error at the call site.
/// Implementations hold any session state internally after [`StoreClient::login`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<Session, StoreError>;

    async fn create_collection(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Collection, StoreError>;

    async fn list_collections(&self) -> Result<Vec<Collection>, StoreError>;

    /// Returns whether the store reported the deletion as successful.
    async fn delete_collection(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    async fn delete_user(&self, id: Uuid, password: &str) -> Result<bool, StoreError>;

    async fn search(&self, query: &SearchQuery) -> Result<SearchResult, StoreError>;

    async fn create_document(&self, doc: &NewDocument) -> Result<CreatedDocument, StoreError>;

    async fn extract_document(&self, document_id: Uuid) -> Result<ExtractionResult, StoreError>;
}

/// Receives progress from an ingestion run.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait IngestObserver: Send + Sync {
    fn on_warning(&self, message: &str);

    fn on_outcome(&self, outcome: &FileOutcome);
}

/// Default observer: reports through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl IngestObserver for TracingObserver {
    fn on_warning(&self, message: &str) {
        tracing::warn!("{message}");
    }

    fn on_outcome(&self, outcome: &FileOutcome) {
        use crate::ingest::IngestionOutcome::*;
        let path = outcome.path.display();
        match &outcome.outcome {
            SkippedDuplicate => {
                tracing::info!(file = %path, "Document already exists in store, skipping")
            }
            Ingested { document_id } => {
                tracing::info!(file = %path, %document_id, "File ingested")
            }
            IngestedExtractionFailed {
                document_id,
                reason,
            } => tracing::error!(
                file = %path,
                %document_id,
                reason = %reason,
                "File ingested but extraction failed"
            ),
            Failed { stage, reason } => {
                tracing::error!(file = %path, ?stage, reason = %reason, "File failed")
            }
        }
    }
}
