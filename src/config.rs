use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_BASE_URL: &str = "http://localhost:7272";

/// Connection settings for the remote document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 60,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl StoreConfig {
    pub fn call_policy(&self) -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.max_retries,
            base_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            base_url = %self.base_url,
            timeout_secs = self.timeout_secs,
            max_retries = self.max_retries,
            "Loaded store config"
        );
    }
}

/// Timeout and retry settings applied to every remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    pub timeout: Duration,
    /// Extra attempts after the first one, for connection-level failures only.
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl CallPolicy {
    /// Exponential backoff: `base * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(1u32 << attempt.min(16))
    }
}

impl Default for CallPolicy {
    fn default() -> Self {
        StoreConfig::default().call_policy()
    }
}

/// Processing intensity hint passed through to the store at creation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngestionMode {
    #[default]
    Fast,
    HiRes,
    Custom,
    Ocr,
}

impl IngestionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestionMode::Fast => "fast",
            IngestionMode::HiRes => "hi-res",
            IngestionMode::Custom => "custom",
            IngestionMode::Ocr => "ocr",
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCollection {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Everything the orchestrator needs to know besides the file list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Target collections. Empty means the store's default collection.
    pub collection_ids: Vec<Uuid>,
    /// When set, a new collection is created before ingestion and replaces `collection_ids`.
    pub create_collection: Option<NewCollection>,
    /// Base metadata attached to every document; `file_path` is added per file.
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub ingestion_mode: IngestionMode,
    /// Trigger entity/relationship extraction after each successful creation.
    pub extract: bool,
    /// Number of files processed at once. Files sharing a name are never overlapped.
    pub concurrency: usize,
    /// Never read from or written to config files; injected by the caller.
    #[serde(skip)]
    pub credentials: Option<Credentials>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            collection_ids: Vec::new(),
            create_collection: None,
            metadata: serde_json::Map::new(),
            ingestion_mode: IngestionMode::default(),
            extract: false,
            concurrency: 1,
            credentials: None,
        }
    }
}

impl IngestConfig {
    pub fn trace_loaded(&self) {
        info!(
            collections = self.collection_ids.len(),
            create_collection = self.create_collection.as_ref().map(|c| c.name.as_str()),
            ingestion_mode = self.ingestion_mode.as_str(),
            extract = self.extract,
            concurrency = self.concurrency,
            login = self.credentials.is_some(),
            "Loaded ingest config"
        );
        debug!(?self, "Ingest config loaded (full debug)");
    }
}
