#![doc = "HTTP implementation of the store capability against the R2R v3 REST API."]
//
//! # R2RClient
//!
//! Wraps one pooled [`reqwest::Client`] shared by every call. After a
//! successful [`StoreClient::login`] the access token is kept and sent as a
//! bearer token on all subsequent requests.
//!
//! All endpoints answer with a `{"results": ...}` envelope. Connection
//! failures surface as [`StoreError::Unavailable`], client-side timeouts as
//! [`StoreError::Timeout`] and non-success statuses as [`StoreError::Status`].

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::contract::{
    Collection, CreatedDocument, ExtractionResult, NewDocument, SearchQuery, SearchResult,
    Session, StoreClient, User,
};
use crate::error::StoreError;

const PAGE_SIZE: usize = 100;

#[derive(Deserialize)]
struct Envelope<T> {
    results: T,
}

#[derive(Deserialize)]
struct Token {
    token: String,
}

#[derive(Deserialize)]
struct LoginResults {
    access_token: Token,
    #[serde(default)]
    refresh_token: Option<Token>,
}

#[derive(Deserialize)]
struct Success {
    #[serde(default)]
    success: bool,
}

pub struct R2RClient {
    http: Client,
    base_url: String,
    timeout: Duration,
    token: RwLock<Option<String>>,
}

impl R2RClient {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Other(format!("failed to build HTTP client: {e}")))?;
        info!(base_url = %config.base_url, "Initialised store client");
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
            token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v3/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorised(&self, req: RequestBuilder) -> RequestBuilder {
        let token = self.token.read().ok().and_then(|t| t.clone());
        match token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> StoreError {
        if e.is_timeout() {
            StoreError::Timeout(self.timeout)
        } else {
            StoreError::from(e)
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, StoreError> {
        let resp = self
            .authorised(req)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(&self, resp: Response) -> Result<T, StoreError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| String::from("<failed to read response body>"));
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let envelope: Envelope<T> = resp.json().await.map_err(|e| self.transport_error(e))?;
        Ok(envelope.results)
    }

    /// Fetch every page of a list endpoint.
    async fn list_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, StoreError> {
        let mut items = Vec::new();
        let mut offset = 0;
        loop {
            let req = self
                .http
                .get(self.url(path))
                .query(&[("offset", offset), ("limit", PAGE_SIZE)]);
            let page: Vec<T> = self.send(req).await?;
            let size = page.len();
            items.extend(page);
            if size < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }
        debug!(path, count = items.len(), "Listed all pages");
        Ok(items)
    }
}

/// JSON body of a duplicate-detection search.
pub fn search_body(query: &SearchQuery) -> serde_json::Value {
    let mut settings = serde_json::json!({
        "use_semantic_search": false,
        "use_fulltext_search": true,
        "limit": 1,
    });
    if let Some(filters) = query.filters() {
        settings["filters"] = filters;
    }
    serde_json::json!({
        "query": query.query,
        "search_mode": "custom",
        "search_settings": settings,
    })
}

#[async_trait]
impl StoreClient for R2RClient {
    async fn login(&self, email: &str, password: &str) -> Result<Session, StoreError> {
        let req = self
            .http
            .post(self.url("users/login"))
            .form(&[("username", email), ("password", password)]);
        let results: LoginResults = self.send(req).await?;
        if let Ok(mut token) = self.token.write() {
            *token = Some(results.access_token.token.clone());
        }
        info!(email, "Login successful");
        Ok(Session {
            access_token: results.access_token.token,
            refresh_token: results.refresh_token.map(|t| t.token),
        })
    }

    async fn create_collection(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Collection, StoreError> {
        let req = self
            .http
            .post(self.url("collections"))
            .json(&serde_json::json!({ "name": name, "description": description }));
        let collection: Collection = self.send(req).await?;
        info!(collection_id = %collection.id, name, "Created collection");
        Ok(collection)
    }

    async fn list_collections(&self) -> Result<Vec<Collection>, StoreError> {
        self.list_all("collections").await
    }

    async fn delete_collection(&self, id: Uuid) -> Result<bool, StoreError> {
        let req = self.http.delete(self.url(&format!("collections/{id}")));
        let results: Success = self.send(req).await?;
        Ok(results.success)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.list_all("users").await
    }

    async fn delete_user(&self, id: Uuid, password: &str) -> Result<bool, StoreError> {
        let req = self
            .http
            .delete(self.url(&format!("users/{id}")))
            .json(&serde_json::json!({ "password": password }));
        let results: Success = self.send(req).await?;
        Ok(results.success)
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchResult, StoreError> {
        let req = self
            .http
            .post(self.url("retrieval/search"))
            .json(&search_body(query));
        self.send(req).await
    }

    async fn create_document(&self, doc: &NewDocument) -> Result<CreatedDocument, StoreError> {
        let bytes = tokio::fs::read(&doc.file_path)
            .await
            .map_err(|source| StoreError::Io {
                path: doc.file_path.clone(),
                source,
            })?;
        let file_name = doc
            .file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let metadata = serde_json::to_string(&doc.metadata)
            .map_err(|e| StoreError::Other(format!("failed to encode metadata: {e}")))?;

        let mut form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name))
            .text("metadata", metadata)
            .text("ingestion_mode", doc.ingestion_mode.as_str());
        if !doc.collection_ids.is_empty() {
            let ids = serde_json::to_string(&doc.collection_ids)
                .map_err(|e| StoreError::Other(format!("failed to encode collection ids: {e}")))?;
            form = form.text("collection_ids", ids);
        }

        let req = self.http.post(self.url("documents")).multipart(form);
        let created: CreatedDocument = self.send(req).await.map_err(|e| {
            error!(file = %doc.file_path.display(), error = %e, "Document creation failed");
            e
        })?;
        Ok(created)
    }

    async fn extract_document(&self, document_id: Uuid) -> Result<ExtractionResult, StoreError> {
        let req = self
            .http
            .post(self.url(&format!("documents/{document_id}/extract")));
        self.send(req).await
    }
}
