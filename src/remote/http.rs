//! Meilisearch HTTP client.
//!
//! # Endpoints
//!
//! | Method | Path | Used for |
//! |--------|------|----------|
//! | `GET`  | `/indexes/{index}/documents` | Paging through `id` + `file_mtime` |
//! | `POST` | `/indexes/{index}/documents` | Upserting a chunk of documents |
//! | `POST` | `/indexes/{index}/documents/delete-batch` | Deleting a chunk of ids |
//! | `GET`  | `/tasks/{uid}` | Polling an accepted write task |
//! | `GET`  | `/health` | Reachability check |
//!
//! When an API key is configured it is sent as a bearer token on every request.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;

use super::SearchBackend;
use crate::config::SearchConfig;
use crate::error::BackendError;
use crate::models::{Document, DocumentsPage, RemoteRecord, TaskInfo, TaskStatus};

/// Fields requested when reading the index baseline.
const STATE_FIELDS: &str = "id,file_mtime";

pub struct MeiliClient {
    http: reqwest::Client,
    base_url: String,
    index: String,
    api_key: Option<String>,
}

impl MeiliClient {
    pub fn new(config: &SearchConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    fn documents_url(&self) -> String {
        format!("{}/indexes/{}/documents", self.base_url, self.index)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

/// Turns a non-success response into [`BackendError::Status`], preferring the
/// backend's own `message` field over the raw body.
async fn status_error(response: Response) -> BackendError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);
    BackendError::Status { status, message }
}

async fn json_body(response: Response) -> Result<Value, BackendError> {
    if !response.status().is_success() {
        return Err(status_error(response).await);
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| BackendError::Decode(e.to_string()))
}

fn task_info(body: &Value) -> TaskInfo {
    TaskInfo {
        task_uid: body
            .get("taskUid")
            .or_else(|| body.get("uid"))
            .and_then(Value::as_u64),
    }
}

/// Projects one raw index record. Ids may be strings or integers.
fn remote_record(raw: &Value) -> Option<RemoteRecord> {
    let id = match raw.get("id")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some(RemoteRecord {
        id,
        file_mtime: raw.get("file_mtime").and_then(Value::as_f64),
    })
}

fn documents_page(body: &Value) -> Result<DocumentsPage, BackendError> {
    let results = body
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::Decode("documents response has no results array".into()))?;

    let mut records = Vec::with_capacity(results.len());
    for raw in results {
        match remote_record(raw) {
            Some(record) => records.push(record),
            None => tracing::warn!(record = %raw, "index record has no usable id, ignoring"),
        }
    }

    Ok(DocumentsPage {
        results: records,
        fetched: results.len(),
        total: body.get("total").and_then(Value::as_u64),
    })
}

fn task_status(body: &Value) -> Result<TaskStatus, BackendError> {
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| BackendError::Decode("task response has no status".into()))?;
    Ok(match status {
        "enqueued" => TaskStatus::Enqueued,
        "processing" => TaskStatus::Processing,
        "succeeded" => TaskStatus::Succeeded,
        "canceled" => TaskStatus::Canceled,
        "failed" => TaskStatus::Failed(
            body.pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        ),
        other => return Err(BackendError::Decode(format!("unknown task status '{}'", other))),
    })
}

#[async_trait]
impl SearchBackend for MeiliClient {
    async fn fetch_documents(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<DocumentsPage, BackendError> {
        let response = self
            .request(Method::GET, &self.documents_url())
            .query(&[
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
                ("fields", STATE_FIELDS.to_string()),
            ])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::IndexNotFound);
        }
        documents_page(&json_body(response).await?)
    }

    async fn add_documents(&self, documents: &[Document]) -> Result<TaskInfo, BackendError> {
        let response = self
            .request(Method::POST, &self.documents_url())
            .json(documents)
            .send()
            .await?;
        Ok(task_info(&json_body(response).await?))
    }

    async fn delete_documents(&self, ids: &[String]) -> Result<TaskInfo, BackendError> {
        let url = format!("{}/delete-batch", self.documents_url());
        let response = self.request(Method::POST, &url).json(ids).send().await?;
        Ok(task_info(&json_body(response).await?))
    }

    async fn task_status(&self, uid: u64) -> Result<TaskStatus, BackendError> {
        let url = format!("{}/tasks/{}", self.base_url, uid);
        let response = self.request(Method::GET, &url).send().await?;
        task_status(&json_body(response).await?)
    }

    async fn health(&self) -> Result<String, BackendError> {
        let url = format!("{}/health", self.base_url);
        let response = self.request(Method::GET, &url).send().await?;
        let body = json_body(response).await?;
        body.get("status")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BackendError::Decode("health response has no status".into()))
    }
}
