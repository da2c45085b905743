//! In-process stand-in for the Meilisearch HTTP API, built on axum.
//!
//! Serves the handful of endpoints the client uses, stores documents in a
//! map, and records every request so tests can assert on paths, query
//! strings, bodies, and headers.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: Option<Value>,
}

#[derive(Default)]
struct FakeState {
    index: String,
    exists: bool,
    docs: BTreeMap<String, Value>,
    api_key: Option<String>,
    listing: Option<Vec<Value>>,
    vanish_after_first_page: bool,
    next_task: u64,
    requests: Vec<Recorded>,
}

#[derive(Clone, Default)]
pub struct FakeMeili {
    inner: Arc<Mutex<FakeState>>,
}

type Reply = (StatusCode, Json<Value>);

impl FakeMeili {
    /// A server whose `index` does not exist yet.
    pub fn new(index: &str) -> Self {
        let fake = Self::default();
        fake.lock().index = index.to_string();
        fake
    }

    /// Rejects requests that do not carry `Bearer <key>`.
    pub fn require_key(self, key: &str) -> Self {
        self.lock().api_key = Some(key.to_string());
        self
    }

    pub fn seed(&self, records: impl IntoIterator<Item = Value>) {
        let mut state = self.lock();
        state.exists = true;
        for record in records {
            let id = record["id"].as_str().unwrap().to_string();
            state.docs.insert(id, record);
        }
    }

    /// Serves exactly `records` from the documents listing, in order and
    /// without a `total`. Records need not carry an id.
    pub fn serve_listing(&self, records: Vec<Value>) {
        let mut state = self.lock();
        state.exists = true;
        state.listing = Some(records);
    }

    /// Answers any listing request past offset 0 with `index_not_found`.
    pub fn vanish_after_first_page(&self) {
        self.lock().vanish_after_first_page = true;
    }

    pub fn docs(&self) -> BTreeMap<String, Value> {
        self.lock().docs.clone()
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.lock().requests.clone()
    }

    pub fn requests_to(&self, method: Method, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.inner.lock().unwrap()
    }

    /// Binds to an ephemeral port and serves in the background.
    /// Returns the base URL.
    pub async fn start(&self) -> String {
        let app = Router::new()
            .route("/indexes/{index}/documents", get(list_documents).post(add_documents))
            .route("/indexes/{index}/documents/delete-batch", post(delete_batch))
            .route("/tasks/{uid}", get(task))
            .route("/health", get(health))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// Records the request and checks the bearer token.
    fn admit(&self, method: Method, uri: &Uri, headers: &HeaderMap, body: Option<Value>) -> Result<MutexGuard<'_, FakeState>, Reply> {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let mut state = self.lock();
        state.requests.push(Recorded {
            method,
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            authorization: authorization.clone(),
            body,
        });

        if let Some(key) = &state.api_key {
            if authorization.as_deref() != Some(format!("Bearer {}", key).as_str()) {
                return Err((
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"message": "The provided API key is invalid.", "code": "invalid_api_key"})),
                ));
            }
        }
        Ok(state)
    }
}

fn index_not_found(index: &str) -> Reply {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "message": format!("Index `{}` not found.", index),
            "code": "index_not_found",
            "type": "invalid_request",
        })),
    )
}

fn enqueued(state: &mut FakeState, kind: &str) -> Reply {
    let uid = state.next_task;
    state.next_task += 1;
    (
        StatusCode::ACCEPTED,
        Json(json!({"taskUid": uid, "indexUid": state.index, "status": "enqueued", "type": kind})),
    )
}

async fn list_documents(
    State(fake): State<FakeMeili>,
    Path(index): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    uri: Uri,
) -> Reply {
    let state = match fake.admit(Method::GET, &uri, &headers, None) {
        Ok(state) => state,
        Err(reply) => return reply,
    };
    if !state.exists || index != state.index {
        return index_not_found(&index);
    }

    let offset: usize = params.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
    let limit: usize = params.get("limit").and_then(|v| v.parse().ok()).unwrap_or(20);
    let fields: Option<Vec<&str>> = params.get("fields").map(|f| f.split(',').collect());
    if state.vanish_after_first_page && offset > 0 {
        return index_not_found(&index);
    }

    let source: Vec<&Value> = match &state.listing {
        Some(listing) => listing.iter().collect(),
        None => state.docs.values().collect(),
    };
    let results: Vec<Value> = source
        .into_iter()
        .skip(offset)
        .take(limit)
        .map(|doc| match &fields {
            Some(fields) => {
                let projected: serde_json::Map<String, Value> = fields
                    .iter()
                    .filter_map(|f| doc.get(*f).map(|v| (f.to_string(), v.clone())))
                    .collect();
                Value::Object(projected)
            }
            None => doc.clone(),
        })
        .collect();

    let mut body = json!({"results": results, "offset": offset, "limit": limit});
    if state.listing.is_none() {
        body["total"] = json!(state.docs.len());
    }
    (StatusCode::OK, Json(body))
}

async fn add_documents(
    State(fake): State<FakeMeili>,
    Path(index): Path<String>,
    headers: HeaderMap,
    uri: Uri,
    Json(docs): Json<Vec<Value>>,
) -> Reply {
    let mut state = match fake.admit(Method::POST, &uri, &headers, Some(Value::from(docs.clone()))) {
        Ok(state) => state,
        Err(reply) => return reply,
    };
    if index != state.index {
        return index_not_found(&index);
    }
    state.exists = true;
    for doc in docs {
        if let Some(id) = doc.get("id").and_then(Value::as_str) {
            state.docs.insert(id.to_string(), doc.clone());
        }
    }
    enqueued(&mut state, "documentAdditionOrUpdate")
}

async fn delete_batch(
    State(fake): State<FakeMeili>,
    Path(index): Path<String>,
    headers: HeaderMap,
    uri: Uri,
    Json(ids): Json<Vec<String>>,
) -> Reply {
    let mut state = match fake.admit(Method::POST, &uri, &headers, Some(json!(ids))) {
        Ok(state) => state,
        Err(reply) => return reply,
    };
    if !state.exists || index != state.index {
        return index_not_found(&index);
    }
    for id in &ids {
        state.docs.remove(id);
    }
    enqueued(&mut state, "documentDeletion")
}

async fn task(
    State(fake): State<FakeMeili>,
    Path(uid): Path<u64>,
    headers: HeaderMap,
    uri: Uri,
) -> Reply {
    let state = match fake.admit(Method::GET, &uri, &headers, None) {
        Ok(state) => state,
        Err(reply) => return reply,
    };
    if uid >= state.next_task {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"message": format!("Task `{}` not found.", uid), "code": "task_not_found"})),
        );
    }
    (StatusCode::OK, Json(json!({"uid": uid, "status": "succeeded"})))
}

async fn health(State(fake): State<FakeMeili>, headers: HeaderMap, uri: Uri) -> Reply {
    if let Err(reply) = fake.admit(Method::GET, &uri, &headers, None) {
        return reply;
    }
    (StatusCode::OK, Json(json!({"status": "available"})))
}
