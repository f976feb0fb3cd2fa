//! HTTP handlers.
//!
//! Each handler translates a request into one call on the store, the bulk
//! engine or the fetch engine and serializes the result. Failures go through
//! [`ApiError`], so every error body has the same `{"error": ...}` shape.

use super::{error::ApiError, state::AppState};
use crate::server::telemetry::{
    increment_bulk_errors, increment_bulk_requests, increment_fetch_failures,
    increment_fetch_targets, increment_persons_created, record_bulk_duration,
};
use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use persons_core::{
    Error, NewPerson, Person, PersonId, StoreResult,
    bulk::{BatchReport, BulkOutcome},
    fetch::FetchResult,
    store::PersonStore,
    strategy::{Execute, StrategyKind},
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Instant};

#[derive(Debug, Deserialize)]
pub struct CheckParams {
    pub pk: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub count: i64,
    /// Overrides the configured default strategy.
    #[serde(default)]
    pub strategy: Option<StrategyKind>,
}

#[derive(Debug, Deserialize)]
pub struct AsyncBulkRequest {
    pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResponse {
    pub message: String,
    pub created_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<BatchReport>>,
}

#[derive(Debug, Serialize)]
pub struct FetchResponse {
    pub results: Vec<FetchResult>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PersonList {
    pub count: usize,
    pub results: Vec<Person>,
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `GET /check?pk=<id>`
pub async fn check(
    State(state): State<AppState>,
    Query(params): Query<CheckParams>,
) -> Result<Json<Person>, ApiError> {
    let raw = params
        .pk
        .ok_or_else(|| Error::validation("pk parameter is required"))?;
    let id = raw
        .trim()
        .parse::<PersonId>()
        .map_err(|_| Error::validation(format!("pk must be a non-negative integer, got `{raw}`")))?;

    Ok(Json(find(&state, id).await?))
}

/// `POST /create_bulk`
pub async fn create_bulk(
    State(state): State<AppState>,
    payload: Result<Json<BulkRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let outcome = run_bulk(&state, request.count, request.strategy).await?;

    let body = BulkResponse {
        message: format!("Successfully created {} persons", outcome.created_count),
        created_count: outcome.created_count,
        results: None,
    };
    Ok((StatusCode::CREATED, Json(body)))
}

/// `POST /async_create_bulk`
///
/// Always runs under the cooperative strategy and reports every batch.
pub async fn async_create_bulk(
    State(state): State<AppState>,
    payload: Result<Json<AsyncBulkRequest>, JsonRejection>,
) -> Result<Json<BulkResponse>, ApiError> {
    let Json(request) = payload?;
    let outcome = run_bulk(&state, request.count, Some(StrategyKind::Cooperative)).await?;

    Ok(Json(BulkResponse {
        message: format!("Successfully created {} persons", outcome.created_count),
        created_count: outcome.created_count,
        results: Some(outcome.batches),
    }))
}

async fn run_bulk(
    state: &AppState,
    count: i64,
    requested: Option<StrategyKind>,
) -> Result<BulkOutcome, ApiError> {
    let strategy = state.strategy(requested);
    let kind = strategy.kind();
    increment_bulk_requests(kind);

    let start = Instant::now();
    let outcome = state.bulk().create_bulk(count, strategy).await;
    record_bulk_duration(kind, start.elapsed().as_secs_f64() * 1_000.0);

    match outcome {
        Ok(outcome) => {
            increment_persons_created(outcome.created_count as u64);
            Ok(outcome)
        }
        Err(e) => {
            if let Error::Store { committed, .. } = &e {
                increment_persons_created(*committed as u64);
            }
            increment_bulk_errors();
            Err(e.into())
        }
    }
}

/// `GET /fetch_data`
pub async fn fetch_data(State(state): State<AppState>) -> Json<FetchResponse> {
    let targets = state.fetch_targets().to_vec();
    increment_fetch_targets(targets.len() as u64);

    let results = state.fan_out().fetch_all(targets).await;
    let failures = results.iter().filter(|r| !r.outcome.is_success()).count();
    if failures > 0 {
        increment_fetch_failures(failures as u64);
    }

    Json(FetchResponse {
        total: results.len(),
        results,
    })
}

/// `GET /persons`
pub async fn list_persons(State(state): State<AppState>) -> Result<Json<PersonList>, ApiError> {
    let results = with_store(&state, |store| store.list()).await?;
    Ok(Json(PersonList {
        count: results.len(),
        results,
    }))
}

/// `POST /persons`
pub async fn create_person(
    State(state): State<AppState>,
    payload: Result<Json<NewPerson>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(person) = payload?;
    person.validate()?;

    let created = with_store(&state, move |store| store.create(person)).await?;
    tracing::debug!(id = created.id, "Created {created}");
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /persons/{id}`
pub async fn get_person(
    State(state): State<AppState>,
    id: Result<Path<PersonId>, PathRejection>,
) -> Result<Json<Person>, ApiError> {
    let Path(id) = id?;
    Ok(Json(find(&state, id).await?))
}

/// `PUT /persons/{id}`
pub async fn update_person(
    State(state): State<AppState>,
    id: Result<Path<PersonId>, PathRejection>,
    payload: Result<Json<NewPerson>, JsonRejection>,
) -> Result<Json<Person>, ApiError> {
    let Path(id) = id?;
    let Json(person) = payload?;
    person.validate()?;

    let updated = with_store(&state, move |store| store.update(id, person))
        .await?
        .ok_or(Error::NotFound { id })?;
    Ok(Json(updated))
}

/// `DELETE /persons/{id}`
pub async fn delete_person(
    State(state): State<AppState>,
    id: Result<Path<PersonId>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;
    if with_store(&state, move |store| store.delete(id)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound { id }.into())
    }
}

async fn find(state: &AppState, id: PersonId) -> Result<Person, Error> {
    with_store(state, move |store| store.get(id))
        .await?
        .ok_or(Error::NotFound { id })
}

/// Runs a store call on the blocking pool. The store is synchronous and may
/// wait on a lock held by a running bulk batch.
async fn with_store<T, F>(state: &AppState, call: F) -> Result<T, Error>
where
    F: FnOnce(&dyn PersonStore) -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(state.store());
    tokio::task::spawn_blocking(move || call(store.as_ref()))
        .await
        .map_err(|e| Error::worker_unavailable(format!("store call did not complete: {e}")))?
        .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CliArgs, ServerConfig};
    use clap::Parser;
    use core::time::Duration;
    use persons_core::{StoreError, store::MemoryStore};
    use std::sync::{Mutex, mpsc};

    /// Answers `get` only after the test releases it.
    struct GatedStore {
        inner: MemoryStore,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl PersonStore for GatedStore {
        fn create(&self, person: NewPerson) -> StoreResult<Person> {
            self.inner.create(person)
        }

        fn create_many(&self, persons: Vec<NewPerson>) -> StoreResult<usize> {
            self.inner.create_many(persons)
        }

        fn get(&self, id: PersonId) -> StoreResult<Option<Person>> {
            let release = self.release.lock().unwrap();
            release
                .recv_timeout(Duration::from_secs(1))
                .map_err(|_| StoreError::Backend {
                    reason: "never released".to_string(),
                })?;
            self.inner.get(id)
        }

        fn list(&self) -> StoreResult<Vec<Person>> {
            self.inner.list()
        }

        fn update(&self, id: PersonId, person: NewPerson) -> StoreResult<Option<Person>> {
            self.inner.update(id, person)
        }

        fn delete(&self, id: PersonId) -> StoreResult<bool> {
            self.inner.delete(id)
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn store_calls_leave_the_runtime_thread_free() {
        let (release, gate) = mpsc::channel();
        let store = GatedStore {
            inner: MemoryStore::new(),
            release: Mutex::new(gate),
        };
        let created = store.create(NewPerson::new("Dana", 41)).unwrap();

        let args = CliArgs::try_parse_from(["persons-server", "--num-workers", "1"]).unwrap();
        let config = ServerConfig::try_from(args).unwrap();
        let state = AppState::with_store(&config, Arc::new(store)).unwrap();

        // The releasing task shares the only runtime thread with the lookup.
        let (found, ()) = tokio::join!(find(&state, created.id), async {
            tokio::task::yield_now().await;
            release.send(()).unwrap();
        });
        assert_eq!(found.unwrap(), created);
        state.shutdown().await.unwrap();
    }
}
