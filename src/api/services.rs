use std::collections::HashMap;
use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::{Stream, StreamExt};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::{
    error::ApiError,
    models::{
        ClearFeedResponse, DeclinedResponse, DownloadAcceptedResponse, DownloadView, FeedQuery,
        HealthResponse, RecordFeedRequest, StartDownloadRequest,
    },
    state::AppState,
    utils::{feed_limit, parse_content_type, validate_body_size},
};
use crate::download::DownloadRequest;
use crate::service::{StartOutcome, TransferDecision};

/// Liveness plus a summary of the download service (GET /health)
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();
    let ledger = match state.store.stats() {
        Ok(_) => "ok".to_string(),
        Err(err) => format!("error: {}", err),
    };
    components.insert("ledger".to_string(), ledger);

    let snapshot = state.service.snapshot();
    Json(HealthResponse {
        status: "ok".to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: state.service.state(),
        active_downloads: snapshot.len(),
        metrics: state.metrics.snapshot(),
    })
}

/// Start a download (POST /downloads)
///
/// 1. Validate the body and parse [`StartDownloadRequest`]
/// 2. Unless the chapter selection is empty, ask the traffic gate; on a metered network without a stored "don't
///    ask again" this answers 409 until the client sends a confirmation
/// 3. Hand the request to the service
///
/// Answers 202 with the request id, 200 `{"declined": true}` when the client
/// declined the transfer, or 204 when the chapter selection was empty.
pub async fn start_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<Response, ApiError> {
    let payload: StartDownloadRequest = read_json(&state, &headers, body).await?;
    let request_id = payload
        .request_id
        .unwrap_or_else(|| state.service.next_request_id());
    let request = DownloadRequest::new(request_id, payload.manga, payload.chapter_ids);

    // An empty selection is dropped by the service and must not touch the
    // traffic preference.
    if !request.is_empty_selection() {
        match state.gate.check(payload.confirmation)? {
            TransferDecision::Proceed => {}
            TransferDecision::ConfirmationRequired => return Err(ApiError::ConfirmationRequired),
            TransferDecision::Declined => {
                debug!(manga_id = request.manga().id, "Transfer declined by client");
                return Ok(Json(DeclinedResponse { declined: true }).into_response());
            }
        }
    }

    match state.service.start(request).await? {
        StartOutcome::Started(request_id) => Ok((
            StatusCode::ACCEPTED,
            Json(DownloadAcceptedResponse { request_id }),
        )
            .into_response()),
        StartOutcome::Rejected => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// Cancel a download (DELETE /downloads/{request_id})
///
/// Unknown ids are not an error; the answer is 204 either way.
pub async fn cancel_download(
    State(state): State<AppState>,
    Path(request_id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let found = state.service.cancel(request_id).await?;
    info!(request_id, found, "Cancel requested over HTTP");
    Ok(StatusCode::NO_CONTENT)
}

/// Active downloads in start order (GET /downloads)
pub async fn list_downloads(State(state): State<AppState>) -> Json<Vec<DownloadView>> {
    Json(DownloadView::from_snapshot(&state.service.snapshot()))
}

/// Active downloads as server-sent events (GET /downloads/watch)
///
/// Sends the current list first, then a new list after every change to the
/// set of active downloads. The client stays bound until it disconnects.
pub async fn watch_downloads(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = state.service.bind().into_downloads().map(|snapshot| {
        let views = DownloadView::from_snapshot(&snapshot);
        Ok(sse_event("downloads", &views))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Finished downloads as server-sent events (GET /downloads/completed)
pub async fn completed_downloads(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = state
        .service
        .completion_stream()
        .filter_map(|msg| async move { msg.ok() })
        .map(|completed| Ok(sse_event("completed", &completed)));

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Notifications currently on display (GET /notifications)
pub async fn notifications(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.board.list())
}

/// Tracking feed, newest first (GET /feed?offset=&limit=)
pub async fn feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state
        .store
        .track_logs(query.offset.unwrap_or(0), feed_limit(query.limit))?;
    let feed: Vec<_> = items.iter().map(|item| item.to_feed_item()).collect();
    Ok(Json(feed))
}

/// Record chapters found for a manga (POST /feed)
pub async fn record_feed(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let payload: RecordFeedRequest = read_json(&state, &headers, body).await?;
    if payload.chapters.is_empty() {
        return Err(ApiError::InvalidPayload("chapters must not be empty".into()));
    }
    // Logs store chapters newline-joined; such names would not read back.
    if let Some(name) = payload
        .chapters
        .iter()
        .find(|name| name.is_empty() || name.contains('\n'))
    {
        return Err(ApiError::InvalidPayload(format!(
            "chapter name must be non-empty and single-line: {:?}",
            name
        )));
    }

    state.store.upsert_manga(&payload.manga)?;
    let log = state.store.record_track_log(payload.manga.id, &payload.chapters)?;
    Ok((StatusCode::CREATED, Json(log)))
}

/// Drop every tracking log (DELETE /feed)
pub async fn clear_feed(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let removed = state.store.clear_track_logs()?;
    info!(removed, "Tracking feed cleared");
    Ok(Json(ClearFeedResponse { removed }))
}

fn sse_event<T: serde::Serialize>(name: &str, value: &T) -> Event {
    let data = serde_json::to_string(value).unwrap_or_else(|err| {
        warn!(event = name, error = %err, "Failed to serialize SSE payload");
        "{}".to_string()
    });
    Event::default().event(name).data(data)
}

/// Checks the Content-Type, reads the body within the configured limit and
/// decodes it.
///
/// Decompression is handled by `RequestDecompressionLayer`, so this sees
/// the decoded bytes.
async fn read_json<T: DeserializeOwned>(
    state: &AppState,
    headers: &HeaderMap,
    body: axum::body::Body,
) -> Result<T, ApiError> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    parse_content_type(content_type)?;

    let data = body
        .collect()
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?
        .to_bytes();
    validate_body_size(&data, state.config.server.max_payload_bytes.as_u64() as usize)?;

    Ok(serde_json::from_slice(&data)?)
}
