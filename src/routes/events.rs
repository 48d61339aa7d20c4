/**
 * Live Content Events Route
 * Server-sent events stream of content changes. The stream owns its
 * broadcaster subscription, so a client disconnect drops the handle and
 * unregisters the subscriber with no bookkeeping in the handler.
 */
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, KeepAliveStream, Sse},
    Json,
};
use futures::Stream;
use serde::Deserialize;
use std::collections::HashSet;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::realtime::{ContentTable, SubscriptionHandle};
use crate::routes::ErrorResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Optional comma-separated table filter, e.g. ?tables=services,faqs.
    /// Absent means every content table.
    pub tables: Option<String>,
}

/// Adapts a subscription into an SSE event stream. Ending the stream (or
/// the client hanging up) drops the handle, which unsubscribes.
pub struct ChangeEventStream {
    handle: SubscriptionHandle,
}

impl Stream for ChangeEventStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.get_mut().handle.poll_recv(cx) {
            Poll::Ready(Some(change)) => {
                let event = Event::default()
                    .event("change")
                    .json_data(&change)
                    .unwrap_or_else(|e| {
                        tracing::error!("Failed to serialize change event: {}", e);
                        Event::default().comment("unserializable event")
                    });
                Poll::Ready(Some(Ok(event)))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

fn parse_table_filter(
    raw: Option<&str>,
) -> Result<Option<HashSet<ContentTable>>, String> {
    let Some(raw) = raw else {
        return Ok(None);
    };

    let mut tables = HashSet::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match ContentTable::parse(name) {
            Some(table) => {
                tables.insert(table);
            }
            None => return Err(name.to_string()),
        }
    }

    if tables.is_empty() {
        Ok(None)
    } else {
        Ok(Some(tables))
    }
}

/// GET /api/events
pub async fn content_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<KeepAliveStream<ChangeEventStream>>, (StatusCode, Json<ErrorResponse>)> {
    let tables = parse_table_filter(query.tables.as_deref()).map_err(|unknown| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Unknown table".to_string(),
                message: Some(format!("'{}' is not a watchable table", unknown)),
            }),
        )
    })?;

    let handle = state.changes.subscribe(tables);
    tracing::debug!(
        subscribers = state.changes.subscriber_count(),
        "live events client connected"
    );

    Ok(Sse::new(ChangeEventStream { handle })
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::{ChangeEvent, ChangeOp};
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use futures::StreamExt;
    use tower::ServiceExt;

    fn events_router(state: AppState) -> Router {
        Router::new()
            .route("/api/events", get(content_events))
            .with_state(state)
    }

    #[test]
    fn test_parse_filter_accepts_aliases_and_table_names() {
        let filter = parse_table_filter(Some("services,faqs_dwd2024")).unwrap().unwrap();
        assert!(filter.contains(&ContentTable::Services));
        assert!(filter.contains(&ContentTable::Faqs));
    }

    #[test]
    fn test_parse_filter_rejects_unknown_table() {
        assert_eq!(parse_table_filter(Some("nope")), Err("nope".to_string()));
    }

    #[test]
    fn test_parse_filter_empty_means_all_tables() {
        assert_eq!(parse_table_filter(None), Ok(None));
        assert_eq!(parse_table_filter(Some(" , ")), Ok(None));
    }

    #[tokio::test]
    async fn test_unknown_table_returns_bad_request() {
        let res = events_router(AppState::new())
            .oneshot(
                Request::get("/api/events?tables=unknown")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stream_yields_published_change() {
        let state = AppState::new();
        let handle = state
            .changes
            .subscribe(Some([ContentTable::Hero].into_iter().collect()));
        let mut stream = ChangeEventStream { handle };

        state.changes.publish(ChangeEvent {
            table: ContentTable::Hero,
            op: ChangeOp::Update,
            row: serde_json::json!({ "id": 1 }),
        });

        let event = stream.next().await.expect("stream should yield").unwrap();
        // The SSE wire format carries the table name in the data payload.
        let rendered = format!("{:?}", event);
        assert!(rendered.contains("hero_content_dwd2024"));
    }

    #[tokio::test]
    async fn test_dropping_stream_unsubscribes() {
        let state = AppState::new();
        let stream = ChangeEventStream {
            handle: state.changes.subscribe(None),
        };
        assert_eq!(state.changes.subscriber_count(), 1);

        drop(stream);
        assert_eq!(state.changes.subscriber_count(), 0);
    }
}
