/**
 * FAQ Routes
 * CRUD for the FAQ collection with manual reordering, mirroring the
 * services collection minus visibility.
 */
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;

use crate::db::{self, models::Faq};
use crate::realtime::{ChangeEvent, ChangeOp, ContentTable};
use crate::routes::{auth, plan_neighbor_swap, ErrorResponse, MoveDirection, SuccessResponse};
use crate::AppState;

type RouteError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, error: &str) -> RouteError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: None,
        }),
    )
}

fn db_unavailable() -> RouteError {
    error(StatusCode::SERVICE_UNAVAILABLE, "Database not available")
}

fn internal(context: &'static str) -> impl Fn(sqlx::Error) -> RouteError {
    move |e| {
        tracing::error!("{}: {}", context, e);
        error(StatusCode::INTERNAL_SERVER_ERROR, context)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateFaqRequest {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFaqRequest {
    pub question: Option<String>,
    pub answer: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MoveFaqRequest {
    pub direction: MoveDirection,
}

/// GET /api/faqs
pub async fn list_faqs() -> Result<Json<Vec<Faq>>, RouteError> {
    let pool = match db::get_pool() {
        Some(p) => p,
        None => return Ok(Json(Vec::new())),
    };

    let faqs = sqlx::query_as::<_, Faq>(
        "SELECT id, question, answer, order_num FROM faqs_dwd2024 ORDER BY order_num ASC, id ASC",
    )
    .fetch_all(pool.as_ref())
    .await
    .map_err(internal("Failed to fetch FAQs"))?;

    Ok(Json(faqs))
}

/// POST /api/faqs
/// Create a FAQ at the end of the display order.
pub async fn create_faq(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateFaqRequest>,
) -> Result<(StatusCode, Json<Faq>), RouteError> {
    auth::require_admin(&headers)?;

    if payload.question.trim().is_empty() || payload.answer.trim().is_empty() {
        return Err(error(
            StatusCode::BAD_REQUEST,
            "Question and answer are required",
        ));
    }

    let pool = db::get_pool().ok_or_else(db_unavailable)?;

    let faq = sqlx::query_as::<_, Faq>(
        r#"
        INSERT INTO faqs_dwd2024 (question, answer, order_num)
        SELECT $1, $2, COALESCE(MAX(order_num) + 1, 0)
        FROM faqs_dwd2024
        RETURNING id, question, answer, order_num
        "#,
    )
    .bind(&payload.question)
    .bind(&payload.answer)
    .fetch_one(pool.as_ref())
    .await
    .map_err(internal("Failed to create FAQ"))?;

    state.changes.publish(ChangeEvent {
        table: ContentTable::Faqs,
        op: ChangeOp::Insert,
        row: serde_json::to_value(&faq).unwrap_or_default(),
    });

    Ok((StatusCode::CREATED, Json(faq)))
}

/// PATCH /api/faqs/{id}
pub async fn update_faq(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(payload): Json<UpdateFaqRequest>,
) -> Result<Json<Faq>, RouteError> {
    auth::require_admin(&headers)?;
    let pool = db::get_pool().ok_or_else(db_unavailable)?;

    let faq = sqlx::query_as::<_, Faq>(
        r#"
        UPDATE faqs_dwd2024 SET
            question = COALESCE($2, question),
            answer = COALESCE($3, answer)
        WHERE id = $1
        RETURNING id, question, answer, order_num
        "#,
    )
    .bind(id)
    .bind(&payload.question)
    .bind(&payload.answer)
    .fetch_optional(pool.as_ref())
    .await
    .map_err(internal("Failed to update FAQ"))?
    .ok_or_else(|| error(StatusCode::NOT_FOUND, "FAQ not found"))?;

    state.changes.publish(ChangeEvent {
        table: ContentTable::Faqs,
        op: ChangeOp::Update,
        row: serde_json::to_value(&faq).unwrap_or_default(),
    });

    Ok(Json(faq))
}

/// DELETE /api/faqs/{id}
pub async fn delete_faq(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, RouteError> {
    auth::require_admin(&headers)?;
    let pool = db::get_pool().ok_or_else(db_unavailable)?;

    let result = sqlx::query("DELETE FROM faqs_dwd2024 WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await
        .map_err(internal("Failed to delete FAQ"))?;

    if result.rows_affected() == 0 {
        return Err(error(StatusCode::NOT_FOUND, "FAQ not found"));
    }

    state.changes.publish(ChangeEvent {
        table: ContentTable::Faqs,
        op: ChangeOp::Delete,
        row: serde_json::json!({ "id": id }),
    });

    Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/faqs/{id}/move
/// Swap with the neighbour in the requested direction; boundary moves
/// are silent no-ops.
pub async fn move_faq(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(payload): Json<MoveFaqRequest>,
) -> Result<Json<SuccessResponse>, RouteError> {
    auth::require_admin(&headers)?;
    let pool = db::get_pool().ok_or_else(db_unavailable)?;

    let rows: Vec<(i64, i32)> =
        sqlx::query_as("SELECT id, order_num FROM faqs_dwd2024 ORDER BY order_num ASC, id ASC")
            .fetch_all(pool.as_ref())
            .await
            .map_err(internal("Failed to fetch FAQ order"))?;

    let Some((first, second)) = plan_neighbor_swap(&rows, id, payload.direction) else {
        return Ok(Json(SuccessResponse { success: true }));
    };

    let mut tx = pool
        .begin()
        .await
        .map_err(internal("Failed to reorder FAQs"))?;
    for (row_id, order_num) in [first, second] {
        sqlx::query("UPDATE faqs_dwd2024 SET order_num = $2 WHERE id = $1")
            .bind(row_id)
            .bind(order_num)
            .execute(&mut *tx)
            .await
            .map_err(internal("Failed to reorder FAQs"))?;
    }
    tx.commit()
        .await
        .map_err(internal("Failed to reorder FAQs"))?;

    for (row_id, order_num) in [first, second] {
        state.changes.publish(ChangeEvent {
            table: ContentTable::Faqs,
            op: ChangeOp::Update,
            row: serde_json::json!({ "id": row_id, "order_num": order_num }),
        });
    }

    Ok(Json(SuccessResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, post};
    use axum::Router;
    use tower::ServiceExt;

    fn faqs_router() -> Router {
        Router::new()
            .route("/api/faqs", get(list_faqs).post(create_faq))
            .route(
                "/api/faqs/{id}",
                axum::routing::patch(update_faq).delete(delete_faq),
            )
            .route("/api/faqs/{id}/move", post(move_faq))
            .with_state(AppState::new())
    }

    #[tokio::test]
    async fn test_list_without_db_returns_empty_list() {
        let res = faqs_router()
            .oneshot(Request::get("/api/faqs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let faqs: Vec<Faq> = serde_json::from_slice(&bytes).unwrap();
        assert!(faqs.is_empty());
    }

    #[tokio::test]
    async fn test_create_without_auth_is_unauthorized() {
        let payload =
            serde_json::json!({ "question": "How long is a session?", "answer": "60 minutes." });
        let res = faqs_router()
            .oneshot(
                Request::post("/api/faqs")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_move_with_invalid_direction_is_unprocessable() {
        let payload = serde_json::json!({ "direction": "sideways" });
        let res = faqs_router()
            .oneshot(
                Request::post("/api/faqs/1/move")
                    .header("content-type", "application/json")
                    .header("authorization", "Bearer not-a-real-token")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        // Body deserialization runs before the handler; an unknown direction
        // never reaches the auth check.
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
