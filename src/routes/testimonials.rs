/**
 * Testimonial Routes
 * Client testimonials, listed newest first. No manual reordering.
 */
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;

use crate::db::{self, models::Testimonial};
use crate::realtime::{ChangeEvent, ChangeOp, ContentTable};
use crate::routes::{auth, ErrorResponse, SuccessResponse};
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

fn internal(context: &'static str) -> impl Fn(sqlx::Error) -> RouteError {
    move |e| {
        tracing::error!("{}: {}", context, e);
        error(StatusCode::INTERNAL_SERVER_ERROR, context)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTestimonialRequest {
    pub name: String,
    pub text: String,
    #[serde(default)]
    pub photo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTestimonialRequest {
    pub name: Option<String>,
    pub text: Option<String>,
    pub photo_url: Option<String>,
}

/// GET /api/testimonials
pub async fn list_testimonials() -> Result<Json<Vec<Testimonial>>, RouteError> {
    let pool = match db::get_pool() {
        Some(p) => p,
        None => return Ok(Json(Vec::new())),
    };

    let testimonials = sqlx::query_as::<_, Testimonial>(
        "SELECT id, name, text, photo_url, created_at \
         FROM testimonials_dwd2024 ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(pool.as_ref())
    .await
    .map_err(internal("Failed to fetch testimonials"))?;

    Ok(Json(testimonials))
}

/// POST /api/testimonials
pub async fn create_testimonial(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateTestimonialRequest>,
) -> Result<(StatusCode, Json<Testimonial>), RouteError> {
    auth::require_admin(&headers)?;

    if payload.name.trim().is_empty() || payload.text.trim().is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "Name and text are required"));
    }

    let pool = db::get_pool().ok_or_else(|| {
        error(StatusCode::SERVICE_UNAVAILABLE, "Database not available")
    })?;

    let testimonial = sqlx::query_as::<_, Testimonial>(
        r#"
        INSERT INTO testimonials_dwd2024 (name, text, photo_url, created_at)
        VALUES ($1, $2, $3, now())
        RETURNING id, name, text, photo_url, created_at
        "#,
    )
    .bind(&payload.name)
    .bind(&payload.text)
    .bind(&payload.photo_url)
    .fetch_one(pool.as_ref())
    .await
    .map_err(internal("Failed to create testimonial"))?;

    state.changes.publish(ChangeEvent {
        table: ContentTable::Testimonials,
        op: ChangeOp::Insert,
        row: serde_json::to_value(&testimonial).unwrap_or_default(),
    });

    Ok((StatusCode::CREATED, Json(testimonial)))
}

/// PATCH /api/testimonials/{id}
pub async fn update_testimonial(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(payload): Json<UpdateTestimonialRequest>,
) -> Result<Json<Testimonial>, RouteError> {
    auth::require_admin(&headers)?;

    let pool = db::get_pool().ok_or_else(|| {
        error(StatusCode::SERVICE_UNAVAILABLE, "Database not available")
    })?;

    let testimonial = sqlx::query_as::<_, Testimonial>(
        r#"
        UPDATE testimonials_dwd2024 SET
            name = COALESCE($2, name),
            text = COALESCE($3, text),
            photo_url = COALESCE($4, photo_url)
        WHERE id = $1
        RETURNING id, name, text, photo_url, created_at
        "#,
    )
    .bind(id)
    .bind(&payload.name)
    .bind(&payload.text)
    .bind(&payload.photo_url)
    .fetch_optional(pool.as_ref())
    .await
    .map_err(internal("Failed to update testimonial"))?
    .ok_or_else(|| error(StatusCode::NOT_FOUND, "Testimonial not found"))?;

    state.changes.publish(ChangeEvent {
        table: ContentTable::Testimonials,
        op: ChangeOp::Update,
        row: serde_json::to_value(&testimonial).unwrap_or_default(),
    });

    Ok(Json(testimonial))
}

/// DELETE /api/testimonials/{id}
pub async fn delete_testimonial(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, RouteError> {
    auth::require_admin(&headers)?;

    let pool = db::get_pool().ok_or_else(|| {
        error(StatusCode::SERVICE_UNAVAILABLE, "Database not available")
    })?;

    let result = sqlx::query("DELETE FROM testimonials_dwd2024 WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await
        .map_err(internal("Failed to delete testimonial"))?;

    if result.rows_affected() == 0 {
        return Err(error(StatusCode::NOT_FOUND, "Testimonial not found"));
    }

    state.changes.publish(ChangeEvent {
        table: ContentTable::Testimonials,
        op: ChangeOp::Delete,
        row: serde_json::json!({ "id": id }),
    });

    Ok(Json(SuccessResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn testimonials_router() -> Router {
        Router::new()
            .route(
                "/api/testimonials",
                get(list_testimonials).post(create_testimonial),
            )
            .route(
                "/api/testimonials/{id}",
                axum::routing::patch(update_testimonial).delete(delete_testimonial),
            )
            .with_state(AppState::new())
    }

    #[tokio::test]
    async fn test_list_without_db_returns_empty_list() {
        let res = testimonials_router()
            .oneshot(
                Request::get("/api/testimonials")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let testimonials: Vec<Testimonial> = serde_json::from_slice(&bytes).unwrap();
        assert!(testimonials.is_empty());
    }

    #[tokio::test]
    async fn test_create_without_auth_is_unauthorized() {
        let payload = serde_json::json!({ "name": "Sarah M.", "text": "Life changing." });
        let res = testimonials_router()
            .oneshot(
                Request::post("/api/testimonials")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_delete_without_auth_is_unauthorized() {
        let res = testimonials_router()
            .oneshot(
                Request::delete("/api/testimonials/1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
