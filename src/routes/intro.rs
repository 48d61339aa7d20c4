/**
 * Intro Routes
 * "Meet Katie" intro singleton: public read with fallback, admin upsert.
 */
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::db::{self, models::IntroContent};
use crate::realtime::{ChangeEvent, ChangeOp, ContentTable};
use crate::routes::{auth, ErrorResponse};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct IntroUpdateRequest {
    pub heading: String,
    pub body: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// GET /api/intro
pub async fn get_intro() -> impl IntoResponse {
    let pool = match db::get_pool() {
        Some(p) => p,
        None => return Json(IntroContent::fallback()),
    };

    match sqlx::query_as::<_, IntroContent>(
        "SELECT id, heading, body, image_url FROM intro_content_dwd2024 WHERE id = 1",
    )
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(intro)) => Json(intro),
        Ok(None) => Json(IntroContent::fallback()),
        Err(e) => {
            tracing::error!("Failed to fetch intro content: {}", e);
            Json(IntroContent::fallback())
        }
    }
}

/// PUT /api/intro
pub async fn update_intro(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<IntroUpdateRequest>,
) -> Result<Json<IntroContent>, (StatusCode, Json<ErrorResponse>)> {
    auth::require_admin(&headers)?;

    let pool = db::get_pool().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "Database not available".to_string(),
                message: None,
            }),
        )
    })?;

    let intro = sqlx::query_as::<_, IntroContent>(
        r#"
        INSERT INTO intro_content_dwd2024 (id, heading, body, image_url)
        VALUES (1, $1, $2, $3)
        ON CONFLICT (id) DO UPDATE SET
            heading = EXCLUDED.heading,
            body = EXCLUDED.body,
            image_url = EXCLUDED.image_url
        RETURNING id, heading, body, image_url
        "#,
    )
    .bind(&payload.heading)
    .bind(&payload.body)
    .bind(&payload.image_url)
    .fetch_one(pool.as_ref())
    .await
    .map_err(|e| {
        tracing::error!("Failed to update intro content: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Failed to update intro content".to_string(),
                message: None,
            }),
        )
    })?;

    state.changes.publish(ChangeEvent {
        table: ContentTable::Intro,
        op: ChangeOp::Update,
        row: serde_json::to_value(&intro).unwrap_or_default(),
    });

    Ok(Json(intro))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn intro_router() -> Router {
        Router::new()
            .route("/api/intro", get(get_intro).put(update_intro))
            .with_state(AppState::new())
    }

    #[tokio::test]
    async fn test_get_intro_without_db_returns_fallback() {
        let res = intro_router()
            .oneshot(Request::get("/api/intro").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let intro: IntroContent = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(intro.heading, "Meet Katie");
        assert!(intro.image_url.is_none());
    }

    #[tokio::test]
    async fn test_update_intro_without_auth_is_unauthorized() {
        let payload = serde_json::json!({ "heading": "h", "body": "b" });
        let res = intro_router()
            .oneshot(
                Request::put("/api/intro")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
