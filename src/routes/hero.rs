/**
 * Hero Routes
 * Hero banner singleton: public read with fallback copy, admin upsert.
 */
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::db::{self, models::HeroContent};
use crate::realtime::{ChangeEvent, ChangeOp, ContentTable};
use crate::routes::{auth, ErrorResponse};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct HeroUpdateRequest {
    pub title: String,
    pub secondary_title: String,
    pub subtitle: String,
    pub cta_button_text: String,
    pub cta_button_link: String,
}

/// GET /api/hero
/// Returns the hero banner, or built-in fallback copy when the row is
/// missing or no database is configured. Never errors on read.
pub async fn get_hero() -> impl IntoResponse {
    let pool = match db::get_pool() {
        Some(p) => p,
        None => return Json(HeroContent::fallback()),
    };

    match sqlx::query_as::<_, HeroContent>(
        "SELECT id, title, secondary_title, subtitle, cta_button_text, cta_button_link \
         FROM hero_content_dwd2024 WHERE id = 1",
    )
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(hero)) => Json(hero),
        Ok(None) => Json(HeroContent::fallback()),
        Err(e) => {
            tracing::error!("Failed to fetch hero content: {}", e);
            Json(HeroContent::fallback())
        }
    }
}

/// PUT /api/hero
/// Upsert the hero banner at id 1 and broadcast the change.
pub async fn update_hero(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<HeroUpdateRequest>,
) -> Result<Json<HeroContent>, (StatusCode, Json<ErrorResponse>)> {
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

    let hero = sqlx::query_as::<_, HeroContent>(
        r#"
        INSERT INTO hero_content_dwd2024
            (id, title, secondary_title, subtitle, cta_button_text, cta_button_link)
        VALUES (1, $1, $2, $3, $4, $5)
        ON CONFLICT (id) DO UPDATE SET
            title = EXCLUDED.title,
            secondary_title = EXCLUDED.secondary_title,
            subtitle = EXCLUDED.subtitle,
            cta_button_text = EXCLUDED.cta_button_text,
            cta_button_link = EXCLUDED.cta_button_link
        RETURNING id, title, secondary_title, subtitle, cta_button_text, cta_button_link
        "#,
    )
    .bind(&payload.title)
    .bind(&payload.secondary_title)
    .bind(&payload.subtitle)
    .bind(&payload.cta_button_text)
    .bind(&payload.cta_button_link)
    .fetch_one(pool.as_ref())
    .await
    .map_err(|e| {
        tracing::error!("Failed to update hero content: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Failed to update hero content".to_string(),
                message: None,
            }),
        )
    })?;

    state.changes.publish(ChangeEvent {
        table: ContentTable::Hero,
        op: ChangeOp::Update,
        row: serde_json::to_value(&hero).unwrap_or_default(),
    });

    Ok(Json(hero))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn hero_router() -> Router {
        Router::new()
            .route("/api/hero", get(get_hero).put(update_hero))
            .with_state(AppState::new())
    }

    #[tokio::test]
    async fn test_get_hero_without_db_returns_fallback_copy() {
        let res = hero_router()
            .oneshot(Request::get("/api/hero").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let hero: HeroContent = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(hero.title, "Find Your Strength");
        assert_eq!(hero.secondary_title, "Through Change");
    }

    #[tokio::test]
    async fn test_update_hero_without_auth_is_unauthorized() {
        let payload = serde_json::json!({
            "title": "New Title",
            "secondary_title": "x",
            "subtitle": "x",
            "cta_button_text": "x",
            "cta_button_link": "x",
        });
        let res = hero_router()
            .oneshot(
                Request::put("/api/hero")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
