/**
 * Privacy Policy Routes
 * Singleton rich-text policy. Markup is sanitized on write because the
 * public page renders it unescaped.
 */
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::db::{self, models::PrivacyPolicy};
use crate::realtime::{ChangeEvent, ChangeOp, ContentTable};
use crate::routes::{auth, ErrorResponse};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PolicyUpdateRequest {
    pub content: String,
}

/// Strip scripts, event handlers and other active content; keep the basic
/// formatting tags the policy editor produces.
pub(crate) fn sanitize_policy_markup(raw: &str) -> String {
    ammonia::Builder::default()
        .add_generic_attributes(&["class"])
        .clean(raw)
        .to_string()
}

/// GET /api/privacy
pub async fn get_policy() -> impl IntoResponse {
    let pool = match db::get_pool() {
        Some(p) => p,
        None => return Json(PrivacyPolicy::fallback()),
    };

    match sqlx::query_as::<_, PrivacyPolicy>(
        "SELECT id, content FROM privacy_policy_dwd2024 WHERE id = 1",
    )
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(policy)) => Json(policy),
        Ok(None) => Json(PrivacyPolicy::fallback()),
        Err(e) => {
            tracing::error!("Failed to fetch privacy policy: {}", e);
            Json(PrivacyPolicy::fallback())
        }
    }
}

/// PUT /api/privacy
pub async fn update_policy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PolicyUpdateRequest>,
) -> Result<Json<PrivacyPolicy>, (StatusCode, Json<ErrorResponse>)> {
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

    let cleaned = sanitize_policy_markup(&payload.content);

    let policy = sqlx::query_as::<_, PrivacyPolicy>(
        r#"
        INSERT INTO privacy_policy_dwd2024 (id, content)
        VALUES (1, $1)
        ON CONFLICT (id) DO UPDATE SET content = EXCLUDED.content
        RETURNING id, content
        "#,
    )
    .bind(&cleaned)
    .fetch_one(pool.as_ref())
    .await
    .map_err(|e| {
        tracing::error!("Failed to update privacy policy: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Failed to update privacy policy".to_string(),
                message: None,
            }),
        )
    })?;

    state.changes.publish(ChangeEvent {
        table: ContentTable::PrivacyPolicy,
        op: ChangeOp::Update,
        row: serde_json::to_value(&policy).unwrap_or_default(),
    });

    Ok(Json(policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    #[test]
    fn test_sanitize_strips_script_tags() {
        let cleaned = sanitize_policy_markup("<p>Hello</p><script>alert(1)</script>");
        assert_eq!(cleaned, "<p>Hello</p>");
    }

    #[test]
    fn test_sanitize_strips_event_handlers_keeps_formatting() {
        let cleaned = sanitize_policy_markup("<h2 onclick=\"x()\">Data</h2><em>kept</em>");
        assert!(cleaned.contains("<h2>Data</h2>"));
        assert!(cleaned.contains("<em>kept</em>"));
        assert!(!cleaned.contains("onclick"));
    }

    #[tokio::test]
    async fn test_get_policy_without_db_returns_empty_content() {
        let app = Router::new()
            .route("/api/privacy", get(get_policy).put(update_policy))
            .with_state(AppState::new());
        let res = app
            .oneshot(Request::get("/api/privacy").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let policy: PrivacyPolicy = serde_json::from_slice(&bytes).unwrap();
        assert!(policy.content.is_empty());
    }
}
