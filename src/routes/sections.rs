/**
 * Section Content Routes
 * Keyed text blocks for the homepage support section. Reads return a
 * key -> content map; writes upsert a batch of keys in one transaction.
 */
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::db::{self, models::SectionContent};
use crate::realtime::{ChangeEvent, ChangeOp, ContentTable};
use crate::routes::{auth, ErrorResponse};
use crate::AppState;

lazy_static::lazy_static! {
    /// Section keys are slug-shaped: lowercase alphanumerics, '_' and '-'.
    static ref SECTION_KEY_RE: regex::Regex =
        regex::Regex::new(r"^[a-z0-9][a-z0-9_-]{0,63}$").unwrap();
}

#[derive(Debug, Deserialize)]
pub struct SectionsQuery {
    /// Optional comma-separated key filter, e.g. ?keys=support_heading,support_body
    pub keys: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SectionsUpdateRequest {
    /// Keys to upsert mapped to their new content.
    pub sections: BTreeMap<String, String>,
}

fn bad_request(error: &str, message: Option<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: error.to_string(),
            message,
        }),
    )
}

/// GET /api/sections
/// Returns all section blocks (or only the requested keys) as a map.
/// Missing keys are simply absent; the page falls back per key.
pub async fn get_sections(Query(query): Query<SectionsQuery>) -> impl IntoResponse {
    let requested: Option<Vec<String>> = query.keys.map(|s| {
        s.split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect()
    });

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return Json(BTreeMap::<String, String>::new()),
    };

    let rows = match &requested {
        Some(keys) => {
            sqlx::query_as::<_, SectionContent>(
                "SELECT key, content FROM section_content_dwd2024 WHERE key = ANY($1)",
            )
            .bind(keys)
            .fetch_all(pool.as_ref())
            .await
        }
        None => {
            sqlx::query_as::<_, SectionContent>(
                "SELECT key, content FROM section_content_dwd2024 ORDER BY key",
            )
            .fetch_all(pool.as_ref())
            .await
        }
    };

    match rows {
        Ok(rows) => Json(
            rows.into_iter()
                .map(|row| (row.key, row.content))
                .collect::<BTreeMap<String, String>>(),
        ),
        Err(e) => {
            tracing::error!("Failed to fetch section content: {}", e);
            Json(BTreeMap::new())
        }
    }
}

/// PUT /api/sections
/// Upsert a batch of section blocks atomically. Either every key is
/// written or none is, and one change event is published per key.
pub async fn update_sections(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SectionsUpdateRequest>,
) -> Result<Json<BTreeMap<String, String>>, (StatusCode, Json<ErrorResponse>)> {
    auth::require_admin(&headers)?;

    if payload.sections.is_empty() {
        return Err(bad_request("No sections provided", None));
    }

    for key in payload.sections.keys() {
        if !SECTION_KEY_RE.is_match(key) {
            return Err(bad_request(
                "Invalid section key",
                Some(format!(
                    "'{}' must be a lowercase slug of at most 64 characters",
                    key
                )),
            ));
        }
    }

    let pool = db::get_pool().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "Database not available".to_string(),
                message: None,
            }),
        )
    })?;

    let internal_error = |e: sqlx::Error| {
        tracing::error!("Failed to update section content: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Failed to update section content".to_string(),
                message: None,
            }),
        )
    };

    let mut tx = pool.begin().await.map_err(internal_error)?;
    for (key, content) in &payload.sections {
        sqlx::query(
            r#"
            INSERT INTO section_content_dwd2024 (key, content)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET content = EXCLUDED.content
            "#,
        )
        .bind(key)
        .bind(content)
        .execute(&mut *tx)
        .await
        .map_err(internal_error)?;
    }
    tx.commit().await.map_err(internal_error)?;

    for (key, content) in &payload.sections {
        state.changes.publish(ChangeEvent {
            table: ContentTable::Sections,
            op: ChangeOp::Update,
            row: serde_json::json!({ "key": key, "content": content }),
        });
    }

    Ok(Json(payload.sections))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn sections_router() -> Router {
        Router::new()
            .route("/api/sections", get(get_sections).put(update_sections))
            .with_state(AppState::new())
    }

    #[test]
    fn test_section_key_regex_accepts_slugs() {
        assert!(SECTION_KEY_RE.is_match("support_heading"));
        assert!(SECTION_KEY_RE.is_match("block-2"));
        assert!(!SECTION_KEY_RE.is_match("Support Heading"));
        assert!(!SECTION_KEY_RE.is_match(""));
        assert!(!SECTION_KEY_RE.is_match("_leading"));
    }

    #[tokio::test]
    async fn test_get_sections_without_db_returns_empty_map() {
        let res = sections_router()
            .oneshot(Request::get("/api/sections").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let map: BTreeMap<String, String> = serde_json::from_slice(&bytes).unwrap();
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn test_update_sections_without_auth_is_unauthorized() {
        let payload = serde_json::json!({ "sections": { "support_heading": "text" } });
        let res = sections_router()
            .oneshot(
                Request::put("/api/sections")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
