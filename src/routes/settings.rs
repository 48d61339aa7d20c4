/**
 * Settings Routes
 * Footer, login-redirect and booking-calendar singletons. Reads are public
 * and fall back to defaults; writes are admin-gated upserts at id 1.
 */
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::db::{
    self,
    models::{CalendarSettings, FooterSettings, LoginSettings},
};
use crate::realtime::{ChangeEvent, ChangeOp, ContentTable};
use crate::routes::{auth, ErrorResponse};
use crate::AppState;

fn db_unavailable() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse {
            error: "Database not available".to_string(),
            message: None,
        }),
    )
}

fn write_failed(what: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: format!("Failed to update {}", what),
            message: None,
        }),
    )
}

// ============================================================================
// Footer
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct FooterUpdateRequest {
    pub email: String,
    pub whatsapp_link: String,
    pub copyright_year: i32,
}

/// GET /api/settings/footer
pub async fn get_footer() -> impl IntoResponse {
    let pool = match db::get_pool() {
        Some(p) => p,
        None => return Json(FooterSettings::fallback()),
    };

    match sqlx::query_as::<_, FooterSettings>(
        "SELECT id, email, whatsapp_link, copyright_year FROM footer_settings_dwd2024 WHERE id = 1",
    )
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(footer)) => Json(footer),
        Ok(None) => Json(FooterSettings::fallback()),
        Err(e) => {
            tracing::error!("Failed to fetch footer settings: {}", e);
            Json(FooterSettings::fallback())
        }
    }
}

/// PUT /api/settings/footer
pub async fn update_footer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<FooterUpdateRequest>,
) -> Result<Json<FooterSettings>, (StatusCode, Json<ErrorResponse>)> {
    auth::require_admin(&headers)?;
    let pool = db::get_pool().ok_or_else(db_unavailable)?;

    let footer = sqlx::query_as::<_, FooterSettings>(
        r#"
        INSERT INTO footer_settings_dwd2024 (id, email, whatsapp_link, copyright_year)
        VALUES (1, $1, $2, $3)
        ON CONFLICT (id) DO UPDATE SET
            email = EXCLUDED.email,
            whatsapp_link = EXCLUDED.whatsapp_link,
            copyright_year = EXCLUDED.copyright_year
        RETURNING id, email, whatsapp_link, copyright_year
        "#,
    )
    .bind(&payload.email)
    .bind(&payload.whatsapp_link)
    .bind(payload.copyright_year)
    .fetch_one(pool.as_ref())
    .await
    .map_err(|e| {
        tracing::error!("Failed to update footer settings: {}", e);
        write_failed("footer settings")
    })?;

    state.changes.publish(ChangeEvent {
        table: ContentTable::FooterSettings,
        op: ChangeOp::Update,
        row: serde_json::to_value(&footer).unwrap_or_default(),
    });

    Ok(Json(footer))
}

// ============================================================================
// Login redirect
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginSettingsUpdateRequest {
    pub redirect_url: String,
}

/// GET /api/settings/login
pub async fn get_login() -> impl IntoResponse {
    let pool = match db::get_pool() {
        Some(p) => p,
        None => return Json(LoginSettings::fallback()),
    };

    match sqlx::query_as::<_, LoginSettings>(
        "SELECT id, redirect_url FROM login_settings_dwd2024 WHERE id = 1",
    )
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(settings)) => Json(settings),
        Ok(None) => Json(LoginSettings::fallback()),
        Err(e) => {
            tracing::error!("Failed to fetch login settings: {}", e);
            Json(LoginSettings::fallback())
        }
    }
}

/// PUT /api/settings/login
pub async fn update_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginSettingsUpdateRequest>,
) -> Result<Json<LoginSettings>, (StatusCode, Json<ErrorResponse>)> {
    auth::require_admin(&headers)?;
    let pool = db::get_pool().ok_or_else(db_unavailable)?;

    let settings = sqlx::query_as::<_, LoginSettings>(
        r#"
        INSERT INTO login_settings_dwd2024 (id, redirect_url)
        VALUES (1, $1)
        ON CONFLICT (id) DO UPDATE SET redirect_url = EXCLUDED.redirect_url
        RETURNING id, redirect_url
        "#,
    )
    .bind(&payload.redirect_url)
    .fetch_one(pool.as_ref())
    .await
    .map_err(|e| {
        tracing::error!("Failed to update login settings: {}", e);
        write_failed("login settings")
    })?;

    state.changes.publish(ChangeEvent {
        table: ContentTable::LoginSettings,
        op: ChangeOp::Update,
        row: serde_json::to_value(&settings).unwrap_or_default(),
    });

    Ok(Json(settings))
}

// ============================================================================
// Booking calendar
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CalendarUpdateRequest {
    pub booking_url: String,
}

/// GET /api/settings/calendar
pub async fn get_calendar() -> impl IntoResponse {
    let pool = match db::get_pool() {
        Some(p) => p,
        None => return Json(CalendarSettings::fallback()),
    };

    match sqlx::query_as::<_, CalendarSettings>(
        "SELECT id, booking_url FROM calendar_settings_dwd2024 WHERE id = 1",
    )
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(settings)) => Json(settings),
        Ok(None) => Json(CalendarSettings::fallback()),
        Err(e) => {
            tracing::error!("Failed to fetch calendar settings: {}", e);
            Json(CalendarSettings::fallback())
        }
    }
}

/// PUT /api/settings/calendar
pub async fn update_calendar(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CalendarUpdateRequest>,
) -> Result<Json<CalendarSettings>, (StatusCode, Json<ErrorResponse>)> {
    auth::require_admin(&headers)?;
    let pool = db::get_pool().ok_or_else(db_unavailable)?;

    let settings = sqlx::query_as::<_, CalendarSettings>(
        r#"
        INSERT INTO calendar_settings_dwd2024 (id, booking_url)
        VALUES (1, $1)
        ON CONFLICT (id) DO UPDATE SET booking_url = EXCLUDED.booking_url
        RETURNING id, booking_url
        "#,
    )
    .bind(&payload.booking_url)
    .fetch_one(pool.as_ref())
    .await
    .map_err(|e| {
        tracing::error!("Failed to update calendar settings: {}", e);
        write_failed("calendar settings")
    })?;

    state.changes.publish(ChangeEvent {
        table: ContentTable::CalendarSettings,
        op: ChangeOp::Update,
        row: serde_json::to_value(&settings).unwrap_or_default(),
    });

    Ok(Json(settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn settings_router() -> Router {
        Router::new()
            .route("/api/settings/footer", get(get_footer).put(update_footer))
            .route("/api/settings/login", get(get_login).put(update_login))
            .route(
                "/api/settings/calendar",
                get(get_calendar).put(update_calendar),
            )
            .with_state(AppState::new())
    }

    #[tokio::test]
    async fn test_get_calendar_without_db_returns_default_booking_url() {
        let res = settings_router()
            .oneshot(
                Request::get("/api/settings/calendar")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let settings: CalendarSettings = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(settings.booking_url, "https://tidycal.com/dwd/clarity-call");
    }

    #[tokio::test]
    async fn test_get_login_without_db_returns_default_redirect() {
        let res = settings_router()
            .oneshot(
                Request::get("/api/settings/login")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let settings: LoginSettings = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(settings.redirect_url, "https://app.divorcewithdirection.com");
    }

    #[tokio::test]
    async fn test_update_footer_without_auth_is_unauthorized() {
        let payload = serde_json::json!({
            "email": "hello@example.com",
            "whatsapp_link": "https://wa.me/123",
            "copyright_year": 2025,
        });
        let res = settings_router()
            .oneshot(
                Request::put("/api/settings/footer")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
