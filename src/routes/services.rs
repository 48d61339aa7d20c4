/**
 * Service Routes
 * CRUD for the coaching services collection, plus manual reordering and
 * visibility toggling. Public reads return visible services only, in
 * display order; admins can request hidden rows too.
 */
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;

use crate::db::{
    self,
    models::{Service, ServiceIcon},
};
use crate::realtime::{ChangeEvent, ChangeOp, ContentTable};
use crate::routes::{auth, plan_neighbor_swap, ErrorResponse, MoveDirection, SuccessResponse};
use crate::AppState;

const SELECT_COLUMNS: &str =
    "id, name, description, price, booking_url, icon, icon_url, order_num, visible";

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

fn validate_icon(icon: &Option<String>) -> Result<(), RouteError> {
    if let Some(tag) = icon {
        if ServiceIcon::parse(tag).is_none() {
            return Err(error(StatusCode::BAD_REQUEST, "Unknown icon tag"));
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub include_hidden: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub price: Option<String>,
    pub booking_url: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
}

/// Distinguishes an absent field from an explicit null so PATCH can clear
/// optional columns: absent keeps the value, null clears it.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Deserialize)]
pub struct UpdateServiceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub price: Option<Option<String>>,
    pub booking_url: Option<String>,
    pub icon: Option<String>,
    pub icon_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub direction: MoveDirection,
}

/// GET /api/services
/// Visible services in display order. `?include_hidden=true` returns the
/// full collection but requires an admin token.
pub async fn list_services(
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<Service>>, RouteError> {
    if query.include_hidden {
        auth::require_admin(&headers)?;
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return Ok(Json(Vec::new())),
    };

    let sql = if query.include_hidden {
        format!(
            "SELECT {} FROM services_dwd2024 ORDER BY order_num ASC, id ASC",
            SELECT_COLUMNS
        )
    } else {
        format!(
            "SELECT {} FROM services_dwd2024 WHERE visible = true ORDER BY order_num ASC, id ASC",
            SELECT_COLUMNS
        )
    };

    let services = sqlx::query_as::<_, Service>(&sql)
        .fetch_all(pool.as_ref())
        .await
        .map_err(internal("Failed to fetch services"))?;

    Ok(Json(services))
}

/// POST /api/services
/// Create a service at the end of the display order.
pub async fn create_service(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateServiceRequest>,
) -> Result<(StatusCode, Json<Service>), RouteError> {
    auth::require_admin(&headers)?;

    if payload.name.trim().is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "Service name is required"));
    }
    validate_icon(&payload.icon)?;

    let pool = db::get_pool().ok_or_else(db_unavailable)?;

    let service = sqlx::query_as::<_, Service>(&format!(
        r#"
        INSERT INTO services_dwd2024
            (name, description, price, booking_url, icon, icon_url, order_num, visible)
        SELECT $1, $2, $3, $4, $5, $6, COALESCE(MAX(order_num) + 1, 0), true
        FROM services_dwd2024
        RETURNING {}
        "#,
        SELECT_COLUMNS
    ))
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(&payload.price)
    .bind(&payload.booking_url)
    .bind(&payload.icon)
    .bind(&payload.icon_url)
    .fetch_one(pool.as_ref())
    .await
    .map_err(internal("Failed to create service"))?;

    state.changes.publish(ChangeEvent {
        table: ContentTable::Services,
        op: ChangeOp::Insert,
        row: serde_json::to_value(&service).unwrap_or_default(),
    });

    Ok((StatusCode::CREATED, Json(service)))
}

/// PATCH /api/services/{id}
pub async fn update_service(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(payload): Json<UpdateServiceRequest>,
) -> Result<Json<Service>, RouteError> {
    auth::require_admin(&headers)?;
    validate_icon(&payload.icon)?;

    let pool = db::get_pool().ok_or_else(db_unavailable)?;

    let service = sqlx::query_as::<_, Service>(&format!(
        r#"
        UPDATE services_dwd2024 SET
            name = COALESCE($2, name),
            description = COALESCE($3, description),
            price = CASE WHEN $4 THEN $5 ELSE price END,
            booking_url = COALESCE($6, booking_url),
            icon = COALESCE($7, icon),
            icon_url = COALESCE($8, icon_url)
        WHERE id = $1
        RETURNING {}
        "#,
        SELECT_COLUMNS
    ))
    .bind(id)
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(payload.price.is_some())
    .bind(payload.price.clone().flatten())
    .bind(&payload.booking_url)
    .bind(&payload.icon)
    .bind(&payload.icon_url)
    .fetch_optional(pool.as_ref())
    .await
    .map_err(internal("Failed to update service"))?
    .ok_or_else(|| error(StatusCode::NOT_FOUND, "Service not found"))?;

    state.changes.publish(ChangeEvent {
        table: ContentTable::Services,
        op: ChangeOp::Update,
        row: serde_json::to_value(&service).unwrap_or_default(),
    });

    Ok(Json(service))
}

/// DELETE /api/services/{id}
pub async fn delete_service(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, RouteError> {
    auth::require_admin(&headers)?;
    let pool = db::get_pool().ok_or_else(db_unavailable)?;

    let result = sqlx::query("DELETE FROM services_dwd2024 WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await
        .map_err(internal("Failed to delete service"))?;

    if result.rows_affected() == 0 {
        return Err(error(StatusCode::NOT_FOUND, "Service not found"));
    }

    state.changes.publish(ChangeEvent {
        table: ContentTable::Services,
        op: ChangeOp::Delete,
        row: serde_json::json!({ "id": id }),
    });

    Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/services/{id}/move
/// Swap the service's order_num with its neighbour in the requested
/// direction. A move past either end is a silent no-op.
pub async fn move_service(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(payload): Json<MoveRequest>,
) -> Result<Json<SuccessResponse>, RouteError> {
    auth::require_admin(&headers)?;
    let pool = db::get_pool().ok_or_else(db_unavailable)?;

    let rows: Vec<(i64, i32)> =
        sqlx::query_as("SELECT id, order_num FROM services_dwd2024 ORDER BY order_num ASC, id ASC")
            .fetch_all(pool.as_ref())
            .await
            .map_err(internal("Failed to fetch service order"))?;

    let Some((first, second)) = plan_neighbor_swap(&rows, id, payload.direction) else {
        return Ok(Json(SuccessResponse { success: true }));
    };

    let mut tx = pool
        .begin()
        .await
        .map_err(internal("Failed to reorder services"))?;
    for (row_id, order_num) in [first, second] {
        sqlx::query("UPDATE services_dwd2024 SET order_num = $2 WHERE id = $1")
            .bind(row_id)
            .bind(order_num)
            .execute(&mut *tx)
            .await
            .map_err(internal("Failed to reorder services"))?;
    }
    tx.commit()
        .await
        .map_err(internal("Failed to reorder services"))?;

    for (row_id, order_num) in [first, second] {
        state.changes.publish(ChangeEvent {
            table: ContentTable::Services,
            op: ChangeOp::Update,
            row: serde_json::json!({ "id": row_id, "order_num": order_num }),
        });
    }

    Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/services/{id}/visibility
/// Flip the service's visible flag.
pub async fn toggle_visibility(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Service>, RouteError> {
    auth::require_admin(&headers)?;
    let pool = db::get_pool().ok_or_else(db_unavailable)?;

    let service = sqlx::query_as::<_, Service>(&format!(
        "UPDATE services_dwd2024 SET visible = NOT visible WHERE id = $1 RETURNING {}",
        SELECT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool.as_ref())
    .await
    .map_err(internal("Failed to toggle service visibility"))?
    .ok_or_else(|| error(StatusCode::NOT_FOUND, "Service not found"))?;

    state.changes.publish(ChangeEvent {
        table: ContentTable::Services,
        op: ChangeOp::Update,
        row: serde_json::to_value(&service).unwrap_or_default(),
    });

    Ok(Json(service))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, post};
    use axum::Router;
    use tower::ServiceExt;

    fn services_router() -> Router {
        Router::new()
            .route("/api/services", get(list_services).post(create_service))
            .route(
                "/api/services/{id}",
                axum::routing::patch(update_service).delete(delete_service),
            )
            .route("/api/services/{id}/move", post(move_service))
            .route("/api/services/{id}/visibility", post(toggle_visibility))
            .with_state(AppState::new())
    }

    #[tokio::test]
    async fn test_list_without_db_returns_empty_list() {
        let res = services_router()
            .oneshot(Request::get("/api/services").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let services: Vec<Service> = serde_json::from_slice(&bytes).unwrap();
        assert!(services.is_empty());
    }

    #[tokio::test]
    async fn test_list_hidden_without_auth_is_unauthorized() {
        let res = services_router()
            .oneshot(
                Request::get("/api/services?include_hidden=true")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_without_auth_is_unauthorized() {
        let payload = serde_json::json!({
            "name": "Clarity Call",
            "description": "A 30-minute call",
            "booking_url": "https://tidycal.com/dwd/clarity-call",
        });
        let res = services_router()
            .oneshot(
                Request::post("/api/services")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_move_without_auth_is_unauthorized() {
        let payload = serde_json::json!({ "direction": "up" });
        let res = services_router()
            .oneshot(
                Request::post("/api/services/1/move")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_validate_icon_rejects_unknown_tag() {
        assert!(validate_icon(&Some("sparkles".to_string())).is_err());
        assert!(validate_icon(&Some("heart".to_string())).is_ok());
        assert!(validate_icon(&None).is_ok());
    }
}
