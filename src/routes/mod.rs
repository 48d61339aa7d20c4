/**
 * Routes Module
 * API route handlers
 */
pub mod auth;
pub mod events;
pub mod faqs;
pub mod health;
pub mod hero;
pub mod intro;
pub mod logs;
pub mod pages;
pub mod privacy;
pub mod sections;
pub mod services;
pub mod settings;
pub mod testimonials;
pub mod upload;

use serde::{Deserialize, Serialize};

/// Error body shared by every route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Success body for deletes and other bodiless mutations.
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Direction for a manual reorder within an ordered collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    Up,
    Down,
}

/// Plan a neighbour swap for a manual reorder.
///
/// `rows` must be the collection in its current display order as
/// `(id, order_num)` pairs. Returns the two `(id, new_order_num)` writes
/// needed to swap the target with its neighbour, or `None` when the move
/// is a boundary no-op or the id is unknown. No other row is touched.
pub(crate) fn plan_neighbor_swap(
    rows: &[(i64, i32)],
    id: i64,
    direction: MoveDirection,
) -> Option<((i64, i32), (i64, i32))> {
    let index = rows.iter().position(|(row_id, _)| *row_id == id)?;
    let neighbor = match direction {
        MoveDirection::Up => index.checked_sub(1)?,
        MoveDirection::Down => {
            if index + 1 >= rows.len() {
                return None;
            }
            index + 1
        }
    };

    let (row_id, row_order) = rows[index];
    let (neighbor_id, neighbor_order) = rows[neighbor];

    Some(((row_id, neighbor_order), (neighbor_id, row_order)))
}
