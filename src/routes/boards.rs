use crate::db::models::{Board, BoardWithLists, NewBoard};
use crate::db::repository;
use crate::error::AppError;
use crate::routes::AppState;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/boards", get(list_boards).post(create_board))
        .route(
            "/boards/{id}",
            get(get_board).patch(rename_board).delete(delete_board),
        )
}

#[derive(Debug, Deserialize)]
pub struct RenameBoard {
    pub name: String,
}

/// Upper bound on lists created together with a board
pub const MAX_LISTS_PER_BOARD: usize = 100;

fn required(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

/// Validate and normalize a board creation request
fn validate_new_board(input: NewBoard) -> Result<NewBoard, AppError> {
    let name = required("name", &input.name)?;
    if input.lists.len() > MAX_LISTS_PER_BOARD {
        return Err(AppError::BadRequest(format!(
            "a board may have at most {} lists",
            MAX_LISTS_PER_BOARD
        )));
    }
    let lists = input
        .lists
        .iter()
        .map(|title| required("list title", title))
        .collect::<Result<Vec<_>, _>>()?;
    let description = input
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    Ok(NewBoard {
        name,
        description,
        lists,
    })
}

/// Handle board creation
///
/// # Endpoint
/// POST /boards
///
/// # Returns
/// - 201 Created with the board and its lists
/// - 400 Bad Request for a blank name or list title, or too many lists
async fn create_board(
    State(state): State<AppState>,
    Json(input): Json<NewBoard>,
) -> Result<(StatusCode, Json<BoardWithLists>), AppError> {
    let new_board = validate_new_board(input)?;
    let board = repository::create_board(&state.db, new_board).await?;
    Ok((StatusCode::CREATED, Json(board)))
}

async fn list_boards(State(state): State<AppState>) -> Result<Json<Vec<Board>>, AppError> {
    Ok(Json(repository::list_boards(&state.db).await?))
}

async fn get_board(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BoardWithLists>, AppError> {
    repository::get_board(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Board {} not found", id)))
}

async fn rename_board(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<RenameBoard>,
) -> Result<Json<Board>, AppError> {
    let name = required("name", &input.name)?;
    repository::rename_board(&state.db, id, name)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Board {} not found", id)))
}

async fn delete_board(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if repository::delete_board(&state.db, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Board {} not found", id)))
    }
}
