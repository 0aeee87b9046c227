use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Board {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BoardList {
    pub id: Uuid,
    pub board_id: Uuid,
    pub title: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

/// A board together with its lists, ordered by position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardWithLists {
    #[serde(flatten)]
    pub board: Board,
    pub lists: Vec<BoardList>,
}

/// Input for creating a board; list titles are stored in the given order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewBoard {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub lists: Vec<String>,
}
