use crate::db::models::{Board, BoardList, BoardWithLists, NewBoard};
use crate::db::pool::PoolManager;
use crate::db::transaction::run_in_transaction;
use crate::error::DbError;
use uuid::Uuid;

/// Create a board and its lists atomically.
///
/// Either the board and every list are stored, or nothing is.
///
/// # Arguments
/// * `manager` - Pool manager owning the connection pool
/// * `new_board` - Board name, optional description and ordered list titles
///
/// # Returns
/// The stored board with its lists
///
/// # Errors
/// Returns error if a connection cannot be acquired or any insert fails
pub async fn create_board(
    manager: &PoolManager,
    new_board: NewBoard,
) -> Result<BoardWithLists, DbError> {
    run_in_transaction(manager, move |conn| {
        Box::pin(async move {
            let board = sqlx::query_as::<_, Board>(
                r#"
                INSERT INTO boards (id, name, description)
                VALUES ($1, $2, $3)
                RETURNING id, name, description, created_at
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&new_board.name)
            .bind(&new_board.description)
            .fetch_one(&mut **conn)
            .await?;

            let mut lists = Vec::with_capacity(new_board.lists.len());
            for (index, title) in new_board.lists.iter().enumerate() {
                let position = list_position(index)?;
                let list = sqlx::query_as::<_, BoardList>(
                    r#"
                    INSERT INTO board_lists (id, board_id, title, position)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id, board_id, title, position, created_at
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(board.id)
                .bind(title)
                .bind(position)
                .fetch_one(&mut **conn)
                .await?;
                lists.push(list);
            }

            tracing::info!(
                board_id = %board.id,
                list_count = lists.len(),
                "Created board"
            );

            Ok::<_, DbError>(BoardWithLists { board, lists })
        })
    })
    .await
}

/// Convert a list index into the stored `INTEGER` position.
fn list_position(index: usize) -> Result<i32, sqlx::Error> {
    i32::try_from(index).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

/// Get a board and its lists by ID.
///
/// # Returns
/// Some(BoardWithLists) if the board exists, None otherwise
pub async fn get_board(manager: &PoolManager, id: Uuid) -> Result<Option<BoardWithLists>, DbError> {
    let pool = manager.get_pool()?;

    let Some(board) = sqlx::query_as::<_, Board>(
        r#"
        SELECT id, name, description, created_at
        FROM boards
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    else {
        return Ok(None);
    };

    let lists = sqlx::query_as::<_, BoardList>(
        r#"
        SELECT id, board_id, title, position, created_at
        FROM board_lists
        WHERE board_id = $1
        ORDER BY position
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(Some(BoardWithLists { board, lists }))
}

/// List all boards, newest first.
pub async fn list_boards(manager: &PoolManager) -> Result<Vec<Board>, DbError> {
    let pool = manager.get_pool()?;

    let boards = sqlx::query_as::<_, Board>(
        r#"
        SELECT id, name, description, created_at
        FROM boards
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(boards)
}

/// Rename a board.
///
/// # Returns
/// The updated board, or None if no board has the given ID
pub async fn rename_board(
    manager: &PoolManager,
    id: Uuid,
    name: String,
) -> Result<Option<Board>, DbError> {
    let pool = manager.get_pool()?;

    let board = sqlx::query_as::<_, Board>(
        r#"
        UPDATE boards
        SET name = $1
        WHERE id = $2
        RETURNING id, name, description, created_at
        "#,
    )
    .bind(name)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(board)
}

/// Delete a board and its lists in one transaction.
///
/// # Returns
/// `true` if a board was removed, `false` if none matched
pub async fn delete_board(manager: &PoolManager, id: Uuid) -> Result<bool, DbError> {
    run_in_transaction(manager, move |conn| {
        Box::pin(async move {
            sqlx::query("DELETE FROM board_lists WHERE board_id = $1")
                .bind(id)
                .execute(&mut **conn)
                .await?;

            let deleted = sqlx::query("DELETE FROM boards WHERE id = $1")
                .bind(id)
                .execute(&mut **conn)
                .await?
                .rows_affected();

            Ok::<_, DbError>(deleted > 0)
        })
    })
    .await
}
