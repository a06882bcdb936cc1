use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;
use crate::{
    error::{AppError, Result},
    models::{
        pagination::Page,
        user::{Role, User},
    },
};

const USER_COLUMNS: &str = "id, name, email, password, role, avatar, is_verified, last_login, created_at, updated_at";

/// A helper function to map a `tokio_postgres::Row` to a `User`.
fn row_to_user(row: &Row) -> Result<User> {
    Ok(User {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        name: row.try_get("name").map_err(|_| AppError::MissingData("name".to_string()))?,
        email: row.try_get("email").map_err(|_| AppError::MissingData("email".to_string()))?,
        password: row.try_get("password").map_err(|_| AppError::MissingData("password".to_string()))?,
        role: row.try_get("role").map_err(|_| AppError::MissingData("role".to_string()))?,
        avatar: row.try_get("avatar").map_err(|_| AppError::MissingData("avatar".to_string()))?,
        is_verified: row.try_get("is_verified").map_err(|_| AppError::MissingData("is_verified".to_string()))?,
        last_login: row.try_get("last_login").map_err(|_| AppError::MissingData("last_login".to_string()))?,
        created_at: row.try_get("created_at").map_err(|_| AppError::MissingData("created_at".to_string()))?,
        updated_at: row.try_get("updated_at").map_err(|_| AppError::MissingData("updated_at".to_string()))?,
    })
}

fn rows_to_users(rows: &[Row]) -> Result<Vec<User>> {
    rows.iter().map(row_to_user).collect()
}

/// Creates a new user in the database.
///
/// A duplicate email surfaces as a unique violation.
pub async fn create_user(
    pool: &Pool,
    name: &str,
    email: &str,
    password_hash: &str,
    role: Role,
) -> Result<User> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            &format!(
                r#"
                INSERT INTO users (name, email, password, role)
                VALUES ($1, $2, $3, $4)
                RETURNING {USER_COLUMNS}
                "#
            ),
            &[&name, &email, &password_hash, &role],
        )
        .await?;
    row_to_user(&row)
}

/// Finds a user by their email address.
pub async fn find_by_email(pool: &Pool, email: &str) -> Result<Option<User>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"),
            &[&email],
        )
        .await?;
    row.map(|r| row_to_user(&r)).transpose()
}

/// Finds a user by their ID.
pub async fn find_by_id(pool: &Pool, user_id: &Uuid) -> Result<Option<User>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"),
            &[user_id],
        )
        .await?;
    row.map(|r| row_to_user(&r)).transpose()
}

/// Records a successful login and returns the refreshed row.
pub async fn touch_last_login(pool: &Pool, user_id: &Uuid) -> Result<User> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!(
                r#"
                UPDATE users
                SET last_login = NOW(), updated_at = NOW()
                WHERE id = $1
                RETURNING {USER_COLUMNS}
                "#
            ),
            &[user_id],
        )
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    row_to_user(&row)
}

/// Marks the email address as verified.
pub async fn set_verified(pool: &Pool, user_id: &Uuid) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute(
            "UPDATE users SET is_verified = true, updated_at = NOW() WHERE id = $1",
            &[user_id],
        )
        .await?;
    Ok(())
}

/// Updates a user's password hash.
pub async fn update_password(pool: &Pool, user_id: &Uuid, password_hash: &str) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute(
            r#"
            UPDATE users
            SET password = $1, updated_at = NOW()
            WHERE id = $2
            "#,
            &[&password_hash, user_id],
        )
        .await?;
    Ok(())
}

/// Self-service profile update. `None` keeps the current value.
pub async fn update_profile(
    pool: &Pool,
    user_id: &Uuid,
    name: Option<&str>,
    avatar: Option<&str>,
) -> Result<Option<User>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!(
                r#"
                UPDATE users
                SET
                    name = COALESCE($2, name),
                    avatar = COALESCE($3, avatar),
                    updated_at = NOW()
                WHERE id = $1
                RETURNING {USER_COLUMNS}
                "#
            ),
            &[user_id, &name, &avatar],
        )
        .await?;
    row.map(|r| row_to_user(&r)).transpose()
}

/// Admin update, which may also change the role.
pub async fn admin_update(
    pool: &Pool,
    user_id: &Uuid,
    name: Option<&str>,
    role: Option<Role>,
    avatar: Option<&str>,
) -> Result<Option<User>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!(
                r#"
                UPDATE users
                SET
                    name = COALESCE($2, name),
                    role = COALESCE($3, role),
                    avatar = COALESCE($4, avatar),
                    updated_at = NOW()
                WHERE id = $1
                RETURNING {USER_COLUMNS}
                "#
            ),
            &[user_id, &name, &role, &avatar],
        )
        .await?;
    row.map(|r| row_to_user(&r)).transpose()
}

/// Deletes a user. Returns whether a row was removed.
///
/// Courses taught by the user go with it (`ON DELETE CASCADE`).
pub async fn delete_user(pool: &Pool, user_id: &Uuid) -> Result<bool> {
    let client = pool.get().await?;
    let removed = client
        .execute("DELETE FROM users WHERE id = $1", &[user_id])
        .await?;
    Ok(removed > 0)
}

/// Counts users, optionally restricted to one role.
pub async fn count(pool: &Pool, role: Option<Role>) -> Result<i64> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            "SELECT COUNT(*) FROM users WHERE ($1::user_role IS NULL OR role = $1)",
            &[&role],
        )
        .await?;
    row.try_get(0)
        .map_err(|_| AppError::MissingData("count".to_string()))
}

/// One page of users, newest first.
pub async fn list(pool: &Pool, role: Option<Role>, page: Page) -> Result<Vec<User>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            &format!(
                r#"
                SELECT {USER_COLUMNS}
                FROM users
                WHERE ($1::user_role IS NULL OR role = $1)
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3
                "#
            ),
            &[&role, &page.limit, &page.offset()],
        )
        .await?;
    rows_to_users(&rows)
}

/// The `n` most recently registered users.
pub async fn recent(pool: &Pool, n: i64) -> Result<Vec<User>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            &format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT $1"),
            &[&n],
        )
        .await?;
    rows_to_users(&rows)
}
