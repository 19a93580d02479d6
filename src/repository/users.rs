//! Users repository for database operations

use async_trait::async_trait;
use sqlx::{FromRow, Pool, Postgres, Row};

use crate::{
    error::AppResult,
    models::{
        book::BookRef,
        borrow::Borrow,
        user::{NewUser, User, UserDetails, UserListEntry, UserOpenBorrow, UserProfile},
        BorrowsCount,
    },
};

use super::like_pattern;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: &NewUser) -> AppResult<User>;

    async fn get(&self, id: i32) -> AppResult<Option<User>>;

    /// Case-insensitive lookup
    async fn get_by_email(&self, email: &str) -> AppResult<Option<User>>;

    /// Users ordered by name, optionally matching `search` in name or email
    async fn list(&self, search: Option<String>) -> AppResult<Vec<UserListEntry>>;

    /// User with open borrows and borrow history size
    async fn details(&self, id: i32) -> AppResult<Option<UserDetails>>;
}

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UsersRepository {
    async fn create(&self, user: &NewUser) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, name, role)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.role)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get(&self, id: i32) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn list(&self, search: Option<String>) -> AppResult<Vec<UserListEntry>> {
        let pattern = search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(like_pattern);

        let rows = sqlx::query(
            r#"
            SELECT u.*, (SELECT COUNT(*) FROM borrows br WHERE br.user_id = u.id) AS borrow_count
            FROM users u
            WHERE $1::TEXT IS NULL OR u.name ILIKE $1 OR u.email ILIKE $1
            ORDER BY u.name, u.id
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        let mut users = Vec::with_capacity(rows.len());
        for row in &rows {
            let user = User::from_row(row)?;
            users.push(UserListEntry {
                user: UserProfile::from(user),
                count: BorrowsCount {
                    borrows: row.get("borrow_count"),
                },
            });
        }
        Ok(users)
    }

    async fn details(&self, id: i32) -> AppResult<Option<UserDetails>> {
        let Some(user) = self.get(id).await? else {
            return Ok(None);
        };

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM borrows WHERE user_id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(
            r#"
            SELECT br.*, b.title AS book_title, b.isbn AS book_isbn
            FROM borrows br
            JOIN books b ON b.id = br.book_id
            WHERE br.user_id = $1 AND br.returned_at IS NULL
            ORDER BY br.borrowed_at DESC, br.id DESC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut borrows = Vec::with_capacity(rows.len());
        for row in &rows {
            let borrow = Borrow::from_row(row)?;
            borrows.push(UserOpenBorrow {
                book: BookRef {
                    id: borrow.book_id,
                    title: row.get("book_title"),
                    isbn: row.get("book_isbn"),
                },
                borrow,
            });
        }

        Ok(Some(UserDetails {
            user: UserProfile::from(user),
            borrows,
            count: BorrowsCount { borrows: total },
        }))
    }
}
