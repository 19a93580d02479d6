//! Borrows repository: the checkout/checkin transactions

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, FromRow, Pool, Postgres, Row};

use crate::{
    error::{AppError, AppResult},
    models::{
        author::{Author, AuthorRef},
        book::{Book, BookRef, BookWithAuthor},
        borrow::{
            BookRefWithAuthor, Borrow, BorrowDetails, BorrowListEntry, BorrowReceipt, BorrowedBook,
            NewBorrow, UserBorrowEntry,
        },
        user::{User, UserSummary},
    },
};

/// Persistence of borrow records and the two atomic lifecycle units
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BorrowStore: Send + Sync {
    async fn get(&self, id: i32) -> AppResult<Option<Borrow>>;

    /// Open borrow of `book_id` by `user_id`, if any
    async fn find_open(&self, user_id: i32, book_id: i32) -> AppResult<Option<Borrow>>;

    /// Atomically take one copy of the book and record the borrow.
    ///
    /// Re-checks existence, availability and the one-open-borrow rule under lock.
    async fn checkout(&self, borrow: &NewBorrow) -> AppResult<BorrowReceipt>;

    /// Atomically close the borrow and put its copy back
    async fn checkin(&self, borrow_id: i32, returned_at: DateTime<Utc>) -> AppResult<BorrowReceipt>;

    /// All borrows, newest first
    async fn list(&self, include_returned: bool) -> AppResult<Vec<BorrowListEntry>>;

    async fn list_by_user(&self, user_id: i32, include_returned: bool) -> AppResult<Vec<UserBorrowEntry>>;

    async fn details(&self, id: i32) -> AppResult<Option<BorrowDetails>>;
}

#[derive(Clone)]
pub struct BorrowsRepository {
    pool: Pool<Postgres>,
}

impl BorrowsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn user_summary(row: &PgRow) -> UserSummary {
    UserSummary {
        id: row.get("user_id"),
        name: row.get("user_name"),
        email: row.get("user_email"),
    }
}

#[async_trait]
impl BorrowStore for BorrowsRepository {
    async fn get(&self, id: i32) -> AppResult<Option<Borrow>> {
        let borrow = sqlx::query_as::<_, Borrow>("SELECT * FROM borrows WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(borrow)
    }

    async fn find_open(&self, user_id: i32, book_id: i32) -> AppResult<Option<Borrow>> {
        let borrow = sqlx::query_as::<_, Borrow>(
            "SELECT * FROM borrows WHERE user_id = $1 AND book_id = $2 AND returned_at IS NULL",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(borrow)
    }

    async fn checkout(&self, new: &NewBorrow) -> AppResult<BorrowReceipt> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(new.user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("User", new.user_id))?;

        // Serializes every checkout and checkin of this book
        let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(new.book_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Book", new.book_id))?;

        if book.available <= 0 {
            return Err(AppError::book_not_available());
        }

        let already_open: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM borrows WHERE user_id = $1 AND book_id = $2 AND returned_at IS NULL)",
        )
        .bind(new.user_id)
        .bind(new.book_id)
        .fetch_one(&mut *tx)
        .await?;

        if already_open {
            return Err(AppError::already_borrowed());
        }

        let book = sqlx::query_as::<_, Book>(
            "UPDATE books SET available = available - 1, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(new.book_id)
        .fetch_one(&mut *tx)
        .await?;

        let borrow = sqlx::query_as::<_, Borrow>(
            r#"
            INSERT INTO borrows (user_id, book_id, borrowed_at, due_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(new.user_id)
        .bind(new.book_id)
        .bind(new.borrowed_at)
        .bind(new.due_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(BorrowReceipt {
            borrow,
            user: UserSummary::from(&user),
            book: BookRef::from(&book),
        })
    }

    async fn checkin(&self, borrow_id: i32, returned_at: DateTime<Utc>) -> AppResult<BorrowReceipt> {
        let mut tx = self.pool.begin().await?;

        let borrow = sqlx::query_as::<_, Borrow>("SELECT * FROM borrows WHERE id = $1")
            .bind(borrow_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Borrow record", borrow_id))?;

        // Lock order is book then borrow, same as checkout
        sqlx::query("SELECT id FROM books WHERE id = $1 FOR UPDATE")
            .bind(borrow.book_id)
            .execute(&mut *tx)
            .await?;

        let borrow = sqlx::query_as::<_, Borrow>("SELECT * FROM borrows WHERE id = $1 FOR UPDATE")
            .bind(borrow_id)
            .fetch_one(&mut *tx)
            .await?;

        if !borrow.is_open() {
            return Err(AppError::already_returned());
        }

        let book = sqlx::query_as::<_, Book>(
            "UPDATE books SET available = available + 1, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(borrow.book_id)
        .fetch_one(&mut *tx)
        .await?;

        let borrow = sqlx::query_as::<_, Borrow>(
            "UPDATE borrows SET returned_at = $2 WHERE id = $1 RETURNING *",
        )
        .bind(borrow_id)
        .bind(returned_at)
        .fetch_one(&mut *tx)
        .await?;

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(borrow.user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(BorrowReceipt {
            borrow,
            user: UserSummary::from(&user),
            book: BookRef::from(&book),
        })
    }

    async fn list(&self, include_returned: bool) -> AppResult<Vec<BorrowListEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT br.*,
                   u.name AS user_name, u.email AS user_email,
                   b.title AS book_title, b.isbn AS book_isbn,
                   a.id AS author_id, a.name AS author_name
            FROM borrows br
            JOIN users u ON u.id = br.user_id
            JOIN books b ON b.id = br.book_id
            JOIN authors a ON a.id = b.author_id
            WHERE $1 OR br.returned_at IS NULL
            ORDER BY br.borrowed_at DESC, br.id DESC
            "#,
        )
        .bind(include_returned)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> AppResult<BorrowListEntry> {
                let borrow = Borrow::from_row(row)?;
                Ok(BorrowListEntry {
                    user: user_summary(row),
                    book: BookRefWithAuthor {
                        id: borrow.book_id,
                        title: row.get("book_title"),
                        isbn: row.get("book_isbn"),
                        author: AuthorRef {
                            id: row.get("author_id"),
                            name: row.get("author_name"),
                        },
                    },
                    borrow,
                })
            })
            .collect()
    }

    async fn list_by_user(&self, user_id: i32, include_returned: bool) -> AppResult<Vec<UserBorrowEntry>> {
        let borrows = sqlx::query_as::<_, Borrow>(
            r#"
            SELECT * FROM borrows
            WHERE user_id = $1 AND ($2 OR returned_at IS NULL)
            ORDER BY borrowed_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .bind(include_returned)
        .fetch_all(&self.pool)
        .await?;

        if borrows.is_empty() {
            return Ok(Vec::new());
        }

        let book_ids: Vec<i32> = borrows.iter().map(|b| b.book_id).collect();
        let rows = sqlx::query(
            r#"
            SELECT b.*, a.name AS author_name
            FROM books b
            JOIN authors a ON a.id = b.author_id
            WHERE b.id = ANY($1)
            "#,
        )
        .bind(&book_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut books = HashMap::with_capacity(rows.len());
        for row in &rows {
            let book = Book::from_row(row)?;
            let author = AuthorRef {
                id: book.author_id,
                name: row.get("author_name"),
            };
            books.insert(book.id, BorrowedBook { book, author });
        }

        borrows
            .into_iter()
            .map(|borrow| -> AppResult<UserBorrowEntry> {
                let book = books
                    .get(&borrow.book_id)
                    .cloned()
                    .ok_or_else(|| AppError::not_found("Book", borrow.book_id))?;
                Ok(UserBorrowEntry { borrow, book })
            })
            .collect()
    }

    async fn details(&self, id: i32) -> AppResult<Option<BorrowDetails>> {
        let Some(borrow) = self.get(id).await? else {
            return Ok(None);
        };

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(borrow.user_id)
            .fetch_one(&self.pool)
            .await?;
        let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(borrow.book_id)
            .fetch_one(&self.pool)
            .await?;
        let author = sqlx::query_as::<_, Author>("SELECT * FROM authors WHERE id = $1")
            .bind(book.author_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(Some(BorrowDetails {
            borrow,
            user: UserSummary::from(&user),
            book: BookWithAuthor { book, author },
        }))
    }
}
