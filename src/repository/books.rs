//! Books repository for database operations

use async_trait::async_trait;
use sqlx::{FromRow, Pool, Postgres, QueryBuilder, Row};

use crate::{
    error::{AppError, AppResult},
    models::{
        author::{Author, AuthorRef},
        book::{
            adjusted_available, Book, BookDetails, BookFilter, BookListEntry, BookOpenBorrow,
            BookWithAuthor, NewBook, UpdateBook,
        },
        borrow::Borrow,
        user::UserSummary,
        BorrowsCount,
    },
};

use super::like_pattern;

#[async_trait]
pub trait BookStore: Send + Sync {
    async fn create(&self, book: &NewBook) -> AppResult<Book>;

    async fn get(&self, id: i32) -> AppResult<Option<Book>>;

    async fn get_with_author(&self, id: i32) -> AppResult<Option<BookWithAuthor>>;

    /// Book with its author and open borrows
    async fn details(&self, id: i32) -> AppResult<Option<BookDetails>>;

    /// One page of books matching `filter`, with the total match count
    async fn search(&self, filter: &BookFilter) -> AppResult<(Vec<BookListEntry>, i64)>;

    /// Partial update. A new quantity shifts `available` by the same delta.
    async fn update(&self, id: i32, update: &UpdateBook) -> AppResult<Option<Book>>;

    /// Whether any borrow, open or closed, references the book
    async fn has_borrows(&self, id: i32) -> AppResult<bool>;

    async fn delete(&self, id: i32) -> AppResult<Option<Book>>;
}

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

pub(crate) fn quantity_below_borrowed() -> AppError {
    AppError::Validation("Quantity cannot be lower than the number of borrowed copies".to_string())
}

pub(crate) fn has_borrows_error() -> AppError {
    AppError::Validation("Cannot delete book with active borrows".to_string())
}

/// Append the filter criteria to a query ending in `WHERE TRUE`
fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &BookFilter) {
    if let Some(term) = filter.search_term() {
        let pattern = like_pattern(term);
        qb.push(" AND (b.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR b.isbn ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR b.description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if let Some(author_id) = filter.author_id {
        qb.push(" AND b.author_id = ").push_bind(author_id);
    }

    match filter.available {
        Some(true) => {
            qb.push(" AND b.available > 0");
        }
        Some(false) => {
            qb.push(" AND b.available = 0");
        }
        None => {}
    }
}

#[async_trait]
impl BookStore for BooksRepository {
    async fn create(&self, book: &NewBook) -> AppResult<Book> {
        let book = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (title, isbn, description, published_at, quantity, available, author_id)
            VALUES ($1, $2, $3, $4, $5, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&book.title)
        .bind(&book.isbn)
        .bind(&book.description)
        .bind(book.published_at)
        .bind(book.quantity)
        .bind(book.author_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(book)
    }

    async fn get(&self, id: i32) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(book)
    }

    async fn get_with_author(&self, id: i32) -> AppResult<Option<BookWithAuthor>> {
        let Some(book) = self.get(id).await? else {
            return Ok(None);
        };
        let author = sqlx::query_as::<_, Author>("SELECT * FROM authors WHERE id = $1")
            .bind(book.author_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(Some(BookWithAuthor { book, author }))
    }

    async fn details(&self, id: i32) -> AppResult<Option<BookDetails>> {
        let Some(BookWithAuthor { book, author }) = self.get_with_author(id).await? else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT br.*, u.name AS user_name, u.email AS user_email
            FROM borrows br
            JOIN users u ON u.id = br.user_id
            WHERE br.book_id = $1 AND br.returned_at IS NULL
            ORDER BY br.borrowed_at DESC, br.id DESC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut borrows = Vec::with_capacity(rows.len());
        for row in &rows {
            let borrow = Borrow::from_row(row)?;
            borrows.push(BookOpenBorrow {
                user: UserSummary {
                    id: borrow.user_id,
                    name: row.get("user_name"),
                    email: row.get("user_email"),
                },
                borrow,
            });
        }

        Ok(Some(BookDetails { book, author, borrows }))
    }

    async fn search(&self, filter: &BookFilter) -> AppResult<(Vec<BookListEntry>, i64)> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM books b WHERE TRUE");
        push_filters(&mut count_query, filter);
        let total: i64 = count_query.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select_query = QueryBuilder::<Postgres>::new(
            r#"
            SELECT b.*, a.name AS author_name,
                   (SELECT COUNT(*) FROM borrows br WHERE br.book_id = b.id) AS borrow_count
            FROM books b
            JOIN authors a ON a.id = b.author_id
            WHERE TRUE"#,
        );
        push_filters(&mut select_query, filter);
        select_query
            .push(" ORDER BY b.title, b.id LIMIT ")
            .push_bind(filter.limit())
            .push(" OFFSET ")
            .push_bind(filter.offset());

        let rows = select_query.build().fetch_all(&self.pool).await?;

        let mut books = Vec::with_capacity(rows.len());
        for row in &rows {
            let book = Book::from_row(row)?;
            books.push(BookListEntry {
                author: AuthorRef {
                    id: book.author_id,
                    name: row.get("author_name"),
                },
                count: BorrowsCount {
                    borrows: row.get("borrow_count"),
                },
                book,
            });
        }

        Ok((books, total))
    }

    async fn update(&self, id: i32, update: &UpdateBook) -> AppResult<Option<Book>> {
        let mut tx = self.pool.begin().await?;

        let Some(current) = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        let (quantity, available) = match update.quantity {
            Some(quantity) => (
                quantity,
                adjusted_available(&current, quantity).ok_or_else(quantity_below_borrowed)?,
            ),
            None => (current.quantity, current.available),
        };
        let description = update.description.clone().unwrap_or(current.description);
        let published_at = update.published_at.unwrap_or(current.published_at);

        let book = sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET
                title = COALESCE($2, title),
                isbn = COALESCE($3, isbn),
                description = $4,
                published_at = $5,
                quantity = $6,
                available = $7,
                author_id = COALESCE($8, author_id),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.title)
        .bind(&update.isbn)
        .bind(description)
        .bind(published_at)
        .bind(quantity)
        .bind(available)
        .bind(update.author_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(book))
    }

    async fn has_borrows(&self, id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM borrows WHERE book_id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn delete(&self, id: i32) -> AppResult<Option<Book>> {
        let result = sqlx::query_as::<_, Book>("DELETE FROM books WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await;

        match result {
            Ok(book) => Ok(book),
            // A borrow slipped in after the service checked
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23503") => {
                Err(has_borrows_error())
            }
            Err(e) => Err(e.into()),
        }
    }
}
