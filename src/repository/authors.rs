//! Authors repository for database operations

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        author::{Author, AuthorListEntry, CreateAuthor, UpdateAuthor},
        book::{Book, BookRef},
        BooksCount,
    },
};

use super::like_pattern;

#[async_trait]
pub trait AuthorStore: Send + Sync {
    async fn create(&self, author: &CreateAuthor) -> AppResult<Author>;

    async fn get(&self, id: i32) -> AppResult<Option<Author>>;

    /// Authors ordered by name, optionally matching `search` in name or bio
    async fn list(&self, search: Option<String>) -> AppResult<Vec<AuthorListEntry>>;

    /// Every book of the author, by title
    async fn books_of(&self, id: i32) -> AppResult<Vec<Book>>;

    async fn update(&self, id: i32, update: &UpdateAuthor) -> AppResult<Option<Author>>;

    /// Delete an author without books
    async fn delete(&self, id: i32) -> AppResult<Option<Author>>;
}

#[derive(Clone)]
pub struct AuthorsRepository {
    pool: Pool<Postgres>,
}

impl AuthorsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

pub(crate) fn has_books_error() -> AppError {
    AppError::Validation("Cannot delete author with existing books".to_string())
}

#[async_trait]
impl AuthorStore for AuthorsRepository {
    async fn create(&self, author: &CreateAuthor) -> AppResult<Author> {
        let author = sqlx::query_as::<_, Author>(
            "INSERT INTO authors (name, bio) VALUES ($1, $2) RETURNING *",
        )
        .bind(&author.name)
        .bind(&author.bio)
        .fetch_one(&self.pool)
        .await?;
        Ok(author)
    }

    async fn get(&self, id: i32) -> AppResult<Option<Author>> {
        let author = sqlx::query_as::<_, Author>("SELECT * FROM authors WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(author)
    }

    async fn list(&self, search: Option<String>) -> AppResult<Vec<AuthorListEntry>> {
        let authors = match search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(term) => {
                sqlx::query_as::<_, Author>(
                    r#"
                    SELECT * FROM authors
                    WHERE name ILIKE $1 OR bio ILIKE $1
                    ORDER BY name, id
                    "#,
                )
                .bind(like_pattern(term))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Author>("SELECT * FROM authors ORDER BY name, id")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let ids: Vec<i32> = authors.iter().map(|a| a.id).collect();
        let books = sqlx::query_as::<_, Book>(
            "SELECT * FROM books WHERE author_id = ANY($1) ORDER BY title, id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_author: HashMap<i32, Vec<BookRef>> = HashMap::new();
        for book in &books {
            by_author.entry(book.author_id).or_default().push(BookRef::from(book));
        }

        Ok(authors
            .into_iter()
            .map(|author| {
                let books = by_author.remove(&author.id).unwrap_or_default();
                AuthorListEntry {
                    count: BooksCount { books: books.len() as i64 },
                    author,
                    books,
                }
            })
            .collect())
    }

    async fn books_of(&self, id: i32) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(
            "SELECT * FROM books WHERE author_id = $1 ORDER BY title, id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    async fn update(&self, id: i32, update: &UpdateAuthor) -> AppResult<Option<Author>> {
        let author = sqlx::query_as::<_, Author>(
            r#"
            UPDATE authors SET
                name = COALESCE($2, name),
                bio = COALESCE($3, bio),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.bio)
        .fetch_optional(&self.pool)
        .await?;
        Ok(author)
    }

    async fn delete(&self, id: i32) -> AppResult<Option<Author>> {
        let result = sqlx::query_as::<_, Author>("DELETE FROM authors WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await;

        match result {
            Ok(author) => Ok(author),
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23503") => {
                Err(has_books_error())
            }
            Err(e) => Err(e.into()),
        }
    }
}
