//! Repository layer for database operations
//!
//! Each entity has a store trait; `Repository` bundles one implementation of
//! each. The Postgres repositories are used in production, `MemoryStore` backs
//! tests and `memory://` runs.

pub mod authors;
pub mod books;
pub mod borrows;
pub mod memory;
pub mod users;

use std::sync::Arc;

use sqlx::{Pool, Postgres};

use crate::error::AppResult;

pub use authors::{AuthorStore, AuthorsRepository};
pub use books::{BookStore, BooksRepository};
pub use borrows::{BorrowStore, BorrowsRepository};
pub use memory::MemoryStore;
pub use users::{UserStore, UsersRepository};

/// Main repository struct holding one store per entity
#[derive(Clone)]
pub struct Repository {
    /// Set when backed by Postgres, used for readiness checks
    pub pool: Option<Pool<Postgres>>,
    pub authors: Arc<dyn AuthorStore>,
    pub books: Arc<dyn BookStore>,
    pub users: Arc<dyn UserStore>,
    pub borrows: Arc<dyn BorrowStore>,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            authors: Arc::new(AuthorsRepository::new(pool.clone())),
            books: Arc::new(BooksRepository::new(pool.clone())),
            users: Arc::new(UsersRepository::new(pool.clone())),
            borrows: Arc::new(BorrowsRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// Repository over a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::from_memory(Arc::new(MemoryStore::new()))
    }

    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            pool: None,
            authors: store.clone(),
            books: store.clone(),
            users: store.clone(),
            borrows: store,
        }
    }

    /// Check that the backing store answers
    pub async fn ping(&self) -> AppResult<()> {
        if let Some(ref pool) = self.pool {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }
}

/// Build an `ILIKE` pattern matching `term` anywhere, with wildcards escaped
pub(crate) fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Case-insensitive substring match, the in-memory twin of `ILIKE`
pub(crate) fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
