//! Book catalog service

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookDetails, BookFilter, BookPage, BookWithAuthor, CreateBook, NewBook, PageMeta, UpdateBook},
    repository::{books::has_borrows_error, Repository},
};

#[derive(Clone)]
pub struct BooksService {
    repository: Repository,
}

impl BooksService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Author must exist, reported as a validation failure
    async fn ensure_author(&self, author_id: i32) -> AppResult<()> {
        match self.repository.authors.get(author_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::Validation(format!("Author with ID {} not found", author_id))),
        }
    }

    async fn with_author(&self, id: i32) -> AppResult<BookWithAuthor> {
        self.repository
            .books
            .get_with_author(id)
            .await?
            .ok_or_else(|| AppError::not_found("Book", id))
    }

    pub async fn create(&self, book: CreateBook) -> AppResult<BookWithAuthor> {
        book.validate()?;
        self.ensure_author(book.author_id).await?;

        let book = self.repository.books.create(&NewBook::from(book)).await?;
        tracing::info!(book_id = book.id, isbn = %book.isbn, copies = book.quantity, "Book created");
        self.with_author(book.id).await
    }

    /// One page of the catalog, ordered by title
    pub async fn find_all(&self, filter: BookFilter) -> AppResult<BookPage> {
        filter.validate()?;
        let (data, total) = self.repository.books.search(&filter).await?;
        Ok(BookPage {
            data,
            meta: PageMeta::new(total, filter.page(), filter.limit()),
        })
    }

    pub async fn find_one(&self, id: i32) -> AppResult<BookDetails> {
        self.repository
            .books
            .details(id)
            .await?
            .ok_or_else(|| AppError::not_found("Book", id))
    }

    pub async fn update(&self, id: i32, update: UpdateBook) -> AppResult<BookWithAuthor> {
        update.validate()?;
        if self.repository.books.get(id).await?.is_none() {
            return Err(AppError::not_found("Book", id));
        }
        if let Some(author_id) = update.author_id {
            self.ensure_author(author_id).await?;
        }

        self.repository
            .books
            .update(id, &update)
            .await?
            .ok_or_else(|| AppError::not_found("Book", id))?;
        self.with_author(id).await
    }

    /// Delete a book that was never borrowed
    pub async fn remove(&self, id: i32) -> AppResult<Book> {
        if self.repository.books.get(id).await?.is_none() {
            return Err(AppError::not_found("Book", id));
        }
        if self.repository.books.has_borrows(id).await? {
            return Err(has_borrows_error());
        }

        let book = self
            .repository
            .books
            .delete(id)
            .await?
            .ok_or_else(|| AppError::not_found("Book", id))?;
        tracing::info!(book_id = id, "Book deleted");
        Ok(book)
    }
}
