//! Author catalog service

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::author::{Author, AuthorListEntry, AuthorWithBooks, CreateAuthor, UpdateAuthor},
    repository::Repository,
};

#[derive(Clone)]
pub struct AuthorsService {
    repository: Repository,
}

impl AuthorsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn create(&self, author: CreateAuthor) -> AppResult<AuthorWithBooks> {
        author.validate()?;
        let author = self.repository.authors.create(&author).await?;
        tracing::info!(author_id = author.id, "Author created");
        Ok(AuthorWithBooks::new(author, Vec::new()))
    }

    /// Authors by name, optionally filtered on name or bio
    pub async fn find_all(&self, search: Option<String>) -> AppResult<Vec<AuthorListEntry>> {
        self.repository.authors.list(search).await
    }

    pub async fn find_one(&self, id: i32) -> AppResult<AuthorWithBooks> {
        let author = self
            .repository
            .authors
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("Author", id))?;
        let books = self.repository.authors.books_of(id).await?;
        Ok(AuthorWithBooks::new(author, books))
    }

    pub async fn update(&self, id: i32, update: UpdateAuthor) -> AppResult<AuthorWithBooks> {
        update.validate()?;
        let author = self
            .repository
            .authors
            .update(id, &update)
            .await?
            .ok_or_else(|| AppError::not_found("Author", id))?;
        let books = self.repository.authors.books_of(id).await?;
        Ok(AuthorWithBooks::new(author, books))
    }

    /// Delete an author; refused while any of their books remain
    pub async fn remove(&self, id: i32) -> AppResult<Author> {
        let author = self
            .repository
            .authors
            .delete(id)
            .await?
            .ok_or_else(|| AppError::not_found("Author", id))?;
        tracing::info!(author_id = id, "Author deleted");
        Ok(author)
    }
}
