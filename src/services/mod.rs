//! Business logic services

pub mod auth;
pub mod authors;
pub mod books;
pub mod borrows;
pub mod users;

use crate::{config::AppConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub authors: authors::AuthorsService,
    pub books: books::BooksService,
    pub users: users::UsersService,
    pub borrows: borrows::BorrowsService,
    pub repository: Repository,
}

impl Services {
    /// Create all services over the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        let users = users::UsersService::new(repository.clone());
        Self {
            auth: auth::AuthService::new(users.clone(), config.auth.clone()),
            authors: authors::AuthorsService::new(repository.clone()),
            books: books::BooksService::new(repository.clone()),
            borrows: borrows::BorrowsService::new(repository.clone(), config.borrows.clone()),
            users,
            repository,
        }
    }
}
