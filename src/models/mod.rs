//! Data models for the library

pub mod author;
pub mod book;
pub mod borrow;
pub mod user;

use serde::Serialize;
use utoipa::ToSchema;

// Re-export commonly used types
pub use author::{Author, AuthorRef};
pub use book::{Book, BookRef};
pub use borrow::{Borrow, BorrowReceipt};
pub use user::{Role, User, UserProfile, UserSummary};

/// `_count` block of a listing: size of the borrow history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ToSchema)]
pub struct BorrowsCount {
    pub borrows: i64,
}

/// `_count` block of a listing: number of books
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ToSchema)]
pub struct BooksCount {
    pub books: i64,
}
