//! Book model, catalog filters and pagination

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::{
    author::{Author, AuthorRef},
    borrow::Borrow,
    user::UserSummary,
    BorrowsCount,
};

static ISBN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9Xx-]+$").expect("valid ISBN pattern"));

pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Full book model from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub isbn: String,
    pub description: Option<String>,
    pub published_at: Option<NaiveDate>,
    pub quantity: i32,
    /// Copies not currently borrowed, `0..=quantity`
    pub available: i32,
    pub author_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Book identification embedded in borrow records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BookRef {
    pub id: i32,
    pub title: String,
    pub isbn: String,
}

impl From<&Book> for BookRef {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id,
            title: book.title.clone(),
            isbn: book.isbn.clone(),
        }
    }
}

/// Book with its full author
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookWithAuthor {
    #[serde(flatten)]
    pub book: Book,
    pub author: Author,
}

/// Catalog list entry
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookListEntry {
    #[serde(flatten)]
    pub book: Book,
    pub author: AuthorRef,
    #[serde(rename = "_count")]
    pub count: BorrowsCount,
}

/// Open borrow as shown on a book's page
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookOpenBorrow {
    #[serde(flatten)]
    pub borrow: Borrow,
    pub user: UserSummary,
}

/// Book details with author and currently open borrows
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookDetails {
    #[serde(flatten)]
    pub book: Book,
    pub author: Author,
    pub borrows: Vec<BookOpenBorrow>,
}

/// Catalog filter; every given criterion must hold
#[derive(Debug, Clone, Default, Deserialize, Validate, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct BookFilter {
    /// Case-insensitive substring of title, ISBN or description
    pub search: Option<String>,
    pub author_id: Option<i32>,
    /// `true`: at least one copy available, `false`: none available
    pub available: Option<bool>,
    /// 1-indexed page (default 1)
    #[validate(range(min = 1, message = "page must not be less than 1"))]
    pub page: Option<i64>,
    /// Page size (default 10)
    #[validate(range(min = 1, message = "limit must not be less than 1"))]
    pub limit: Option<i64>,
}

impl BookFilter {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }

    /// Search term, ignoring blank input
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Pagination metadata
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl PageMeta {
    pub fn new(total: i64, page: i64, limit: i64) -> Self {
        let total_pages = if total > 0 && limit > 0 { (total - 1) / limit + 1 } else { 0 };
        Self {
            total,
            page,
            limit,
            total_pages,
        }
    }
}

/// One page of the catalog
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookPage {
    pub data: Vec<BookListEntry>,
    pub meta: PageMeta,
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBook {
    #[validate(length(min = 1, max = 200, message = "title must be between 1 and 200 characters"))]
    pub title: String,
    #[validate(
        length(min = 10, max = 17, message = "isbn must be between 10 and 17 characters"),
        regex(path = *ISBN_RE, message = "isbn may only contain digits, X and dashes")
    )]
    pub isbn: String,
    #[validate(length(max = 2000, message = "description must be at most 2000 characters"))]
    pub description: Option<String>,
    pub published_at: Option<NaiveDate>,
    #[validate(range(min = 1, message = "quantity must not be less than 1"))]
    pub quantity: Option<i32>,
    pub author_id: i32,
}

/// Update book request; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 200, message = "title must be between 1 and 200 characters"))]
    pub title: Option<String>,
    #[validate(
        length(min = 10, max = 17, message = "isbn must be between 10 and 17 characters"),
        regex(path = *ISBN_RE, message = "isbn may only contain digits, X and dashes")
    )]
    pub isbn: Option<String>,
    /// `null` clears the description
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>, nullable)]
    #[validate(length(max = 2000, message = "description must be at most 2000 characters"))]
    pub description: Option<Option<String>>,
    /// `null` clears the publication date
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<NaiveDate>, nullable)]
    pub published_at: Option<Option<NaiveDate>>,
    #[validate(range(min = 1, message = "quantity must not be less than 1"))]
    pub quantity: Option<i32>,
    pub author_id: Option<i32>,
}

/// Row to insert
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub isbn: String,
    pub description: Option<String>,
    pub published_at: Option<NaiveDate>,
    pub quantity: i32,
    pub author_id: i32,
}

impl From<CreateBook> for NewBook {
    fn from(book: CreateBook) -> Self {
        Self {
            title: book.title,
            isbn: book.isbn,
            description: book.description,
            published_at: book.published_at,
            quantity: book.quantity.unwrap_or(1),
            author_id: book.author_id,
        }
    }
}

/// Apply a quantity change to the available counter.
///
/// Returns `None` when more copies are borrowed than the new quantity allows.
pub fn adjusted_available(book: &Book, new_quantity: i32) -> Option<i32> {
    let available = book.available + (new_quantity - book.quantity);
    (available >= 0).then_some(available)
}
