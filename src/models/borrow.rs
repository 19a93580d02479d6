//! Borrow model and related types

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use super::{
    author::AuthorRef,
    book::{Book, BookRef, BookWithAuthor},
    user::UserSummary,
};

/// Borrow record. Open while `returned_at` is `None`, closed once set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Borrow {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl Borrow {
    pub fn is_open(&self) -> bool {
        self.returned_at.is_none()
    }
}

/// Result of a borrow or return: the record plus who and what
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BorrowReceipt {
    #[serde(flatten)]
    pub borrow: Borrow,
    pub user: UserSummary,
    pub book: BookRef,
}

/// Book reference with its author, used in borrow listings
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BookRefWithAuthor {
    pub id: i32,
    pub title: String,
    pub isbn: String,
    pub author: AuthorRef,
}

/// Borrow listing entry across all users
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BorrowListEntry {
    #[serde(flatten)]
    pub borrow: Borrow,
    pub user: UserSummary,
    pub book: BookRefWithAuthor,
}

/// Full book with author reference, used in per-user listings
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BorrowedBook {
    #[serde(flatten)]
    pub book: Book,
    pub author: AuthorRef,
}

/// Borrow listing entry for one user
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserBorrowEntry {
    #[serde(flatten)]
    pub borrow: Borrow,
    pub book: BorrowedBook,
}

/// Single borrow with user and full book
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BorrowDetails {
    #[serde(flatten)]
    pub borrow: Borrow,
    pub user: UserSummary,
    pub book: BookWithAuthor,
}

/// Borrow request
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BorrowBookRequest {
    pub user_id: i32,
    pub book_id: i32,
    /// ISO 8601 date or date-time; defaults to the configured loan duration
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub due_at: Option<DateTime<Utc>>,
}

/// Return request
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReturnBookRequest {
    pub borrow_id: i32,
}

/// Borrow listing parameters
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct BorrowListQuery {
    /// Also list closed borrows
    pub include_returned: Option<bool>,
}

impl BorrowListQuery {
    pub fn include_returned(&self) -> bool {
        self.include_returned.unwrap_or(false)
    }
}

/// Row to insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewBorrow {
    pub user_id: i32,
    pub book_id: i32,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

/// Accept `2024-05-01T12:00:00Z`, `2024-05-01T12:00:00` (UTC) and a plain
/// `2024-05-01` (midnight UTC)
fn deserialize_optional_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) => parse_date(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("dueAt must be an ISO 8601 date, got {}", s))),
    }
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
