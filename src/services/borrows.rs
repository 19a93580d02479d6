//! Borrow lifecycle service
//!
//! Borrowing takes one copy of a book and opens a borrow record; returning
//! closes the record and puts the copy back. Both run as a single atomic unit
//! in the store. The checks done here give the precise error early, and the
//! store repeats them under lock so concurrent requests cannot oversell a book
//! or open two borrows for the same user and book.
//!
//! When the database aborts a unit because of a serialization failure or a
//! deadlock, the whole unit is run again after a short randomized backoff.

use std::future::Future;

use chrono::Utc;
use rand::Rng;
use tokio::time::Duration;

use crate::{
    config::BorrowsConfig,
    error::{AppError, AppResult},
    models::borrow::{
        BorrowBookRequest, BorrowDetails, BorrowListEntry, BorrowReceipt, NewBorrow, UserBorrowEntry,
    },
    repository::Repository,
};

/// Longest backoff doubling, keeps delays bounded under heavy contention
const MAX_BACKOFF_SHIFT: u32 = 6;

#[derive(Clone)]
pub struct BorrowsService {
    repository: Repository,
    config: BorrowsConfig,
}

impl BorrowsService {
    pub fn new(repository: Repository, config: BorrowsConfig) -> Self {
        Self { repository, config }
    }

    /// Borrow one copy of a book for a user.
    ///
    /// Fails with `NotFound` for an unknown user or book, and with
    /// `Validation` when no copy is left or when the user already holds the
    /// book. A given due date is stored as is, even one in the past.
    pub async fn borrow_book(&self, request: BorrowBookRequest) -> AppResult<BorrowReceipt> {
        let BorrowBookRequest { user_id, book_id, due_at } = request;

        if self.repository.users.get(user_id).await?.is_none() {
            return Err(AppError::not_found("User", user_id));
        }
        let book = self
            .repository
            .books
            .get(book_id)
            .await?
            .ok_or_else(|| AppError::not_found("Book", book_id))?;
        if book.available <= 0 {
            return Err(AppError::book_not_available());
        }
        if self.repository.borrows.find_open(user_id, book_id).await?.is_some() {
            return Err(AppError::already_borrowed());
        }

        let now = Utc::now();
        let due_at = due_at.unwrap_or_else(|| now + chrono::Duration::days(self.config.loan_days));

        let new_borrow = NewBorrow {
            user_id,
            book_id,
            borrowed_at: now,
            due_at,
        };
        let receipt = self
            .run_atomic("borrow", || self.repository.borrows.checkout(&new_borrow))
            .await?;

        tracing::info!(
            borrow_id = receipt.borrow.id,
            user_id,
            book_id,
            due_at = %receipt.borrow.due_at,
            "Book borrowed"
        );
        Ok(receipt)
    }

    /// Return the copy held by an open borrow
    pub async fn return_book(&self, borrow_id: i32) -> AppResult<BorrowReceipt> {
        let borrow = self
            .repository
            .borrows
            .get(borrow_id)
            .await?
            .ok_or_else(|| AppError::not_found("Borrow record", borrow_id))?;
        if !borrow.is_open() {
            return Err(AppError::already_returned());
        }

        let receipt = self
            .run_atomic("return", || self.repository.borrows.checkin(borrow_id, Utc::now()))
            .await?;

        tracing::info!(
            borrow_id,
            user_id = receipt.borrow.user_id,
            book_id = receipt.borrow.book_id,
            "Book returned"
        );
        Ok(receipt)
    }

    /// All borrows, newest first; closed ones only when asked for
    pub async fn find_all(&self, include_returned: bool) -> AppResult<Vec<BorrowListEntry>> {
        self.repository.borrows.list(include_returned).await
    }

    pub async fn find_by_user(&self, user_id: i32, include_returned: bool) -> AppResult<Vec<UserBorrowEntry>> {
        if self.repository.users.get(user_id).await?.is_none() {
            return Err(AppError::not_found("User", user_id));
        }
        self.repository.borrows.list_by_user(user_id, include_returned).await
    }

    pub async fn find_one(&self, id: i32) -> AppResult<BorrowDetails> {
        self.repository
            .borrows
            .details(id)
            .await?
            .ok_or_else(|| AppError::not_found("Borrow record", id))
    }

    /// Run an atomic store unit, re-running it on transient conflicts.
    ///
    /// Any other error, and the last transient one once attempts run out,
    /// is returned as is.
    async fn run_atomic<T, F, Fut>(&self, operation: &'static str, mut unit: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let max_attempts = self.config.max_transaction_attempts.max(1);
        let mut attempt = 1;

        loop {
            match unit().await {
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = backoff(self.config.retry_backoff_ms, attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transaction conflict, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    tracing::error!(operation, attempts = attempt, "Transaction kept conflicting, giving up");
                    return Err(e);
                }
                result => return result,
            }
        }
    }
}

/// Exponential backoff with up to one base step of jitter
fn backoff(base_ms: u64, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
    let jitter = if base_ms > 0 {
        rand::thread_rng().gen_range(0..=base_ms)
    } else {
        0
    };
    Duration::from_millis(base_ms.saturating_mul(1 << shift) + jitter)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use chrono::{DateTime, Duration as ChronoDuration};

    use super::*;
    use crate::{
        models::{
            author::CreateAuthor,
            book::{BookRef, NewBook},
            borrow::Borrow,
            user::{NewUser, Role, UserSummary},
        },
        repository::{borrows::MockBorrowStore, MemoryStore},
    };

    fn config(max_transaction_attempts: u32) -> BorrowsConfig {
        BorrowsConfig {
            loan_days: 14,
            max_transaction_attempts,
            retry_backoff_ms: 1,
        }
    }

    /// Memory-backed users and books with one user (1) and one book (1, 2 copies)
    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let repo = Repository::from_memory(store.clone());
        let author = repo
            .authors
            .create(&CreateAuthor {
                name: "Jane Austen".into(),
                bio: None,
            })
            .await
            .unwrap();
        repo.books
            .create(&NewBook {
                title: "Pride and Prejudice".into(),
                isbn: "9780141439518".into(),
                description: None,
                published_at: None,
                quantity: 2,
                author_id: author.id,
            })
            .await
            .unwrap();
        repo.users
            .create(&NewUser {
                email: "user@library.com".into(),
                password_hash: "x".into(),
                name: "John Doe".into(),
                role: Role::User,
            })
            .await
            .unwrap();
        store
    }

    fn with_borrows(store: Arc<MemoryStore>, borrows: MockBorrowStore) -> Repository {
        Repository {
            pool: None,
            authors: store.clone(),
            books: store.clone(),
            users: store,
            borrows: Arc::new(borrows),
        }
    }

    fn receipt(new: &NewBorrow) -> BorrowReceipt {
        BorrowReceipt {
            borrow: Borrow {
                id: 1,
                user_id: new.user_id,
                book_id: new.book_id,
                borrowed_at: new.borrowed_at,
                due_at: new.due_at,
                returned_at: None,
            },
            user: UserSummary {
                id: new.user_id,
                name: "John Doe".into(),
                email: "user@library.com".into(),
            },
            book: BookRef {
                id: new.book_id,
                title: "Pride and Prejudice".into(),
                isbn: "9780141439518".into(),
            },
        }
    }

    fn request(due_at: Option<DateTime<Utc>>) -> BorrowBookRequest {
        BorrowBookRequest {
            user_id: 1,
            book_id: 1,
            due_at,
        }
    }

    #[tokio::test]
    async fn test_transient_conflicts_are_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut borrows = MockBorrowStore::new();
        borrows.expect_find_open().returning(|_, _| Ok(None));
        borrows.expect_checkout().returning(move |new| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AppError::TransientConflict("could not serialize access".into()))
            } else {
                Ok(receipt(new))
            }
        });

        let service = BorrowsService::new(with_borrows(seeded_store().await, borrows), config(5));
        let result = service.borrow_book(request(None)).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.borrow.book_id, 1);
    }

    #[tokio::test]
    async fn test_retries_stop_at_max_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut borrows = MockBorrowStore::new();
        borrows.expect_find_open().returning(|_, _| Ok(None));
        borrows.expect_checkout().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(AppError::TransientConflict("deadlock detected".into()))
        });

        let service = BorrowsService::new(with_borrows(seeded_store().await, borrows), config(3));
        let err = service.borrow_book(request(None)).await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_business_errors_are_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut borrows = MockBorrowStore::new();
        borrows.expect_find_open().returning(|_, _| Ok(None));
        borrows.expect_checkout().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(AppError::book_not_available())
        });

        let service = BorrowsService::new(with_borrows(seeded_store().await, borrows), config(5));
        let err = service.borrow_book(request(None)).await.unwrap_err();

        assert!(matches!(err, AppError::Validation(ref m) if m == "Book is not available for borrowing"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_default_and_explicit_due_dates() {
        let mut borrows = MockBorrowStore::new();
        borrows.expect_find_open().returning(|_, _| Ok(None));
        borrows.expect_checkout().returning(|new| Ok(receipt(new)));
        let service = BorrowsService::new(with_borrows(seeded_store().await, borrows), config(5));

        let result = service.borrow_book(request(None)).await.unwrap();
        let loan = result.borrow.due_at - result.borrow.borrowed_at;
        assert_eq!(loan, ChronoDuration::days(14));

        let due = Utc::now() + ChronoDuration::days(3);
        let result = service.borrow_book(request(Some(due))).await.unwrap();
        assert_eq!(result.borrow.due_at, due);
    }

    #[tokio::test]
    async fn test_past_due_date_is_kept() {
        let mut borrows = MockBorrowStore::new();
        borrows.expect_find_open().returning(|_, _| Ok(None));
        borrows.expect_checkout().times(1).returning(|new| Ok(receipt(new)));
        let service = BorrowsService::new(with_borrows(seeded_store().await, borrows), config(5));

        let due = Utc::now() - ChronoDuration::days(1);
        let result = service.borrow_book(request(Some(due))).await.unwrap();
        assert_eq!(result.borrow.due_at, due);
        assert!(result.borrow.due_at < result.borrow.borrowed_at);
    }

    #[tokio::test]
    async fn test_return_of_unknown_borrow() {
        let mut borrows = MockBorrowStore::new();
        borrows.expect_get().returning(|_| Ok(None));
        borrows.expect_checkin().never();
        let service = BorrowsService::new(with_borrows(seeded_store().await, borrows), config(5));

        let err = service.return_book(9).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m == "Borrow record with ID 9 not found"));
    }

    #[test]
    fn test_backoff_grows_and_is_bounded() {
        assert_eq!(backoff(0, 1), Duration::ZERO);
        let first = backoff(10, 1);
        assert!(first >= Duration::from_millis(10) && first <= Duration::from_millis(20));
        let third = backoff(10, 3);
        assert!(third >= Duration::from_millis(40) && third <= Duration::from_millis(50));
        assert!(backoff(10, 50) <= Duration::from_millis(10 * 64 + 10));
    }
}
