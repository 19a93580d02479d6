//! Tests against a real Postgres database
//!
//! Run with: DATABASE_URL=postgres://... cargo test --test postgres_tests -- --ignored

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;

use library_server::{
    config::AppConfig,
    models::{
        author::CreateAuthor,
        book::{NewBook, UpdateBook},
        borrow::BorrowBookRequest,
        user::{NewUser, Role},
    },
    repository::Repository,
    services::Services,
    AppError,
};

async fn connect() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPool::connect(&url).await.expect("Failed to connect to database");
    sqlx::migrate!("./migrations").run(&pool).await.expect("Failed to run migrations");
    pool
}

/// Digits unique to this run so repeated runs don't collide on ISBN or email
fn run_id() -> String {
    format!("{:013}", Utc::now().timestamp_micros() % 10_000_000_000_000)
}

/// One fresh book with `copies` copies and `readers` fresh users
async fn fixture(repository: &Repository, copies: i32, readers: usize) -> (i32, Vec<i32>) {
    let tag = run_id();
    let author = repository
        .authors
        .create(&CreateAuthor {
            name: format!("Author {}", tag),
            bio: None,
        })
        .await
        .unwrap();
    let book = repository
        .books
        .create(&NewBook {
            title: format!("Book {}", tag),
            isbn: tag.clone(),
            description: None,
            published_at: None,
            quantity: copies,
            author_id: author.id,
        })
        .await
        .unwrap();

    let mut users = Vec::new();
    for i in 0..readers {
        let user = repository
            .users
            .create(&NewUser {
                email: format!("reader{}-{}@test.local", i, tag),
                password_hash: "not-a-real-hash".into(),
                name: format!("Reader {}", i),
                role: Role::User,
            })
            .await
            .unwrap();
        users.push(user.id);
    }
    (book.id, users)
}

fn request(user_id: i32, book_id: i32) -> BorrowBookRequest {
    BorrowBookRequest {
        user_id,
        book_id,
        due_at: None,
    }
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_checkout_and_checkin() {
    let repository = Repository::new(connect().await);
    let services = Services::new(repository.clone(), &AppConfig::default());
    let (book_id, users) = fixture(&repository, 2, 1).await;

    let receipt = services.borrows.borrow_book(request(users[0], book_id)).await.unwrap();
    assert_eq!(repository.books.get(book_id).await.unwrap().unwrap().available, 1);

    let err = services.borrows.borrow_book(request(users[0], book_id)).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(ref m) if m == "User already has this book borrowed"));

    let returned = services.borrows.return_book(receipt.borrow.id).await.unwrap();
    assert!(returned.borrow.returned_at.is_some());
    assert_eq!(repository.books.get(book_id).await.unwrap().unwrap().available, 2);

    let err = services.borrows.return_book(receipt.borrow.id).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(ref m) if m == "Book has already been returned"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_checkouts_never_oversell() {
    let repository = Repository::new(connect().await);
    let services = Arc::new(Services::new(repository.clone(), &AppConfig::default()));
    let (book_id, users) = fixture(&repository, 3, 12).await;

    let handles: Vec<_> = users
        .iter()
        .map(|&user_id| {
            let services = services.clone();
            tokio::spawn(async move { services.borrows.borrow_book(request(user_id, book_id)).await })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(AppError::Validation(m)) => assert_eq!(m, "Book is not available for borrowing"),
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(succeeded, 3);
    assert_eq!(repository.books.get(book_id).await.unwrap().unwrap().available, 0);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_constraint_violations_are_classified() {
    let repository = Repository::new(connect().await);
    let (book_id, _) = fixture(&repository, 1, 0).await;
    let book = repository.books.get(book_id).await.unwrap().unwrap();

    let err = repository
        .books
        .create(&NewBook {
            title: "Duplicate".into(),
            isbn: book.isbn.clone(),
            description: None,
            published_at: None,
            quantity: 1,
            author_id: book.author_id,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(ref m) if m == "Book with this ISBN already exists"));

    let err = repository.authors.delete(book.author_id).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(ref m) if m == "Cannot delete author with existing books"));

    let updated = repository
        .books
        .update(
            book_id,
            &UpdateBook {
                quantity: Some(4),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!((updated.quantity, updated.available), (4, 4));
}
