//! HTTP API tests against the router backed by the in-memory store

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use library_server::{api, config::AppConfig, repository::Repository, AppState};

fn app() -> Router {
    api::router(AppState::new(AppConfig::default(), Repository::in_memory()))
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

/// Register an account and return its token and id
async fn register(app: &Router, email: &str) -> (String, i64) {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "email": email, "password": "secret1", "name": "Test Reader" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    (
        body["accessToken"].as_str().unwrap().to_string(),
        body["user"]["id"].as_i64().unwrap(),
    )
}

/// Create an author and one book with `quantity` copies, returning the book id
async fn book(app: &Router, token: &str, quantity: i32) -> i64 {
    let (status, author) = send(
        app,
        Method::POST,
        "/api/authors",
        Some(token),
        Some(json!({ "name": "George Orwell", "bio": "English novelist" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{author}");
    assert_eq!(author["_count"]["books"], 0);

    let (status, book) = send(
        app,
        Method::POST,
        "/api/books",
        Some(token),
        Some(json!({
            "title": "1984",
            "isbn": "9780451524935",
            "publishedAt": "1949-06-08",
            "quantity": quantity,
            "authorId": author["id"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{book}");
    assert_eq!(book["available"], quantity);
    assert_eq!(book["author"]["name"], "George Orwell");
    book["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (status, body) = send(&app(), Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&app(), Method::GET, "/api/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let (status, body) = send(&app(), Method::GET, "/api-docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/borrows/borrow"].is_object());
}

#[tokio::test]
async fn test_guarded_routes_need_a_token() {
    let app = app();

    let (status, body) = send(&app, Method::POST, "/api/authors", None, Some(json!({ "name": "Nobody" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["statusCode"], 401);
    assert_eq!(body["error"], "Unauthorized");

    let (status, _) = send(&app, Method::GET, "/api/borrows", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Catalog reads are public
    let (status, body) = send(&app, Method::GET, "/api/books", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 0);
    assert_eq!(body["meta"]["page"], 1);
    assert_eq!(body["meta"]["limit"], 10);
}

#[tokio::test]
async fn test_login_and_me() {
    let app = app();
    let (_, id) = register(&app, "reader@library.com").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "reader@library.com", "password": "secret1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["user"].get("passwordHash").is_none());
    let token = body["accessToken"].as_str().unwrap().to_string();

    let (status, me) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], id);
    assert_eq!(me["role"], "USER");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "reader@library.com", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid credentials");
}

#[tokio::test]
async fn test_validation_errors_are_400() {
    let app = app();
    let (token, _) = register(&app, "reader@library.com").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/books",
        Some(&token),
        Some(json!({ "title": "Bad", "isbn": "abc", "authorId": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["statusCode"], 400);

    let (status, _) = send(&app, Method::GET, "/api/books?limit=0", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/api/books/abc", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/borrows/borrow",
        Some(&token),
        Some(json!({ "userId": "one" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Bad Request");
}

#[tokio::test]
async fn test_borrow_and_return_flow() {
    let app = app();
    let (token, user_id) = register(&app, "reader@library.com").await;
    let book_id = book(&app, &token, 1).await;

    let (status, receipt) = send(
        &app,
        Method::POST,
        "/api/borrows/borrow",
        Some(&token),
        Some(json!({ "userId": user_id, "bookId": book_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{receipt}");
    assert_eq!(receipt["book"]["title"], "1984");
    assert_eq!(receipt["user"]["id"], user_id);
    assert!(receipt["returnedAt"].is_null());
    let borrow_id = receipt["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/borrows/borrow",
        Some(&token),
        Some(json!({ "userId": user_id, "bookId": book_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Book is not available for borrowing");

    let (status, page) = send(&app, Method::GET, "/api/books?available=false", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["meta"]["total"], 1);
    assert_eq!(page["data"][0]["_count"]["borrows"], 1);

    let (status, list) = send(&app, Method::GET, &format!("/api/borrows/user/{}", user_id), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["book"]["author"]["name"], "George Orwell");

    let (status, returned) = send(
        &app,
        Method::POST,
        "/api/borrows/return",
        Some(&token),
        Some(json!({ "borrowId": borrow_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(returned["returnedAt"].is_string());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/borrows/return",
        Some(&token),
        Some(json!({ "borrowId": borrow_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Book has already been returned");

    let (_, open) = send(&app, Method::GET, "/api/borrows", Some(&token), None).await;
    assert!(open.as_array().unwrap().is_empty());
    let (_, all) = send(&app, Method::GET, "/api/borrows?includeReturned=true", Some(&token), None).await;
    assert_eq!(all.as_array().unwrap().len(), 1);

    let (status, details) = send(&app, Method::GET, &format!("/api/borrows/{}", borrow_id), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["book"]["author"]["name"], "George Orwell");
}

#[tokio::test]
async fn test_missing_resources_are_404() {
    let app = app();
    let (token, _) = register(&app, "reader@library.com").await;

    let (status, body) = send(&app, Method::GET, "/api/books/42", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Book with ID 42 not found");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/borrows/return",
        Some(&token),
        Some(json!({ "borrowId": 7 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Borrow record with ID 7 not found");

    let (status, _) = send(&app, Method::GET, "/api/users/99", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duplicates_are_409() {
    let app = app();
    let (token, _) = register(&app, "reader@library.com").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "email": "READER@library.com", "password": "secret1", "name": "Again" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "User with this email already exists");

    let book_id = book(&app, &token, 2).await;
    let (_, existing) = send(&app, Method::GET, &format!("/api/books/{}", book_id), None, None).await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/books",
        Some(&token),
        Some(json!({ "title": "Copy", "isbn": "9780451524935", "authorId": existing["authorId"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Book with this ISBN already exists");
}

#[tokio::test]
async fn test_author_with_books_cannot_be_deleted() {
    let app = app();
    let (token, _) = register(&app, "reader@library.com").await;
    let book_id = book(&app, &token, 1).await;
    let (_, book) = send(&app, Method::GET, &format!("/api/books/{}", book_id), None, None).await;
    let author_id = book["authorId"].as_i64().unwrap();

    let (status, body) = send(&app, Method::DELETE, &format!("/api/authors/{}", author_id), Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cannot delete author with existing books");

    let (status, _) = send(&app, Method::DELETE, &format!("/api/books/{}", book_id), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::DELETE, &format!("/api/authors/{}", author_id), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_due_date_is_stored_as_given() {
    let app = app();
    let (token, user_id) = register(&app, "reader@library.com").await;
    let book_id = book(&app, &token, 2).await;

    let (status, receipt) = send(
        &app,
        Method::POST,
        "/api/borrows/borrow",
        Some(&token),
        Some(json!({ "userId": user_id, "bookId": book_id, "dueAt": "2020-01-15T10:30:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{receipt}");
    assert_eq!(receipt["dueAt"], "2020-01-15T10:30:00Z");
}

#[tokio::test]
async fn test_extreme_paging_values() {
    let app = app();
    let (token, _) = register(&app, "reader@library.com").await;
    book(&app, &token, 1).await;

    let (status, page) = send(&app, Method::GET, "/api/books?page=9223372036854775807", None, None).await;
    assert_eq!(status, StatusCode::OK, "{page}");
    assert!(page["data"].as_array().unwrap().is_empty());
    assert_eq!(page["meta"]["total"], 1);
    assert_eq!(page["meta"]["totalPages"], 1);

    let (status, page) = send(&app, Method::GET, "/api/books?limit=1000", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["data"].as_array().unwrap().len(), 1);
    assert_eq!(page["meta"]["limit"], 1000);
}
