//! Book catalog endpoints

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::{AppResult, ErrorResponse},
    models::book::{Book, BookDetails, BookFilter, BookPage, BookWithAuthor, CreateBook, UpdateBook},
    AppState,
};

use super::{AppJson, AppPath, AppQuery, AuthenticatedUser};

/// Search the catalog
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    params(BookFilter),
    responses(
        (status = 200, description = "One page of books", body = BookPage),
        (status = 400, description = "Invalid pagination", body = ErrorResponse)
    )
)]
pub async fn list_books(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<BookFilter>,
) -> AppResult<Json<BookPage>> {
    let page = state.services.books.find_all(filter).await?;
    Ok(Json(page))
}

/// Get book details with open borrows
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book details", body = BookDetails),
        (status = 404, description = "Book not found", body = ErrorResponse)
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    AppPath(id): AppPath<i32>,
) -> AppResult<Json<BookDetails>> {
    let book = state.services.books.find_one(id).await?;
    Ok(Json(book))
}

/// Add a book to the catalog
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = BookWithAuthor),
        (status = 400, description = "Invalid request or unknown author", body = ErrorResponse),
        (status = 409, description = "ISBN already exists", body = ErrorResponse)
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    AppJson(request): AppJson<CreateBook>,
) -> AppResult<(StatusCode, Json<BookWithAuthor>)> {
    let book = state.services.books.create(request).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// Update a book
#[utoipa::path(
    patch,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = BookWithAuthor),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Book not found", body = ErrorResponse),
        (status = 409, description = "ISBN already exists", body = ErrorResponse)
    )
)]
pub async fn update_book(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    AppPath(id): AppPath<i32>,
    AppJson(request): AppJson<UpdateBook>,
) -> AppResult<Json<BookWithAuthor>> {
    let book = state.services.books.update(id, request).await?;
    Ok(Json(book))
}

/// Delete a book that was never borrowed
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Deleted book", body = Book),
        (status = 400, description = "Book has borrow records", body = ErrorResponse),
        (status = 404, description = "Book not found", body = ErrorResponse)
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    AppPath(id): AppPath<i32>,
) -> AppResult<Json<Book>> {
    let book = state.services.books.remove(id).await?;
    Ok(Json(book))
}
