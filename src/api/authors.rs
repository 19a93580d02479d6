//! Author endpoints

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::{AppResult, ErrorResponse},
    models::{
        author::{Author, AuthorListEntry, AuthorWithBooks, CreateAuthor, UpdateAuthor},
        user::SearchQuery,
    },
    AppState,
};

use super::{AppJson, AppPath, AppQuery, AuthenticatedUser};

/// List authors
#[utoipa::path(
    get,
    path = "/authors",
    tag = "authors",
    params(SearchQuery),
    responses(
        (status = 200, description = "Authors ordered by name", body = Vec<AuthorListEntry>)
    )
)]
pub async fn list_authors(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<SearchQuery>,
) -> AppResult<Json<Vec<AuthorListEntry>>> {
    let authors = state.services.authors.find_all(query.search).await?;
    Ok(Json(authors))
}

/// Get an author with their books
#[utoipa::path(
    get,
    path = "/authors/{id}",
    tag = "authors",
    params(("id" = i32, Path, description = "Author ID")),
    responses(
        (status = 200, description = "Author details", body = AuthorWithBooks),
        (status = 404, description = "Author not found", body = ErrorResponse)
    )
)]
pub async fn get_author(
    State(state): State<AppState>,
    AppPath(id): AppPath<i32>,
) -> AppResult<Json<AuthorWithBooks>> {
    let author = state.services.authors.find_one(id).await?;
    Ok(Json(author))
}

/// Create an author
#[utoipa::path(
    post,
    path = "/authors",
    tag = "authors",
    security(("bearer_auth" = [])),
    request_body = CreateAuthor,
    responses(
        (status = 201, description = "Author created", body = AuthorWithBooks),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    )
)]
pub async fn create_author(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    AppJson(request): AppJson<CreateAuthor>,
) -> AppResult<(StatusCode, Json<AuthorWithBooks>)> {
    let author = state.services.authors.create(request).await?;
    Ok((StatusCode::CREATED, Json(author)))
}

/// Update an author
#[utoipa::path(
    patch,
    path = "/authors/{id}",
    tag = "authors",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Author ID")),
    request_body = UpdateAuthor,
    responses(
        (status = 200, description = "Author updated", body = AuthorWithBooks),
        (status = 404, description = "Author not found", body = ErrorResponse)
    )
)]
pub async fn update_author(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    AppPath(id): AppPath<i32>,
    AppJson(request): AppJson<UpdateAuthor>,
) -> AppResult<Json<AuthorWithBooks>> {
    let author = state.services.authors.update(id, request).await?;
    Ok(Json(author))
}

/// Delete an author without books
#[utoipa::path(
    delete,
    path = "/authors/{id}",
    tag = "authors",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Author ID")),
    responses(
        (status = 200, description = "Deleted author", body = Author),
        (status = 400, description = "Author still has books", body = ErrorResponse),
        (status = 404, description = "Author not found", body = ErrorResponse)
    )
)]
pub async fn delete_author(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    AppPath(id): AppPath<i32>,
) -> AppResult<Json<Author>> {
    let author = state.services.authors.remove(id).await?;
    Ok(Json(author))
}
