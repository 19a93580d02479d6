//! User management endpoints

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::{AppResult, ErrorResponse},
    models::user::{CreateUser, SearchQuery, UserDetails, UserListEntry, UserProfile},
    AppState,
};

use super::{AppJson, AppPath, AppQuery, AuthenticatedUser};

/// List users
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    params(SearchQuery),
    responses(
        (status = 200, description = "Users ordered by name", body = Vec<UserListEntry>),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    AppQuery(query): AppQuery<SearchQuery>,
) -> AppResult<Json<Vec<UserListEntry>>> {
    let users = state.services.users.find_all(query.search).await?;
    Ok(Json(users))
}

/// Get user details with open borrows
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "User details", body = UserDetails),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    AppPath(id): AppPath<i32>,
) -> AppResult<Json<UserDetails>> {
    let user = state.services.users.find_one(id).await?;
    Ok(Json(user))
}

/// Create a new user
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created", body = UserProfile),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    AppJson(request): AppJson<CreateUser>,
) -> AppResult<(StatusCode, Json<UserProfile>)> {
    let user = state.services.users.create(request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}
