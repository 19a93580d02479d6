//! Borrow lifecycle endpoints

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::{AppResult, ErrorResponse},
    models::borrow::{
        BorrowBookRequest, BorrowDetails, BorrowListEntry, BorrowListQuery, BorrowReceipt,
        ReturnBookRequest, UserBorrowEntry,
    },
    AppState,
};

use super::{AppJson, AppPath, AppQuery, AuthenticatedUser};

/// Borrow a book
#[utoipa::path(
    post,
    path = "/borrows/borrow",
    tag = "borrows",
    security(("bearer_auth" = [])),
    request_body = BorrowBookRequest,
    responses(
        (status = 201, description = "Book borrowed", body = BorrowReceipt),
        (status = 400, description = "No copy available or already borrowed", body = ErrorResponse),
        (status = 404, description = "User or book not found", body = ErrorResponse),
        (status = 503, description = "Too much contention, retry later", body = ErrorResponse)
    )
)]
pub async fn borrow_book(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    AppJson(request): AppJson<BorrowBookRequest>,
) -> AppResult<(StatusCode, Json<BorrowReceipt>)> {
    let receipt = state.services.borrows.borrow_book(request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/borrows/return",
    tag = "borrows",
    security(("bearer_auth" = [])),
    request_body = ReturnBookRequest,
    responses(
        (status = 200, description = "Book returned", body = BorrowReceipt),
        (status = 400, description = "Already returned", body = ErrorResponse),
        (status = 404, description = "Borrow record not found", body = ErrorResponse),
        (status = 503, description = "Too much contention, retry later", body = ErrorResponse)
    )
)]
pub async fn return_book(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    AppJson(request): AppJson<ReturnBookRequest>,
) -> AppResult<Json<BorrowReceipt>> {
    let receipt = state.services.borrows.return_book(request.borrow_id).await?;
    Ok(Json(receipt))
}

/// List borrows
#[utoipa::path(
    get,
    path = "/borrows",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(BorrowListQuery),
    responses(
        (status = 200, description = "Borrows, newest first", body = Vec<BorrowListEntry>)
    )
)]
pub async fn list_borrows(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    AppQuery(query): AppQuery<BorrowListQuery>,
) -> AppResult<Json<Vec<BorrowListEntry>>> {
    let borrows = state.services.borrows.find_all(query.include_returned()).await?;
    Ok(Json(borrows))
}

/// List the borrows of one user
#[utoipa::path(
    get,
    path = "/borrows/user/{user_id}",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("user_id" = i32, Path, description = "User ID"),
        BorrowListQuery
    ),
    responses(
        (status = 200, description = "User's borrows, newest first", body = Vec<UserBorrowEntry>),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
pub async fn list_user_borrows(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    AppPath(user_id): AppPath<i32>,
    AppQuery(query): AppQuery<BorrowListQuery>,
) -> AppResult<Json<Vec<UserBorrowEntry>>> {
    let borrows = state
        .services
        .borrows
        .find_by_user(user_id, query.include_returned())
        .await?;
    Ok(Json(borrows))
}

/// Get one borrow record
#[utoipa::path(
    get,
    path = "/borrows/{id}",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrow ID")),
    responses(
        (status = 200, description = "Borrow details", body = BorrowDetails),
        (status = 404, description = "Borrow record not found", body = ErrorResponse)
    )
)]
pub async fn get_borrow(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    AppPath(id): AppPath<i32>,
) -> AppResult<Json<BorrowDetails>> {
    let borrow = state.services.borrows.find_one(id).await?;
    Ok(Json(borrow))
}
