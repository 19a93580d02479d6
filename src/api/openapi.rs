//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, authors, books, borrows, health, users};
use crate::models;

/// Registers the bearer token scheme referenced by guarded paths
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Library API",
        version = "1.0.0",
        description = "Library management REST API: users, authors, books and borrows",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api", description = "API")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::login,
        auth::me,
        // Authors
        authors::list_authors,
        authors::get_author,
        authors::create_author,
        authors::update_author,
        authors::delete_author,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Users
        users::list_users,
        users::get_user,
        users::create_user,
        // Borrows
        borrows::borrow_book,
        borrows::return_book,
        borrows::list_borrows,
        borrows::list_user_borrows,
        borrows::get_borrow,
    ),
    components(
        schemas(
            // Auth
            auth::LoginRequest,
            auth::AuthResponse,
            // Authors
            models::author::Author,
            models::author::AuthorRef,
            models::author::AuthorWithBooks,
            models::author::AuthorListEntry,
            models::author::CreateAuthor,
            models::author::UpdateAuthor,
            models::BooksCount,
            // Books
            models::book::Book,
            models::book::BookRef,
            models::book::BookWithAuthor,
            models::book::BookListEntry,
            models::book::BookOpenBorrow,
            models::book::BookDetails,
            models::book::BookPage,
            models::book::PageMeta,
            models::book::CreateBook,
            models::book::UpdateBook,
            // Users
            models::user::Role,
            models::user::UserProfile,
            models::user::UserSummary,
            models::user::UserListEntry,
            models::user::UserOpenBorrow,
            models::user::UserDetails,
            models::user::CreateUser,
            models::BorrowsCount,
            // Borrows
            models::borrow::Borrow,
            models::borrow::BorrowReceipt,
            models::borrow::BookRefWithAuthor,
            models::borrow::BorrowListEntry,
            models::borrow::BorrowedBook,
            models::borrow::UserBorrowEntry,
            models::borrow::BorrowDetails,
            models::borrow::BorrowBookRequest,
            models::borrow::ReturnBookRequest,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Registration, login and current user"),
        (name = "authors", description = "Author management"),
        (name = "books", description = "Book catalog"),
        (name = "users", description = "User management"),
        (name = "borrows", description = "Borrowing and returning books")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_borrow_routes_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/borrows/borrow"));
        assert!(doc.paths.paths.contains_key("/books/{id}"));

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(components.schemas.contains_key("BorrowReceipt"));
    }
}
