//! Token issuance and verification

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{CreateUser, User, UserClaims, UserProfile},
};

use super::users::UsersService;

#[derive(Clone)]
pub struct AuthService {
    users: UsersService,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(users: UsersService, config: AuthConfig) -> Self {
        Self { users, config }
    }

    fn issue_token(&self, user: &User) -> AppResult<String> {
        UserClaims::new(user, self.config.jwt_expiration_hours)
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Create an account and log it in
    pub async fn register(&self, user: CreateUser) -> AppResult<(String, UserProfile)> {
        let email = user.email.clone();
        let password = user.password.clone();
        self.users.create(user).await?;
        self.login(&email, &password).await
    }

    pub async fn login(&self, email: &str, password: &str) -> AppResult<(String, UserProfile)> {
        let user = self
            .users
            .verify_credentials(email, password)
            .await?
            .ok_or_else(|| {
                tracing::debug!("Rejected login attempt");
                AppError::Authentication("Invalid credentials".to_string())
            })?;

        let token = self.issue_token(&user)?;
        tracing::info!(user_id = user.id, "User logged in");
        Ok((token, UserProfile::from(user)))
    }

    /// Resolve a bearer token to a current user
    pub async fn authenticate(&self, token: &str) -> AppResult<UserProfile> {
        let claims = UserClaims::from_token(token, &self.config.jwt_secret)
            .map_err(|_| AppError::Authentication("Invalid or expired token".to_string()))?;

        let user = self
            .users
            .get(claims.sub)
            .await?
            .ok_or_else(|| AppError::Authentication("User no longer exists".to_string()))?;
        Ok(UserProfile::from(user))
    }
}
