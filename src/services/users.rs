//! User catalog service and password hashing

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::user::{CreateUser, NewUser, Role, User, UserDetails, UserListEntry, UserProfile},
    repository::Repository,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
}

impl UsersService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Register a user with the default role
    pub async fn create(&self, user: CreateUser) -> AppResult<UserProfile> {
        self.create_with_role(user, Role::User).await
    }

    pub async fn create_with_role(&self, user: CreateUser, role: Role) -> AppResult<UserProfile> {
        user.validate()?;
        let email = user.email.trim().to_lowercase();

        if self.repository.users.get_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("User with this email already exists".to_string()));
        }

        let created = self
            .repository
            .users
            .create(&NewUser {
                email,
                password_hash: hash_password(&user.password)?,
                name: user.name,
                role,
            })
            .await?;

        tracing::info!(user_id = created.id, role = ?created.role, "User created");
        Ok(UserProfile::from(created))
    }

    /// Users by name, optionally filtered on name or email
    pub async fn find_all(&self, search: Option<String>) -> AppResult<Vec<UserListEntry>> {
        self.repository.users.list(search).await
    }

    pub async fn find_one(&self, id: i32) -> AppResult<UserDetails> {
        self.repository
            .users
            .details(id)
            .await?
            .ok_or_else(|| AppError::not_found("User", id))
    }

    pub async fn get(&self, id: i32) -> AppResult<Option<User>> {
        self.repository.users.get(id).await
    }

    /// Check an email/password pair, returning the user on success
    pub async fn verify_credentials(&self, email: &str, password: &str) -> AppResult<Option<User>> {
        let Some(user) = self.repository.users.get_by_email(email.trim()).await? else {
            return Ok(None);
        };
        if verify_password(&user.password_hash, password)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
