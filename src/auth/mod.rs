use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{web, FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use futures_util::future::{ready, Ready};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::AppState;
use crate::config::Config;
use crate::error::ApiError;
use crate::models::{AccessToken, Post, TokenPair, User};
use crate::store::{Store, StoreError};

const BAD_CREDENTIALS: &str = "No active account found with the given credentials";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,      // user_id
    pub exp: i64,         // expiration timestamp
    pub iat: i64,         // issued at
    pub token_type: TokenType,
}

pub struct AuthService {
    jwt_secret: String,
    store: Arc<Store>,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(jwt_secret: String, store: Arc<Store>) -> Self {
        Self {
            jwt_secret,
            store,
            access_lifetime: Duration::minutes(60),
            refresh_lifetime: Duration::days(1),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }

    pub fn from_config(config: &Config, store: Arc<Store>) -> Self {
        Self::new(config.jwt_secret.clone(), store)
            .with_lifetimes(
                Duration::minutes(config.access_token_minutes),
                Duration::days(config.refresh_token_days),
            )
            .with_bcrypt_cost(config.bcrypt_cost)
    }

    pub fn with_lifetimes(mut self, access: Duration, refresh: Duration) -> Self {
        self.access_lifetime = access;
        self.refresh_lifetime = refresh;
        self
    }

    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    /// Hash a password using bcrypt
    pub fn hash_password(&self, password: &str) -> Result<String, bcrypt::BcryptError> {
        bcrypt::hash(password, self.bcrypt_cost)
    }

    /// Verify a password against a bcrypt hash
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
        bcrypt::verify(password, hash)
    }

    fn generate_token(
        &self,
        user_id: &str,
        token_type: TokenType,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let lifetime = match token_type {
            TokenType::Access => self.access_lifetime,
            TokenType::Refresh => self.refresh_lifetime,
        };

        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + lifetime).timestamp(),
            iat: now.timestamp(),
            token_type,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
    }

    pub fn generate_access_token(&self, user_id: &str) -> Result<String, jsonwebtoken::errors::Error> {
        self.generate_token(user_id, TokenType::Access)
    }

    pub fn generate_token_pair(&self, user_id: &str) -> Result<TokenPair, jsonwebtoken::errors::Error> {
        Ok(TokenPair {
            access: self.generate_token(user_id, TokenType::Access)?,
            refresh: self.generate_token(user_id, TokenType::Refresh)?,
        })
    }

    /// Validate a JWT and check that it is of the expected kind
    pub fn validate_token(
        &self,
        token: &str,
        expected: TokenType,
    ) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )?;
        if token_data.claims.token_type != expected {
            return Err(ErrorKind::InvalidToken.into());
        }
        Ok(token_data.claims)
    }

    /// Exchange username and password for an access/refresh pair
    pub fn login(&self, username: &str, password: &str) -> Result<TokenPair, ApiError> {
        let user = match self.store.get_user_by_username(username) {
            Ok(u) => u,
            Err(StoreError::NotFound(_)) => {
                return Err(ApiError::Unauthorized(BAD_CREDENTIALS.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let valid = self
            .verify_password(password, &user.password_hash)
            .unwrap_or(false);
        if !valid {
            log::debug!("Failed login for {}", username);
            return Err(ApiError::Unauthorized(BAD_CREDENTIALS.to_string()));
        }

        Ok(self.generate_token_pair(&user.id)?)
    }

    /// Issue a new access token from a refresh token
    pub fn refresh(&self, refresh_token: &str) -> Result<AccessToken, ApiError> {
        let claims = self
            .validate_token(refresh_token, TokenType::Refresh)
            .map_err(|_| ApiError::Unauthorized("Token is invalid or expired".to_string()))?;

        // The account may have been deleted since the refresh token was issued
        self.load_account(&claims.sub)?;

        Ok(AccessToken {
            access: self.generate_access_token(&claims.sub)?,
        })
    }

    /// Resolve a bearer access token to the account it belongs to
    pub fn authenticate(&self, token: &str) -> Result<AuthUser, ApiError> {
        let claims = self
            .validate_token(token, TokenType::Access)
            .map_err(|_| ApiError::Unauthorized("Invalid token".to_string()))?;
        let user = self.load_account(&claims.sub)?;
        Ok(AuthUser::from(&user))
    }

    /// Create a staff account unless the username is already taken.
    /// Returns whether an account was created.
    pub fn ensure_staff_account(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<bool, ApiError> {
        match self.store.get_user_by_username(username) {
            Ok(_) => return Ok(false),
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let mut user = User {
            id: String::new(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: self.hash_password(password)?,
            profile_picture: None,
            bio: String::new(),
            is_staff: true,
            date_joined: Utc::now(),
        };
        self.store.create_user(&mut user)?;
        Ok(true)
    }

    fn load_account(&self, user_id: &str) -> Result<User, ApiError> {
        match self.store.get_user(user_id) {
            Ok(user) => Ok(user),
            Err(StoreError::NotFound(_)) => Err(ApiError::Unauthorized("User not found".to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

/// Authenticated account extracted from the `Authorization: Bearer` header
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub username: String,
    pub is_staff: bool,
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            username: user.username.clone(),
            is_staff: user.is_staff,
        }
    }
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract_auth(req))
    }
}

fn extract_auth(req: &HttpRequest) -> Result<AuthUser, ApiError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| ApiError::Internal("AppState not registered".to_string()))?;

    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            ApiError::Unauthorized("Authentication credentials were not provided.".to_string())
        })?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header format".to_string()))?;

    state.auth_service.authenticate(token.trim())
}

/// Profiles may be changed by their owner or by staff
pub fn can_modify_profile(actor: &AuthUser, target: &User) -> bool {
    actor.user_id == target.id || actor.is_staff
}

/// Posts may be deleted by their author or by staff
pub fn can_modify_post(actor: &AuthUser, post: &Post) -> bool {
    actor.user_id == post.user_id || actor.is_staff
}
