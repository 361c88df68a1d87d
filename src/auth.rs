//! Authentication gate: user registration, login and bearer-token checks.
//!
//! Passwords are stored as a salted SHA-256 digest. Tokens are stateless:
//! `<user-id>.<issued-unix-seconds>.<hex signature>`, where the signature is
//! HMAC-SHA256 keyed by the server secret over the user id and issue time.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;

use crate::error::AuthError;
use crate::store::JsonFile;
use crate::task::UserId;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRecord {
    id: UserId,
    username: String,
    email: String,
    password_salt: String,
    password_digest: String,
    created_at: DateTime<Utc>,
}

impl UserRecord {
    fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }
}

/// The public view of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

fn password_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl,
        }
    }

    /// A signer with a random secret; tokens do not survive a restart.
    pub fn ephemeral(ttl: Duration) -> Self {
        Self::new(rand::random::<[u8; 32]>().to_vec(), ttl)
    }

    fn mac(&self, user: UserId, issued: i64) -> Result<HmacSha256, AuthError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| AuthError::InvalidToken)?;
        mac.update(user.to_string().as_bytes());
        mac.update(b".");
        mac.update(&issued.to_be_bytes());
        Ok(mac)
    }

    pub fn issue(&self, user: UserId, now: DateTime<Utc>) -> Result<String, AuthError> {
        let issued = now.timestamp();
        let signature = hex::encode(self.mac(user, issued)?.finalize().into_bytes());
        Ok(format!("{user}.{issued}.{signature}"))
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<UserId, AuthError> {
        let mut parts = token.splitn(3, '.');
        let (Some(user), Some(issued), Some(signature)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::InvalidToken);
        };
        let user: UserId = user.parse().map_err(|_| AuthError::InvalidToken)?;
        let issued: i64 = issued.parse().map_err(|_| AuthError::InvalidToken)?;

        let signature = hex::decode(signature).map_err(|_| AuthError::InvalidToken)?;
        self.mac(user, issued)?
            .verify_slice(&signature)
            .map_err(|_| AuthError::InvalidToken)?;

        let age = now.timestamp().saturating_sub(issued);
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        if age < 0 || age > ttl {
            return Err(AuthError::InvalidToken);
        }
        Ok(user)
    }
}

/// Registered users, optionally mirrored to a JSON file.
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: RwLock<Vec<UserRecord>>,
    file: Option<JsonFile>,
}

impl UserDirectory {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub async fn open(file: JsonFile) -> Result<Self, AuthError> {
        let users: Vec<UserRecord> = file.load().await?;
        tracing::info!(path = %file.path().display(), count = users.len(), "loaded users");
        Ok(Self {
            users: RwLock::new(users),
            file: Some(file),
        })
    }

    async fn register(&self, request: RegisterRequest) -> Result<UserProfile, AuthError> {
        let username = request.username.trim();
        let email = request.email.trim().to_lowercase();
        if username.is_empty() {
            return Err(AuthError::MissingField("a username"));
        }
        if email.is_empty() {
            return Err(AuthError::MissingField("an email"));
        }
        if request.password.is_empty() {
            return Err(AuthError::MissingField("a password"));
        }

        let mut users = self.users.write().await;
        if users.iter().any(|u| u.email == email) {
            return Err(AuthError::UserExists);
        }

        let salt = hex::encode(rand::random::<[u8; 16]>());
        let record = UserRecord {
            id: UserId::generate(),
            username: username.to_string(),
            password_digest: password_digest(&salt, &request.password),
            password_salt: salt,
            email,
            created_at: Utc::now(),
        };
        users.push(record.clone());
        if let Some(file) = &self.file {
            if let Err(err) = file.save(&*users).await {
                users.pop();
                return Err(err.into());
            }
        }
        Ok(record.profile())
    }

    async fn authenticate(&self, request: &LoginRequest) -> Result<UserProfile, AuthError> {
        if request.email.trim().is_empty() {
            return Err(AuthError::MissingField("an email"));
        }
        if request.password.is_empty() {
            return Err(AuthError::MissingField("a password"));
        }

        let email = request.email.trim().to_lowercase();
        let users = self.users.read().await;
        let user = users
            .iter()
            .find(|u| u.email == email)
            .ok_or(AuthError::InvalidCredentials)?;
        let digest = password_digest(&user.password_salt, &request.password);
        if !bool::from(digest.as_bytes().ct_eq(user.password_digest.as_bytes())) {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(user.profile())
    }

    async fn exists(&self, id: UserId) -> bool {
        self.users.read().await.iter().any(|u| u.id == id)
    }
}

/// The capability the HTTP layer needs: issue tokens and resolve them back
/// to a user.
pub struct Authenticator {
    users: UserDirectory,
    signer: TokenSigner,
}

impl Authenticator {
    pub fn new(users: UserDirectory, signer: TokenSigner) -> Self {
        Self { users, signer }
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, AuthError> {
        let user = self.users.register(request).await?;
        tracing::info!(user = %user.id, "user registered");
        Ok(AuthResponse {
            token: self.signer.issue(user.id, Utc::now())?,
            user,
        })
    }

    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, AuthError> {
        match self.users.authenticate(&request).await {
            Ok(user) => {
                tracing::info!(user = %user.id, "user logged in");
                Ok(AuthResponse {
                    token: self.signer.issue(user.id, Utc::now())?,
                    user,
                })
            }
            Err(err) => {
                tracing::warn!(error = %err, "login rejected");
                Err(err)
            }
        }
    }

    /// Resolves a bearer token to the user it was issued for. Tokens for
    /// users no longer in the directory are rejected.
    pub async fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let user = self.signer.verify(token, Utc::now())?;
        if !self.users.exists(user).await {
            return Err(AuthError::InvalidToken);
        }
        Ok(user)
    }
}
