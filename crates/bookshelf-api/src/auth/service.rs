//! Authentication service layer
//!
//! Registration and login on top of the user repository. Password hashing
//! is CPU-bound and runs on the blocking thread pool.

use super::middleware::Identity;
use super::password::{hash_password_with_config, verify_password, PasswordConfig};
use super::token::TokenService;
use crate::audit::{audit_log, AuditEvent, ClientInfo};
use crate::error::AppError;
use bookshelf_core::{BookshelfError, NewUser, Role, User, UserRepository};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;
use utoipa::ToSchema;

/// Message for every failed login, whatever the cause
pub const LOGIN_FAILED_MESSAGE: &str = "Invalid username or password";

/// Hashed once and verified against on unknown usernames
const DUMMY_PASSWORD: &str = "bookshelf-dummy-password";

/// User registration request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "jae")]
    pub username: String,
    pub password: String,
    /// One of `user`, `supervisor`, `manager`; defaults to `user`
    #[schema(example = "user")]
    pub role: Option<String>,
}

/// User login request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Successful login
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    /// Token lifetime in seconds
    pub expires_in: u64,
}

/// User information response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role,
        }
    }
}

/// Authentication service
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    tokens: Arc<TokenService>,
    password_config: PasswordConfig,
    dummy_hash: OnceCell<String>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, tokens: Arc<TokenService>) -> Self {
        Self {
            users,
            tokens,
            password_config: PasswordConfig::default(),
            dummy_hash: OnceCell::new(),
        }
    }

    /// Use different Argon2 parameters for new hashes
    pub fn with_password_config(mut self, config: PasswordConfig) -> Self {
        self.password_config = config;
        self.dummy_hash = OnceCell::new();
        self
    }

    /// Register a new user
    ///
    /// Fails with `BadRequest` for an empty username or password or an
    /// unknown role, and with `Conflict` if the username is taken. The
    /// `admin` role cannot be self-assigned.
    pub async fn register(
        &self,
        request: RegisterRequest,
        client: &ClientInfo,
    ) -> Result<UserInfo, AppError> {
        let username = request.username.trim().to_string();

        let result = self.try_register(&username, request, client).await;
        if let Err(e) = &result {
            audit_log(&AuditEvent::RegistrationFailure {
                username,
                reason: failure_reason(e),
                client: client.clone(),
            });
        }
        result
    }

    async fn try_register(
        &self,
        username: &str,
        request: RegisterRequest,
        client: &ClientInfo,
    ) -> Result<UserInfo, AppError> {
        if username.is_empty() || request.password.is_empty() {
            return Err(AppError::BadRequest(
                "Username and password are required".to_string(),
            ));
        }

        let role = match request.role.as_deref().map(str::trim) {
            None | Some("") => Role::default(),
            Some(name) => name
                .parse::<Role>()
                .map_err(|_| AppError::BadRequest(format!("Invalid role: {name}")))?,
        };
        if role == Role::Admin {
            return Err(AppError::BadRequest(
                "Role admin cannot be self-assigned".to_string(),
            ));
        }

        let password_hash = self.hash(request.password).await?;

        let user = self
            .users
            .create(NewUser {
                username: username.to_string(),
                password_hash,
                role,
            })
            .await
            .map_err(|e| match e {
                BookshelfError::Conflict(_) => {
                    AppError::Conflict("Username already exists".to_string())
                }
                other => other.into(),
            })?;

        tracing::info!(user_id = user.id, role = %user.role, "user registered");
        audit_log(&AuditEvent::RegistrationSuccess {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role.to_string(),
            client: client.clone(),
        });

        Ok(user.into())
    }

    /// Log in with username and password
    ///
    /// Unknown usernames and wrong passwords are indistinguishable to the
    /// caller. An unknown username still costs one password verification.
    pub async fn login(
        &self,
        request: LoginRequest,
        client: &ClientInfo,
    ) -> Result<LoginResponse, AppError> {
        let username = request.username.trim().to_string();

        let user = match self.users.get_by_username(&username).await {
            Ok(user) => user,
            Err(BookshelfError::NotFound(_)) => {
                let dummy = self.dummy_hash().await?;
                self.verify(request.password, dummy).await?;
                return Err(self.login_failed(username, "unknown user", client));
            }
            Err(e) => return Err(e.into()),
        };

        if !self.verify(request.password, user.password_hash.clone()).await? {
            return Err(self.login_failed(username, "wrong password", client));
        }

        let token = self
            .tokens
            .issue(&user.username, user.role)
            .map_err(|e| AppError::Internal(format!("Failed to issue token: {e}")))?;

        audit_log(&AuditEvent::LoginSuccess {
            username: user.username,
            role: user.role.to_string(),
            client: client.clone(),
        });

        Ok(LoginResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in: self.tokens.ttl_secs(),
        })
    }

    /// Current user for a verified identity
    pub async fn me(&self, identity: &Identity) -> Result<UserInfo, AppError> {
        let user = self.users.get_by_username(&identity.username).await?;
        Ok(user.into())
    }

    fn login_failed(&self, username: String, reason: &str, client: &ClientInfo) -> AppError {
        audit_log(&AuditEvent::LoginFailure {
            username,
            reason: reason.to_string(),
            client: client.clone(),
        });
        AppError::Unauthorized(LOGIN_FAILED_MESSAGE.to_string())
    }

    async fn hash(&self, password: String) -> Result<String, AppError> {
        let config = self.password_config.clone();
        tokio::task::spawn_blocking(move || hash_password_with_config(&password, &config))
            .await
            .map_err(|e| AppError::Internal(format!("Hashing task failed: {e}")))?
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    async fn dummy_hash(&self) -> Result<String, AppError> {
        self.dummy_hash
            .get_or_try_init(|| self.hash(DUMMY_PASSWORD.to_string()))
            .await
            .cloned()
    }

    async fn verify(&self, password: String, hash: String) -> Result<bool, AppError> {
        tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("Verification task failed: {e}")))
    }
}

fn failure_reason(error: &AppError) -> String {
    match error {
        AppError::BadRequest(msg) | AppError::Conflict(msg) => msg.clone(),
        _ => "internal error".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::TokenConfig;
    use bookshelf_core::MemoryStore;

    fn service() -> AuthService {
        let tokens = TokenService::new(TokenConfig {
            secret: "service-test-secret".to_string(),
            ttl_secs: 600,
            issuer: "bookshelf".to_string(),
            key_id: None,
        })
        .unwrap();

        AuthService::new(Arc::new(MemoryStore::new()), Arc::new(tokens))
            .with_password_config(PasswordConfig::light())
    }

    fn register_request(username: &str, role: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            password: "pw-123".to_string(),
            role: role.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let auth = service();
        let client = ClientInfo::default();

        let info = auth
            .register(register_request("jae", Some("Manager")), &client)
            .await
            .unwrap();
        assert_eq!(info.role, Role::Manager);

        let response = auth
            .login(
                LoginRequest {
                    username: "jae".to_string(),
                    password: "pw-123".to_string(),
                },
                &client,
            )
            .await
            .unwrap();
        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.expires_in, 600);

        let claims = auth.tokens.verify(&response.token).unwrap();
        assert_eq!(claims.sub, "jae");
        assert_eq!(claims.role, Role::Manager);

        let me = auth
            .me(&Identity {
                username: "jae".to_string(),
                role: Role::Manager,
            })
            .await
            .unwrap();
        assert_eq!(me, info);
    }

    #[tokio::test]
    async fn test_default_role_is_user() {
        let auth = service();
        let info = auth
            .register(register_request("kim", None), &ClientInfo::default())
            .await
            .unwrap();
        assert_eq!(info.role, Role::User);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input() {
        let auth = service();
        let client = ClientInfo::default();

        for request in [
            register_request("jae", Some("superuser")),
            register_request("jae", Some("admin")),
            register_request("   ", None),
            RegisterRequest {
                password: String::new(),
                ..register_request("jae", None)
            },
        ] {
            assert!(matches!(
                auth.register(request, &client).await,
                Err(AppError::BadRequest(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_duplicate_username() {
        let auth = service();
        let client = ClientInfo::default();

        auth.register(register_request("jae", None), &client)
            .await
            .unwrap();
        assert!(matches!(
            auth.register(register_request("jae", None), &client).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_login_trims_username() {
        let auth = service();
        let client = ClientInfo::default();
        auth.register(register_request("jae ", None), &client)
            .await
            .unwrap();

        let response = auth
            .login(
                LoginRequest {
                    username: "jae ".to_string(),
                    password: "pw-123".to_string(),
                },
                &client,
            )
            .await
            .unwrap();
        assert_eq!(auth.tokens.verify(&response.token).unwrap().sub, "jae");
    }

    #[tokio::test]
    async fn test_unknown_user_still_verifies_a_hash() {
        let auth = service();
        assert!(!auth.dummy_hash.initialized());

        let result = auth
            .login(
                LoginRequest {
                    username: "nobody".to_string(),
                    password: "pw-123".to_string(),
                },
                &ClientInfo::default(),
            )
            .await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));

        let dummy = auth.dummy_hash.get().unwrap();
        assert!(dummy.starts_with("$argon2id$"));
        assert!(verify_password(DUMMY_PASSWORD, dummy));
    }

    #[tokio::test]
    async fn test_login_failures_look_the_same() {
        let auth = service();
        let client = ClientInfo::default();
        auth.register(register_request("jae", None), &client)
            .await
            .unwrap();

        let wrong_password = auth
            .login(
                LoginRequest {
                    username: "jae".to_string(),
                    password: "nope".to_string(),
                },
                &client,
            )
            .await;
        let unknown_user = auth
            .login(
                LoginRequest {
                    username: "nobody".to_string(),
                    password: "pw-123".to_string(),
                },
                &client,
            )
            .await;

        for result in [wrong_password, unknown_user] {
            match result {
                Err(AppError::Unauthorized(msg)) => assert_eq!(msg, LOGIN_FAILED_MESSAGE),
                other => panic!("expected Unauthorized, got {other:?}"),
            }
        }
    }
}
