//! Authentication and authorization module
//!
//! - Password hashing with Argon2id
//! - Signed, time-limited session tokens
//! - Authentication gate middleware attaching the caller's identity
//! - Per-route authorization policies
//! - Registration and login service

pub mod middleware;
pub mod password;
pub mod policy;
pub mod service;
pub mod token;

pub use middleware::{auth_middleware, extract_bearer_token, AuthError, Identity};
pub use password::{hash_password, verify_password, PasswordConfig};
pub use policy::{require, AuthorizationPolicy};
pub use service::{AuthService, LoginRequest, LoginResponse, RegisterRequest, UserInfo};
pub use token::{Claims, TokenConfig, TokenError, TokenService};
