//! Role-based authorization policies
//!
//! A policy runs after the authentication gate and decides, from the
//! caller's role alone, whether the route may proceed. Two shapes are
//! supported and chosen per route when the router is built:
//!
//! - `Hierarchical`: ranked roles, `user < supervisor < manager`
//! - `Allowlist`: exact membership, no ordering
//!
//! `admin` sits outside the hierarchy (rank 0) and is only ever granted
//! access by an allowlist.

use super::middleware::{AuthError, Identity};
use crate::audit::{audit_log, AuditEvent, ClientInfo};
use axum::{extract::Request, middleware::Next, response::Response};
use bookshelf_core::Role;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Per-route authorization requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationPolicy {
    /// Caller rank must be at least the rank of `required`
    Hierarchical { required: Role },
    /// Caller role must be one of `allowed`
    Allowlist { allowed: Vec<Role> },
}

impl AuthorizationPolicy {
    pub fn at_least(required: Role) -> Self {
        Self::Hierarchical { required }
    }

    pub fn any_of(allowed: impl IntoIterator<Item = Role>) -> Self {
        Self::Allowlist {
            allowed: allowed.into_iter().collect(),
        }
    }

    /// Whether `role` satisfies this policy
    ///
    /// Rank 0 never satisfies a hierarchical check, on either side.
    pub fn permits(&self, role: Role) -> bool {
        match self {
            Self::Hierarchical { required } => {
                let (caller, needed) = (role.rank(), required.rank());
                caller > 0 && needed > 0 && caller >= needed
            }
            Self::Allowlist { allowed } => allowed.contains(&role),
        }
    }

    /// Check an optional identity against this policy
    ///
    /// A missing identity means the gate did not run; that fails closed.
    pub fn check(&self, identity: Option<&Identity>) -> Result<(), AuthError> {
        let identity = identity.ok_or(AuthError::MissingIdentity)?;
        if self.permits(identity.role) {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}

impl fmt::Display for AuthorizationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hierarchical { required } => write!(f, "at least {required}"),
            Self::Allowlist { allowed } => {
                let names: Vec<&str> = allowed.iter().map(Role::as_str).collect();
                write!(f, "one of [{}]", names.join(", "))
            }
        }
    }
}

/// Type alias for policy middleware future
type PolicyFuture = Pin<Box<dyn Future<Output = Result<Response, AuthError>> + Send>>;

/// Middleware factory enforcing `policy` on the routes it is layered on
///
/// Must be layered inside the authentication gate.
///
/// # Example
///
/// ```ignore
/// use axum::{middleware, routing::delete, Router};
/// use bookshelf_api::auth::{require, AuthorizationPolicy};
/// use bookshelf_core::Role;
///
/// let app = Router::new()
///     .route("/api/books/:id", delete(delete_book))
///     .route_layer(middleware::from_fn(require(AuthorizationPolicy::at_least(Role::Manager))));
/// ```
pub fn require(
    policy: AuthorizationPolicy,
) -> impl Fn(Request, Next) -> PolicyFuture + Clone {
    let policy = Arc::new(policy);

    move |request: Request, next: Next| {
        let policy = Arc::clone(&policy);
        Box::pin(async move {
            let identity = request.extensions().get::<Identity>().cloned();

            if let Err(e) = policy.check(identity.as_ref()) {
                if matches!(e, AuthError::Forbidden) {
                    audit_log(&AuditEvent::AccessDenied {
                        username: identity.as_ref().map(|i| i.username.clone()),
                        role: identity.as_ref().map(|i| i.role.to_string()),
                        resource: format!("{} {}", request.method(), request.uri().path()),
                        policy: policy.to_string(),
                        client: ClientInfo::from_headers(request.headers()),
                    });
                }
                return Err(e);
            }

            Ok(next.run(request).await)
        })
    }
}
