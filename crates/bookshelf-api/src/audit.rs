//! Security audit logging for authentication events
//!
//! Every login, registration, rejected token and denied request is logged
//! at INFO level with the "audit" target so it can be filtered and routed
//! separately from application logs. Tokens and passwords never appear in
//! an audit record.
//!
//! # Example
//!
//! ```ignore
//! use bookshelf_api::audit::{audit_log, AuditEvent, ClientInfo};
//!
//! audit_log(&AuditEvent::LoginSuccess {
//!     username: "jae".to_string(),
//!     role: "manager".to_string(),
//!     client: ClientInfo::from_headers(request.headers()),
//! });
//! ```

use axum::http::HeaderMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Request metadata attached to every audit record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client IP address (from proxy headers)
    pub ip_address: Option<String>,
    /// User agent string
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ip_address: extract_ip_address(headers),
            user_agent: extract_user_agent(headers),
        }
    }
}

/// Security audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Successful login, a token was issued
    LoginSuccess {
        username: String,
        role: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    /// Failed login attempt
    LoginFailure {
        username: String,
        reason: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    /// Successful user registration
    RegistrationSuccess {
        user_id: i64,
        username: String,
        role: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    /// Failed registration attempt
    RegistrationFailure {
        username: String,
        reason: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    /// Authenticated request rejected by an authorization policy
    AccessDenied {
        username: Option<String>,
        role: Option<String>,
        resource: String,
        policy: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    /// Missing, malformed, forged or expired token
    InvalidToken {
        reason: String,
        #[serde(flatten)]
        client: ClientInfo,
    },
}

/// Log a security audit event with structured fields
///
/// The full event is also attached as a JSON string for log aggregators.
pub fn audit_log(event: &AuditEvent) {
    let timestamp = Utc::now();

    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    match event {
        AuditEvent::LoginSuccess {
            username,
            role,
            client,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                username = %username,
                role = %role,
                ip_address = ?client.ip_address,
                "Login successful"
            );
        }
        AuditEvent::LoginFailure {
            username,
            reason,
            client,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                username = %username,
                reason = %reason,
                ip_address = ?client.ip_address,
                "Login failed"
            );
        }
        AuditEvent::RegistrationSuccess {
            user_id,
            username,
            role,
            client,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                username = %username,
                role = %role,
                ip_address = ?client.ip_address,
                "Registration successful"
            );
        }
        AuditEvent::RegistrationFailure {
            username,
            reason,
            client,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                username = %username,
                reason = %reason,
                ip_address = ?client.ip_address,
                "Registration failed"
            );
        }
        AuditEvent::AccessDenied {
            username,
            role,
            resource,
            policy,
            client,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                username = ?username,
                role = ?role,
                resource = %resource,
                policy = %policy,
                ip_address = ?client.ip_address,
                "Access denied"
            );
        }
        AuditEvent::InvalidToken { reason, client } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                reason = %reason,
                ip_address = ?client.ip_address,
                "Invalid token"
            );
        }
    }
}

/// Extract the client IP address from proxy headers
///
/// Checks X-Forwarded-For (first hop), then X-Real-IP.
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    if let Some(xff) = headers.get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            if let Some(first_ip) = xff_str.split(',').next() {
                return Some(first_ip.trim().to_string());
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return Some(ip_str.to_string());
        }
    }

    None
}

/// Extract user agent from request headers
pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ClientInfo {
        ClientInfo {
            ip_address: Some("192.168.1.1".to_string()),
            user_agent: Some("Test Agent".to_string()),
        }
    }

    #[test]
    fn test_audit_event_serialization() {
        let event = AuditEvent::LoginSuccess {
            username: "jae".to_string(),
            role: "manager".to_string(),
            client: client(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "login_success");
        assert_eq!(json["username"], "jae");
        assert_eq!(json["ip_address"], "192.168.1.1");
    }

    #[test]
    fn test_audit_log_all_events() {
        // Only checks that logging never panics
        audit_log(&AuditEvent::LoginFailure {
            username: "jae".to_string(),
            reason: "Invalid password".to_string(),
            client: client(),
        });
        audit_log(&AuditEvent::RegistrationSuccess {
            user_id: 7,
            username: "kim".to_string(),
            role: "user".to_string(),
            client: ClientInfo::default(),
        });
        audit_log(&AuditEvent::RegistrationFailure {
            username: "kim".to_string(),
            reason: "Username already exists".to_string(),
            client: ClientInfo::default(),
        });
        audit_log(&AuditEvent::AccessDenied {
            username: Some("kim".to_string()),
            role: Some("user".to_string()),
            resource: "DELETE /api/books/1".to_string(),
            policy: "at least manager".to_string(),
            client: client(),
        });
        audit_log(&AuditEvent::InvalidToken {
            reason: "Token has expired".to_string(),
            client: client(),
        });
    }

    #[test]
    fn test_extract_ip_from_x_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "203.0.113.1, 198.51.100.1".parse().unwrap(),
        );

        assert_eq!(extract_ip_address(&headers), Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_extract_ip_from_x_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "203.0.113.1".parse().unwrap());

        assert_eq!(extract_ip_address(&headers), Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_client_info_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::USER_AGENT,
            "Mozilla/5.0 (Test)".parse().unwrap(),
        );

        let info = ClientInfo::from_headers(&headers);
        assert_eq!(info.user_agent.as_deref(), Some("Mozilla/5.0 (Test)"));
        assert_eq!(info.ip_address, None);

        assert_eq!(ClientInfo::from_headers(&HeaderMap::new()), ClientInfo::default());
    }
}
