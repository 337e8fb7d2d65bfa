//! Application state management

use crate::auth::{AuthService, PasswordConfig, TokenConfig, TokenError, TokenService};
use bookshelf_core::{AppConfig, BookRepository, MemoryStore, UserRepository};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Request statistics for one normalized endpoint
#[derive(Debug, Clone, Default, Serialize)]
pub struct EndpointMetrics {
    pub requests: u64,
    /// Response count per HTTP status code
    pub status_counts: BTreeMap<u16, u64>,
    pub total_latency_us: u64,
    pub max_latency_us: u64,
}

impl EndpointMetrics {
    pub fn average_latency_us(&self) -> u64 {
        self.total_latency_us.checked_div(self.requests).unwrap_or(0)
    }
}

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Token issuer and verifier, shared with the authentication gate
    pub tokens: Arc<TokenService>,
    /// Registration and login
    pub auth: AuthService,
    pub books: Arc<dyn BookRepository>,
    pub users: Arc<dyn UserRepository>,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Ready status
    pub is_ready: AtomicBool,
    /// Per-endpoint request statistics
    pub metrics: RwLock<BTreeMap<String, EndpointMetrics>>,
}

impl AppState {
    /// Create application state over the given repositories
    ///
    /// Fails if the configured signing secret is empty.
    pub fn new(
        config: AppConfig,
        books: Arc<dyn BookRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Result<Self, TokenError> {
        let tokens = Arc::new(TokenService::new(TokenConfig::from(&config.auth))?);
        let auth = AuthService::new(Arc::clone(&users), Arc::clone(&tokens));

        Ok(Self {
            config,
            tokens,
            auth,
            books,
            users,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            is_ready: AtomicBool::new(true),
            metrics: RwLock::new(BTreeMap::new()),
        })
    }

    /// Create application state backed by a fresh in-memory store
    pub fn in_memory(config: AppConfig) -> Result<Self, TokenError> {
        let store = Arc::new(MemoryStore::new());
        Self::new(config, store.clone(), store)
    }

    /// Use different Argon2 parameters for new password hashes
    pub fn with_password_config(mut self, config: PasswordConfig) -> Self {
        self.auth = self.auth.with_password_config(config);
        self
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if service is ready
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    /// Set ready status
    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }

    /// Record one completed request
    pub async fn record_request(&self, endpoint: String, status: u16, latency_us: u64) {
        self.increment_requests();

        let mut metrics = self.metrics.write().await;
        let entry = metrics.entry(endpoint).or_default();
        entry.requests += 1;
        *entry.status_counts.entry(status).or_default() += 1;
        entry.total_latency_us += latency_us;
        entry.max_latency_us = entry.max_latency_us.max(latency_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = "state-test-secret".to_string();
        config
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(
            AppState::in_memory(AppConfig::default()),
            Err(TokenError::MissingSecret)
        ));
    }

    #[tokio::test]
    async fn test_record_request() {
        let state = AppState::in_memory(config()).unwrap();

        state.record_request("/api/books".to_string(), 200, 100).await;
        state.record_request("/api/books".to_string(), 200, 300).await;
        state.record_request("/api/books".to_string(), 401, 20).await;

        assert_eq!(state.get_request_count(), 3);

        let metrics = state.metrics.read().await;
        let books = &metrics["/api/books"];
        assert_eq!(books.requests, 3);
        assert_eq!(books.status_counts[&200], 2);
        assert_eq!(books.status_counts[&401], 1);
        assert_eq!(books.max_latency_us, 300);
        assert_eq!(books.average_latency_us(), 140);
    }

    #[test]
    fn test_ready_flag() {
        let state = AppState::in_memory(config()).unwrap();
        assert!(state.is_ready());
        state.set_ready(false);
        assert!(!state.is_ready());
    }
}
