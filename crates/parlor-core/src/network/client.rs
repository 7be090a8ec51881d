//! HTTP client construction.
//!
//! Two `reqwest` clients are used: one with a total timeout for small API
//! calls (manifest listing, health checks), and one with only a connect
//! timeout for file transfers and token streams, which can legitimately run
//! for many minutes.

use crate::config::NetworkConfig;
use crate::{ParlorError, Result};
use reqwest::Client;

/// Client for request/response API calls.
pub fn api_client() -> Result<Client> {
    Client::builder()
        .timeout(NetworkConfig::REQUEST_TIMEOUT)
        .user_agent(NetworkConfig::USER_AGENT)
        .build()
        .map_err(|e| ParlorError::Network {
            message: format!("Failed to create HTTP client: {}", e),
            cause: None,
        })
}

/// Client for long-running transfers and streams.
pub fn streaming_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(NetworkConfig::CONNECT_TIMEOUT)
        .user_agent(NetworkConfig::USER_AGENT)
        .build()
        .map_err(|e| ParlorError::Network {
            message: format!("Failed to create streaming HTTP client: {}", e),
            cause: None,
        })
}

/// Join a base URL and a path without doubling or dropping the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clients_build() {
        assert!(api_client().is_ok());
        assert!(streaming_client().is_ok());
    }

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("https://huggingface.co/", "/api/models/a/b"),
            "https://huggingface.co/api/models/a/b"
        );
        assert_eq!(join_url("http://127.0.0.1:8080", "health"), "http://127.0.0.1:8080/health");
    }
}
