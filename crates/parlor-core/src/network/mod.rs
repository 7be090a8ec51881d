//! Network plumbing shared by the hub client and the server adapter.

pub mod client;
pub mod retry;

pub use client::{api_client, join_url, streaming_client};
pub use retry::RetryConfig;
