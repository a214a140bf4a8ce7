//! Mock DNS provider and IP lookup for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::ddns::{DdnsClient, DdnsError, DdnsResponse, ExternalIpResolver};

/// Replays scripted replies, one per update call. Once the script runs out
/// every call answers `911`.
#[derive(Debug, Default)]
pub struct MockDdnsClient {
    replies: Mutex<VecDeque<Result<DdnsResponse, DdnsError>>>,
    calls: AtomicUsize,
}

impl MockDdnsClient {
    pub fn new(replies: Vec<Result<DdnsResponse, DdnsError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of update requests made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DdnsClient for MockDdnsClient {
    async fn update(&self, _domain: &str) -> Result<DdnsResponse, DdnsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .unwrap_or(Ok(DdnsResponse::ServerError))
    }
}

/// Answers with a fixed address, or fails.
#[derive(Debug)]
pub struct MockExternalIp {
    ip: Mutex<Option<String>>,
}

impl MockExternalIp {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: Mutex::new(Some(ip.into())),
        }
    }

    pub fn failing() -> Self {
        Self {
            ip: Mutex::new(None),
        }
    }

    pub fn set_ip(&self, ip: impl Into<String>) {
        if let Ok(mut current) = self.ip.lock() {
            *current = Some(ip.into());
        }
    }
}

#[async_trait]
impl ExternalIpResolver for MockExternalIp {
    async fn external_ip(&self) -> Result<String, DdnsError> {
        self.ip
            .lock()
            .ok()
            .and_then(|ip| ip.clone())
            .ok_or_else(|| DdnsError::Request("lookup unavailable".to_string()))
    }
}
