//! HTTP clients for the DNS updater.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use super::response::DdnsResponse;
use crate::config::DdnsConfig;

/// User agent No-IP requires clients to identify with.
pub const USER_AGENT: &str = "groundstation/0.1 groundstation-ddns";

/// Errors talking to the DNS provider or the IP lookup service.
#[derive(Debug, Error)]
pub enum DdnsError {
    #[error("HTTP client setup failed: {0}")]
    Setup(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid external IP response: {0:?}")]
    InvalidIp(String),
}

impl From<reqwest::Error> for DdnsError {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e.to_string())
    }
}

/// Sends update requests to the DNS provider.
#[async_trait]
pub trait DdnsClient: Send + Sync {
    /// Point `domain` at the caller's current address.
    async fn update(&self, domain: &str) -> Result<DdnsResponse, DdnsError>;
}

/// Finds this station's public address.
#[async_trait]
pub trait ExternalIpResolver: Send + Sync {
    async fn external_ip(&self) -> Result<String, DdnsError>;
}

/// No-IP update API client.
pub struct NoIpClient {
    client: Client,
    update_url: String,
    username: String,
    password: String,
}

impl NoIpClient {
    pub fn new(config: &DdnsConfig) -> Result<Self, DdnsError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DdnsError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            update_url: config.update_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }
}

#[async_trait]
impl DdnsClient for NoIpClient {
    async fn update(&self, domain: &str) -> Result<DdnsResponse, DdnsError> {
        let response = self
            .client
            .get(&self.update_url)
            .query(&[("hostname", domain)])
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.as_u16() != 200 {
            return Err(DdnsError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        debug!("DDNS update response: {}", body.trim_end());
        Ok(DdnsResponse::parse(&body))
    }
}

/// Reads the public address from a plain-text lookup endpoint.
pub struct HttpExternalIp {
    client: Client,
    url: String,
}

impl HttpExternalIp {
    pub fn new(config: &DdnsConfig) -> Result<Self, DdnsError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DdnsError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            url: config.external_ip_url.clone(),
        })
    }
}

#[async_trait]
impl ExternalIpResolver for HttpExternalIp {
    async fn external_ip(&self) -> Result<String, DdnsError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(DdnsError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }
        parse_ip(&body)
    }
}

fn parse_ip(body: &str) -> Result<String, DdnsError> {
    let candidate = body.trim();
    candidate
        .parse::<std::net::IpAddr>()
        .map(|ip| ip.to_string())
        .map_err(|_| DdnsError::InvalidIp(candidate.chars().take(64).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn config(base_url: &str) -> DdnsConfig {
        DdnsConfig {
            username: "station".into(),
            password: "secret".into(),
            domain: "station.ddns.net".into(),
            update_url: format!("{}/nic/update", base_url),
            external_ip_url: format!("{}/", base_url),
            interval_secs: 3600,
            timeout_secs: 5,
        }
    }

    /// Answer a single HTTP request; the handle yields the raw request head.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if n == 0 || request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });
        (base_url, handle)
    }

    #[tokio::test]
    async fn test_update_request_shape() {
        let (base_url, server) = serve_once("200 OK", "good 203.0.113.5\n").await;
        let client = NoIpClient::new(&config(&base_url)).unwrap();

        let response = client.update("station.ddns.net").await.unwrap();
        assert_eq!(
            response,
            DdnsResponse::Updated {
                ip: Some("203.0.113.5".into())
            }
        );

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /nic/update?hostname=station.ddns.net HTTP/1.1"));
        assert!(request.contains("c3RhdGlvbjpzZWNyZXQ="));
        assert!(request.contains(USER_AGENT));
    }

    #[tokio::test]
    async fn test_update_non_200_is_status_error() {
        let (base_url, server) = serve_once("401 Unauthorized", "badauth").await;
        let client = NoIpClient::new(&config(&base_url)).unwrap();

        let err = client.update("station.ddns.net").await.unwrap_err();
        assert!(matches!(err, DdnsError::Status { status: 401, ref body } if body == "badauth"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_external_ip_lookup() {
        let (base_url, server) = serve_once("200 OK", "198.51.100.7\n").await;
        let resolver = HttpExternalIp::new(&config(&base_url)).unwrap();

        assert_eq!(resolver.external_ip().await.unwrap(), "198.51.100.7");
        server.await.unwrap();
    }

    #[test]
    fn test_parse_ip() {
        assert_eq!(parse_ip("203.0.113.5\n").unwrap(), "203.0.113.5");
        assert_eq!(parse_ip(" 2001:db8::1 ").unwrap(), "2001:db8::1");
        assert!(matches!(
            parse_ip("<html>rate limited</html>"),
            Err(DdnsError::InvalidIp(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_request_error() {
        let client = NoIpClient::new(&config("http://127.0.0.1:9")).unwrap();
        let err = client.update("station.ddns.net").await.unwrap_err();
        assert!(matches!(err, DdnsError::Request(_)));
    }
}
