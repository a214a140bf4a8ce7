//! Periodic No-IP record updater.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info};

use super::client::{DdnsClient, DdnsError, ExternalIpResolver};
use super::response::DdnsResponse;
use crate::task::{PeriodicWork, TaskError, TaskState};

/// State value holding the last address the provider confirmed.
pub const IP_KEY: &str = "ip";

/// Backoff after the provider answers `911`.
pub const SERVER_ERROR_BACKOFF_MINUTES: i64 = 30;

/// Keeps a No-IP hostname pointed at the station's public address.
///
/// Persisted under the `ddns` prefix: `ddns.ip`, `ddns.fatal` and
/// `ddns.retry.after.millis`.
pub struct NoIpTask {
    domain: String,
    client: Arc<dyn DdnsClient>,
    resolver: Arc<dyn ExternalIpResolver>,
}

impl NoIpTask {
    pub fn new(
        domain: impl Into<String>,
        client: Arc<dyn DdnsClient>,
        resolver: Arc<dyn ExternalIpResolver>,
    ) -> Self {
        Self {
            domain: domain.into(),
            client,
            resolver,
        }
    }
}

#[async_trait]
impl PeriodicWork for NoIpTask {
    fn name(&self) -> &str {
        "ddns"
    }

    async fn execute(
        &self,
        mut state: TaskState,
        now: DateTime<Utc>,
    ) -> Result<TaskState, TaskError> {
        let external_ip = self
            .resolver
            .external_ip()
            .await
            .map_err(TaskError::work)?;
        if state.value(IP_KEY) == Some(external_ip.as_str()) {
            debug!("External IP unchanged ({}), skipping DDNS update", external_ip);
            return Ok(state);
        }

        let response = match self.client.update(&self.domain).await {
            Ok(response) => response,
            Err(DdnsError::Status { status, body }) => {
                error!(
                    "Unable to update DDNS, response code: {}. Body: {}",
                    status, body
                );
                return Ok(state);
            }
            Err(e) => return Err(TaskError::work(e)),
        };

        match response {
            DdnsResponse::Updated { ip: Some(ip) } => {
                info!("DDNS record for {} now points to {}", self.domain, ip);
                state.set_value(IP_KEY, ip);
                Ok(state)
            }
            DdnsResponse::Updated { ip: None } => {
                debug!("DDNS update accepted without an address");
                Ok(state)
            }
            DdnsResponse::Fatal(code) => {
                error!("Fatal DDNS error: {}. Please check DDNS settings", code);
                Ok(state.into_fatal())
            }
            DdnsResponse::ServerError => {
                let deadline = now + Duration::minutes(SERVER_ERROR_BACKOFF_MINUTES);
                error!(
                    "DDNS provider returned a server error, retrying after {}",
                    deadline
                );
                Ok(state.backoff_until(deadline))
            }
            DdnsResponse::Unknown(line) => {
                debug!("Unknown DDNS response: {}", line);
                Ok(state)
            }
        }
    }
}
