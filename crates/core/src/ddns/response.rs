//! No-IP update protocol responses.
//!
//! See <https://www.noip.com/integrate/response>.

/// Outcome codes that mean the account or client is misconfigured.
const FATAL_CODES: [&str; 5] = ["nohost", "badauth", "badagent", "!donator", "abuse"];

/// Parsed first line of an update response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdnsResponse {
    /// `good <ip>` or `nochg <ip>`. The address is absent when the server
    /// did not echo one.
    Updated { ip: Option<String> },
    /// Requires operator intervention; never retry.
    Fatal(String),
    /// `911`: provider-side failure, retry later.
    ServerError,
    /// Anything else.
    Unknown(String),
}

impl DdnsResponse {
    pub fn parse(body: &str) -> Self {
        let line = body.lines().next().unwrap_or("").trim_end();

        if line.starts_with("good") || line.starts_with("nochg") {
            let ip = line
                .split_once(' ')
                .map(|(_, ip)| ip.trim().to_string())
                .filter(|ip| !ip.is_empty());
            return Self::Updated { ip };
        }
        if FATAL_CODES.contains(&line) {
            return Self::Fatal(line.to_string());
        }
        if line == "911" {
            return Self::ServerError;
        }
        Self::Unknown(line.to_string())
    }
}
