//! Dynamic DNS updater for the No-IP protocol.
//!
//! [`NoIpTask`] is a [`PeriodicWork`](crate::task::PeriodicWork): run it
//! inside a [`ResilientTask`](crate::task::ResilientTask) so that `911`
//! responses back off for 30 minutes and credential errors disable it for
//! good, across restarts.

mod client;
mod response;
mod task;

pub use client::{DdnsClient, DdnsError, ExternalIpResolver, HttpExternalIp, NoIpClient, USER_AGENT};
pub use response::DdnsResponse;
pub use task::{NoIpTask, IP_KEY, SERVER_ERROR_BACKOFF_MINUTES};
