//! Login/logout audit trail.
//!
//! Events go to an [`AuditSink`] injected at startup; the default sink writes
//! them as structured `tracing` events under the `polls::audit` target.

use actix_web::HttpRequest;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

pub const AUDIT_TARGET: &str = "polls::audit";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Login,
    Logout,
    LoginFailed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub kind: AuditKind,
    pub username: Option<String>,
    pub client_ip: Option<String>,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(kind: AuditKind, username: Option<String>, client_ip: Option<String>) -> Self {
        Self {
            kind,
            username,
            client_ip,
            at: Utc::now(),
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        let username = event.username.as_deref().unwrap_or("-");
        let client_ip = event.client_ip.as_deref().unwrap_or("-");
        let at = event.at.to_rfc3339();
        match event.kind {
            AuditKind::Login => {
                info!(target: AUDIT_TARGET, username, client_ip, at = at.as_str(), "User logged in")
            }
            AuditKind::Logout => {
                info!(target: AUDIT_TARGET, username, client_ip, at = at.as_str(), "User logged out")
            }
            AuditKind::LoginFailed => {
                warn!(target: AUDIT_TARGET, username, client_ip, at = at.as_str(), "Login failed")
            }
        }
    }
}

/// First `X-Forwarded-For` entry when present, otherwise the peer address.
pub fn client_ip(req: &HttpRequest) -> Option<String> {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    match forwarded {
        Some(ip) => Some(ip.to_owned()),
        None => req.peer_addr().map(|addr| addr.ip().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn prefers_first_forwarded_address() {
        let req = TestRequest::default()
            .insert_header(("X-Forwarded-For", "203.0.113.7, 10.0.0.1"))
            .peer_addr("192.0.2.1:4000".parse().unwrap())
            .to_http_request();
        assert_eq!(client_ip(&req).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn falls_back_to_peer_address() {
        let req = TestRequest::default()
            .peer_addr("192.0.2.1:4000".parse().unwrap())
            .to_http_request();
        assert_eq!(client_ip(&req).as_deref(), Some("192.0.2.1"));
    }

    #[test]
    fn no_address_known() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(client_ip(&req), None);
    }
}
