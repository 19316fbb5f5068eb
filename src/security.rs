use std::net::IpAddr;

use chrono::{DateTime, Duration, Utc};

use crate::{error::ApiError, models::AdminSession, models::SecuritySettings};

/// RequestContext
///
/// What the policy needs to know about the caller of a single request.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    pub role: &'a str,
    /// Whether the identity provider reports a completed second factor for this token.
    pub two_factor: bool,
    pub client_ip: Option<IpAddr>,
    pub now: DateTime<Utc>,
}

/// PolicyViolation
///
/// Why a request was refused by the security policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyViolation {
    IpNotAllowed,
    TwoFactorRequired,
    SessionRevoked,
    SessionExpired,
    SessionIdle,
}

impl PolicyViolation {
    pub fn code(&self) -> &'static str {
        match self {
            PolicyViolation::IpNotAllowed => "ip_not_allowed",
            PolicyViolation::TwoFactorRequired => "two_factor_required",
            PolicyViolation::SessionRevoked => "session_revoked",
            PolicyViolation::SessionExpired => "session_expired",
            PolicyViolation::SessionIdle => "session_idle_timeout",
        }
    }
}

impl From<PolicyViolation> for ApiError {
    fn from(v: PolicyViolation) -> Self {
        match v {
            PolicyViolation::IpNotAllowed | PolicyViolation::TwoFactorRequired => {
                ApiError::Forbidden(v.code().to_string())
            }
            PolicyViolation::SessionRevoked
            | PolicyViolation::SessionExpired
            | PolicyViolation::SessionIdle => ApiError::Unauthorized(v.code().to_string()),
        }
    }
}

/// evaluate
///
/// Applies the security settings to one request. Checks run in a fixed order: IP
/// allow-list, two-factor requirement, then (if the token is bound to a session)
/// revocation, absolute age and idle timeout.
pub fn evaluate(
    settings: &SecuritySettings,
    ctx: &RequestContext<'_>,
    session: Option<&AdminSession>,
) -> Result<(), PolicyViolation> {
    if !ip_allowed(&settings.ip_allowlist, ctx.client_ip) {
        return Err(PolicyViolation::IpNotAllowed);
    }

    let needs_two_factor = settings
        .two_factor_required_roles
        .iter()
        .any(|r| r == ctx.role);
    if needs_two_factor {
        // A session started without 2FA stays unverified even if a later token claims it.
        let verified = ctx.two_factor && session.is_none_or(|s| s.two_factor_verified);
        if !verified {
            return Err(PolicyViolation::TwoFactorRequired);
        }
    }

    if let Some(session) = session {
        if session.is_revoked() {
            return Err(PolicyViolation::SessionRevoked);
        }
        let max_age = Duration::hours(i64::from(settings.session_max_age_hours));
        if settings.session_max_age_hours > 0 && ctx.now - session.created_at > max_age {
            return Err(PolicyViolation::SessionExpired);
        }
        let idle = Duration::minutes(i64::from(settings.session_idle_timeout_minutes));
        if settings.session_idle_timeout_minutes > 0 && ctx.now - session.last_seen_at > idle {
            return Err(PolicyViolation::SessionIdle);
        }
    }

    Ok(())
}

/// An empty allow-list admits everybody; otherwise the caller's IP must be listed.
/// A request whose IP cannot be determined is refused when the list is non-empty.
pub fn ip_allowed(allowlist: &[String], client_ip: Option<IpAddr>) -> bool {
    if allowlist.is_empty() {
        return true;
    }
    let Some(ip) = client_ip else {
        return false;
    };
    allowlist
        .iter()
        .filter_map(|entry| entry.parse::<IpAddr>().ok())
        .any(|allowed| allowed == ip)
}
