use std::net::IpAddr;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use wellness_admin::{
    error::ApiError,
    models::{AdminSession, SecuritySettings},
    security::{PolicyViolation, RequestContext, evaluate, ip_allowed},
};

fn session(age: Duration, idle: Duration, verified: bool) -> AdminSession {
    let now = Utc::now();
    AdminSession {
        id: "sid-1".to_string(),
        user_id: "admin-1".to_string(),
        created_at: now - age,
        last_seen_at: now - idle,
        ip_address: None,
        user_agent: None,
        two_factor_verified: verified,
        revoked_at: None,
    }
}

fn ctx<'a>(role: &'a str, two_factor: bool, ip: Option<&str>) -> RequestContext<'a> {
    RequestContext {
        role,
        two_factor,
        client_ip: ip.map(|ip| ip.parse::<IpAddr>().unwrap()),
        now: Utc::now(),
    }
}

#[test]
fn test_allowlist() {
    assert!(ip_allowed(&[], None));
    let list = vec!["10.0.0.1".to_string(), "2001:db8::1".to_string()];
    assert!(ip_allowed(&list, Some("10.0.0.1".parse().unwrap())));
    assert!(ip_allowed(&list, Some("2001:db8::1".parse().unwrap())));
    assert!(!ip_allowed(&list, Some("10.0.0.2".parse().unwrap())));
    assert!(!ip_allowed(&list, None));
}

#[test]
fn test_two_factor_required_for_configured_roles() {
    let settings = SecuritySettings::default();

    assert_eq!(
        evaluate(&settings, &ctx("admin", false, None), None),
        Err(PolicyViolation::TwoFactorRequired)
    );
    assert!(evaluate(&settings, &ctx("admin", true, None), None).is_ok());
    // Editors are not in the default 2FA list.
    assert!(evaluate(&settings, &ctx("editor", false, None), None).is_ok());
}

#[test]
fn test_unverified_session_stays_unverified() {
    let settings = SecuritySettings::default();
    let s = session(Duration::minutes(5), Duration::minutes(1), false);
    assert_eq!(
        evaluate(&settings, &ctx("super_admin", true, None), Some(&s)),
        Err(PolicyViolation::TwoFactorRequired)
    );
}

#[test]
fn test_session_lifetime_checks() {
    let settings = SecuritySettings::default();

    let fresh = session(Duration::hours(1), Duration::minutes(5), true);
    assert!(evaluate(&settings, &ctx("admin", true, None), Some(&fresh)).is_ok());

    let mut revoked = fresh.clone();
    revoked.revoked_at = Some(Utc::now());
    assert_eq!(
        evaluate(&settings, &ctx("admin", true, None), Some(&revoked)),
        Err(PolicyViolation::SessionRevoked)
    );

    let old = session(Duration::hours(13), Duration::minutes(1), true);
    assert_eq!(
        evaluate(&settings, &ctx("admin", true, None), Some(&old)),
        Err(PolicyViolation::SessionExpired)
    );

    let idle = session(Duration::hours(2), Duration::minutes(45), true);
    assert_eq!(
        evaluate(&settings, &ctx("admin", true, None), Some(&idle)),
        Err(PolicyViolation::SessionIdle)
    );
}

#[test]
fn test_checks_run_in_order() {
    let settings = SecuritySettings {
        ip_allowlist: vec!["10.0.0.1".to_string()],
        ..SecuritySettings::default()
    };
    let mut s = session(Duration::hours(20), Duration::hours(2), false);
    s.revoked_at = Some(Utc::now());

    // Everything is wrong; the IP check comes first.
    assert_eq!(
        evaluate(&settings, &ctx("admin", false, Some("192.168.1.5")), Some(&s)),
        Err(PolicyViolation::IpNotAllowed)
    );
    assert_eq!(
        evaluate(&settings, &ctx("admin", false, Some("10.0.0.1")), Some(&s)),
        Err(PolicyViolation::TwoFactorRequired)
    );
    // Not a 2FA role: revocation wins over age and idleness.
    assert_eq!(
        evaluate(&settings, &ctx("viewer", false, Some("10.0.0.1")), Some(&s)),
        Err(PolicyViolation::SessionRevoked)
    );
}

#[test]
fn test_violation_status_codes() {
    let forbidden: ApiError = PolicyViolation::TwoFactorRequired.into();
    assert_eq!(forbidden.status_code(), StatusCode::FORBIDDEN);
    let forbidden: ApiError = PolicyViolation::IpNotAllowed.into();
    assert_eq!(forbidden.status_code(), StatusCode::FORBIDDEN);

    for v in [
        PolicyViolation::SessionRevoked,
        PolicyViolation::SessionExpired,
        PolicyViolation::SessionIdle,
    ] {
        let err: ApiError = v.into();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), v.code());
    }
}

#[test]
fn test_session_violation_codes() {
    assert_eq!(PolicyViolation::SessionRevoked.code(), "session_revoked");
    assert_eq!(PolicyViolation::SessionExpired.code(), "session_expired");
    assert_eq!(PolicyViolation::SessionIdle.code(), "session_idle_timeout");
}
