use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};

use crate::{
    config::{AppConfig, Env},
    error::{ApiError, StoreError},
    models::{AdminSession, UserStatus},
    rbac::AccessControl,
    repository::RepositoryState,
    security::{self, RequestContext},
};

/// Claims
///
/// Payload of the tokens minted by the identity provider for admin users.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Identity-provider uid; the id of the `users/{uid}` document.
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
    /// Session id, tracked in the `sessions` collection. Tokens without one are refused.
    #[serde(default)]
    pub sid: Option<String>,
    /// True when the sign-in completed a second factor.
    #[serde(default)]
    pub mfa: bool,
}

/// AuthUser
///
/// The resolved identity of an authenticated request, after the account status and
/// security policy checks passed. Permission checks happen later, per handler, through
/// `AccessControl::require_permission`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub role: String,
    pub session_id: Option<String>,
    pub two_factor: bool,
}

/// client_ip
///
/// Caller IP as seen through `trusted_hops` reverse proxies. Each proxy appends the address
/// it received the request from to `x-forwarded-for`, so only the rightmost `trusted_hops`
/// entries are trustworthy; anything left of them is client-supplied. The entry
/// `trusted_hops` positions from the right is the caller. `x-real-ip` is only consulted
/// when `x-forwarded-for` is absent. With `trusted_hops == 0` no header is trusted.
pub fn client_ip(headers: &HeaderMap, trusted_hops: usize) -> Option<IpAddr> {
    if trusted_hops == 0 {
        return None;
    }

    let forwarded: Vec<&str> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();

    if forwarded.is_empty() {
        return headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
    }

    let index = forwarded.len().saturating_sub(trusted_hops);
    forwarded[index].parse().ok()
}

/// Caller IP for a request: forwarded headers per `client_ip`, then the socket peer
/// address when the server was started with connect info.
pub fn request_ip(parts: &Parts, trusted_hops: usize) -> Option<IpAddr> {
    client_ip(&parts.headers, trusted_hops).or_else(|| {
        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    })
}

/// ClientIp
///
/// Extractor for the resolved caller IP, for handlers that check it against the allow-list.
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub Option<IpAddr>);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);
        Ok(ClientIp(request_ip(parts, config.trusted_proxy_hops)))
    }
}

fn decode_claims(parts: &Parts, secret: &str) -> Result<Claims, ApiError> {
    let token = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;

    let mut validation = Validation::default();
    validation.validate_exp = true;

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => ApiError::Unauthorized("token expired".into()),
            _ => ApiError::Unauthorized("invalid token".into()),
        })
}

/// AuthUser Extractor Implementation
///
/// 1. Reuse an identity already resolved by the staff middleware (request extensions).
/// 2. Local bypass: `x-user-id` header, only in `Env::Local`.
/// 3. Bearer JWT validation (signature, `exp`, and a `sid` claim).
/// 4. User lookup: unknown users are 401, suspended or deleted accounts 403.
/// 5. Security policy: IP allow-list, 2FA for the role, session revocation and timeouts.
/// 6. Session bookkeeping: unknown `sid`s are registered, known ones touched.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
    AccessControl: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);
        let access = AccessControl::from_ref(state);

        let bypass_id = match config.env {
            Env::Local => parts
                .headers
                .get("x-user-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            Env::Production => None,
        };

        let (user_id, claims) = match bypass_id {
            Some(id) => (id, None),
            None => {
                let claims = decode_claims(parts, &config.jwt_secret)?;
                // Without a session id the token could not be revoked.
                if claims.sid.as_deref().is_none_or(|sid| sid.trim().is_empty()) {
                    return Err(ApiError::Unauthorized("token has no session id".into()));
                }
                (claims.sub.clone(), Some(claims))
            }
        };

        let user = repo
            .get_user(&user_id)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("unknown user".into()))?;
        if user.status != UserStatus::Active {
            return Err(ApiError::Forbidden(format!(
                "account is {}",
                user.status.as_str()
            )));
        }

        // The local bypass stands in for a fully verified sign-in.
        let two_factor = claims.as_ref().is_none_or(|c| c.mfa);
        let session_id = claims.as_ref().and_then(|c| c.sid.clone());
        let now = Utc::now();
        let ip = request_ip(parts, config.trusted_proxy_hops);

        let session = match &session_id {
            Some(sid) => match repo.get_session(sid).await? {
                Some(s) if s.user_id != user.id => {
                    return Err(ApiError::Unauthorized(
                        "session belongs to another user".into(),
                    ));
                }
                other => other,
            },
            None => None,
        };

        let settings = access.security_settings().await?;
        let ctx = RequestContext {
            role: &user.role,
            two_factor,
            client_ip: ip,
            now,
        };
        if let Err(violation) = security::evaluate(&settings, &ctx, session.as_ref()) {
            tracing::warn!(
                user_id = %user.id,
                reason = violation.code(),
                "request refused by security policy"
            );
            return Err(violation.into());
        }

        match (&session_id, &session) {
            (Some(sid), Some(_)) => repo.touch_session(sid, now).await?,
            (Some(sid), None) => {
                let user_agent = parts
                    .headers
                    .get(header::USER_AGENT)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.chars().take(256).collect());
                let created = repo
                    .create_session(AdminSession {
                        id: sid.clone(),
                        user_id: user.id.clone(),
                        created_at: now,
                        last_seen_at: now,
                        ip_address: ip.map(|ip| ip.to_string()),
                        user_agent,
                        two_factor_verified: two_factor,
                        revoked_at: None,
                    })
                    .await;
                match created {
                    Ok(_) => tracing::info!(user_id = %user.id, session_id = %sid, "session registered"),
                    // Another request registered it first.
                    Err(StoreError::Conflict(_)) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            _ => {}
        }

        Ok(AuthUser {
            id: user.id,
            role: user.role,
            session_id,
            two_factor,
        })
    }
}
